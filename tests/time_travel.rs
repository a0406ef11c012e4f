//! Versioned-connection scenarios: transactions, snapshots, and
//! point-in-time retrieval.

use std::collections::HashSet;

use chrono::Duration;
use umbra::{
    as_of, diff, since, Connection, ConnectionOptions, Registry, TimePoint, TxOp, Value,
};

fn scratch() -> (tempfile::TempDir, Registry) {
    let dir = tempfile::tempdir().unwrap();
    let registry = Registry::new(ConnectionOptions::default(), dir.path().to_path_buf());
    (dir, registry)
}

fn assert_same_value(conn: &Connection, s: i64, expected: Option<i64>, at: impl Into<TimePoint>) {
    let db = conn.db().unwrap();
    let snapshot = as_of(&db, at);
    let pattern = umbra::TriplePattern::new(
        umbra::Slot::Val(Value::Int(s)),
        umbra::Slot::Val(Value::kw("reg", "value")),
        umbra::Slot::Free,
    );
    let found: Vec<Vec<Value>> = snapshot.graph.resolve(&pattern).collect();
    match expected {
        Some(v) => assert_eq!(found, vec![vec![Value::Int(v)]]),
        None => assert!(found.is_empty()),
    }
}

fn set_value(conn: &Connection, s: i64, old: Option<i64>, new: i64) {
    let mut ops = Vec::new();
    if let Some(old) = old {
        ops.push(TxOp::retract(
            Value::Int(s),
            Value::kw("reg", "value"),
            Value::Int(old),
        ));
    }
    ops.push(TxOp::add(
        Value::Int(s),
        Value::kw("reg", "value"),
        Value::Int(new),
    ));
    conn.transact(ops).unwrap();
}

#[test]
fn as_of_returns_each_historical_state() {
    let (_dir, registry) = scratch();
    let conn = registry.connect("umbra:mem://timeline").unwrap();
    set_value(&conn, 1, None, 10);
    set_value(&conn, 1, Some(10), 20);
    set_value(&conn, 1, Some(20), 30);

    let db = conn.db().unwrap();
    assert_eq!(db.t, 3);

    // t indexes the history; the current db is its own fixpoint.
    assert_eq!(as_of(&db, 0).t, 0);
    assert_same_value(&conn, 1, None, 0);
    assert_same_value(&conn, 1, Some(10), 1);
    assert_same_value(&conn, 1, Some(20), 2);
    assert_same_value(&conn, 1, Some(30), 3);

    // Laws: as_of(db, db.t) == db; as_of(db, -1) == history.first.
    assert!(std::sync::Arc::ptr_eq(&as_of(&db, db.t as i64), &db));
    assert_eq!(as_of(&db, -1).t, 0);
    assert_eq!(as_of(&db, 99).t, 3);
}

#[test]
fn as_of_by_instant_picks_the_greatest_predecessor() {
    let (_dir, registry) = scratch();
    let conn = registry.connect("umbra:mem://instants").unwrap();
    set_value(&conn, 1, None, 10);
    set_value(&conn, 1, Some(10), 20);
    let db = conn.db().unwrap();

    let after_first = as_of(&db, 1).timestamp;
    assert_eq!(as_of(&db, after_first).t, 1);
    assert_eq!(as_of(&db, after_first + Duration::microseconds(1)).t, 1);
    assert_eq!(as_of(&db, db.timestamp).t, db.t);
    // Before the first snapshot clamps to it.
    assert_eq!(as_of(&db, after_first - Duration::hours(1)).t, 0);
}

#[test]
fn since_returns_the_first_strictly_later_state() {
    let (_dir, registry) = scratch();
    let conn = registry.connect("umbra:mem://since").unwrap();
    set_value(&conn, 1, None, 10);
    set_value(&conn, 1, Some(10), 20);
    set_value(&conn, 1, Some(20), 30);
    let db = conn.db().unwrap();

    assert_eq!(since(&db, 0).unwrap().t, 1);
    assert_eq!(since(&db, 1).unwrap().t, 2);
    assert_eq!(since(&db, 2).unwrap().t, 3);
    assert!(since(&db, 3).is_none());
    assert!(since(&db, db.timestamp).is_none());

    // Composed with as_of: the snapshot after the first transaction
    // is already past t=0, so it is its own answer.
    let first = as_of(&db, 1);
    assert_eq!(since(&first, 0).unwrap().t, 1);

    let early = as_of(&db, 1).timestamp;
    assert_eq!(since(&db, early).unwrap().t, 2);
}

#[test]
fn history_timestamps_are_ordered_and_indexed() {
    let (_dir, registry) = scratch();
    let conn = registry.connect("umbra:mem://order").unwrap();
    for i in 0..5 {
        set_value(&conn, i, None, i);
    }
    let db = conn.db().unwrap();
    for t in 0..=5u64 {
        let snapshot = as_of(&db, t as i64);
        assert_eq!(snapshot.t, t);
        if t > 0 {
            let prev = as_of(&db, t as i64 - 1);
            assert!(prev.timestamp <= snapshot.timestamp);
        }
    }
}

#[test]
fn diff_reports_subjects_changed_between_snapshots() {
    let (_dir, registry) = scratch();
    let conn = registry.connect("umbra:mem://diff").unwrap();
    set_value(&conn, 1, None, 10);
    set_value(&conn, 2, None, 20);
    set_value(&conn, 2, Some(20), 21);
    let db = conn.db().unwrap();

    let before = as_of(&db, 2);
    let changed: HashSet<Value> = diff(&db, &before).unwrap().into_iter().collect();
    assert_eq!(changed, HashSet::from([Value::Int(2)]));

    let unchanged = diff(&db, &as_of(&db, 3)).unwrap();
    assert!(unchanged.is_empty());
}

#[test]
fn snapshots_are_immutable_under_later_writes() {
    let (_dir, registry) = scratch();
    let conn = registry.connect("umbra:mem://frozen").unwrap();
    set_value(&conn, 1, None, 10);
    let frozen = conn.db().unwrap();
    assert_eq!(frozen.graph.triple_count(), 1);
    for i in 2..50 {
        set_value(&conn, i, None, i);
    }
    assert_eq!(frozen.graph.triple_count(), 1);
    assert_eq!(conn.db().unwrap().graph.triple_count(), 49);
}
