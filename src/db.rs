//! Immutable database snapshots and point-in-time retrieval.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use umbra_index::{empty_graph, Graph, GraphFlavor};
use umbra_types::{Result, Value};

/// One snapshot of the graph: the current value, its predecessors
/// (oldest first, excluding this one), the wall-clock creation time,
/// and the zero-based transaction index.
pub struct Database {
    pub graph: Arc<dyn Graph>,
    history: Vec<Arc<Database>>,
    pub timestamp: DateTime<Utc>,
    pub t: u64,
}

impl Database {
    pub fn empty(flavor: GraphFlavor) -> Arc<Database> {
        Arc::new(Database {
            graph: empty_graph(flavor),
            history: Vec::new(),
            timestamp: Utc::now(),
            t: 0,
        })
    }

    /// Builds the next snapshot around an updated graph, appending
    /// this one to the history.
    pub(crate) fn successor(self: &Arc<Self>, graph: Arc<dyn Graph>) -> Arc<Database> {
        let mut history = self.history.clone();
        history.push(Arc::clone(self));
        Arc::new(Database {
            graph,
            history,
            timestamp: Utc::now(),
            t: self.t + 1,
        })
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn flavor(&self) -> GraphFlavor {
        self.graph.flavor()
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("t", &self.t)
            .field("timestamp", &self.timestamp)
            .field("history", &self.history.len())
            .field("triples", &self.graph.triple_count())
            .finish()
    }
}

/// A point on the database timeline: a transaction index or an
/// instant.
#[derive(Copy, Clone, Debug)]
pub enum TimePoint {
    Tx(i64),
    Inst(DateTime<Utc>),
}

impl From<i64> for TimePoint {
    fn from(t: i64) -> Self {
        TimePoint::Tx(t)
    }
}

impl From<DateTime<Utc>> for TimePoint {
    fn from(at: DateTime<Utc>) -> Self {
        TimePoint::Inst(at)
    }
}

/// The snapshot in effect at `point`. Indexes clamp into the known
/// range; instants pick the greatest predecessor at or before them.
pub fn as_of(db: &Arc<Database>, point: impl Into<TimePoint>) -> Arc<Database> {
    match point.into() {
        TimePoint::Tx(t) => {
            if t >= db.t as i64 || db.history.is_empty() {
                return Arc::clone(db);
            }
            let idx = t.clamp(0, db.history.len() as i64 - 1) as usize;
            Arc::clone(&db.history[idx])
        }
        TimePoint::Inst(at) => {
            if at >= db.timestamp || db.history.is_empty() {
                return Arc::clone(db);
            }
            let idx = db.history.partition_point(|h| h.timestamp <= at);
            Arc::clone(&db.history[idx.saturating_sub(1).min(db.history.len() - 1)])
        }
    }
}

/// The first snapshot strictly after `point`, or `None` when the
/// point is at or past this database.
pub fn since(db: &Arc<Database>, point: impl Into<TimePoint>) -> Option<Arc<Database>> {
    match point.into() {
        TimePoint::Tx(t) => {
            if t >= db.t as i64 {
                return None;
            }
            let idx = (t + 1).max(0) as usize;
            if idx >= db.history.len() {
                Some(Arc::clone(db))
            } else {
                Some(Arc::clone(&db.history[idx]))
            }
        }
        TimePoint::Inst(at) => {
            if at >= db.timestamp {
                return None;
            }
            let idx = db.history.partition_point(|h| h.timestamp <= at);
            if idx >= db.history.len() {
                Some(Arc::clone(db))
            } else {
                Some(Arc::clone(&db.history[idx]))
            }
        }
    }
}

/// Subjects whose predicate-object sub-map differs between the two
/// snapshots.
pub fn diff(a: &Database, b: &Database) -> Result<Vec<Value>> {
    a.graph.subjects_differing_from(b.graph.as_ref())
}
