//! Entity materialization: nested documents back out of triples.
//!
//! An entity's outgoing edges become map entries; cons cells written
//! by the entity encoder (`:umbra/first*` / `:umbra/rest`) fold back
//! into ordered sequences. A `seen` set passes down by value on every
//! recursion, so sibling branches expand independently and mutual
//! references end in placeholders instead of loops.

use std::collections::{BTreeMap, HashSet};

use umbra_index::{Graph, Slot, TriplePattern};
use umbra_types::{Keyword, Value};

use crate::db::Database;

/// A materialized document node.
#[derive(Clone, Debug, PartialEq)]
pub enum EntityValue {
    Value(Value),
    Map(BTreeMap<Value, EntityValue>),
    List(Vec<EntityValue>),
    /// Repeated-attribute values; unordered, compare as a set.
    Many(Vec<EntityValue>),
}

fn kw(ns: &str, name: &str) -> Value {
    Value::Kw(Keyword::new(ns, name))
}

fn db_id() -> Value {
    kw("db", "id")
}

fn db_ident() -> Value {
    kw("db", "ident")
}

fn is_internal(attr: &Value) -> bool {
    *attr == db_id()
        || *attr == db_ident()
        || *attr == kw("umbra", "entity")
        || *attr == kw("umbra", "owns")
}

/// `:umbra/first`, `:umbra/first1`, ... — the cons-cell element keys,
/// ordered by their digit suffix.
fn first_suffix(attr: &Value) -> Option<u64> {
    let Value::Kw(keyword) = attr else {
        return None;
    };
    if keyword.ns.as_deref() != Some("umbra") {
        return None;
    }
    let suffix = keyword.name.strip_prefix("first")?;
    if suffix.is_empty() {
        Some(0)
    } else {
        suffix.parse().ok()
    }
}

fn attr_pairs(graph: &dyn Graph, node: &Value) -> Vec<(Value, Value)> {
    let pattern = TriplePattern::new(Slot::Val(node.clone()), Slot::Free, Slot::Free);
    graph
        .resolve(&pattern)
        .map(|mut binding| {
            let value = binding.pop().expect("two free slots");
            let attr = binding.pop().expect("two free slots");
            (attr, value)
        })
        .collect()
}

/// Resolves a user-facing identifier to an entity: a known subject, a
/// `:db/ident` value, or an `:id` value, in that order.
pub fn ident(db: &Database, value: &Value) -> Option<Value> {
    let graph = db.graph.as_ref();
    let direct = TriplePattern::new(Slot::Val(value.clone()), Slot::Free, Slot::Free);
    if graph.resolve(&direct).next().is_some() {
        return Some(value.clone());
    }
    for attr in [db_ident(), Value::Kw(Keyword::plain("id"))] {
        let reverse = TriplePattern::new(Slot::Free, Slot::Val(attr), Slot::Val(value.clone()));
        if let Some(mut binding) = graph.resolve(&reverse).next() {
            return binding.pop();
        }
    }
    None
}

/// Materializes the entity behind `ident_value` without expanding
/// nested entity-flagged children.
pub fn entity(db: &Database, ident_value: &Value) -> Option<EntityValue> {
    entity_nested(db, ident_value, false)
}

/// Materializes with `nested` controlling whether entity-flagged
/// children expand in place or collapse to placeholders.
pub fn entity_nested(db: &Database, ident_value: &Value, nested: bool) -> Option<EntityValue> {
    let node = ident(db, ident_value)?;
    let graph = db.graph.as_ref();
    let mut seen = HashSet::new();
    seen.insert(node.clone());
    Some(materialize(graph, &node, nested, &seen))
}

fn materialize(
    graph: &dyn Graph,
    node: &Value,
    nested: bool,
    seen: &HashSet<Value>,
) -> EntityValue {
    let pairs = attr_pairs(graph, node);
    if pairs.iter().any(|(attr, _)| first_suffix(attr).is_some()) {
        return materialize_list(graph, pairs, nested, seen);
    }
    if is_list_terminator(&pairs) {
        return EntityValue::List(Vec::new());
    }
    let mut grouped: BTreeMap<Value, Vec<EntityValue>> = BTreeMap::new();
    for (attr, value) in pairs {
        if is_internal(&attr) {
            continue;
        }
        let expanded = expand(graph, &value, nested, seen);
        grouped.entry(attr).or_default().push(expanded);
    }
    EntityValue::Map(
        grouped
            .into_iter()
            .map(|(attr, mut values)| {
                let value = if values.len() == 1 {
                    values.pop().expect("length checked")
                } else {
                    EntityValue::Many(values)
                };
                (attr, value)
            })
            .collect(),
    )
}

fn is_list_terminator(pairs: &[(Value, Value)]) -> bool {
    pairs
        .iter()
        .any(|(attr, value)| *attr == kw("umbra", "type") && *value == kw("umbra", "list"))
        && pairs.iter().all(|(attr, _)| first_suffix(attr).is_none())
}

/// Walks a cons chain back into an ordered sequence.
fn materialize_list(
    graph: &dyn Graph,
    pairs: Vec<(Value, Value)>,
    nested: bool,
    seen: &HashSet<Value>,
) -> EntityValue {
    let rest_attr = kw("umbra", "rest");
    let mut elements = Vec::new();
    let mut cells_seen: HashSet<Value> = HashSet::new();
    let mut pairs = pairs;
    loop {
        let mut firsts: Vec<(u64, Value)> = pairs
            .iter()
            .filter_map(|(attr, value)| first_suffix(attr).map(|n| (n, value.clone())))
            .collect();
        firsts.sort_by_key(|(n, _)| *n);
        for (_, value) in firsts {
            elements.push(expand(graph, &value, nested, seen));
        }
        let rest = pairs
            .iter()
            .find(|(attr, _)| *attr == rest_attr)
            .map(|(_, value)| value.clone());
        match rest {
            None => break,
            Some(value) if value == kw("umbra", "empty-list") => break,
            Some(node @ Value::Node(_)) => {
                if !cells_seen.insert(node.clone()) {
                    break;
                }
                let next = attr_pairs(graph, &node);
                if is_list_terminator(&next) {
                    break;
                }
                pairs = next;
            }
            Some(other) => {
                // Improper tail; keep the value and stop.
                elements.push(expand(graph, &other, nested, seen));
                break;
            }
        }
    }
    EntityValue::List(elements)
}

fn expand(graph: &dyn Graph, value: &Value, nested: bool, seen: &HashSet<Value>) -> EntityValue {
    if *value == kw("umbra", "nil") {
        return EntityValue::Value(Value::Nil);
    }
    if *value == kw("umbra", "empty-list") {
        return EntityValue::List(Vec::new());
    }
    match value {
        Value::Node(_) => {
            if seen.contains(value) {
                return placeholder(graph, value);
            }
            if !nested && is_entity(graph, value) {
                return placeholder(graph, value);
            }
            let mut child_seen = seen.clone();
            child_seen.insert(value.clone());
            materialize(graph, value, nested, &child_seen)
        }
        other => EntityValue::Value(other.clone()),
    }
}

fn is_entity(graph: &dyn Graph, node: &Value) -> bool {
    let pattern = TriplePattern::new(
        Slot::Val(node.clone()),
        Slot::Val(kw("umbra", "entity")),
        Slot::Val(Value::Bool(true)),
    );
    graph.resolve(&pattern).next().is_some()
}

/// `{:db/ident x}` when the node has one, `{:db/id node}` otherwise.
fn placeholder(graph: &dyn Graph, node: &Value) -> EntityValue {
    let pattern = TriplePattern::new(Slot::Val(node.clone()), Slot::Val(db_ident()), Slot::Free);
    let mut map = BTreeMap::new();
    match graph.resolve(&pattern).next().and_then(|mut b| b.pop()) {
        Some(id) => {
            map.insert(db_ident(), EntityValue::Value(id));
        }
        None => {
            map.insert(db_id(), EntityValue::Value(node.clone()));
        }
    }
    EntityValue::Map(map)
}
