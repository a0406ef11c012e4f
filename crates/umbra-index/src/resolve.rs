//! Single-pattern resolution against the rotated indexes.
//!
//! A pattern fixes each slot to a constant or leaves it free; the
//! eight possible shapes each route to the index that can answer them
//! with direct lookups. Bindings come back lazily, one tuple per
//! match, holding the free slots in s-then-p-then-o order.

use umbra_types::Value;

use crate::index::Index;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Slot {
    Val(Value),
    Free,
}

impl Slot {
    pub fn val(v: impl Into<Value>) -> Self {
        Slot::Val(v.into())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TriplePattern {
    pub s: Slot,
    pub p: Slot,
    pub o: Slot,
}

impl TriplePattern {
    pub fn new(s: Slot, p: Slot, o: Slot) -> Self {
        Self { s, p, o }
    }

    /// Number of free slots, which is also each binding's width.
    pub fn free_slots(&self) -> usize {
        [&self.s, &self.p, &self.o]
            .into_iter()
            .filter(|slot| matches!(slot, Slot::Free))
            .count()
    }
}

/// Lazy, unordered bindings produced by resolution.
pub type Bindings<'a> = Box<dyn Iterator<Item = Vec<Value>> + 'a>;

pub(crate) type CountedBindings<'a> = Box<dyn Iterator<Item = (Vec<Value>, u64)> + 'a>;

/// Resolves a non-transitive pattern, yielding each distinct binding
/// with its leaf count so the multi-graph can expand duplicates.
pub(crate) fn resolve_counted<'a>(
    spo: &'a Index,
    pos: &'a Index,
    osp: &'a Index,
    pattern: &TriplePattern,
) -> CountedBindings<'a> {
    use Slot::{Free, Val};
    match (&pattern.s, &pattern.p, &pattern.o) {
        (Val(s), Val(p), Val(o)) => match spo.get(s, p, o) {
            Some(meta) => Box::new(std::iter::once((Vec::new(), meta.count))),
            None => Box::new(std::iter::empty()),
        },
        (Val(s), Val(p), Free) => match spo.get2(s, p) {
            Some(leaves) => Box::new(leaves.iter().map(|(o, m)| (vec![o.clone()], m.count))),
            None => Box::new(std::iter::empty()),
        },
        (Val(s), Free, Val(o)) => match osp.get2(o, s) {
            Some(leaves) => Box::new(leaves.iter().map(|(p, m)| (vec![p.clone()], m.count))),
            None => Box::new(std::iter::empty()),
        },
        (Val(s), Free, Free) => match spo.submap(s) {
            Some(mid) => Box::new(mid.iter().flat_map(|(p, leaves)| {
                leaves
                    .iter()
                    .map(move |(o, m)| (vec![p.clone(), o.clone()], m.count))
            })),
            None => Box::new(std::iter::empty()),
        },
        (Free, Val(p), Val(o)) => match pos.get2(p, o) {
            Some(leaves) => Box::new(leaves.iter().map(|(s, m)| (vec![s.clone()], m.count))),
            None => Box::new(std::iter::empty()),
        },
        (Free, Val(p), Free) => match pos.submap(p) {
            Some(mid) => Box::new(mid.iter().flat_map(|(o, leaves)| {
                leaves
                    .iter()
                    .map(move |(s, m)| (vec![s.clone(), o.clone()], m.count))
            })),
            None => Box::new(std::iter::empty()),
        },
        (Free, Free, Val(o)) => match osp.submap(o) {
            Some(mid) => Box::new(mid.iter().flat_map(|(s, leaves)| {
                leaves
                    .iter()
                    .map(move |(p, m)| (vec![s.clone(), p.clone()], m.count))
            })),
            None => Box::new(std::iter::empty()),
        },
        (Free, Free, Free) => Box::new(spo.top().flat_map(|(s, mid)| {
            mid.iter().flat_map(move |(p, leaves)| {
                leaves
                    .iter()
                    .map(move |(o, m)| (vec![s.clone(), p.clone(), o.clone()], m.count))
            })
        })),
    }
}

/// Distinct-match cardinality for a non-transitive pattern, computed
/// from index sizes without walking bindings.
pub(crate) fn count_distinct(
    spo: &Index,
    pos: &Index,
    osp: &Index,
    pattern: &TriplePattern,
    total_triples: u64,
) -> u64 {
    use Slot::{Free, Val};
    match (&pattern.s, &pattern.p, &pattern.o) {
        (Val(s), Val(p), Val(o)) => u64::from(spo.get(s, p, o).is_some()),
        (Val(s), Val(p), Free) => spo.count2(s, p),
        (Val(s), Free, Val(o)) => osp.count2(o, s),
        (Val(s), Free, Free) => spo.count1(s),
        (Free, Val(p), Val(o)) => pos.count2(p, o),
        (Free, Val(p), Free) => pos.count1(p),
        (Free, Free, Val(o)) => osp.count1(o),
        (Free, Free, Free) => total_triples,
    }
}
