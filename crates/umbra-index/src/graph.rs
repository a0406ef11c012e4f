//! Graph values over the rotated indexes.
//!
//! Two flavors share one contract: the simple graph treats assertion
//! as idempotent and resolves with set semantics; the multi graph
//! keeps assertion multiplicity and repeats each binding `count`
//! times. Both are immutable values; every update returns a new graph
//! sharing structure with its predecessor.

use std::sync::Arc;

use umbra_types::{Result, UmbraError, Value};

use crate::index::Index;
use crate::resolve::{self, Bindings, Slot, TriplePattern};
use crate::transitive;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GraphFlavor {
    Simple,
    Multi,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Triple {
    pub s: Value,
    pub p: Value,
    pub o: Value,
}

impl Triple {
    pub fn new(s: impl Into<Value>, p: impl Into<Value>, o: impl Into<Value>) -> Self {
        Self {
            s: s.into(),
            p: p.into(),
            o: o.into(),
        }
    }
}

pub trait Graph: Send + Sync {
    fn flavor(&self) -> GraphFlavor;

    /// Adds one triple at transaction `tx`, returning the new graph.
    fn assert(&self, s: &Value, p: &Value, o: &Value, tx: u64) -> Arc<dyn Graph>;

    /// Removes one copy of a triple; an absent triple leaves the graph
    /// unchanged.
    fn retract(&self, s: &Value, p: &Value, o: &Value) -> Arc<dyn Graph>;

    /// Applies retractions, then assertions, in order.
    fn transact_triples(
        &self,
        tx: u64,
        retractions: &[Triple],
        assertions: &[Triple],
    ) -> Arc<dyn Graph>;

    /// Lazy bindings for a pattern; tagged predicates traverse
    /// transitively.
    fn resolve<'a>(&'a self, pattern: &TriplePattern) -> Bindings<'a>;

    /// Match cardinality. Ignores multiplicity on the simple graph and
    /// sums leaf counts on the multi graph.
    fn count_pattern(&self, pattern: &TriplePattern) -> u64;

    /// Subjects whose predicate-object sub-map differs from `other`'s.
    fn subjects_differing_from(&self, other: &dyn Graph) -> Result<Vec<Value>>;

    /// Flavor-independent view for diffing and laws: distinct triples
    /// with counts, sorted, ignoring statement metadata.
    fn canonical(&self) -> Vec<(Value, Value, Value, u64)>;

    fn spo(&self) -> &Index;
    fn next_stmt_id(&self) -> u64;
    fn triple_count(&self) -> u64;
}

/// The three index rotations plus the statement counter, updated in
/// lock-step.
#[derive(Clone, Debug)]
struct Rotations {
    spo: Index,
    pos: Index,
    osp: Index,
    next_stmt_id: u64,
    triples: u64,
}

impl Rotations {
    fn new() -> Self {
        Self {
            spo: Index::default(),
            pos: Index::default(),
            osp: Index::default(),
            next_stmt_id: 1,
            triples: 0,
        }
    }

    fn add(&self, s: &Value, p: &Value, o: &Value, tx: u64, counted: bool) -> Rotations {
        match self.spo.get(s, p, o) {
            Some(_) if !counted => self.clone(),
            Some(_) => Rotations {
                spo: self.spo.add(s, p, o, tx, 0).0,
                pos: self.pos.add(p, o, s, tx, 0).0,
                osp: self.osp.add(o, s, p, tx, 0).0,
                next_stmt_id: self.next_stmt_id,
                triples: self.triples,
            },
            None => {
                let id = self.next_stmt_id;
                Rotations {
                    spo: self.spo.add(s, p, o, tx, id).0,
                    pos: self.pos.add(p, o, s, tx, id).0,
                    osp: self.osp.add(o, s, p, tx, id).0,
                    next_stmt_id: id + 1,
                    triples: self.triples + 1,
                }
            }
        }
    }

    fn delete(&self, s: &Value, p: &Value, o: &Value) -> Option<Rotations> {
        let (spo, removed) = self.spo.delete(s, p, o)?;
        let (pos, _) = self.pos.delete(p, o, s).expect("indexes out of lock-step");
        let (osp, _) = self.osp.delete(o, s, p).expect("indexes out of lock-step");
        Some(Rotations {
            spo,
            pos,
            osp,
            next_stmt_id: self.next_stmt_id,
            triples: self.triples - u64::from(removed),
        })
    }

    fn resolve<'a>(&'a self, pattern: &TriplePattern) -> resolve::CountedBindings<'a> {
        if let Some((base, tag)) = transitive::tagged_predicate(&pattern.p) {
            let walked =
                transitive::resolve_transitive(&self.spo, &self.pos, &base, tag, &pattern.s, &pattern.o);
            return Box::new(walked.map(|binding| (binding, 1)));
        }
        resolve::resolve_counted(&self.spo, &self.pos, &self.osp, pattern)
    }

    fn canonical(&self) -> Vec<(Value, Value, Value, u64)> {
        let all = TriplePattern::new(Slot::Free, Slot::Free, Slot::Free);
        let mut out: Vec<(Value, Value, Value, u64)> =
            resolve::resolve_counted(&self.spo, &self.pos, &self.osp, &all)
                .map(|(mut binding, count)| {
                    let o = binding.pop().expect("full scan yields three columns");
                    let p = binding.pop().expect("full scan yields three columns");
                    let s = binding.pop().expect("full scan yields three columns");
                    (s, p, o, count)
                })
                .collect();
        out.sort();
        out
    }

    fn diff_subjects(&self, other: &Index) -> Vec<Value> {
        let mut out = Vec::new();
        for (s, mid) in self.spo.top() {
            match other.submap(s) {
                Some(theirs) if Arc::ptr_eq(mid, theirs) || mid == theirs => {}
                _ => out.push(s.clone()),
            }
        }
        for (s, _) in other.top() {
            if self.spo.submap(s).is_none() {
                out.push(s.clone());
            }
        }
        out
    }
}

macro_rules! graph_flavor {
    ($name:ident, $flavor:expr, $counted:expr) => {
        #[derive(Clone, Debug)]
        pub struct $name {
            rot: Rotations,
        }

        impl $name {
            pub fn new() -> Self {
                Self {
                    rot: Rotations::new(),
                }
            }

            pub fn with_triple(&self, s: &Value, p: &Value, o: &Value, tx: u64) -> Self {
                Self {
                    rot: self.rot.add(s, p, o, tx, $counted),
                }
            }

            pub fn without_triple(&self, s: &Value, p: &Value, o: &Value) -> Self {
                match self.rot.delete(s, p, o) {
                    Some(rot) => Self { rot },
                    None => self.clone(),
                }
            }

            /// Retractions first, then assertions.
            pub fn transact(&self, tx: u64, retractions: &[Triple], assertions: &[Triple]) -> Self {
                let mut rot = self.rot.clone();
                for t in retractions {
                    if let Some(next) = rot.delete(&t.s, &t.p, &t.o) {
                        rot = next;
                    }
                }
                for t in assertions {
                    rot = rot.add(&t.s, &t.p, &t.o, tx, $counted);
                }
                Self { rot }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Graph for $name {
            fn flavor(&self) -> GraphFlavor {
                $flavor
            }

            fn assert(&self, s: &Value, p: &Value, o: &Value, tx: u64) -> Arc<dyn Graph> {
                Arc::new(self.with_triple(s, p, o, tx))
            }

            fn retract(&self, s: &Value, p: &Value, o: &Value) -> Arc<dyn Graph> {
                Arc::new(self.without_triple(s, p, o))
            }

            fn transact_triples(
                &self,
                tx: u64,
                retractions: &[Triple],
                assertions: &[Triple],
            ) -> Arc<dyn Graph> {
                Arc::new(self.transact(tx, retractions, assertions))
            }

            fn resolve<'a>(&'a self, pattern: &TriplePattern) -> Bindings<'a> {
                let counted = self.rot.resolve(pattern);
                if $counted {
                    Box::new(counted.flat_map(|(binding, count)| {
                        std::iter::repeat(binding).take(count as usize)
                    }))
                } else {
                    Box::new(counted.map(|(binding, _)| binding))
                }
            }

            fn count_pattern(&self, pattern: &TriplePattern) -> u64 {
                if let Some((base, tag)) = transitive::tagged_predicate(&pattern.p) {
                    return transitive::count_transitive(
                        &self.rot.spo,
                        &self.rot.pos,
                        &self.rot.osp,
                        &base,
                        tag,
                        &pattern.s,
                        &pattern.o,
                    );
                }
                if $counted {
                    self.rot.resolve(pattern).map(|(_, count)| count).sum()
                } else {
                    resolve::count_distinct(
                        &self.rot.spo,
                        &self.rot.pos,
                        &self.rot.osp,
                        pattern,
                        self.rot.triples,
                    )
                }
            }

            fn subjects_differing_from(&self, other: &dyn Graph) -> Result<Vec<Value>> {
                if self.flavor() != other.flavor() {
                    return Err(UmbraError::IncompatibleGraphs);
                }
                Ok(self.rot.diff_subjects(other.spo()))
            }

            fn canonical(&self) -> Vec<(Value, Value, Value, u64)> {
                self.rot.canonical()
            }

            fn spo(&self) -> &Index {
                &self.rot.spo
            }

            fn next_stmt_id(&self) -> u64 {
                self.rot.next_stmt_id
            }

            fn triple_count(&self) -> u64 {
                self.rot.triples
            }
        }
    };
}

graph_flavor!(SimpleGraph, GraphFlavor::Simple, false);
graph_flavor!(MultiGraph, GraphFlavor::Multi, true);

/// Fresh empty graph of the requested flavor.
pub fn empty_graph(flavor: GraphFlavor) -> Arc<dyn Graph> {
    match flavor {
        GraphFlavor::Simple => Arc::new(SimpleGraph::new()),
        GraphFlavor::Multi => Arc::new(MultiGraph::new()),
    }
}
