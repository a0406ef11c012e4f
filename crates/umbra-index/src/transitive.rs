//! Transitive traversal over a tagged predicate.
//!
//! A predicate keyword whose name ends in `+` (one or more hops) or
//! `*` (reflexive closure) switches pattern resolution to a breadth
//! first walk. A visited set bounds every walk, so cyclic graphs
//! terminate.

use std::collections::{HashMap, HashSet, VecDeque};

use umbra_types::{Keyword, Value};

use crate::index::Index;
use crate::resolve::{Bindings, Slot};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransitiveTag {
    /// One or more hops.
    Plus,
    /// Zero or more hops.
    Star,
}

/// Recognizes a tagged predicate slot, returning the base predicate
/// with the suffix stripped.
pub fn tagged_predicate(p: &Slot) -> Option<(Value, TransitiveTag)> {
    let Slot::Val(Value::Kw(kw)) = p else {
        return None;
    };
    let (base, tag) = if let Some(base) = kw.name.strip_suffix('+') {
        (base, TransitiveTag::Plus)
    } else if let Some(base) = kw.name.strip_suffix('*') {
        (base, TransitiveTag::Star)
    } else {
        return None;
    };
    if base.is_empty() {
        return None;
    }
    let kw = Keyword {
        ns: kw.ns.clone(),
        name: base.to_owned(),
    };
    Some((Value::Kw(kw), tag))
}

fn forward_step(spo: &Index, base: &Value, from: &Value) -> Vec<Value> {
    spo.get2(from, base)
        .map(|leaves| leaves.keys().cloned().collect())
        .unwrap_or_default()
}

fn backward_step(pos: &Index, base: &Value, to: &Value) -> Vec<Value> {
    pos.get2(base, to)
        .map(|leaves| leaves.keys().cloned().collect())
        .unwrap_or_default()
}

/// Every node reachable from `start` in one or more steps, in breadth
/// first order. `start` itself appears only if a cycle leads back.
fn reachable(start: &Value, step: impl Fn(&Value) -> Vec<Value>) -> Vec<Value> {
    let mut seen: HashSet<Value> = HashSet::new();
    let mut queue: VecDeque<Value> = step(start).into();
    let mut out = Vec::new();
    while let Some(node) = queue.pop_front() {
        if seen.insert(node.clone()) {
            queue.extend(step(&node));
            out.push(node);
        }
    }
    out
}

fn path_exists(start: &Value, goal: &Value, step: impl Fn(&Value) -> Vec<Value>) -> bool {
    let mut seen: HashSet<Value> = HashSet::new();
    let mut queue: VecDeque<Value> = step(start).into();
    while let Some(node) = queue.pop_front() {
        if node == *goal {
            return true;
        }
        if seen.insert(node.clone()) {
            queue.extend(step(&node));
        }
    }
    false
}

pub(crate) fn resolve_transitive(
    spo: &Index,
    pos: &Index,
    base: &Value,
    tag: TransitiveTag,
    s: &Slot,
    o: &Slot,
) -> Bindings<'static> {
    use Slot::{Free, Val};
    match (s, o) {
        (Val(s), Val(o)) => {
            let hit = match tag {
                TransitiveTag::Star if s == o => true,
                _ => path_exists(s, o, |x| forward_step(spo, base, x)),
            };
            if hit {
                Box::new(std::iter::once(Vec::new()))
            } else {
                Box::new(std::iter::empty())
            }
        }
        (Val(s), Free) => {
            let mut out: Vec<Vec<Value>> = Vec::new();
            if tag == TransitiveTag::Star {
                out.push(vec![s.clone()]);
            }
            for node in reachable(s, |x| forward_step(spo, base, x)) {
                if tag == TransitiveTag::Star && node == *s {
                    continue;
                }
                out.push(vec![node]);
            }
            Box::new(out.into_iter())
        }
        (Free, Val(o)) => {
            let mut out: Vec<Vec<Value>> = Vec::new();
            if tag == TransitiveTag::Star {
                out.push(vec![o.clone()]);
            }
            for node in reachable(o, |x| backward_step(pos, base, x)) {
                if tag == TransitiveTag::Star && node == *o {
                    continue;
                }
                out.push(vec![node]);
            }
            Box::new(out.into_iter())
        }
        (Free, Free) => {
            // Edge map built once; each domain node then walks forward.
            let mut adjacency: HashMap<Value, Vec<Value>> = HashMap::new();
            let mut nodes: HashSet<Value> = HashSet::new();
            if let Some(mid) = pos.submap(base) {
                for (object, leaves) in mid.iter() {
                    nodes.insert(object.clone());
                    for subject in leaves.keys() {
                        nodes.insert(subject.clone());
                        adjacency
                            .entry(subject.clone())
                            .or_default()
                            .push(object.clone());
                    }
                }
            }
            let step = |x: &Value| adjacency.get(x).cloned().unwrap_or_default();
            let mut pairs: HashSet<(Value, Value)> = HashSet::new();
            if tag == TransitiveTag::Star {
                for node in &nodes {
                    pairs.insert((node.clone(), node.clone()));
                }
            }
            for subject in adjacency.keys() {
                for object in reachable(subject, &step) {
                    pairs.insert((subject.clone(), object));
                }
            }
            Box::new(pairs.into_iter().map(|(s, o)| vec![s, o]))
        }
    }
}

/// Cardinality of a transitive pattern. The double-wildcard shape is
/// an upper-bound planner estimate, not a true count.
pub(crate) fn count_transitive(
    spo: &Index,
    pos: &Index,
    osp: &Index,
    base: &Value,
    tag: TransitiveTag,
    s: &Slot,
    o: &Slot,
) -> u64 {
    if matches!((s, o), (Slot::Free, Slot::Free)) {
        return (spo.len() as u64).saturating_mul(osp.len() as u64);
    }
    resolve_transitive(spo, pos, base, tag, s, o).count() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Graph, SimpleGraph, Triple};
    use crate::resolve::TriplePattern;
    use umbra_types::{new_node, Value};

    fn chain(edges: &[(Value, Value)]) -> SimpleGraph {
        let triples: Vec<Triple> = edges
            .iter()
            .map(|(a, b)| Triple::new(a.clone(), Value::kw("node", "next"), b.clone()))
            .collect();
        SimpleGraph::new().transact(1, &[], &triples)
    }

    #[test]
    fn tag_detection_strips_suffix() {
        let slot = Slot::Val(Value::kw("node", "next+"));
        let (base, tag) = tagged_predicate(&slot).unwrap();
        assert_eq!(base, Value::kw("node", "next"));
        assert_eq!(tag, TransitiveTag::Plus);
        assert!(tagged_predicate(&Slot::Val(Value::kw("node", "next"))).is_none());
    }

    #[test]
    fn plus_walks_forward() {
        let (a, b, c) = (
            Value::Node(new_node()),
            Value::Node(new_node()),
            Value::Node(new_node()),
        );
        let g = chain(&[(a.clone(), b.clone()), (b.clone(), c.clone())]);
        let pattern = TriplePattern::new(
            Slot::Val(a.clone()),
            Slot::Val(Value::kw("node", "next+")),
            Slot::Free,
        );
        let reached: HashSet<Vec<Value>> = g.resolve(&pattern).collect();
        assert_eq!(
            reached,
            HashSet::from([vec![b.clone()], vec![c.clone()]])
        );
    }

    #[test]
    fn star_includes_zero_hop() {
        let (a, b) = (Value::Node(new_node()), Value::Node(new_node()));
        let g = chain(&[(a.clone(), b.clone())]);
        let pattern = TriplePattern::new(
            Slot::Val(a.clone()),
            Slot::Val(Value::kw("node", "next*")),
            Slot::Free,
        );
        let reached: Vec<Vec<Value>> = g.resolve(&pattern).collect();
        assert_eq!(reached[0], vec![a.clone()], "zero-hop binding comes first");
        assert_eq!(reached.len(), 2);
    }

    #[test]
    fn cycles_terminate() {
        let (a, b, c) = (
            Value::Node(new_node()),
            Value::Node(new_node()),
            Value::Node(new_node()),
        );
        let g = chain(&[
            (a.clone(), b.clone()),
            (b.clone(), c.clone()),
            (c.clone(), a.clone()),
        ]);
        let pattern = TriplePattern::new(
            Slot::Val(a.clone()),
            Slot::Val(Value::kw("node", "next+")),
            Slot::Free,
        );
        let reached: HashSet<Vec<Value>> = g.resolve(&pattern).collect();
        // One-or-more hops around the cycle reaches a itself.
        assert_eq!(reached.len(), 3);
        assert!(reached.contains(&vec![a.clone()]));
    }

    #[test]
    fn backward_walk_finds_ancestors() {
        let (a, b, c) = (
            Value::Node(new_node()),
            Value::Node(new_node()),
            Value::Node(new_node()),
        );
        let g = chain(&[(a.clone(), b.clone()), (b.clone(), c.clone())]);
        let pattern = TriplePattern::new(
            Slot::Free,
            Slot::Val(Value::kw("node", "next+")),
            Slot::Val(c.clone()),
        );
        let reached: HashSet<Vec<Value>> = g.resolve(&pattern).collect();
        assert_eq!(reached, HashSet::from([vec![a], vec![b]]));
    }

    #[test]
    fn endpoint_check_yields_unit_binding() {
        let (a, b) = (Value::Node(new_node()), Value::Node(new_node()));
        let g = chain(&[(a.clone(), b.clone())]);
        let hit = TriplePattern::new(
            Slot::Val(a.clone()),
            Slot::Val(Value::kw("node", "next+")),
            Slot::Val(b.clone()),
        );
        assert_eq!(g.resolve(&hit).collect::<Vec<_>>(), vec![Vec::new()]);
        let reflexive = TriplePattern::new(
            Slot::Val(a.clone()),
            Slot::Val(Value::kw("node", "next*")),
            Slot::Val(a.clone()),
        );
        assert_eq!(g.resolve(&reflexive).count(), 1);
        let miss = TriplePattern::new(
            Slot::Val(b),
            Slot::Val(Value::kw("node", "next+")),
            Slot::Val(a),
        );
        assert_eq!(g.resolve(&miss).count(), 0);
    }
}
