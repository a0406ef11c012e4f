//! Clause ordering for selectivity.
//!
//! Patterns are sorted by their static match count (constant slots
//! only), most constrained first, ties in user order. Negations,
//! disjunctions, filters, and binds slot in at the earliest point
//! where every variable they need is already bound; a variable that
//! nothing in the query can bind never blocks placement.

use std::collections::HashSet;

use umbra_index::{Graph, Slot, TriplePattern};

use crate::ast::{Clause, ClausePattern, PatternSlot, Var};

/// Static shape of a pattern: constants stay, variables go free.
pub(crate) fn static_pattern(pattern: &ClausePattern) -> TriplePattern {
    let slot = |s: &PatternSlot| match s {
        PatternSlot::Lit(v) => Slot::Val(v.clone()),
        PatternSlot::Var(_) | PatternSlot::Any => Slot::Free,
    };
    TriplePattern::new(slot(&pattern.e), slot(&pattern.a), slot(&pattern.v))
}

pub(crate) fn plan(
    clauses: &[Clause],
    initially_bound: &HashSet<Var>,
    graph: &dyn Graph,
    user_order: bool,
) -> Vec<Clause> {
    if user_order {
        return clauses.to_vec();
    }

    // Everything the conjunction can ever bind; used so a variable
    // with no producer does not hold a clause back forever.
    let mut bindable = initially_bound.clone();
    for clause in clauses {
        clause.variables(&mut bindable);
    }

    let mut patterns: Vec<(u64, usize, &Clause)> = Vec::new();
    let mut others: Vec<(usize, &Clause)> = Vec::new();
    for (position, clause) in clauses.iter().enumerate() {
        match clause {
            Clause::Pattern(p) => {
                let selectivity = graph.count_pattern(&static_pattern(p));
                patterns.push((selectivity, position, clause));
            }
            _ => others.push((position, clause)),
        }
    }
    patterns.sort_by_key(|(selectivity, position, _)| (*selectivity, *position));

    let mut bound = initially_bound.clone();
    let mut planned: Vec<Clause> = Vec::with_capacity(clauses.len());
    let mut pending = others;

    let flush = |bound: &mut HashSet<Var>,
                 pending: &mut Vec<(usize, &Clause)>,
                 planned: &mut Vec<Clause>| {
        loop {
            let Some(at) = pending.iter().position(|(_, clause)| {
                clause
                    .required_variables()
                    .iter()
                    .all(|var| bound.contains(var) || !bindable.contains(var))
            }) else {
                break;
            };
            let (_, clause) = pending.remove(at);
            clause.variables(bound);
            planned.push(clause.clone());
        }
    };

    flush(&mut bound, &mut pending, &mut planned);
    for (_, _, clause) in patterns {
        planned.push(clause.clone());
        clause.variables(&mut bound);
        flush(&mut bound, &mut pending, &mut planned);
    }
    for (_, clause) in pending {
        planned.push(clause.clone());
    }
    planned
}
