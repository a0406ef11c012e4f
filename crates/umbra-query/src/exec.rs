//! Clause execution as relational combination.
//!
//! Join state is a columnar relation: named columns over value rows.
//! Each clause consumes the relation and produces the next one;
//! patterns extend rows through index lookups, `or` unions branches,
//! `not` anti-joins, `filter` and `bind` evaluate expressions per row.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;
use umbra_index::{Graph, GraphFlavor, Slot, TriplePattern};
use umbra_types::{Result, UmbraError, Value};

use crate::aggregate::{self, QueryResult};
use crate::ast::{BindTarget, Clause, ClausePattern, Expr, InBinding, PatternSlot, Query, Var};
use crate::expr::{self, BindValue, EvalScope, ExprEnv, NativeFn};
use crate::plan;

/// Join state flowing between clauses.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Relation {
    pub cols: Vec<Var>,
    pub rows: Vec<Vec<Value>>,
}

impl Relation {
    /// The identity for joins: no columns, one empty row.
    pub(crate) fn unit() -> Self {
        Relation {
            cols: Vec::new(),
            rows: vec![Vec::new()],
        }
    }

    pub(crate) fn col(&self, var: &Var) -> Option<usize> {
        self.cols.iter().position(|c| c == var)
    }
}

/// Positional query inputs matched against the `:in` spec.
pub enum QueryInput {
    Val(Value),
    Coll(Vec<Value>),
    Tuple(Vec<Value>),
    Fn(NativeFn),
    Graph(Arc<dyn Graph>),
}

#[derive(Clone, Copy, Debug, Default)]
pub struct QueryOptions {
    /// Keep the user's clause order instead of planning.
    pub user_order: bool,
}

#[derive(Default)]
pub struct QueryEngine {
    env: ExprEnv,
}

impl QueryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_env(env: ExprEnv) -> Self {
        Self { env }
    }

    pub fn q(
        &self,
        query: &Query,
        graph: &dyn Graph,
        inputs: Vec<QueryInput>,
    ) -> Result<QueryResult> {
        self.q_opts(query, graph, inputs, QueryOptions::default())
    }

    pub fn q_opts(
        &self,
        query: &Query,
        graph: &dyn Graph,
        inputs: Vec<QueryInput>,
        opts: QueryOptions,
    ) -> Result<QueryResult> {
        if query.in_spec.len() != inputs.len() {
            return Err(UmbraError::Invalid("wrong number of query inputs"));
        }
        let mut relation = Relation::unit();
        let mut locals: HashMap<String, NativeFn> = HashMap::new();
        let mut input_graph: Option<Arc<dyn Graph>> = None;
        for (binding, input) in query.in_spec.iter().zip(inputs) {
            match (binding, input) {
                (InBinding::Database, QueryInput::Graph(g)) => input_graph = Some(g),
                (InBinding::Scalar(var), QueryInput::Val(v)) => {
                    relation = product_scalar(relation, var, vec![v])?;
                }
                (InBinding::Scalar(var), QueryInput::Fn(f)) => {
                    locals.insert(var.0.clone(), f);
                }
                (InBinding::Coll(var), QueryInput::Coll(values)) => {
                    relation = product_scalar(relation, var, values)?;
                }
                (InBinding::Tuple(vars), QueryInput::Tuple(values)) => {
                    relation = product_tuple(relation, vars, values)?;
                }
                _ => {
                    return Err(UmbraError::Invalid(
                        "query input does not match its :in binding",
                    ))
                }
            }
        }
        let graph = input_graph.as_deref().unwrap_or(graph);

        let bound: HashSet<Var> = relation.cols.iter().cloned().collect();
        let planned = plan::plan(&query.where_clauses, &bound, graph, opts.user_order);
        debug!(
            clauses = planned.len(),
            input_rows = relation.rows.len(),
            "query.plan"
        );

        let scope = EvalScope {
            env: &self.env,
            locals: &locals,
        };
        for clause in &planned {
            relation = self.apply(relation, clause, graph, &scope)?;
        }
        debug!(rows = relation.rows.len(), "query.join");

        let distinct = graph.flavor() == GraphFlavor::Simple;
        aggregate::project(relation, &query.find, &query.with, distinct)
    }

    fn apply(
        &self,
        rel: Relation,
        clause: &Clause,
        graph: &dyn Graph,
        scope: &EvalScope<'_>,
    ) -> Result<Relation> {
        match clause {
            Clause::Pattern(pattern) => apply_pattern(rel, pattern, graph),
            Clause::Or(branches) => self.apply_or(rel, branches, graph, scope),
            Clause::Not(sub) => self.apply_not(rel, sub, graph, scope),
            Clause::Filter(expr) => apply_filter(rel, expr, scope),
            Clause::Bind(expr, target) => apply_bind(rel, expr, target, scope),
        }
    }

    /// Branches run in the same binding environment; their outputs are
    /// unioned, with nil filling columns a branch did not bind.
    fn apply_or(
        &self,
        rel: Relation,
        branches: &[Clause],
        graph: &dyn Graph,
        scope: &EvalScope<'_>,
    ) -> Result<Relation> {
        let mut out_cols = rel.cols.clone();
        let mut branch_outputs = Vec::with_capacity(branches.len());
        for branch in branches {
            let out = self.apply(rel.clone(), branch, graph, scope)?;
            for col in &out.cols {
                if !out_cols.contains(col) {
                    out_cols.push(col.clone());
                }
            }
            branch_outputs.push(out);
        }
        let mut seen: HashSet<Vec<Value>> = HashSet::new();
        let mut rows = Vec::new();
        for out in branch_outputs {
            let mapping: Vec<Option<usize>> = out_cols.iter().map(|c| out.col(c)).collect();
            for row in out.rows {
                let full: Vec<Value> = mapping
                    .iter()
                    .map(|m| m.map(|i| row[i].clone()).unwrap_or(Value::Nil))
                    .collect();
                if seen.insert(full.clone()) {
                    rows.push(full);
                }
            }
        }
        Ok(Relation {
            cols: out_cols,
            rows,
        })
    }

    /// Anti-join: a row survives only if the sub-plan produces nothing
    /// when seeded with that row's bindings.
    fn apply_not(
        &self,
        rel: Relation,
        sub: &[Clause],
        graph: &dyn Graph,
        scope: &EvalScope<'_>,
    ) -> Result<Relation> {
        let bound: HashSet<Var> = rel.cols.iter().cloned().collect();
        let planned = plan::plan(sub, &bound, graph, false);
        let cols = rel.cols;
        let mut kept = Vec::new();
        for row in rel.rows {
            let mut probe = Relation {
                cols: cols.clone(),
                rows: vec![row.clone()],
            };
            for clause in &planned {
                probe = self.apply(probe, clause, graph, scope)?;
                if probe.rows.is_empty() {
                    break;
                }
            }
            if probe.rows.is_empty() {
                kept.push(row);
            }
        }
        Ok(Relation { cols, rows: kept })
    }
}

enum SlotPlan {
    Const(Value),
    Row(usize),
    New(usize),
    Dup(usize),
    Ignore,
}

fn apply_pattern(rel: Relation, pattern: &ClausePattern, graph: &dyn Graph) -> Result<Relation> {
    let mut plans = Vec::with_capacity(3);
    let mut new_cols: Vec<Var> = Vec::new();
    for slot in [&pattern.e, &pattern.a, &pattern.v] {
        let plan = match slot {
            PatternSlot::Lit(v) => SlotPlan::Const(v.clone()),
            PatternSlot::Any => SlotPlan::Ignore,
            PatternSlot::Var(var) => match rel.col(var) {
                Some(idx) => SlotPlan::Row(idx),
                None => match new_cols.iter().position(|c| c == var) {
                    Some(pos) => SlotPlan::Dup(pos),
                    None => {
                        new_cols.push(var.clone());
                        SlotPlan::New(new_cols.len() - 1)
                    }
                },
            },
        };
        plans.push(plan);
    }

    let ext_width = new_cols.len();
    let mut cols = rel.cols.clone();
    cols.extend(new_cols);
    let mut rows = Vec::new();
    for row in &rel.rows {
        let resolved = TriplePattern::new(
            slot_for(&plans[0], row),
            slot_for(&plans[1], row),
            slot_for(&plans[2], row),
        );
        'bindings: for binding in graph.resolve(&resolved) {
            let mut ext = vec![Value::Nil; ext_width];
            let mut cursor = 0;
            for plan in &plans {
                match plan {
                    SlotPlan::New(pos) => {
                        ext[*pos] = binding[cursor].clone();
                        cursor += 1;
                    }
                    SlotPlan::Dup(pos) => {
                        if ext[*pos] != binding[cursor] {
                            continue 'bindings;
                        }
                        cursor += 1;
                    }
                    SlotPlan::Ignore => cursor += 1,
                    SlotPlan::Const(_) | SlotPlan::Row(_) => {}
                }
            }
            let mut out = row.clone();
            out.extend(ext);
            rows.push(out);
        }
    }
    Ok(Relation { cols, rows })
}

fn slot_for(plan: &SlotPlan, row: &[Value]) -> Slot {
    match plan {
        SlotPlan::Const(v) => Slot::Val(v.clone()),
        SlotPlan::Row(idx) => Slot::Val(row[*idx].clone()),
        SlotPlan::New(_) | SlotPlan::Dup(_) | SlotPlan::Ignore => Slot::Free,
    }
}

fn apply_filter(rel: Relation, expr: &Expr, scope: &EvalScope<'_>) -> Result<Relation> {
    let Relation { cols, rows } = rel;
    let mut kept = Vec::new();
    for row in rows {
        let lookup = |var: &Var| {
            cols.iter()
                .position(|c| c == var)
                .map(|idx| row[idx].clone())
        };
        let keep = expr::eval(expr, &lookup, scope)?.single()?.is_truthy();
        if keep {
            kept.push(row);
        }
    }
    Ok(Relation { cols, rows: kept })
}

fn apply_bind(
    rel: Relation,
    expr: &Expr,
    target: &BindTarget,
    scope: &EvalScope<'_>,
) -> Result<Relation> {
    let Relation { mut cols, rows } = rel;
    let new_vars: Vec<Var> = match target {
        BindTarget::Var(v) => vec![v.clone()],
        BindTarget::Tuple(vars) => vars.clone(),
    };
    for var in &new_vars {
        if cols.contains(var) {
            return Err(UmbraError::Invalid("bind target variable is already bound"));
        }
    }
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let lookup = |var: &Var| {
            cols.iter()
                .position(|c| c == var)
                .map(|idx| row[idx].clone())
        };
        let value = expr::eval(expr, &lookup, scope)?;
        let mut row = row;
        match (target, value) {
            (BindTarget::Var(_), BindValue::One(v)) => row.push(v),
            (BindTarget::Var(_), BindValue::Many(_)) => {
                return Err(UmbraError::Invalid(
                    "bind to a single variable needs a single value",
                ))
            }
            (BindTarget::Tuple(vars), BindValue::Many(values)) if values.len() == vars.len() => {
                row.extend(values);
            }
            (BindTarget::Tuple(_), _) => {
                return Err(UmbraError::Invalid("bind destructure arity mismatch"))
            }
        }
        out.push(row);
    }
    cols.extend(new_vars);
    Ok(Relation { cols, rows: out })
}

fn product_scalar(rel: Relation, var: &Var, values: Vec<Value>) -> Result<Relation> {
    if rel.col(var).is_some() {
        return Err(UmbraError::Invalid(":in binds a variable twice"));
    }
    let Relation { mut cols, rows } = rel;
    cols.push(var.clone());
    let mut out = Vec::with_capacity(rows.len() * values.len());
    for row in &rows {
        for value in &values {
            let mut next = row.clone();
            next.push(value.clone());
            out.push(next);
        }
    }
    Ok(Relation { cols, rows: out })
}

fn product_tuple(rel: Relation, vars: &[Var], values: Vec<Value>) -> Result<Relation> {
    if vars.len() != values.len() {
        return Err(UmbraError::Invalid(":in tuple arity mismatch"));
    }
    let Relation { mut cols, rows } = rel;
    for var in vars {
        if cols.contains(var) {
            return Err(UmbraError::Invalid(":in binds a variable twice"));
        }
    }
    cols.extend(vars.iter().cloned());
    let out = rows
        .into_iter()
        .map(|mut row| {
            row.extend(values.iter().cloned());
            row
        })
        .collect();
    Ok(Relation { cols, rows: out })
}
