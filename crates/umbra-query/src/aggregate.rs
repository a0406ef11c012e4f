//! Projection shapes and grouped aggregation.
//!
//! The find spec decides the output shape; aggregates group by the
//! non-aggregate find variables plus `:with`, which joins the grouping
//! identity without appearing in the output.

use std::collections::HashMap;

use umbra_types::{Result, UmbraError, Value};

use crate::ast::{AggArg, AggOp, FindElem, FindSpec, Var};
use crate::exec::Relation;
use crate::expr::compare_values;

/// Relation-shaped output with its column labels, e.g. `?addr`,
/// `?count-child`.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultRelation {
    pub cols: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum QueryResult {
    Relation(ResultRelation),
    Scalar(Option<Value>),
    Coll(Vec<Value>),
    Tuple(Option<Vec<Value>>),
}

impl QueryResult {
    /// Rows view for relation-shaped results; empty otherwise.
    pub fn rows(&self) -> &[Vec<Value>] {
        match self {
            QueryResult::Relation(rel) => &rel.rows,
            _ => &[],
        }
    }
}

pub(crate) fn project(
    rel: Relation,
    find: &FindSpec,
    with: &[Var],
    distinct: bool,
) -> Result<QueryResult> {
    let elems = find.elems();
    let labels: Vec<String> = elems.iter().map(FindElem::label).collect();
    let has_agg = elems
        .iter()
        .any(|elem| matches!(elem, FindElem::Agg { .. }));
    let rows = if has_agg {
        aggregate_rows(&rel, elems, with, distinct)?
    } else {
        plain_rows(&rel, elems, distinct)?
    };
    Ok(shape(find, labels, rows))
}

fn shape(find: &FindSpec, cols: Vec<String>, mut rows: Vec<Vec<Value>>) -> QueryResult {
    match find {
        FindSpec::Relation(_) => QueryResult::Relation(ResultRelation { cols, rows }),
        FindSpec::Scalar(_) => QueryResult::Scalar(
            (!rows.is_empty()).then(|| rows.swap_remove(0).swap_remove(0)),
        ),
        FindSpec::Coll(_) => {
            QueryResult::Coll(rows.into_iter().map(|mut row| row.swap_remove(0)).collect())
        }
        FindSpec::Tuple(_) => {
            QueryResult::Tuple((!rows.is_empty()).then(|| rows.swap_remove(0)))
        }
    }
}

fn plain_rows(rel: &Relation, elems: &[FindElem], distinct: bool) -> Result<Vec<Vec<Value>>> {
    let mut indices = Vec::with_capacity(elems.len());
    for elem in elems {
        let FindElem::Var(var) = elem else {
            return Err(UmbraError::Invalid("mixed aggregate projection"));
        };
        indices.push(bound_col(rel, var)?);
    }
    let projected = rel
        .rows
        .iter()
        .map(|row| indices.iter().map(|idx| row[*idx].clone()).collect())
        .collect();
    Ok(if distinct {
        dedup_rows(projected)
    } else {
        projected
    })
}

fn aggregate_rows(
    rel: &Relation,
    elems: &[FindElem],
    with: &[Var],
    distinct: bool,
) -> Result<Vec<Vec<Value>>> {
    // Rows group by the non-aggregate find variables. `:with`
    // variables join the deduplication basis below, keeping
    // otherwise-identical rows apart, but never the grouping key.
    let mut group_vars: Vec<Var> = Vec::new();
    let mut agg_vars: Vec<Var> = Vec::new();
    let mut whole_row = false;
    for elem in elems {
        match elem {
            FindElem::Var(var) => group_vars.push(var.clone()),
            FindElem::Agg {
                arg: AggArg::Var(var),
                ..
            } => agg_vars.push(var.clone()),
            FindElem::Agg {
                arg: AggArg::Row, ..
            } => whole_row = true,
        }
    }

    // The base tuple the set semantics deduplicate over: everything
    // the projection observes. A whole-row aggregate observes it all.
    let base_cols: Vec<Var> = if whole_row {
        rel.cols.clone()
    } else {
        let mut cols = group_vars.clone();
        for var in agg_vars.iter().chain(with) {
            if !cols.contains(var) {
                cols.push(var.clone());
            }
        }
        cols
    };
    let base_indices: Vec<usize> = base_cols
        .iter()
        .map(|var| bound_col(rel, var))
        .collect::<Result<_>>()?;
    let mut base_rows: Vec<Vec<Value>> = rel
        .rows
        .iter()
        .map(|row| base_indices.iter().map(|idx| row[*idx].clone()).collect())
        .collect();
    if distinct {
        base_rows = dedup_rows(base_rows);
    }

    let base_col = |var: &Var| -> Result<usize> {
        base_cols
            .iter()
            .position(|c| c == var)
            .ok_or(UmbraError::Invalid("find variable is not bound"))
    };
    let key_indices: Vec<usize> = group_vars
        .iter()
        .map(|var| base_col(var))
        .collect::<Result<_>>()?;

    // Group rows, keeping first-seen group order.
    let mut order: Vec<Vec<Value>> = Vec::new();
    let mut groups: HashMap<Vec<Value>, Vec<usize>> = HashMap::new();
    for (idx, row) in base_rows.iter().enumerate() {
        let key: Vec<Value> = key_indices.iter().map(|i| row[*i].clone()).collect();
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(idx);
    }
    // A fully aggregated projection always has exactly one group, even
    // over no rows.
    if key_indices.is_empty() && order.is_empty() {
        order.push(Vec::new());
        groups.insert(Vec::new(), Vec::new());
    }

    let mut out = Vec::with_capacity(order.len());
    for key in order {
        let members = &groups[&key];
        let mut row = Vec::with_capacity(elems.len());
        for elem in elems {
            match elem {
                FindElem::Var(var) => {
                    let pos = group_vars
                        .iter()
                        .position(|v| v == var)
                        .expect("group variable came from the find spec");
                    row.push(key[pos].clone());
                }
                FindElem::Agg { op, arg } => {
                    let value = match arg {
                        AggArg::Row => {
                            apply_row_agg(*op, members.iter().map(|idx| &base_rows[*idx]))?
                        }
                        AggArg::Var(var) => {
                            let col = base_col(var)?;
                            apply_value_agg(
                                *op,
                                members.iter().map(|idx| &base_rows[*idx][col]),
                            )?
                        }
                    };
                    row.push(value);
                }
            }
        }
        out.push(row);
    }
    Ok(out)
}

fn apply_row_agg<'a>(
    op: AggOp,
    rows: impl Iterator<Item = &'a Vec<Value>>,
) -> Result<Value> {
    match op {
        AggOp::Count => Ok(Value::Int(rows.count() as i64)),
        AggOp::CountDistinct => {
            let distinct: std::collections::HashSet<&Vec<Value>> = rows.collect();
            Ok(Value::Int(distinct.len() as i64))
        }
        other => Err(UmbraError::IllegalAggregate(format!(
            "({} *) is not defined",
            other.name()
        ))),
    }
}

fn apply_value_agg<'a>(op: AggOp, values: impl Iterator<Item = &'a Value>) -> Result<Value> {
    let bound: Vec<&Value> = values.filter(|v| !matches!(v, Value::Nil)).collect();
    match op {
        AggOp::Count => Ok(Value::Int(bound.len() as i64)),
        AggOp::CountDistinct => {
            let distinct: std::collections::HashSet<&&Value> = bound.iter().collect();
            Ok(Value::Int(distinct.len() as i64))
        }
        AggOp::Sum => {
            let mut int_acc: i64 = 0;
            let mut float_acc: f64 = 0.0;
            let mut saw_float = false;
            for value in &bound {
                match value {
                    Value::Int(n) => int_acc += n,
                    Value::Float(n) => {
                        saw_float = true;
                        float_acc += n;
                    }
                    _ => return Err(UmbraError::Invalid("sum over a non-numeric value")),
                }
            }
            Ok(if saw_float {
                Value::Float(float_acc + int_acc as f64)
            } else {
                Value::Int(int_acc)
            })
        }
        AggOp::Min | AggOp::Max => {
            let mut best: Option<&Value> = None;
            for value in &bound {
                best = Some(match best {
                    None => value,
                    Some(current) => {
                        let ord = compare_values(value, current)?;
                        let replace = match op {
                            AggOp::Min => ord == std::cmp::Ordering::Less,
                            _ => ord == std::cmp::Ordering::Greater,
                        };
                        if replace {
                            value
                        } else {
                            current
                        }
                    }
                });
            }
            Ok(best.cloned().unwrap_or(Value::Nil))
        }
        AggOp::Avg => {
            if bound.is_empty() {
                return Ok(Value::Nil);
            }
            let mut total = 0.0;
            for value in &bound {
                match value {
                    Value::Int(n) => total += *n as f64,
                    Value::Float(n) => total += n,
                    _ => return Err(UmbraError::Invalid("avg over a non-numeric value")),
                }
            }
            Ok(Value::Float(total / bound.len() as f64))
        }
    }
}

fn bound_col(rel: &Relation, var: &Var) -> Result<usize> {
    rel.col(var)
        .ok_or(UmbraError::Invalid("find variable is not bound"))
}

fn dedup_rows(rows: Vec<Vec<Value>>) -> Vec<Vec<Value>> {
    let mut seen = std::collections::HashSet::new();
    rows.into_iter()
        .filter(|row| seen.insert(row.clone()))
        .collect()
}
