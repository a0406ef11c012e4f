//! Query forms and the typed AST they parse into.

use std::collections::HashSet;
use std::fmt;

use umbra_types::{Keyword, Value};

/// EDN-shaped query input. `Sym` covers variables (`?x`), wildcards
/// (`_`), and operator names; everything self-evaluating is a `Lit`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Form {
    Lit(Value),
    Sym(String),
    Vector(Vec<Form>),
    List(Vec<Form>),
}

impl Form {
    pub fn sym(name: impl Into<String>) -> Self {
        Form::Sym(name.into())
    }

    /// Keyword literal from `:ns/name` text.
    pub fn kw(text: &str) -> Self {
        let kw: Keyword = text.parse().expect("keyword literal");
        Form::Lit(Value::Kw(kw))
    }

    pub fn vector(items: impl IntoIterator<Item = Form>) -> Self {
        Form::Vector(items.into_iter().collect())
    }

    pub fn list(items: impl IntoIterator<Item = Form>) -> Self {
        Form::List(items.into_iter().collect())
    }
}

impl From<Value> for Form {
    fn from(v: Value) -> Self {
        Form::Lit(v)
    }
}

impl From<i64> for Form {
    fn from(v: i64) -> Self {
        Form::Lit(Value::Int(v))
    }
}

impl From<&str> for Form {
    fn from(v: &str) -> Self {
        Form::Lit(Value::Str(v.to_owned()))
    }
}

impl From<bool> for Form {
    fn from(v: bool) -> Self {
        Form::Lit(Value::Bool(v))
    }
}

impl From<Keyword> for Form {
    fn from(v: Keyword) -> Self {
        Form::Lit(Value::Kw(v))
    }
}

/// Query variable, stored with its leading `?`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(pub String);

impl Var {
    pub fn new(name: impl Into<String>) -> Self {
        Var(name.into())
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AggOp {
    Count,
    CountDistinct,
    Sum,
    Min,
    Max,
    Avg,
}

impl AggOp {
    pub fn name(self) -> &'static str {
        match self {
            AggOp::Count => "count",
            AggOp::CountDistinct => "count-distinct",
            AggOp::Sum => "sum",
            AggOp::Min => "min",
            AggOp::Max => "max",
            AggOp::Avg => "avg",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AggArg {
    Var(Var),
    /// The whole row, written `*`.
    Row,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FindElem {
    Var(Var),
    Agg { op: AggOp, arg: AggArg },
}

impl FindElem {
    /// Output column label, e.g. `?addr` or `?count-child`.
    pub fn label(&self) -> String {
        match self {
            FindElem::Var(v) => v.0.clone(),
            FindElem::Agg { op, arg: AggArg::Row } => format!("?{}", op.name()),
            FindElem::Agg {
                op,
                arg: AggArg::Var(v),
            } => format!("?{}-{}", op.name(), v.0.trim_start_matches('?')),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FindSpec {
    /// `[?x ?y]` — relation of tuples.
    Relation(Vec<FindElem>),
    /// `[?x .]` — first tuple's first column.
    Scalar(FindElem),
    /// `[[?x ...]]` — flat collection of the first column.
    Coll(FindElem),
    /// `[[?x ?y]]` — first tuple only.
    Tuple(Vec<FindElem>),
}

impl FindSpec {
    pub fn elems(&self) -> &[FindElem] {
        match self {
            FindSpec::Relation(elems) | FindSpec::Tuple(elems) => elems,
            FindSpec::Scalar(elem) | FindSpec::Coll(elem) => std::slice::from_ref(elem),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InBinding {
    /// `$` — the database input.
    Database,
    /// `?x` — one value (or one function).
    Scalar(Var),
    /// `[?x ...]` — a collection expanded row-wise.
    Coll(Var),
    /// `[?x ?y]` — one tuple destructured across variables.
    Tuple(Vec<Var>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PatternSlot {
    Lit(Value),
    Var(Var),
    /// `_` matches anything and reveals nothing.
    Any,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClausePattern {
    pub e: PatternSlot,
    pub a: PatternSlot,
    pub v: PatternSlot,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    Lit(Value),
    Var(Var),
    /// Free identifier; rejected by the sandbox at evaluation time.
    Ident(String),
    App(String, Vec<Expr>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BindTarget {
    Var(Var),
    Tuple(Vec<Var>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Clause {
    Pattern(ClausePattern),
    Not(Vec<Clause>),
    Or(Vec<Clause>),
    Filter(Expr),
    Bind(Expr, BindTarget),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    pub find: FindSpec,
    pub in_spec: Vec<InBinding>,
    pub with: Vec<Var>,
    pub where_clauses: Vec<Clause>,
}

impl Expr {
    pub fn variables(&self, out: &mut HashSet<Var>) {
        match self {
            Expr::Lit(_) | Expr::Ident(_) => {}
            Expr::Var(v) => {
                out.insert(v.clone());
            }
            Expr::App(_, args) => {
                for arg in args {
                    arg.variables(out);
                }
            }
        }
    }
}

impl ClausePattern {
    pub fn variables(&self, out: &mut HashSet<Var>) {
        for slot in [&self.e, &self.a, &self.v] {
            if let PatternSlot::Var(v) = slot {
                out.insert(v.clone());
            }
        }
    }
}

impl Clause {
    /// Variables referenced by the clause, including ones it binds.
    pub fn variables(&self, out: &mut HashSet<Var>) {
        match self {
            Clause::Pattern(p) => p.variables(out),
            Clause::Not(clauses) | Clause::Or(clauses) => {
                for clause in clauses {
                    clause.variables(out);
                }
            }
            Clause::Filter(expr) => expr.variables(out),
            Clause::Bind(expr, target) => {
                expr.variables(out);
                match target {
                    BindTarget::Var(v) => {
                        out.insert(v.clone());
                    }
                    BindTarget::Tuple(vars) => out.extend(vars.iter().cloned()),
                }
            }
        }
    }

    /// Variables the clause needs bound before it can run: everything
    /// it references except what it introduces itself.
    pub fn required_variables(&self) -> HashSet<Var> {
        let mut vars = HashSet::new();
        match self {
            Clause::Filter(expr) => expr.variables(&mut vars),
            Clause::Bind(expr, _) => expr.variables(&mut vars),
            Clause::Pattern(_) => {}
            Clause::Not(clauses) | Clause::Or(clauses) => {
                for clause in clauses {
                    clause.variables(&mut vars);
                }
            }
        }
        vars
    }
}
