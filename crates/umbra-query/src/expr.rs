//! The expression sublanguage used by bind and filter clauses.
//!
//! Expressions are literals, variables, and applications. Operator
//! names resolve against the built-in safelist, then the ambient
//! environment; anything else is rejected. The only way past the
//! sandbox is an explicitly installed resolver, which stays local to
//! the engine that carries it.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use umbra_types::{Result, UmbraError, Value};

use crate::ast::{Expr, Var};

/// Result of evaluating an expression: one value, or a sequence that a
/// vector bind target destructures.
#[derive(Clone, Debug, PartialEq)]
pub enum BindValue {
    One(Value),
    Many(Vec<Value>),
}

impl BindValue {
    pub fn single(self) -> Result<Value> {
        match self {
            BindValue::One(v) => Ok(v),
            BindValue::Many(_) => Err(UmbraError::Invalid(
                "expected a single value, found a collection",
            )),
        }
    }
}

pub type NativeFn = Arc<dyn Fn(&[Value]) -> Result<BindValue> + Send + Sync>;

type Resolver = Arc<dyn Fn(&str) -> Option<NativeFn> + Send + Sync>;

/// Name-to-function environment plus the sandbox policy.
#[derive(Clone, Default)]
pub struct ExprEnv {
    fns: HashMap<String, NativeFn>,
    unrestricted: Option<Resolver>,
}

impl ExprEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an ambient function under `name`.
    pub fn register(&mut self, name: impl Into<String>, f: NativeFn) {
        self.fns.insert(name.into(), f);
    }

    /// Installs a fallback resolver consulted for names outside the
    /// safelist and the ambient environment. This lifts the sandbox
    /// for this environment only.
    pub fn with_unrestricted_resolver(mut self, resolver: Resolver) -> Self {
        self.unrestricted = Some(resolver);
        self
    }

    fn lookup(&self, name: &str) -> Option<NativeFn> {
        if let Some(f) = self.fns.get(name) {
            return Some(Arc::clone(f));
        }
        if let Some(f) = builtin(name) {
            return Some(f);
        }
        self.unrestricted.as_ref().and_then(|r| r(name))
    }
}

/// Per-query function bindings (`:in $ ?fn` style) layered over the
/// ambient environment.
pub(crate) struct EvalScope<'a> {
    pub env: &'a ExprEnv,
    pub locals: &'a HashMap<String, NativeFn>,
}

impl EvalScope<'_> {
    fn resolve(&self, name: &str) -> Result<NativeFn> {
        if let Some(f) = self.locals.get(name) {
            return Ok(Arc::clone(f));
        }
        self.env
            .lookup(name)
            .ok_or_else(|| UmbraError::UnsupportedOperation(name.to_owned()))
    }
}

pub(crate) fn eval(
    expr: &Expr,
    lookup_var: &dyn Fn(&Var) -> Option<Value>,
    scope: &EvalScope<'_>,
) -> Result<BindValue> {
    match expr {
        Expr::Lit(v) => Ok(BindValue::One(v.clone())),
        Expr::Var(var) => lookup_var(var)
            .map(BindValue::One)
            .ok_or(UmbraError::Invalid("unbound variable in expression")),
        Expr::Ident(name) => Err(UmbraError::UnsupportedOperation(name.clone())),
        Expr::App(name, args) => {
            let f = scope.resolve(name)?;
            let mut evaluated = Vec::with_capacity(args.len());
            for arg in args {
                evaluated.push(eval(arg, lookup_var, scope)?.single()?);
            }
            f(&evaluated)
        }
    }
}

fn builtin(name: &str) -> Option<NativeFn> {
    let f: NativeFn = match name {
        "+" => Arc::new(|args| numeric_fold(args, 0, |a, b| a + b, |a, b| a + b)),
        "-" => Arc::new(sub),
        "*" => Arc::new(|args| numeric_fold(args, 1, |a, b| a * b, |a, b| a * b)),
        "/" => Arc::new(div),
        "<" => Arc::new(|args| compare_chain(args, |ord| ord == Ordering::Less)),
        "<=" => Arc::new(|args| compare_chain(args, |ord| ord != Ordering::Greater)),
        ">" => Arc::new(|args| compare_chain(args, |ord| ord == Ordering::Greater)),
        ">=" => Arc::new(|args| compare_chain(args, |ord| ord != Ordering::Less)),
        "=" => Arc::new(|args| {
            Ok(BindValue::One(Value::Bool(
                args.windows(2).all(|w| w[0] == w[1]),
            )))
        }),
        "not=" => Arc::new(|args| {
            Ok(BindValue::One(Value::Bool(
                !args.windows(2).all(|w| w[0] == w[1]),
            )))
        }),
        "str" => Arc::new(|args| {
            let mut out = String::new();
            for arg in args {
                out.push_str(&display_fragment(arg));
            }
            Ok(BindValue::One(Value::Str(out)))
        }),
        _ => return None,
    };
    Some(f)
}

/// `str` renders strings bare and nil as nothing.
fn display_fragment(v: &Value) -> String {
    match v {
        Value::Nil => String::new(),
        Value::Str(s) => s.clone(),
        other => other.to_string(),
    }
}

enum Num {
    Int(i64),
    Float(f64),
}

fn as_num(v: &Value) -> Result<Num> {
    match v {
        Value::Int(n) => Ok(Num::Int(*n)),
        Value::Float(n) => Ok(Num::Float(*n)),
        _ => Err(UmbraError::Invalid("expected a numeric value")),
    }
}

fn num_value(n: Num) -> Value {
    match n {
        Num::Int(v) => Value::Int(v),
        Num::Float(v) => Value::Float(v),
    }
}

fn combine(a: Num, b: Num, int_op: fn(i64, i64) -> i64, float_op: fn(f64, f64) -> f64) -> Num {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => Num::Int(int_op(x, y)),
        (x, y) => Num::Float(float_op(to_f64(x), to_f64(y))),
    }
}

fn to_f64(n: Num) -> f64 {
    match n {
        Num::Int(v) => v as f64,
        Num::Float(v) => v,
    }
}

fn numeric_fold(
    args: &[Value],
    identity: i64,
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
) -> Result<BindValue> {
    let mut acc = Num::Int(identity);
    for arg in args {
        acc = combine(acc, as_num(arg)?, int_op, float_op);
    }
    Ok(BindValue::One(num_value(acc)))
}

fn sub(args: &[Value]) -> Result<BindValue> {
    let Some((first, rest)) = args.split_first() else {
        return Err(UmbraError::Invalid("- needs at least one argument"));
    };
    let mut acc = as_num(first)?;
    if rest.is_empty() {
        acc = combine(Num::Int(0), acc, |a, b| a - b, |a, b| a - b);
    }
    for arg in rest {
        acc = combine(acc, as_num(arg)?, |a, b| a - b, |a, b| a - b);
    }
    Ok(BindValue::One(num_value(acc)))
}

fn div(args: &[Value]) -> Result<BindValue> {
    let Some((first, rest)) = args.split_first() else {
        return Err(UmbraError::Invalid("/ needs at least one argument"));
    };
    let mut acc = to_f64(as_num(first)?);
    for arg in rest {
        let d = to_f64(as_num(arg)?);
        if d == 0.0 {
            return Err(UmbraError::Invalid("division by zero"));
        }
        acc /= d;
    }
    // Exact integer ratios stay integers.
    if acc.fract() == 0.0 && acc.abs() < i64::MAX as f64 {
        let all_ints = args.iter().all(|a| matches!(a, Value::Int(_)));
        if all_ints {
            return Ok(BindValue::One(Value::Int(acc as i64)));
        }
    }
    Ok(BindValue::One(Value::Float(acc)))
}

/// Comparison usable by the query layer as well (min/max aggregates).
pub(crate) fn compare_values(a: &Value, b: &Value) -> Result<Ordering> {
    match (a, b) {
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (Ok(x), Ok(y)) = (as_num(a), as_num(b)) else {
                return Err(UmbraError::Invalid("values are not comparable"));
            };
            Ok(to_f64(x).total_cmp(&to_f64(y)))
        }
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        (Value::Kw(x), Value::Kw(y)) => Ok(x.cmp(y)),
        (Value::Inst(x), Value::Inst(y)) => Ok(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Ok(x.cmp(y)),
        _ => Err(UmbraError::Invalid("values are not comparable")),
    }
}

fn compare_chain(args: &[Value], keep: fn(Ordering) -> bool) -> Result<BindValue> {
    for pair in args.windows(2) {
        if !keep(compare_values(&pair[0], &pair[1])?) {
            return Ok(BindValue::One(Value::Bool(false)));
        }
    }
    Ok(BindValue::One(Value::Bool(true)))
}
