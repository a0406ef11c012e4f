//! The value universe triples range over.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::{NodeId, Result, UmbraError};

/// Namespaced symbolic identifier, printed `:ns/name` or `:name`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Keyword {
    pub ns: Option<String>,
    pub name: String,
}

impl Keyword {
    pub fn new(ns: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            ns: Some(ns.into()),
            name: name.into(),
        }
    }

    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            ns: None,
            name: name.into(),
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ns {
            Some(ns) => write!(f, ":{}/{}", ns, self.name),
            None => write!(f, ":{}", self.name),
        }
    }
}

impl FromStr for Keyword {
    type Err = UmbraError;

    fn from_str(s: &str) -> Result<Self> {
        let body = s
            .strip_prefix(':')
            .ok_or(UmbraError::Invalid("keyword literal must start with ':'"))?;
        if body.is_empty() {
            return Err(UmbraError::Invalid("keyword literal has an empty name"));
        }
        match body.split_once('/') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() => Ok(Keyword::new(ns, name)),
            Some(_) => Err(UmbraError::Invalid("keyword namespace or name is empty")),
            None => Ok(Keyword::plain(body)),
        }
    }
}

/// A single triple component. Any value may occupy any slot.
///
/// Floats compare and hash by bit pattern so a `Value` can key the
/// index maps without breaking the `Eq`/`Hash` contract.
#[derive(Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Kw(Keyword),
    Inst(DateTime<Utc>),
    Node(NodeId),
}

impl Value {
    pub fn kw(ns: &str, name: &str) -> Self {
        Value::Kw(Keyword::new(ns, name))
    }

    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Value::Node(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_kw(&self) -> Option<&Keyword> {
        match self {
            Value::Kw(k) => Some(k),
            _ => None,
        }
    }

    /// True for everything except `Nil` and `false`.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Nil => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::Float(_) => 3,
            Value::Str(_) => 4,
            Value::Kw(_) => 5,
            Value::Inst(_) => 6,
            Value::Node(_) => 7,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Kw(a), Value::Kw(b)) => a == b,
            (Value::Inst(a), Value::Inst(b)) => a == b,
            (Value::Node(a), Value::Node(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Nil => {}
            Value::Bool(v) => v.hash(state),
            Value::Int(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::Str(v) => v.hash(state),
            Value::Kw(v) => v.hash(state),
            Value::Inst(v) => v.hash(state),
            Value::Node(v) => v.hash(state),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Kw(a), Value::Kw(b)) => a.cmp(b),
            (Value::Inst(a), Value::Inst(b)) => a.cmp(b),
            (Value::Node(a), Value::Node(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v:?}"),
            Value::Kw(v) => write!(f, "{v}"),
            Value::Inst(v) => write!(f, "#inst \"{}\"", v.to_rfc3339()),
            Value::Node(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Keyword> for Value {
    fn from(v: Keyword) -> Self {
        Value::Kw(v)
    }
}

impl From<NodeId> for Value {
    fn from(v: NodeId) -> Self {
        Value::Node(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Inst(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(v: &Value) -> u64 {
        let mut h = DefaultHasher::new();
        v.hash(&mut h);
        h.finish()
    }

    #[test]
    fn keyword_parse_round_trips() {
        for text in [":artist/name", ":verdict"] {
            let kw: Keyword = text.parse().unwrap();
            assert_eq!(kw.to_string(), text);
        }
        assert!(":".parse::<Keyword>().is_err());
        assert!("artist/name".parse::<Keyword>().is_err());
        assert!(":/name".parse::<Keyword>().is_err());
    }

    #[test]
    fn float_equality_matches_hash() {
        let a = Value::Float(1.5);
        let b = Value::Float(1.5);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        // NaN keys are stable under the bit-pattern rule.
        let nan = Value::Float(f64::NAN);
        assert_eq!(nan, nan.clone());
    }

    #[test]
    fn values_of_different_kinds_never_compare_equal() {
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::Str("1".into()), Value::Int(1));
        assert_ne!(Value::Nil, Value::Bool(false));
    }

    #[test]
    fn ordering_is_total_across_kinds() {
        let mut values = vec![
            Value::Node(NodeId(3)),
            Value::Str("b".into()),
            Value::Int(7),
            Value::Nil,
            Value::Float(0.25),
        ];
        values.sort();
        assert_eq!(values[0], Value::Nil);
        assert_eq!(values[4], Value::Node(NodeId(3)));
    }
}
