#![forbid(unsafe_code)]

//! Shared value model and error taxonomy.
//!
//! Everything that crosses a crate boundary lives here: the [`Value`]
//! universe triples are built from, node identities and their allocator,
//! and the single error enum the rest of the workspace converges on.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

pub mod codec;
mod value;

pub use value::{Keyword, Value};

/// Opaque node identity. Two distinct allocations never compare equal.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct NodeId(pub u64);

static NEXT_NODE: AtomicU64 = AtomicU64::new(1);

/// Allocates a fresh node identity, unique for the life of the process.
pub fn new_node() -> NodeId {
    NodeId(NEXT_NODE.fetch_add(1, Ordering::Relaxed))
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#node/{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = UmbraError;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s
            .strip_prefix("#node/")
            .ok_or(UmbraError::Invalid("node literal must start with #node/"))?;
        let n = digits
            .parse::<u64>()
            .map_err(|_| UmbraError::Invalid("node literal has a non-numeric id"))?;
        Ok(NodeId(n))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UmbraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corruption detected: {0}")]
    Corruption(&'static str),
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    #[error("query is missing a :{0} clause")]
    MissingClause(&'static str),
    #[error("unknown query clauses: {0:?}")]
    UnknownClauses(Vec<String>),
    #[error("illegal aggregate: {0}")]
    IllegalAggregate(String),
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    #[error("graphs are of incompatible kinds")]
    IncompatibleGraphs,
    #[error("read past end of file in region {region} at offset {offset}")]
    BeyondEndOfFile { region: u64, offset: u64 },
    #[error("corrupted transaction file")]
    CorruptedTransactionFile,
    #[error("transaction timed out after {0} ms")]
    TransactionTimeout(u64),
    #[error("database connection is closed")]
    DatabaseClosed,
    #[error("unknown database uri scheme: {0}")]
    UnknownUriScheme(String),
}

pub type Result<T> = std::result::Result<T, UmbraError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn nodes_are_unique() {
        let allocated: HashSet<NodeId> = (0..1024).map(|_| new_node()).collect();
        assert_eq!(allocated.len(), 1024);
    }

    #[test]
    fn node_display_round_trips() {
        let n = new_node();
        let printed = n.to_string();
        assert_eq!(printed.parse::<NodeId>().unwrap(), n);
    }

    #[test]
    fn node_parse_rejects_garbage() {
        assert!("node/1".parse::<NodeId>().is_err());
        assert!("#node/x".parse::<NodeId>().is_err());
    }
}
