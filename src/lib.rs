#![forbid(unsafe_code)]

//! umbra: an in-process graph database of (subject, predicate, object)
//! triples with first-class temporal versioning.
//!
//! Every transaction produces a new immutable database value sharing
//! structure with its predecessor; prior snapshots stay queryable by
//! transaction number or instant. Connections serialize transactions
//! through a compare-and-set cell, the registry routes `umbra:` URIs
//! to live connections, and the entity layer materializes nested
//! documents back out of triples.

pub mod connection;
pub mod db;
pub mod entity;
pub mod registry;
pub mod transact;

pub use connection::{Connection, ConnectionOptions, TxReport};
pub use db::{as_of, diff, since, Database, TimePoint};
pub use entity::{entity, entity_nested, ident, EntityValue};
pub use registry::{
    connect, create_database, delete_database, registry, release, shutdown, GraphKind, Registry,
};
pub use transact::TxOp;

pub use umbra_index::{
    empty_graph, Graph, GraphFlavor, MultiGraph, SimpleGraph, Slot, Triple, TriplePattern,
};
pub use umbra_query::builder;
pub use umbra_query::{
    BindValue, ExprEnv, Form, NativeFn, Query, QueryBuilder, QueryEngine, QueryInput,
    QueryOptions, QueryResult,
};
pub use umbra_types::{new_node, Keyword, NodeId, Result, UmbraError, Value};
