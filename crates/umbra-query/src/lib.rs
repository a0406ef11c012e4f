#![forbid(unsafe_code)]

//! Query planning and execution over a graph value.
//!
//! Queries arrive as EDN-shaped forms (the surface text parser lives
//! outside this crate), get validated into a typed AST, reordered for
//! selectivity, and executed as relational combination of pattern
//! resolutions. Projection shapes and aggregation live in
//! [`aggregate`]; the sandboxed expression sublanguage in [`expr`].

pub mod aggregate;
pub mod ast;
pub mod builder;
pub mod exec;
pub mod expr;
pub mod parse;
mod plan;

pub use aggregate::{QueryResult, ResultRelation};
pub use ast::{Clause, FindSpec, Form, InBinding, Query, Var};
pub use builder::QueryBuilder;
pub use exec::{QueryEngine, QueryInput, QueryOptions};
pub use expr::{BindValue, ExprEnv, NativeFn};
