#![forbid(unsafe_code)]

//! The multi-indexed triple store.
//!
//! Three rotations of a three-level map (SPO, POS, OSP) are kept in
//! lock-step; every update produces new index roots that share all
//! untouched sub-trees with their predecessors, so prior graph values
//! stay alive and queryable for free.

pub mod graph;
pub mod index;
pub mod resolve;
pub mod transitive;

pub use graph::{empty_graph, Graph, GraphFlavor, MultiGraph, SimpleGraph, Triple};
pub use index::{Index, StmtMeta};
pub use resolve::{Bindings, Slot, TriplePattern};
pub use transitive::TransitiveTag;
