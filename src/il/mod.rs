//! The intermediate language: bound expression trees, the dependency graph
//! built from a module's declarations, and the passes run over it.

pub mod bound;
pub mod expr;
pub mod graph;
pub mod lower;
pub mod path;
pub mod scheduler;
pub mod schema;

pub use graph::{build_graph, build_module_graphs, BuildOptions, Graph, Node, NodeId, NodeKind};
pub use lower::{lower, lower_graph, LowerOptions};
