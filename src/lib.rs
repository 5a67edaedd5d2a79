//! tfport: translate Terraform-style module trees into TypeScript programs.
//!
//! Declarations are bound into a per-module dependency graph, lowered
//! (path resolution and constant folding), ordered, and handed to a
//! target generator.

pub mod cli;
pub mod core;
pub mod gen;
pub mod il;

pub use crate::core::error::{Error, Result};
pub use crate::gen::generate;
pub use crate::gen::nodejs::{NodeJsGenerator, NodeJsOptions};
pub use crate::il::{build_graph, build_module_graphs, BuildOptions};
