//! Core types: declaration trees, YAML loading, and the error taxonomy.

pub mod error;
pub mod parser;
pub mod types;
