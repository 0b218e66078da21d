//! Shared building blocks for knowledge-graph query context assembly:
//! artifact table access, indexer adapters, context normalization,
//! configuration and the error taxonomy.

pub mod adapters;
pub mod config;
pub mod context;
pub mod error;
pub mod table;
pub mod types;

pub use context::{normalize, ContextCategory, NormalizedContext, RawContext, Record};
pub use error::{Error, Result};
pub use table::Table;
