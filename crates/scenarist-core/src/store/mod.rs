//! Store module
//!
//! - ScopeStore: per-workspace nested documents shared by all steps
//! - path: dotted-path read/write algorithms used by the scope and templates
//! - SequenceStore: sequence persistence seam (async trait) and in-memory store

pub mod path;
mod scope;
mod sequence_store;

pub use scope::{Scope, ScopeStore};
pub use sequence_store::{InMemorySequenceStore, SequenceStore};

use thiserror::Error;

/// Store error types
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
