//! # Scenarist Core
//!
//! Step sequencing, shared scope and plugin dispatch.
//!
//! This crate contains:
//! - Step / Sequence / Workspace definitions
//! - ScopeStore with nested-path reads and writes, and template rendering
//! - StepHandler contract and PluginRegistry
//! - SequenceEngine and the HandlerActionBridge used to resume it
//!
//! This crate does NOT care about:
//! - How steps are rendered to a user
//! - Where sequences are persisted beyond the SequenceStore seam
//! - How a model or remote service is called

pub mod bridge;
pub mod engine;
pub mod handler;
pub mod registry;
pub mod store;
pub mod template;
pub mod types;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::bridge::{HandlerActionBridge, ResumeHandle, ResumeMode};
    pub use crate::engine::{
        CursorMove, EngineConfig, EngineContext, EngineError, ExecutionProgressEvent,
        ExecutionProgressReporter, RunOutcome, SequenceEngine,
    };
    pub use crate::handler::{
        ChatMessage, HandlerMeta, MessageRole, StepContext, StepHandler, StepInput, StepOutputs,
        StepResult,
    };
    pub use crate::registry::{PluginRegistry, Registration, ResolveError};
    pub use crate::store::{
        InMemorySequenceStore, Scope, ScopeStore, SequenceStore, StoreError,
    };
    pub use crate::types::{
        Sequence, SequenceId, SequenceKind, SequenceStatus, Step, StepErrorKind, StepFailure,
        StepId, StepPatch, StepStatus, Workspace,
    };
}

// Re-export key types at crate root
pub use bridge::{HandlerActionBridge, ResumeHandle, ResumeMode};
pub use engine::{
    CursorMove, EngineConfig, EngineContext, EngineError, ExecutionProgressEvent,
    ExecutionProgressReporter, RunOutcome, SequenceEngine,
};
pub use handler::{StepHandler, StepInput, StepResult};
pub use registry::{PluginRegistry, ResolveError};
pub use store::{ScopeStore, SequenceStore, StoreError};
pub use types::{Sequence, Step, StepId, Workspace};
