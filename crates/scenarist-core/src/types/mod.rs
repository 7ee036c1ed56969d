//! Core type definitions
//!
//! - Step: one unit of work with handler type, config and scope mappings
//! - Sequence: ordered steps plus cursor and run status
//! - Workspace: owner of a scope and its declared initial context

mod sequence;
mod step;
mod workspace;

pub use sequence::{Sequence, SequenceId, SequenceKind, SequenceStatus};
pub use step::{Step, StepErrorKind, StepFailure, StepId, StepPatch, StepStatus};
pub use workspace::{ScopeId, Workspace, WorkspaceId};
