//! StepContext type definition

use crate::store::Scope;
use crate::types::{ScopeId, SequenceId, StepId};

/// Execution context for handlers
///
/// Handlers see a read-only snapshot of the scope taken before the step
/// started; they write back only through their outputs.
#[derive(Clone)]
pub struct StepContext {
    pub sequence_id: SequenceId,
    pub step_id: StepId,
    /// Runtime ID of this execution; distinguishes re-runs of the same step
    pub execution_id: String,
    pub scope_id: ScopeId,
    pub scope: Scope,
}

impl StepContext {
    pub fn new(
        sequence_id: impl Into<SequenceId>,
        step_id: impl Into<StepId>,
        execution_id: impl Into<String>,
        scope_id: impl Into<ScopeId>,
        scope: Scope,
    ) -> Self {
        Self {
            sequence_id: sequence_id.into(),
            step_id: step_id.into(),
            execution_id: execution_id.into(),
            scope_id: scope_id.into(),
            scope,
        }
    }

    /// Read a full `key.path` from the scope snapshot
    pub fn scope_value(&self, full_path: &str) -> Option<&serde_json::Value> {
        crate::store::path::lookup(&self.scope, full_path)
    }
}

impl std::fmt::Debug for StepContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepContext")
            .field("sequence_id", &self.sequence_id)
            .field("step_id", &self.step_id)
            .field("execution_id", &self.execution_id)
            .field("scope_id", &self.scope_id)
            .finish_non_exhaustive()
    }
}
