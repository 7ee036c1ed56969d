//! Realtime execution progress reporting

use async_trait::async_trait;
use serde_json::Value;

use crate::types::{SequenceId, StepId};

pub const PHASE_STEP_STARTED: &str = "step_started";
pub const PHASE_STEP_COMPLETED: &str = "step_completed";
pub const PHASE_STEP_WAITING: &str = "step_waiting";
pub const PHASE_STEP_FAILED: &str = "step_failed";
pub const PHASE_SEQUENCE_COMPLETED: &str = "sequence_completed";
pub const PHASE_SEQUENCE_FAILED: &str = "sequence_failed";

/// Realtime execution progress event.
#[derive(Debug, Clone)]
pub struct ExecutionProgressEvent {
    pub sequence_id: SequenceId,
    pub step_id: Option<StepId>,
    pub type_tag: Option<String>,
    /// Phase label, e.g. step_started/step_completed/sequence_completed.
    pub phase: String,
    /// Optional human-readable message.
    pub message: Option<String>,
    /// Extra structured metadata.
    pub metadata: Value,
}

impl ExecutionProgressEvent {
    pub fn new(
        sequence_id: impl Into<SequenceId>,
        step_id: Option<StepId>,
        type_tag: Option<String>,
        phase: impl Into<String>,
    ) -> Self {
        Self {
            sequence_id: sequence_id.into(),
            step_id,
            type_tag,
            phase: phase.into(),
            message: None,
            metadata: Value::Null,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn is_step_error(&self) -> bool {
        self.phase == PHASE_STEP_FAILED
    }
}

/// Sink interface for execution progress reporting.
#[async_trait]
pub trait ExecutionProgressReporter: Send + Sync {
    async fn report(&self, event: ExecutionProgressEvent) -> Result<(), String>;
}
