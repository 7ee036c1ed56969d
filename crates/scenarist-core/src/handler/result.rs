//! StepResult type definition

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Handler outputs keyed by output name
pub type StepOutputs = Map<String, Value>;

/// What a handler reports back to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepResult {
    /// Step finished; outputs go through the output mapping
    Completed {
        #[serde(default)]
        outputs: StepOutputs,
    },

    /// Completion depends on an external event (a person, a remote call).
    /// The step stays running until resumed.
    WaitingForAction {
        #[serde(default)]
        prompt: Option<String>,
    },

    /// Handler logic failed
    Error { message: String },
}

impl StepResult {
    /// Convenience: completed with no outputs
    pub fn completed() -> Self {
        Self::Completed {
            outputs: Map::new(),
        }
    }

    pub fn completed_with(outputs: StepOutputs) -> Self {
        Self::Completed { outputs }
    }

    /// Convenience: completed with a single output
    pub fn completed_with_one(name: impl Into<String>, value: Value) -> Self {
        let mut outputs = Map::new();
        outputs.insert(name.into(), value);
        Self::Completed { outputs }
    }

    pub fn waiting() -> Self {
        Self::WaitingForAction { prompt: None }
    }

    pub fn waiting_with_prompt(prompt: impl Into<String>) -> Self {
        Self::WaitingForAction {
            prompt: Some(prompt.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self, Self::WaitingForAction { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}
