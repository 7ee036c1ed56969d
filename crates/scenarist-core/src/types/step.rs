//! Step type definitions
//!
//! A Step is one unit of work in a Sequence: a scenario node or a task step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use super::SequenceId;

/// Strongly-typed Step ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct StepId(pub String);

impl StepId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generate a fresh random step id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for StepId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for StepId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<&StepId> for StepId {
    fn from(value: &StepId) -> Self {
        value.clone()
    }
}

impl From<StepId> for String {
    fn from(value: StepId) -> Self {
        value.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for StepId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl PartialEq<&str> for StepId {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

/// Step lifecycle status.
///
/// Moves forward `pending -> running -> (completed | error)`; only explicit
/// reset, edit or retry puts a step back to `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Error,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Error)
    }
}

/// Classification of a step-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepErrorKind {
    /// Unknown or inactive handler, or config rejected by `validate`.
    Config,
    /// The handler's own logic failed.
    Execution,
}

/// Failure captured on a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub kind: StepErrorKind,
    pub message: String,
}

impl StepFailure {
    pub fn config(message: impl Into<String>) -> Self {
        Self {
            kind: StepErrorKind::Config,
            message: message.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self {
            kind: StepErrorKind::Execution,
            message: message.into(),
        }
    }
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            StepErrorKind::Config => write!(f, "config error: {}", self.message),
            StepErrorKind::Execution => write!(f, "execution error: {}", self.message),
        }
    }
}

/// Partial update applied by `edit_step`.
///
/// Any edit resets the step to `pending`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepPatch {
    #[serde(default)]
    pub type_tag: Option<String>,
    #[serde(default)]
    pub config: Option<Value>,
    #[serde(default)]
    pub input_mapping: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub output_mapping: Option<BTreeMap<String, String>>,
}

/// A single step of a sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Unique identifier for this step
    pub id: StepId,
    /// Position key, unique within the owning sequence
    pub order: u32,
    /// Owning sequence
    pub sequence_id: SequenceId,
    /// Handler selector
    #[serde(rename = "type")]
    pub type_tag: String,
    /// Plugin-owned configuration
    #[serde(default)]
    pub config: Value,
    /// handler input name -> scope path
    #[serde(default)]
    pub input_mapping: BTreeMap<String, String>,
    /// handler output name -> scope path
    #[serde(default)]
    pub output_mapping: BTreeMap<String, String>,
    #[serde(default)]
    pub status: StepStatus,
    /// Effective input of the last execution
    #[serde(default)]
    pub input: Option<Value>,
    /// Outputs of the last completed execution
    #[serde(default)]
    pub output: Option<Map<String, Value>>,
    #[serde(default)]
    pub error: Option<StepFailure>,
    /// Runtime id of the current/last execution; distinguishes re-runs
    #[serde(default)]
    pub execution_id: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Step {
    /// Create a pending step
    pub fn new(
        id: impl Into<StepId>,
        sequence_id: impl Into<SequenceId>,
        type_tag: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            order: 0,
            sequence_id: sequence_id.into(),
            type_tag: type_tag.into(),
            config: Value::Null,
            input_mapping: BTreeMap::new(),
            output_mapping: BTreeMap::new(),
            status: StepStatus::Pending,
            input: None,
            output: None,
            error: None,
            execution_id: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn with_order(mut self, order: u32) -> Self {
        self.order = order;
        self
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    /// Map a handler input name to a scope path
    pub fn with_input(mut self, name: impl Into<String>, scope_path: impl Into<String>) -> Self {
        self.input_mapping.insert(name.into(), scope_path.into());
        self
    }

    /// Map a handler output name to a scope path
    pub fn with_output(mut self, name: impl Into<String>, scope_path: impl Into<String>) -> Self {
        self.output_mapping.insert(name.into(), scope_path.into());
        self
    }

    /// Transition to running under a fresh execution id.
    pub fn start(&mut self) -> String {
        let execution_id = uuid::Uuid::new_v4().to_string();
        self.status = StepStatus::Running;
        self.execution_id = Some(execution_id.clone());
        self.error = None;
        self.started_at = Some(Utc::now());
        self.finished_at = None;
        execution_id
    }

    pub fn complete(&mut self, output: Map<String, Value>) {
        self.status = StepStatus::Completed;
        self.output = Some(output);
        self.error = None;
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, failure: StepFailure) {
        self.status = StepStatus::Error;
        self.error = Some(failure);
        self.finished_at = Some(Utc::now());
    }

    /// Explicit reset back to pending; drops the audit payloads.
    pub fn reset(&mut self) {
        self.status = StepStatus::Pending;
        self.input = None;
        self.output = None;
        self.error = None;
        self.execution_id = None;
        self.started_at = None;
        self.finished_at = None;
    }

    /// Apply an edit; always resets the step.
    pub fn apply_patch(&mut self, patch: StepPatch) {
        if let Some(type_tag) = patch.type_tag {
            self.type_tag = type_tag;
        }
        if let Some(config) = patch.config {
            self.config = config;
        }
        if let Some(input_mapping) = patch.input_mapping {
            self.input_mapping = input_mapping;
        }
        if let Some(output_mapping) = patch.output_mapping {
            self.output_mapping = output_mapping;
        }
        self.reset();
    }

    /// Whether `execution_id` identifies the current execution of this step.
    pub fn is_execution(&self, execution_id: &str) -> bool {
        self.execution_id.as_deref() == Some(execution_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_start_assigns_new_execution_id() {
        let mut step = Step::new("s1", "seq", "echo");
        let first = step.start();
        let second = step.start();
        assert_ne!(first, second);
        assert!(step.is_execution(&second));
        assert!(!step.is_execution(&first));
        assert_eq!(step.status, StepStatus::Running);
    }

    #[test]
    fn test_apply_patch_resets_status_and_audit() {
        let mut step = Step::new("s1", "seq", "echo").with_config(json!({"value": 1}));
        step.start();
        step.complete(Map::new());

        step.apply_patch(StepPatch {
            config: Some(json!({"value": 2})),
            ..StepPatch::default()
        });

        assert_eq!(step.status, StepStatus::Pending);
        assert_eq!(step.config, json!({"value": 2}));
        assert!(step.output.is_none());
        assert!(step.execution_id.is_none());
    }

    #[test]
    fn test_step_serializes_type_tag_as_type() {
        let step = Step::new("s1", "seq", "template");
        let value = serde_json::to_value(&step).expect("serialize");
        assert_eq!(value.get("type"), Some(&json!("template")));
        assert_eq!(value.get("status"), Some(&json!("pending")));
    }
}
