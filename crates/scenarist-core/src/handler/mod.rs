//! Step handler abstraction
//!
//! A StepHandler is the plugin selected by a step's type tag:
//! - StepHandler: validate / transform / generate messages / execute
//! - StepInput: rendered config plus mapped scope inputs
//! - StepContext: ids and a scope snapshot for one execution
//! - StepResult: completed, waiting for an external action, or error

mod context;
mod input;
mod message;
mod result;

use async_trait::async_trait;
use serde_json::Value;

pub use context::StepContext;
pub use input::StepInput;
pub use message::{ChatMessage, MessageRole};
pub use result::{StepOutputs, StepResult};

use crate::store::Scope;
use crate::types::Step;

/// StepHandler trait - the contract every plugin implements
///
/// Handlers are black boxes to the engine. They may perform async work
/// inside `execute`, ask to wait for an external action, or fail.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Type tag this handler serves (must be unique in a registry)
    fn type_tag(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str {
        ""
    }

    /// Registration metadata
    fn metadata(&self) -> HandlerMeta {
        HandlerMeta::new(self.type_tag(), self.description())
    }

    /// Check a step's effective config before execution.
    fn validate(&self, _config: &Value) -> Result<(), String> {
        Ok(())
    }

    /// Normalize a step before execution. Must not have side effects.
    fn transform_step(&self, step: &Step) -> Step {
        step.clone()
    }

    /// Messages this step would send to a model, for preview and prompting.
    fn generate_messages(&self, _input: &StepInput, _scope: &Scope) -> Vec<ChatMessage> {
        Vec::new()
    }

    /// Execute the step
    async fn execute(&self, input: StepInput, ctx: StepContext) -> StepResult;
}

/// Handler metadata kept in the registration record
#[derive(Debug, Clone)]
pub struct HandlerMeta {
    /// Type tag
    pub type_tag: String,
    /// Display name
    pub name: String,
    pub description: String,
    /// Config merged under every step's own config
    pub default_config: Value,
    /// Completion is always driven from outside; `execute` is never called
    pub interactive: bool,
    /// Output names the handler produces
    pub outputs: Vec<String>,
}

impl HandlerMeta {
    pub fn new(type_tag: impl Into<String>, description: impl Into<String>) -> Self {
        let type_tag = type_tag.into();
        Self {
            name: type_tag.clone(),
            type_tag,
            description: description.into(),
            default_config: Value::Null,
            interactive: false,
            outputs: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_default_config(mut self, default_config: Value) -> Self {
        self.default_config = default_config;
        self
    }

    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    pub fn with_outputs(mut self, outputs: Vec<String>) -> Self {
        self.outputs = outputs;
        self
    }
}
