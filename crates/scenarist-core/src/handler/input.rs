//! StepInput type definition

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Effective input handed to a handler
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepInput {
    /// Step config after default injection and template rendering
    #[serde(default)]
    pub config: Value,
    /// Values read from scope through the step's input mapping
    #[serde(default)]
    pub inputs: Map<String, Value>,
}

impl StepInput {
    pub fn new(config: Value, inputs: Map<String, Value>) -> Self {
        Self { config, inputs }
    }

    /// Create input with config only
    pub fn with_config(config: Value) -> Self {
        Self {
            config,
            inputs: Map::new(),
        }
    }

    /// Mapped input by name
    pub fn input(&self, name: &str) -> Option<&Value> {
        self.inputs.get(name)
    }

    /// Config field by name
    pub fn config_value(&self, name: &str) -> Option<&Value> {
        self.config.get(name)
    }

    /// Mapped input first, then config field
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.input(name).or_else(|| self.config_value(name))
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.as_str())
    }

    /// Serialized form recorded on the step for audit/replay
    pub fn to_value(&self) -> Value {
        let mut record = Map::new();
        record.insert("config".to_string(), self.config.clone());
        record.insert("inputs".to_string(), Value::Object(self.inputs.clone()));
        Value::Object(record)
    }
}
