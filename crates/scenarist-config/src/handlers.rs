use serde::Deserialize;
use serde_json::Value;

/// Handlers config root
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HandlersConfig {
    #[serde(default)]
    pub handlers: Vec<HandlerSpec>,
}

impl HandlersConfig {
    pub fn get(&self, name: &str) -> Option<&HandlerSpec> {
        self.handlers.iter().find(|h| h.name == name)
    }
}

/// Single handler registration from config.
///
/// `name` is the step type tag the handler is registered under; `kind`
/// selects the built-in implementation.
#[derive(Debug, Clone, Deserialize)]
pub struct HandlerSpec {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Default config merged under every step of this type
    #[serde(default)]
    pub config: Value,
}

fn default_active() -> bool {
    true
}

impl HandlerSpec {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            description: None,
            active: true,
            config: Value::Null,
        }
    }

    pub fn description_or(&self, fallback: &str) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| fallback.to_string())
    }
}
