//! # Scenarist Config
//!
//! Single-file configuration for Scenarist.
//! One `scenarist.yaml` configures the engine, the handler registrations,
//! the workspaces and their initial context, and observability settings.

mod handlers;
mod loader;

pub use handlers::{HandlerSpec, HandlersConfig};
pub use loader::{load_config, load_handlers_config, parse_config, ConfigError};

use serde::Deserialize;
use serde_json::Value;

/// Top-level configuration schema for Scenarist.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenaristConfig {
    /// Config schema version.
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub handlers: HandlersConfig,
    #[serde(default)]
    pub workspaces: Vec<WorkspaceSpec>,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for ScenaristConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            app: AppConfig::default(),
            engine: EngineSettings::default(),
            handlers: HandlersConfig::default(),
            workspaces: Vec::new(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ScenaristConfig {
    pub fn handlers(&self) -> &HandlersConfig {
        &self.handlers
    }

    pub fn workspace(&self, id: &str) -> Option<&WorkspaceSpec> {
        self.workspaces.iter().find(|w| w.id == id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub environment: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            environment: default_env(),
        }
    }
}

fn default_app_name() -> String {
    "scenarist".to_string()
}

fn default_env() -> String {
    "development".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    /// Step types whose completion is always driven from outside.
    #[serde(default)]
    pub interactive_types: Vec<String>,
    /// Steps one run may execute before yielding.
    #[serde(default = "default_max_steps_per_run")]
    pub max_steps_per_run: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            interactive_types: Vec::new(),
            max_steps_per_run: default_max_steps_per_run(),
        }
    }
}

fn default_max_steps_per_run() -> usize {
    1000
}

/// A workspace owns one scope, seeded from `initial_context` on first use.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceSpec {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub initial_context: Value,
}

impl WorkspaceSpec {
    pub fn name_or_id(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_file: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
