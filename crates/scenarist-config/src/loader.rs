//! Configuration loading and validation.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::{HandlersConfig, ScenaristConfig};

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Load full Scenarist configuration from YAML file.
pub fn load_config(path: &Path) -> Result<ScenaristConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from YAML text.
pub fn parse_config(content: &str) -> Result<ScenaristConfig, ConfigError> {
    let config: ScenaristConfig = if content.trim().is_empty() {
        ScenaristConfig::default()
    } else {
        serde_yaml::from_str(content)?
    };
    validate_config(&config)?;
    Ok(config)
}

/// Load only the handlers section from the unified config file.
pub fn load_handlers_config(path: &Path) -> Result<HandlersConfig, ConfigError> {
    let config = load_config(path)?;
    Ok(config.handlers)
}

fn validate_config(config: &ScenaristConfig) -> Result<(), ConfigError> {
    if config.version == 0 {
        return Err(ConfigError::Invalid(
            "version must be greater than 0".to_string(),
        ));
    }

    if config.app.name.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "app.name must not be empty".to_string(),
        ));
    }

    if config.engine.max_steps_per_run == 0 {
        return Err(ConfigError::Invalid(
            "engine.max_steps_per_run must be > 0".to_string(),
        ));
    }

    validate_handlers(&config.handlers)?;
    validate_workspaces(config)?;

    Ok(())
}

fn validate_handlers(config: &HandlersConfig) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for spec in &config.handlers {
        if spec.name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "handler name must not be empty".to_string(),
            ));
        }
        if spec.kind.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "handler '{}' kind must not be empty",
                spec.name
            )));
        }
        if !seen.insert(spec.name.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "handler '{}' is declared more than once",
                spec.name
            )));
        }
        if !spec.config.is_null() && !spec.config.is_object() {
            return Err(ConfigError::Invalid(format!(
                "handler '{}' config must be an object",
                spec.name
            )));
        }
    }
    Ok(())
}

fn validate_workspaces(config: &ScenaristConfig) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for workspace in &config.workspaces {
        if workspace.id.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "workspaces[].id must not be empty".to_string(),
            ));
        }
        if !seen.insert(workspace.id.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "workspace '{}' is declared more than once",
                workspace.id
            )));
        }
        if !workspace.initial_context.is_null() && !workspace.initial_context.is_object() {
            return Err(ConfigError::Invalid(format!(
                "workspace '{}' initial_context must be an object",
                workspace.id
            )));
        }
    }
    Ok(())
}
