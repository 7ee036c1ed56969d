//! Bootstrap helpers for starting Scenarist from a single YAML config.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use thiserror::Error;

use scenarist_config::{
    load_config, ConfigError, HandlersConfig, ObservabilityConfig, ScenaristConfig,
};
use scenarist_core::engine::{EngineConfig, EngineContext, SequenceEngine};
use scenarist_core::registry::PluginRegistry;
use scenarist_core::types::Workspace;
use scenarist_handlers::{
    builtin_specs, register_handlers, DefaultHandlerFactory, HandlerBuildError,
};

use crate::hooks::{HookProgressReporter, HookRegistry};
use crate::runtime::{Runtime, RuntimeError};

/// Workspace created when the config declares none.
pub const DEFAULT_WORKSPACE_ID: &str = "default";

/// Runtime bootstrap errors.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("handler build error: {0}")]
    Handler(#[from] HandlerBuildError),
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

static TRACING_INIT: OnceLock<()> = OnceLock::new();

impl Runtime {
    /// Create a runtime from a single `scenarist.yaml`, initialising tracing.
    pub async fn from_config_path(path: impl AsRef<Path>) -> Result<Self, BootstrapError> {
        let config = load_config(path.as_ref())?;
        init_tracing_if_needed(&config.observability);
        Self::from_config(&config).await
    }

    /// Create a runtime from an already loaded config.
    pub async fn from_config(config: &ScenaristConfig) -> Result<Self, BootstrapError> {
        Self::from_config_with_hooks(config, Arc::new(HookRegistry::new())).await
    }

    /// Create a runtime and inject a hook registry.
    ///
    /// Without configured handlers every built-in kind is registered under
    /// its kind name. The first declared workspace is selected.
    pub async fn from_config_with_hooks(
        config: &ScenaristConfig,
        hooks: Arc<HookRegistry>,
    ) -> Result<Self, BootstrapError> {
        let handlers = if config.handlers.handlers.is_empty() {
            HandlersConfig {
                handlers: builtin_specs(),
            }
        } else {
            config.handlers.clone()
        };
        let mut registry = PluginRegistry::new();
        let registered = register_handlers(&mut registry, &handlers, &DefaultHandlerFactory::new())?;

        let engine_config = EngineConfig {
            interactive_types: config.engine.interactive_types.clone(),
            max_steps_per_run: config.engine.max_steps_per_run,
        };
        let engine = SequenceEngine::builder(EngineContext::in_memory(registry))
            .config(engine_config)
            .progress_reporter(Arc::new(HookProgressReporter::new(hooks.clone())))
            .build();

        let runtime = Runtime::new(engine, hooks);
        let workspaces: Vec<Workspace> = if config.workspaces.is_empty() {
            vec![Workspace::new(DEFAULT_WORKSPACE_ID)]
        } else {
            config
                .workspaces
                .iter()
                .map(|spec| {
                    Workspace::new(spec.id.clone())
                        .with_name(spec.name_or_id())
                        .with_initial_context(spec.initial_context.clone())
                })
                .collect()
        };
        let first = workspaces
            .first()
            .map(|w| w.id.clone())
            .unwrap_or_else(|| DEFAULT_WORKSPACE_ID.to_string());
        for workspace in workspaces {
            runtime.add_workspace(workspace).await;
        }
        runtime.select_workspace(&first).await?;

        tracing::info!(
            app = %config.app.name,
            environment = %config.app.environment,
            handlers = registered,
            workspaces = config.workspaces.len().max(1),
            workspace = %first,
            "scenarist runtime ready"
        );
        Ok(runtime)
    }
}

fn init_tracing_if_needed(observability: &ObservabilityConfig) {
    TRACING_INIT.get_or_init(|| {
        let log_file_path = std::env::var("SCENARIST_LOG_FILE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| observability.log_file.clone());
        let file_writer = log_file_path.as_deref().and_then(create_log_writer);
        let fallback_level = match observability.log_level.trim().to_ascii_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" => "warn",
            "error" => "error",
            _ => "info",
        };

        let make_filter = || {
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(fallback_level))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        };

        match file_writer {
            Some(writer) => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(make_filter())
                    .with_target(true)
                    .with_ansi(false)
                    .with_writer(writer)
                    .try_init();
            }
            None => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(make_filter())
                    .with_target(true)
                    .with_writer(std::io::stderr)
                    .try_init();
            }
        }

        tracing::info!(
            log_level = %observability.log_level,
            log_file = log_file_path.as_deref().unwrap_or("(stderr)"),
            "tracing initialized"
        );
    });
}

fn create_log_writer(path: &str) -> Option<SharedFileMakeWriter> {
    use std::fs::{create_dir_all, OpenOptions};

    let file_path = Path::new(path);
    if let Some(parent) = file_path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(err) = create_dir_all(parent) {
                eprintln!(
                    "failed to create log directory '{}': {}",
                    parent.display(),
                    err
                );
                return None;
            }
        }
    }
    let file = match OpenOptions::new().create(true).append(true).open(file_path) {
        Ok(f) => f,
        Err(err) => {
            eprintln!("failed to open log file '{}': {}", file_path.display(), err);
            return None;
        }
    };
    Some(SharedFileMakeWriter::new(file))
}

#[derive(Clone)]
struct SharedFileMakeWriter {
    file: Arc<std::sync::Mutex<std::fs::File>>,
}

impl SharedFileMakeWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: Arc::new(std::sync::Mutex::new(file)),
        }
    }
}

struct SharedFileWriter {
    file: Arc<std::sync::Mutex<std::fs::File>>,
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedFileMakeWriter {
    type Writer = SharedFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SharedFileWriter {
            file: self.file.clone(),
        }
    }
}

impl std::io::Write for SharedFileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| std::io::Error::other("log file mutex poisoned"))?;
        std::io::Write::write(&mut *file, buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| std::io::Error::other("log file mutex poisoned"))?;
        std::io::Write::flush(&mut *file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenarist_config::parse_config;
    use serde_json::json;
    use std::io::Write;

    #[tokio::test]
    async fn test_builtins_registered_without_handler_config() {
        let runtime = Runtime::from_config(&ScenaristConfig::default())
            .await
            .expect("runtime");
        let tags: Vec<String> = runtime
            .list_handlers()
            .await
            .into_iter()
            .map(|h| h.type_tag)
            .collect();
        assert_eq!(
            tags,
            vec!["echo", "llm_prompt", "set_value", "template", "user_input"]
        );
        assert_eq!(
            runtime.current_workspace().await.as_deref(),
            Some(DEFAULT_WORKSPACE_ID)
        );
    }

    #[tokio::test]
    async fn test_configured_handlers_and_workspaces() {
        let config = parse_config(
            r#"
handlers:
  handlers:
    - { name: say, kind: echo }
    - { name: ask, kind: user_input, active: false }
workspaces:
  - id: ws1
    initial_context: { user: { name: Ada } }
  - id: ws2
"#,
        )
        .expect("config");
        let runtime = Runtime::from_config(&config).await.expect("runtime");

        let handlers = runtime.list_handlers().await;
        assert_eq!(handlers.len(), 2);
        assert!(handlers.iter().any(|h| h.type_tag == "ask" && !h.active && h.interactive));
        assert_eq!(runtime.current_workspace().await.as_deref(), Some("ws1"));
        assert_eq!(
            runtime.get_scope_value("ws1", "user", Some("name")).await,
            Some(json!("Ada"))
        );
        assert_eq!(runtime.workspaces().await.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_handler_kind_fails_bootstrap() {
        let config = parse_config("handlers: { handlers: [ { name: run, kind: shell } ] }")
            .expect("config");
        let err = Runtime::from_config(&config).await.err().expect("error");
        assert!(matches!(err, BootstrapError::Handler(_)));
    }

    #[tokio::test]
    async fn test_from_config_path_reports_missing_file() {
        let err = Runtime::from_config_path("/nonexistent/scenarist.yaml")
            .await
            .err()
            .expect("error");
        assert!(matches!(err, BootstrapError::Config(ConfigError::Io(_))));
    }

    #[test]
    fn test_log_writer_creates_parent_directories() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("logs").join("scenarist.log");
        let writer = create_log_writer(path.to_str().expect("utf8 path")).expect("writer");
        let mut file = tracing_subscriber::fmt::MakeWriter::make_writer(&writer);
        file.write_all(b"hello\n").expect("write");
        file.flush().expect("flush");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "hello\n");
    }
}
