use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use scenarist_config::{HandlerSpec, HandlersConfig};
use scenarist_core::handler::{
    ChatMessage, HandlerMeta, StepContext, StepHandler, StepInput, StepResult,
};
use scenarist_core::registry::PluginRegistry;
use scenarist_core::store::Scope;
use scenarist_core::types::Step;

use crate::builtin::build_builtin_handler;

/// Handler factory errors
#[derive(Debug, Error)]
pub enum HandlerBuildError {
    #[error("unknown handler kind '{kind}' for '{name}'")]
    UnknownKind { name: String, kind: String },
}

/// Handler factory trait
pub trait HandlerFactory: Send + Sync {
    fn build(&self, spec: &HandlerSpec) -> Result<Arc<dyn StepHandler>, HandlerBuildError>;
}

/// Default factory for built-in handlers
pub struct DefaultHandlerFactory;

impl DefaultHandlerFactory {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DefaultHandlerFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerFactory for DefaultHandlerFactory {
    fn build(&self, spec: &HandlerSpec) -> Result<Arc<dyn StepHandler>, HandlerBuildError> {
        match build_builtin_handler(spec) {
            Some(handler) => {
                let handler: Arc<dyn StepHandler> = Arc::from(handler);
                Ok(Arc::new(ConfiguredHandler::new(handler, spec)))
            }
            None => Err(HandlerBuildError::UnknownKind {
                name: spec.name.clone(),
                kind: spec.kind.clone(),
            }),
        }
    }
}

/// Build every spec and register it under its name, honouring `active`.
///
/// Returns the number of registrations made.
pub fn register_handlers(
    registry: &mut PluginRegistry,
    config: &HandlersConfig,
    factory: &dyn HandlerFactory,
) -> Result<usize, HandlerBuildError> {
    for spec in &config.handlers {
        let handler = factory.build(spec)?;
        let meta = handler.metadata();
        registry.register_with(spec.name.clone(), handler, meta, spec.active);
        tracing::debug!(name = %spec.name, kind = %spec.kind, active = spec.active, "handler registered");
    }
    Ok(config.handlers.len())
}

/// Wraps a built handler with the metadata its config spec declares.
struct ConfiguredHandler {
    inner: Arc<dyn StepHandler>,
    metadata: HandlerMeta,
}

impl ConfiguredHandler {
    fn new(inner: Arc<dyn StepHandler>, spec: &HandlerSpec) -> Self {
        let metadata = merge_handler_metadata(inner.metadata(), spec);
        Self { inner, metadata }
    }
}

#[async_trait]
impl StepHandler for ConfiguredHandler {
    fn type_tag(&self) -> &str {
        self.inner.type_tag()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn metadata(&self) -> HandlerMeta {
        self.metadata.clone()
    }

    fn validate(&self, config: &Value) -> Result<(), String> {
        self.inner.validate(config)
    }

    fn transform_step(&self, step: &Step) -> Step {
        self.inner.transform_step(step)
    }

    fn generate_messages(&self, input: &StepInput, scope: &Scope) -> Vec<ChatMessage> {
        self.inner.generate_messages(input, scope)
    }

    async fn execute(&self, input: StepInput, ctx: StepContext) -> StepResult {
        self.inner.execute(input, ctx).await
    }
}

/// Spec config keys are laid over the handler's own defaults.
fn merge_handler_metadata(base: HandlerMeta, spec: &HandlerSpec) -> HandlerMeta {
    let mut merged = base.with_name(spec.name.clone());
    merged.type_tag = spec.name.clone();
    match (&mut merged.default_config, &spec.config) {
        (_, Value::Null) => {}
        (Value::Object(defaults), Value::Object(overrides)) => {
            for (key, value) in overrides {
                defaults.insert(key.clone(), value.clone());
            }
        }
        (defaults, overrides) => *defaults = overrides.clone(),
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_handler_metadata_lays_spec_config_over_defaults() {
        let base = HandlerMeta::new("user_input", "asks")
            .interactive()
            .with_default_config(json!({"prompt": "Your input", "placeholder": ""}));
        let mut spec = HandlerSpec::new("ask_name", "user_input");
        spec.config = json!({"prompt": "Name?"});

        let merged = merge_handler_metadata(base, &spec);
        assert_eq!(merged.type_tag, "ask_name");
        assert_eq!(merged.name, "ask_name");
        assert!(merged.interactive);
        assert_eq!(
            merged.default_config,
            json!({"prompt": "Name?", "placeholder": ""})
        );
    }

    #[test]
    fn test_register_handlers_honours_active_flag() {
        let mut echo = HandlerSpec::new("say", "echo");
        echo.description = Some("says things".to_string());
        let mut hidden = HandlerSpec::new("later", "template");
        hidden.active = false;
        let config = HandlersConfig {
            handlers: vec![echo, hidden],
        };

        let mut registry = PluginRegistry::new();
        let count = register_handlers(&mut registry, &config, &DefaultHandlerFactory::new())
            .expect("register");
        assert_eq!(count, 2);
        assert_eq!(registry.names(), vec!["later".to_string(), "say".to_string()]);
        assert!(registry.is_active("say"));
        assert!(!registry.is_active("later"));
        let say = registry.resolve("say").expect("resolve");
        assert_eq!(say.meta.description, "says things");
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let config = HandlersConfig {
            handlers: vec![HandlerSpec::new("run", "shell")],
        };
        let mut registry = PluginRegistry::new();
        let err = register_handlers(&mut registry, &config, &DefaultHandlerFactory::new())
            .expect_err("unknown kind");
        assert!(matches!(err, HandlerBuildError::UnknownKind { kind, .. } if kind == "shell"));
        assert!(registry.names().is_empty());
    }
}
