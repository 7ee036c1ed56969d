//! Plugin registry
//!
//! Maps step type tags to handlers. Registration is explicit: every handler
//! the application uses is registered at startup or later through the
//! runtime API. A step can only run when its type tag has an active
//! registration.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::handler::{HandlerMeta, StepHandler};

/// Why a type tag could not be resolved to a runnable handler
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("no handler registered for step type '{0}'")]
    NotFound(String),
    #[error("handler for step type '{0}' is inactive")]
    Inactive(String),
}

/// Registration record for one type tag
#[derive(Clone)]
pub struct Registration {
    pub handler: Arc<dyn StepHandler>,
    pub meta: HandlerMeta,
    pub active: bool,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("meta", &self.meta)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

/// Handler registry for looking up handlers by type tag
#[derive(Default)]
pub struct PluginRegistry {
    handlers: HashMap<String, Registration>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its own type tag, active.
    ///
    /// Re-registering a tag replaces the previous handler. Returns whether
    /// a registration was replaced.
    pub fn register(&mut self, handler: Arc<dyn StepHandler>) -> bool {
        let type_tag = handler.type_tag().to_string();
        self.register_as(type_tag, handler)
    }

    /// Register a handler under an explicit type tag, active.
    pub fn register_as(&mut self, type_tag: impl Into<String>, handler: Arc<dyn StepHandler>) -> bool {
        let meta = handler.metadata();
        self.register_with(type_tag, handler, meta, true)
    }

    /// Register with explicit metadata and activation flag.
    pub fn register_with(
        &mut self,
        type_tag: impl Into<String>,
        handler: Arc<dyn StepHandler>,
        mut meta: HandlerMeta,
        active: bool,
    ) -> bool {
        let type_tag = type_tag.into();
        meta.type_tag = type_tag.clone();
        let replaced = self
            .handlers
            .insert(
                type_tag.clone(),
                Registration {
                    handler,
                    meta,
                    active,
                },
            )
            .is_some();
        if replaced {
            tracing::debug!(type_tag = %type_tag, "handler registration replaced");
        }
        replaced
    }

    /// Remove a registration entirely
    pub fn unregister(&mut self, type_tag: &str) -> bool {
        self.handlers.remove(type_tag).is_some()
    }

    /// Mark a registered handler active. Returns false for unknown tags.
    pub fn activate(&mut self, type_tag: &str) -> bool {
        self.set_active(type_tag, true)
    }

    /// Mark a registered handler inactive. Returns false for unknown tags.
    pub fn deactivate(&mut self, type_tag: &str) -> bool {
        self.set_active(type_tag, false)
    }

    fn set_active(&mut self, type_tag: &str, active: bool) -> bool {
        match self.handlers.get_mut(type_tag) {
            Some(registration) => {
                registration.active = active;
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self, type_tag: &str) -> bool {
        self.handlers.contains_key(type_tag)
    }

    pub fn is_active(&self, type_tag: &str) -> bool {
        self.handlers
            .get(type_tag)
            .map(|r| r.active)
            .unwrap_or(false)
    }

    /// Resolve a type tag to its active registration
    pub fn resolve(&self, type_tag: &str) -> Result<Registration, ResolveError> {
        match self.handlers.get(type_tag) {
            Some(registration) if registration.active => Ok(registration.clone()),
            Some(_) => Err(ResolveError::Inactive(type_tag.to_string())),
            None => Err(ResolveError::NotFound(type_tag.to_string())),
        }
    }

    /// Get a registration regardless of its activation flag
    pub fn get(&self, type_tag: &str) -> Option<&Registration> {
        self.handlers.get(type_tag)
    }

    /// All registered type tags, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// All registrations, sorted by type tag
    pub fn registrations(&self) -> Vec<Registration> {
        let mut all: Vec<Registration> = self.handlers.values().cloned().collect();
        all.sort_by(|a, b| a.meta.type_tag.cmp(&b.meta.type_tag));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{StepContext, StepInput, StepResult};
    use async_trait::async_trait;
    use serde_json::json;

    struct NamedHandler(&'static str, &'static str);

    #[async_trait]
    impl StepHandler for NamedHandler {
        fn type_tag(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            self.1
        }

        async fn execute(&self, _input: StepInput, _ctx: StepContext) -> StepResult {
            StepResult::completed_with_one("from", json!(self.1))
        }
    }

    #[test]
    fn test_register_last_write_wins() {
        let mut registry = PluginRegistry::new();
        assert!(!registry.register(Arc::new(NamedHandler("echo", "first"))));
        assert!(registry.register(Arc::new(NamedHandler("echo", "second"))));

        let resolved = registry.resolve("echo").expect("resolve");
        assert_eq!(resolved.meta.description, "second");
        assert_eq!(registry.names(), vec!["echo".to_string()]);
    }

    #[test]
    fn test_resolve_reports_not_found_and_inactive() {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(NamedHandler("echo", "")));

        assert_eq!(
            registry.resolve("nonexistent").err(),
            Some(ResolveError::NotFound("nonexistent".to_string()))
        );

        assert!(registry.deactivate("echo"));
        assert!(!registry.is_active("echo"));
        assert_eq!(
            registry.resolve("echo").err(),
            Some(ResolveError::Inactive("echo".to_string()))
        );

        assert!(registry.activate("echo"));
        assert!(registry.resolve("echo").is_ok());
        assert!(!registry.activate("missing"));
    }

    #[test]
    fn test_register_as_overrides_meta_type_tag() {
        let mut registry = PluginRegistry::new();
        registry.register_as("greet", Arc::new(NamedHandler("echo", "alias")));
        let resolved = registry.resolve("greet").expect("resolve");
        assert_eq!(resolved.meta.type_tag, "greet");
        assert!(!registry.is_registered("echo"));
    }
}
