//! ScopeStore - per-workspace nested key-value documents

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::path;
use crate::types::{ScopeId, Workspace};

/// One scope: independent top-level keys holding arbitrary JSON values.
pub type Scope = Map<String, Value>;

/// Owns every activated scope, addressed by `ScopeId`.
///
/// Reads on a scope that was never activated return `None`; writes to it are
/// no-ops that return `false`. Writes to the same scope are serialized by a
/// per-scope lock, so independent scopes never contend.
#[derive(Debug, Default)]
pub struct ScopeStore {
    scopes: RwLock<HashMap<ScopeId, Arc<RwLock<Scope>>>>,
    current: RwLock<Option<ScopeId>>,
}

impl ScopeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate a scope, seeding it from `initial_context` the first time.
    ///
    /// An existing scope is reused untouched. The scope becomes current.
    /// Returns whether a new scope was seeded.
    pub async fn activate(&self, scope_id: &str, initial_context: &Value) -> bool {
        let seeded = {
            let mut scopes = self.scopes.write().await;
            if scopes.contains_key(scope_id) {
                false
            } else {
                let seed = match initial_context {
                    Value::Object(map) => map.clone(),
                    Value::Null => Map::new(),
                    other => {
                        tracing::warn!(
                            scope_id = %scope_id,
                            kind = %json_kind(other),
                            "initial context is not an object; scope starts empty"
                        );
                        Map::new()
                    }
                };
                scopes.insert(scope_id.to_string(), Arc::new(RwLock::new(seed)));
                true
            }
        };
        *self.current.write().await = Some(scope_id.to_string());
        tracing::debug!(scope_id = %scope_id, seeded, "scope activated");
        seeded
    }

    /// Activate the scope owned by `workspace`.
    pub async fn activate_workspace(&self, workspace: &Workspace) -> bool {
        self.activate(&workspace.scope_id(), &workspace.initial_context)
            .await
    }

    /// Stop treating `scope_id` as current. Its data is kept for reuse.
    pub async fn deactivate(&self, scope_id: &str) -> bool {
        let mut current = self.current.write().await;
        if current.as_deref() == Some(scope_id) {
            *current = None;
            true
        } else {
            false
        }
    }

    /// Drop a scope and its data.
    pub async fn discard(&self, scope_id: &str) -> bool {
        let removed = self.scopes.write().await.remove(scope_id).is_some();
        if removed {
            self.deactivate(scope_id).await;
        }
        removed
    }

    /// Currently selected scope, if any
    pub async fn current(&self) -> Option<ScopeId> {
        self.current.read().await.clone()
    }

    /// Whether the scope has been activated
    pub async fn contains(&self, scope_id: &str) -> bool {
        self.scopes.read().await.contains_key(scope_id)
    }

    async fn scope(&self, scope_id: &str) -> Option<Arc<RwLock<Scope>>> {
        self.scopes.read().await.get(scope_id).cloned()
    }

    /// Read the value at `key`, or nested under it at the dotted `path`.
    pub async fn get_path(&self, scope_id: &str, key: &str, path: Option<&str>) -> Option<Value> {
        let scope = self.scope(scope_id).await?;
        let scope = scope.read().await;
        let value = scope.get(key)?;
        match path {
            Some(path) if !path.is_empty() => path::get_path(value, path).cloned(),
            _ => Some(value.clone()),
        }
    }

    /// Read a full `key.path` expression.
    pub async fn get(&self, scope_id: &str, full_path: &str) -> Option<Value> {
        let (key, path) = path::split_scope_path(full_path);
        self.get_path(scope_id, key, path).await
    }

    /// Replace the whole value stored at `key`.
    pub async fn set_key(&self, scope_id: &str, key: &str, value: Value) -> bool {
        let Some(scope) = self.scope(scope_id).await else {
            tracing::debug!(scope_id = %scope_id, key = %key, "write to inactive scope ignored");
            return false;
        };
        scope.write().await.insert(key.to_string(), value);
        true
    }

    /// Write `value` at the dotted `path` under `key`.
    ///
    /// Only the addressed chain is touched; siblings keep their values.
    /// Non-object intermediates are overwritten with empty objects and
    /// reported at warn level.
    pub async fn set_path(&self, scope_id: &str, key: &str, path: &str, value: Value) -> bool {
        if path.is_empty() {
            return self.set_key(scope_id, key, value).await;
        }
        let Some(scope) = self.scope(scope_id).await else {
            tracing::debug!(
                scope_id = %scope_id,
                key = %key,
                path = %path,
                "write to inactive scope ignored"
            );
            return false;
        };
        let mut scope = scope.write().await;
        let root = scope
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        for location in path::set_path(root, path, value) {
            let overwritten = if location.is_empty() {
                key.to_string()
            } else {
                format!("{}.{}", key, location)
            };
            tracing::warn!(
                scope_id = %scope_id,
                key = %key,
                path = %path,
                overwritten = %overwritten,
                "non-object value replaced by an object while writing scope path"
            );
        }
        true
    }

    /// Write a full `key.path` expression.
    pub async fn set(&self, scope_id: &str, full_path: &str, value: Value) -> bool {
        let (key, path) = path::split_scope_path(full_path);
        match path {
            Some(path) => self.set_path(scope_id, key, path, value).await,
            None => self.set_key(scope_id, key, value).await,
        }
    }

    /// Remove a top-level key.
    pub async fn remove(&self, scope_id: &str, key: &str) -> Option<Value> {
        let scope = self.scope(scope_id).await?;
        let removed = scope.write().await.remove(key);
        removed
    }

    /// Clone the whole scope for pure consumers (template rendering, handlers).
    pub async fn snapshot(&self, scope_id: &str) -> Option<Scope> {
        let scope = self.scope(scope_id).await?;
        let snapshot = scope.read().await.clone();
        Some(snapshot)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
