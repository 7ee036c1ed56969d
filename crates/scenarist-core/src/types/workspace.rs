use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Type alias for Workspace ID
pub type WorkspaceId = String;

/// Scopes are addressed by the id of the workspace that owns them.
pub type ScopeId = String;

/// A workspace declares the initial context its scope is seeded from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    #[serde(default)]
    pub name: String,
    /// Plain nested object; `null` means start empty
    #[serde(default)]
    pub initial_context: Value,
}

impl Workspace {
    pub fn new(id: impl Into<WorkspaceId>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            initial_context: Value::Null,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_initial_context(mut self, initial_context: Value) -> Self {
        self.initial_context = initial_context;
        self
    }

    pub fn scope_id(&self) -> ScopeId {
        self.id.clone()
    }
}
