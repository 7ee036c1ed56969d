//! Runtime facade: workspace selection plus the sequence, scope and handler
//! operations exposed to a UI or CLI layer.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;

use scenarist_core::bridge::ResumeHandle;
use scenarist_core::engine::{CursorMove, EngineError, RunOutcome, SequenceEngine};
use scenarist_core::handler::{ChatMessage, StepHandler, StepOutputs};
use scenarist_core::store::Scope;
use scenarist_core::template;
use scenarist_core::types::{
    ScopeId, Sequence, SequenceId, SequenceKind, Step, StepId, StepPatch, Workspace, WorkspaceId,
};

use crate::hooks::HookRegistry;

/// Runtime facade errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("workspace '{0}' not found")]
    UnknownWorkspace(String),
    #[error("no workspace selected")]
    NoWorkspaceSelected,
    #[error("no sequence selected")]
    NoSequenceSelected,
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Registration summary for listing.
#[derive(Debug, Clone, Serialize)]
pub struct HandlerSummary {
    pub type_tag: String,
    pub name: String,
    pub description: String,
    pub active: bool,
    pub interactive: bool,
    pub outputs: Vec<String>,
}

/// Process-level runtime around one [`SequenceEngine`].
///
/// Holds the known workspaces and the current workspace and sequence
/// selection. Operations without an explicit sequence id act on the
/// current sequence.
pub struct Runtime {
    engine: SequenceEngine,
    hooks: Arc<HookRegistry>,
    workspaces: RwLock<HashMap<WorkspaceId, Workspace>>,
    current_workspace: RwLock<Option<WorkspaceId>>,
    current_sequence: RwLock<Option<SequenceId>>,
}

impl Runtime {
    pub fn new(engine: SequenceEngine, hooks: Arc<HookRegistry>) -> Self {
        Self {
            engine,
            hooks,
            workspaces: RwLock::new(HashMap::new()),
            current_workspace: RwLock::new(None),
            current_sequence: RwLock::new(None),
        }
    }

    pub fn engine(&self) -> &SequenceEngine {
        &self.engine
    }

    pub fn hooks(&self) -> Arc<HookRegistry> {
        self.hooks.clone()
    }

    // ---- workspaces ----

    /// Declare a workspace. Returns whether an existing declaration was replaced.
    pub async fn add_workspace(&self, workspace: Workspace) -> bool {
        self.workspaces
            .write()
            .await
            .insert(workspace.id.clone(), workspace)
            .is_some()
    }

    /// Declared workspaces, sorted by id
    pub async fn workspaces(&self) -> Vec<Workspace> {
        let mut all: Vec<Workspace> = self.workspaces.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Make `workspace_id` current and activate its scope.
    ///
    /// The scope is seeded from the initial context the first time only;
    /// switching away and back reuses it as-is. Returns whether it was seeded.
    pub async fn select_workspace(&self, workspace_id: &str) -> Result<bool, RuntimeError> {
        let workspace = self
            .workspaces
            .read()
            .await
            .get(workspace_id)
            .cloned()
            .ok_or_else(|| RuntimeError::UnknownWorkspace(workspace_id.to_string()))?;

        let previous = self.current_workspace.read().await.clone();
        if previous.as_deref() != Some(workspace_id) {
            self.deselect_workspace().await;
        }
        let seeded = self.engine.context().scopes.activate_workspace(&workspace).await;
        *self.current_workspace.write().await = Some(workspace.id.clone());
        tracing::info!(workspace_id = %workspace.id, seeded, "workspace selected");
        Ok(seeded)
    }

    /// Leave the current workspace and close its sequence. The scope is kept
    /// for later reuse.
    pub async fn deselect_workspace(&self) -> Option<WorkspaceId> {
        let previous = self.current_workspace.write().await.take();
        if let Some(workspace_id) = &previous {
            self.close_sequence().await;
            self.engine.context().scopes.deactivate(workspace_id).await;
            tracing::debug!(workspace_id = %workspace_id, "workspace deselected");
        }
        previous
    }

    pub async fn current_workspace(&self) -> Option<WorkspaceId> {
        self.current_workspace.read().await.clone()
    }

    /// Scope id of the current workspace
    pub async fn current_scope(&self) -> Result<ScopeId, RuntimeError> {
        let workspace_id = self
            .current_workspace()
            .await
            .ok_or(RuntimeError::NoWorkspaceSelected)?;
        let workspaces = self.workspaces.read().await;
        workspaces
            .get(&workspace_id)
            .map(|w| w.scope_id())
            .ok_or(RuntimeError::UnknownWorkspace(workspace_id))
    }

    // ---- sequences ----

    /// Create a sequence bound to the current workspace's scope.
    pub async fn create_sequence(
        &self,
        sequence_id: &str,
        kind: SequenceKind,
        name: &str,
        steps: Vec<Step>,
    ) -> Result<Sequence, RuntimeError> {
        let scope_id = self.current_scope().await?;
        let sequence = Sequence::new(sequence_id, kind, name, scope_id).with_steps(steps);
        Ok(self.engine.create_sequence(sequence).await?)
    }

    /// Make `sequence_id` the current sequence without running it.
    ///
    /// A different sequence left behind has its running step abandoned.
    pub async fn open_sequence(&self, sequence_id: &str) -> Result<Sequence, RuntimeError> {
        let sequence = self.engine.get_sequence(sequence_id).await?;
        if self.current_sequence().await.as_deref() != Some(sequence_id) {
            self.close_sequence().await;
        }
        *self.current_sequence.write().await = Some(sequence.id.clone());
        Ok(sequence)
    }

    /// Clear the current sequence, abandoning its running step.
    pub async fn close_sequence(&self) -> Option<SequenceId> {
        let previous = self.current_sequence.write().await.take();
        if let Some(sequence_id) = &previous {
            match self.engine.abandon(sequence_id).await {
                Ok(abandoned) => {
                    tracing::debug!(sequence_id = %sequence_id, abandoned, "sequence closed")
                }
                Err(err) => {
                    tracing::debug!(sequence_id = %sequence_id, error = %err, "sequence closed")
                }
            }
        }
        previous
    }

    pub async fn current_sequence(&self) -> Option<SequenceId> {
        self.current_sequence.read().await.clone()
    }

    /// Current state of the current sequence
    pub async fn sequence(&self) -> Result<Sequence, RuntimeError> {
        let sequence_id = self.require_sequence().await?;
        Ok(self.engine.get_sequence(&sequence_id).await?)
    }

    /// Open `sequence_id` and run it from its cursor.
    pub async fn start_sequence(&self, sequence_id: &str) -> Result<RunOutcome, RuntimeError> {
        self.open_sequence(sequence_id).await?;
        Ok(self.engine.run_sequence(sequence_id).await?)
    }

    /// Continue running the current sequence.
    pub async fn run(&self) -> Result<RunOutcome, RuntimeError> {
        let sequence_id = self.require_sequence().await?;
        Ok(self.engine.run_sequence(&sequence_id).await?)
    }

    pub async fn advance(&self) -> Result<RunOutcome, RuntimeError> {
        let sequence_id = self.require_sequence().await?;
        Ok(self.engine.advance(&sequence_id).await?)
    }

    /// Move back one step; at the first step the current sequence is closed
    /// and its running step abandoned.
    pub async fn retreat(&self) -> Result<CursorMove, RuntimeError> {
        let sequence_id = self.require_sequence().await?;
        let movement = self.engine.retreat(&sequence_id).await?;
        if movement == CursorMove::ExitSequence {
            *self.current_sequence.write().await = None;
        }
        Ok(movement)
    }

    pub async fn finish(&self) -> Result<RunOutcome, RuntimeError> {
        let sequence_id = self.require_sequence().await?;
        Ok(self.engine.finish(&sequence_id).await?)
    }

    pub async fn retry_step(&self) -> Result<RunOutcome, RuntimeError> {
        let sequence_id = self.require_sequence().await?;
        Ok(self.engine.retry_step(&sequence_id).await?)
    }

    pub async fn abandon(&self) -> Result<bool, RuntimeError> {
        let sequence_id = self.require_sequence().await?;
        Ok(self.engine.abandon(&sequence_id).await?)
    }

    pub async fn reset_sequence(&self) -> Result<Sequence, RuntimeError> {
        let sequence_id = self.require_sequence().await?;
        Ok(self.engine.reset_sequence(&sequence_id).await?)
    }

    /// Messages the current step would send to a model
    pub async fn preview_messages(&self) -> Result<Vec<ChatMessage>, RuntimeError> {
        let sequence_id = self.require_sequence().await?;
        Ok(self.engine.preview_messages(&sequence_id).await?)
    }

    async fn require_sequence(&self) -> Result<SequenceId, RuntimeError> {
        self.current_sequence()
            .await
            .ok_or(RuntimeError::NoSequenceSelected)
    }

    // ---- authoring ----

    pub async fn create_step(
        &self,
        sequence_id: &str,
        type_tag: &str,
        config: Value,
    ) -> Result<Step, RuntimeError> {
        Ok(self.engine.create_step(sequence_id, type_tag, config).await?)
    }

    pub async fn edit_step(&self, step_id: &StepId, patch: StepPatch) -> Result<Step, RuntimeError> {
        Ok(self.engine.edit_step(step_id, patch).await?)
    }

    pub async fn delete_step(&self, step_id: &StepId) -> Result<Step, RuntimeError> {
        Ok(self.engine.delete_step(step_id).await?)
    }

    pub async fn reorder_steps(
        &self,
        sequence_id: &str,
        ordered: &[StepId],
    ) -> Result<Sequence, RuntimeError> {
        Ok(self.engine.reorder_steps(sequence_id, ordered).await?)
    }

    // ---- scope ----

    pub async fn get_scope_value(
        &self,
        scope_id: &str,
        key: &str,
        path: Option<&str>,
    ) -> Option<Value> {
        self.engine.context().scopes.get_path(scope_id, key, path).await
    }

    /// Write a scope value. Returns false when the scope is not active.
    pub async fn set_scope_value(
        &self,
        scope_id: &str,
        key: &str,
        path: Option<&str>,
        value: Value,
    ) -> bool {
        let scopes = &self.engine.context().scopes;
        match path {
            Some(path) => scopes.set_path(scope_id, key, path, value).await,
            None => scopes.set_key(scope_id, key, value).await,
        }
    }

    /// Copy of a whole scope
    pub async fn scope_snapshot(&self, scope_id: &str) -> Option<Scope> {
        self.engine.context().scopes.snapshot(scope_id).await
    }

    /// Render `text` against a scope. An inactive scope renders as empty,
    /// leaving every placeholder verbatim.
    pub async fn render_template(&self, text: &str, scope_id: &str) -> String {
        let scope = self.scope_snapshot(scope_id).await.unwrap_or_default();
        template::render(text, &scope)
    }

    // ---- handlers ----

    /// Register (or replace) an active handler under `type_tag`.
    pub async fn register_handler(
        &self,
        type_tag: &str,
        handler: Arc<dyn StepHandler>,
    ) -> bool {
        let replaced = self
            .engine
            .context()
            .registry
            .write()
            .await
            .register_as(type_tag, handler);
        tracing::debug!(type_tag = %type_tag, replaced, "handler registered");
        replaced
    }

    pub async fn activate_handler(&self, type_tag: &str) -> bool {
        self.engine.context().registry.write().await.activate(type_tag)
    }

    pub async fn deactivate_handler(&self, type_tag: &str) -> bool {
        self.engine
            .context()
            .registry
            .write()
            .await
            .deactivate(type_tag)
    }

    /// Every registration, sorted by type tag
    pub async fn list_handlers(&self) -> Vec<HandlerSummary> {
        let registry = self.engine.context().registry.read().await;
        registry
            .registrations()
            .into_iter()
            .map(|registration| {
                let meta = registration.meta;
                let interactive =
                    meta.interactive || self.engine.config().is_interactive(&meta.type_tag);
                HandlerSummary {
                    type_tag: meta.type_tag,
                    name: meta.name,
                    description: meta.description,
                    active: registration.active,
                    interactive,
                    outputs: meta.outputs,
                }
            })
            .collect()
    }

    // ---- completion ----

    /// Complete a suspended step by id. Unknown or settled ids are ignored.
    pub async fn trigger_step_completion(&self, step_id: &StepId, outputs: StepOutputs) -> bool {
        self.engine.trigger_step_completion(step_id, outputs).await
    }

    /// Resume a suspension through its handle. `None` means the handle is stale.
    pub async fn resume(
        &self,
        handle: &ResumeHandle,
        outputs: StepOutputs,
    ) -> Result<Option<RunOutcome>, RuntimeError> {
        Ok(self.engine.resume(handle, outputs).await?)
    }
}
