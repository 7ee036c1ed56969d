//! Sequence engine
//!
//! Drives one sequence at a time through its ordered steps:
//! - resolves each step's handler through the PluginRegistry
//! - builds the step input from the scope (input mapping, default config,
//!   transform, validation, template rendering)
//! - writes outputs back to the scope through the output mapping
//! - suspends on interactive steps and resumes through the HandlerActionBridge
//!
//! Scenario playback and task execution are both plain sequences; the
//! engine does not distinguish them.

mod editing;
mod progress;

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use futures_util::future::BoxFuture;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

pub use progress::{
    ExecutionProgressEvent, ExecutionProgressReporter, PHASE_SEQUENCE_COMPLETED,
    PHASE_SEQUENCE_FAILED, PHASE_STEP_COMPLETED, PHASE_STEP_FAILED, PHASE_STEP_STARTED,
    PHASE_STEP_WAITING,
};

use crate::bridge::{HandlerActionBridge, ResumeFn, ResumeHandle, ResumeMode};
use crate::handler::{ChatMessage, StepContext, StepInput, StepOutputs, StepResult};
use crate::registry::{PluginRegistry, Registration};
use crate::store::{
    path, InMemorySequenceStore, Scope, ScopeStore, SequenceStore, StoreError,
};
use crate::template;
use crate::types::{Sequence, SequenceId, SequenceStatus, StepFailure, StepId, StepStatus};

const MAX_LOG_TEXT_CHARS: usize = 2_000;
const MAX_LOG_JSON_CHARS: usize = 8_000;
pub const DEFAULT_MAX_STEPS_PER_RUN: usize = 1_000;

fn truncate_for_log(input: &str, max_chars: usize) -> String {
    let char_count = input.chars().count();
    if char_count <= max_chars {
        return input.to_string();
    }
    let mut preview: String = input.chars().take(max_chars).collect();
    preview.push_str(&format!("... [truncated, total_chars={}]", char_count));
    preview
}

fn truncate_json_for_log(value: &Value, max_chars: usize) -> String {
    truncate_for_log(&value.to_string(), max_chars)
}

/// Engine errors. Step failures are recorded on the step, not returned here.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("sequence '{0}' not found")]
    SequenceNotFound(String),

    #[error("step '{0}' not found")]
    StepNotFound(String),

    #[error("scope '{0}' is not active")]
    ScopeNotActive(String),

    #[error("sequence '{0}' has no current step")]
    NoCurrentStep(String),

    #[error("cannot reorder sequence '{0}' while it is active")]
    ReorderWhileActive(String),

    #[error("invalid reorder: {0}")]
    InvalidReorder(String),

    #[error("invalid sequence: {0}")]
    InvalidSequence(String),

    #[error("step '{step_id}' cannot be prepared: {failure}")]
    Prepare {
        step_id: StepId,
        failure: StepFailure,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Engine tuning
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Step types whose completion always comes from outside, in addition to
    /// handlers that declare themselves interactive
    pub interactive_types: Vec<String>,
    /// Steps a single `run_sequence` call may execute before yielding
    pub max_steps_per_run: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interactive_types: Vec::new(),
            max_steps_per_run: DEFAULT_MAX_STEPS_PER_RUN,
        }
    }
}

impl EngineConfig {
    pub fn is_interactive(&self, type_tag: &str) -> bool {
        self.interactive_types.iter().any(|t| t == type_tag)
    }
}

/// Collaborators shared by every engine operation
#[derive(Clone)]
pub struct EngineContext {
    pub registry: Arc<RwLock<PluginRegistry>>,
    pub scopes: Arc<ScopeStore>,
    pub sequences: Arc<dyn SequenceStore>,
}

impl EngineContext {
    pub fn new(
        registry: Arc<RwLock<PluginRegistry>>,
        scopes: Arc<ScopeStore>,
        sequences: Arc<dyn SequenceStore>,
    ) -> Self {
        Self {
            registry,
            scopes,
            sequences,
        }
    }

    /// Context with fresh in-memory scope and sequence stores
    pub fn in_memory(registry: PluginRegistry) -> Self {
        Self::new(
            Arc::new(RwLock::new(registry)),
            Arc::new(ScopeStore::new()),
            Arc::new(InMemorySequenceStore::new()),
        )
    }
}

/// How an engine call left the sequence
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Every step completed, or the sequence was finished
    Completed,
    /// The current step completed and the cursor moved to `cursor`
    Advanced { cursor: usize },
    /// A step is running and waits for an external action
    Suspended {
        step_id: StepId,
        handle: ResumeHandle,
        prompt: Option<String>,
        input: StepInput,
    },
    /// A step failed; the sequence is in error
    Failed { step_id: StepId, error: StepFailure },
    /// The run used its step budget; run again to continue
    Yielded { cursor: usize },
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, RunOutcome::Suspended { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RunOutcome::Failed { .. })
    }

    pub fn handle(&self) -> Option<&ResumeHandle> {
        match self {
            RunOutcome::Suspended { handle, .. } => Some(handle),
            _ => None,
        }
    }
}

/// Result of moving the cursor backwards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorMove {
    Moved { cursor: usize },
    /// Already at the first step; the caller should leave the sequence
    ExitSequence,
}

enum StepOutcome {
    Completed,
    Suspended {
        handle: ResumeHandle,
        prompt: Option<String>,
        input: StepInput,
    },
    Failed(StepFailure),
}

struct PreparedStep {
    registration: Registration,
    input: StepInput,
    scope: Scope,
    interactive: bool,
}

struct EngineInner {
    ctx: EngineContext,
    config: EngineConfig,
    bridge: HandlerActionBridge,
    progress_reporter: Option<Arc<dyn ExecutionProgressReporter>>,
    locks: Mutex<HashMap<SequenceId, Arc<Mutex<()>>>>,
}

/// Sequence engine. Cheap to clone; clones share state.
///
/// Operations on the same sequence are serialized. Handlers and progress
/// reporters run while the sequence is locked and must not call back into
/// the engine for that sequence.
#[derive(Clone)]
pub struct SequenceEngine {
    inner: Arc<EngineInner>,
}

/// Builder for [`SequenceEngine`]
pub struct SequenceEngineBuilder {
    ctx: EngineContext,
    config: EngineConfig,
    progress_reporter: Option<Arc<dyn ExecutionProgressReporter>>,
}

impl SequenceEngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn progress_reporter(mut self, reporter: Arc<dyn ExecutionProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    pub fn build(self) -> SequenceEngine {
        SequenceEngine {
            inner: Arc::new(EngineInner {
                ctx: self.ctx,
                config: self.config,
                bridge: HandlerActionBridge::new(),
                progress_reporter: self.progress_reporter,
                locks: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl SequenceEngine {
    /// Engine with default config and no progress reporter
    pub fn new(ctx: EngineContext) -> Self {
        Self::builder(ctx).build()
    }

    pub fn builder(ctx: EngineContext) -> SequenceEngineBuilder {
        SequenceEngineBuilder {
            ctx,
            config: EngineConfig::default(),
            progress_reporter: None,
        }
    }

    pub fn context(&self) -> &EngineContext {
        &self.inner.ctx
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn bridge(&self) -> &HandlerActionBridge {
        &self.inner.bridge
    }

    /// Run from the cursor until the sequence completes, suspends, fails or
    /// uses up its step budget.
    ///
    /// Completed sequences are left alone. Completed steps are skipped; a
    /// step in error is executed again.
    pub async fn run_sequence(&self, sequence_id: &str) -> Result<RunOutcome, EngineError> {
        let lock = self.sequence_lock(sequence_id).await;
        let _guard = lock.lock().await;

        let mut sequence = self.load(sequence_id).await?;
        if sequence.status == SequenceStatus::Completed {
            tracing::debug!(sequence_id = %sequence_id, "sequence already completed");
            return Ok(RunOutcome::Completed);
        }
        self.ensure_scope(&sequence).await?;

        sequence.set_status(SequenceStatus::Active);
        tracing::info!(
            sequence_id = %sequence.id,
            kind = ?sequence.kind,
            cursor = sequence.cursor,
            steps = sequence.len(),
            "sequence run started"
        );
        self.run_loop(&mut sequence).await
    }

    /// Execute the current step once and move the cursor past it.
    ///
    /// A step that already completed is not executed again.
    pub async fn advance(&self, sequence_id: &str) -> Result<RunOutcome, EngineError> {
        let lock = self.sequence_lock(sequence_id).await;
        let _guard = lock.lock().await;

        let mut sequence = self.load(sequence_id).await?;
        if sequence.is_exhausted() {
            return self.complete_sequence(&mut sequence).await;
        }
        let index = sequence.cursor;
        if sequence.steps[index].status != StepStatus::Completed {
            self.ensure_scope(&sequence).await?;
            sequence.set_status(SequenceStatus::Active);
            match self.execute_current(&mut sequence, ResumeMode::Advance).await? {
                StepOutcome::Completed => {}
                StepOutcome::Suspended {
                    handle,
                    prompt,
                    input,
                } => return Ok(suspended(handle, prompt, input)),
                StepOutcome::Failed(error) => {
                    return self.fail_sequence(&mut sequence, index, error).await
                }
            }
        }
        sequence.cursor = index + 1;
        self.settle_after_advance(&mut sequence).await
    }

    /// Move the cursor back one step. Scope writes are kept.
    ///
    /// A running step left behind is abandoned: its pending resume is
    /// dropped and it goes back to pending. This also holds when retreating
    /// at the first step exits the sequence.
    pub async fn retreat(&self, sequence_id: &str) -> Result<CursorMove, EngineError> {
        let lock = self.sequence_lock(sequence_id).await;
        let _guard = lock.lock().await;

        let mut sequence = self.load(sequence_id).await?;
        let abandoned = self.abandon_current(&mut sequence).await;
        if sequence.cursor == 0 {
            if abandoned {
                self.persist(&sequence).await?;
            }
            tracing::debug!(sequence_id = %sequence_id, "retreat at first step; exit sequence");
            return Ok(CursorMove::ExitSequence);
        }
        sequence.cursor -= 1;
        sequence.touch();
        self.persist(&sequence).await?;
        tracing::debug!(sequence_id = %sequence_id, cursor = sequence.cursor, "cursor moved back");
        Ok(CursorMove::Moved {
            cursor: sequence.cursor,
        })
    }

    /// Execute only the current step, then end the sequence.
    ///
    /// On completion the sequence is completed with the cursor past the end
    /// and later steps untouched. A suspension ends the sequence once resumed.
    pub async fn finish(&self, sequence_id: &str) -> Result<RunOutcome, EngineError> {
        let lock = self.sequence_lock(sequence_id).await;
        let _guard = lock.lock().await;

        let mut sequence = self.load(sequence_id).await?;
        let current_done = sequence
            .current_step()
            .map(|s| s.status == StepStatus::Completed)
            .unwrap_or(true);
        if current_done {
            return self.complete_sequence(&mut sequence).await;
        }
        self.ensure_scope(&sequence).await?;
        sequence.set_status(SequenceStatus::Active);
        let index = sequence.cursor;
        match self.execute_current(&mut sequence, ResumeMode::Finish).await? {
            StepOutcome::Completed => self.complete_sequence(&mut sequence).await,
            StepOutcome::Suspended {
                handle,
                prompt,
                input,
            } => Ok(suspended(handle, prompt, input)),
            StepOutcome::Failed(error) => self.fail_sequence(&mut sequence, index, error).await,
        }
    }

    /// Re-execute the current step once, whatever its status.
    ///
    /// On completion the cursor moves past it like `advance`.
    pub async fn retry_step(&self, sequence_id: &str) -> Result<RunOutcome, EngineError> {
        let lock = self.sequence_lock(sequence_id).await;
        let _guard = lock.lock().await;

        let mut sequence = self.load(sequence_id).await?;
        if sequence.is_exhausted() {
            return Err(EngineError::NoCurrentStep(sequence_id.to_string()));
        }
        self.ensure_scope(&sequence).await?;
        let index = sequence.cursor;
        let step_id = sequence.steps[index].id.clone();
        self.inner.bridge.unregister_resume(&step_id).await;
        sequence.steps[index].reset();
        sequence.set_status(SequenceStatus::Active);
        tracing::info!(sequence_id = %sequence_id, step_id = %step_id, "step retry requested");

        match self.execute_current(&mut sequence, ResumeMode::Advance).await? {
            StepOutcome::Completed => {
                sequence.cursor = index + 1;
                self.settle_after_advance(&mut sequence).await
            }
            StepOutcome::Suspended {
                handle,
                prompt,
                input,
            } => Ok(suspended(handle, prompt, input)),
            StepOutcome::Failed(error) => self.fail_sequence(&mut sequence, index, error).await,
        }
    }

    /// Drop the pending resume of the running step and put it back to pending.
    ///
    /// Returns whether a running step was abandoned.
    pub async fn abandon(&self, sequence_id: &str) -> Result<bool, EngineError> {
        let lock = self.sequence_lock(sequence_id).await;
        let _guard = lock.lock().await;

        let mut sequence = self.load(sequence_id).await?;
        let abandoned = self.abandon_current(&mut sequence).await;
        if abandoned {
            self.persist(&sequence).await?;
        }
        Ok(abandoned)
    }

    /// Resume a suspended step with the outputs of the external action.
    ///
    /// Returns `None` when the handle is stale: the step was already resumed,
    /// re-run, reset or abandoned.
    pub async fn resume(
        &self,
        handle: &ResumeHandle,
        outputs: StepOutputs,
    ) -> Result<Option<RunOutcome>, EngineError> {
        if !self
            .inner
            .bridge
            .take(&handle.step_id, &handle.execution_id)
            .await
        {
            tracing::debug!(
                sequence_id = %handle.sequence_id,
                step_id = %handle.step_id,
                execution_id = %handle.execution_id,
                "resume with stale handle ignored"
            );
            return Ok(None);
        }
        self.complete_suspended(handle, outputs).await
    }

    /// Complete a suspended step by id. Unknown ids are ignored.
    pub async fn trigger_step_completion(&self, step_id: &StepId, outputs: StepOutputs) -> bool {
        self.inner.bridge.trigger(step_id, outputs).await
    }

    /// Messages the current step's handler would produce, without running it.
    pub async fn preview_messages(
        &self,
        sequence_id: &str,
    ) -> Result<Vec<ChatMessage>, EngineError> {
        let sequence = self.load(sequence_id).await?;
        let Some(step) = sequence.current_step() else {
            return Err(EngineError::NoCurrentStep(sequence_id.to_string()));
        };
        let step_id = step.id.clone();
        let prepared = self
            .prepare(&sequence, sequence.cursor)
            .await
            .map_err(|failure| EngineError::Prepare { step_id, failure })?;
        Ok(prepared
            .registration
            .handler
            .generate_messages(&prepared.input, &prepared.scope))
    }

    async fn run_loop(&self, sequence: &mut Sequence) -> Result<RunOutcome, EngineError> {
        let mut executed = 0usize;
        loop {
            if sequence.is_exhausted() {
                return self.complete_sequence(sequence).await;
            }
            let index = sequence.cursor;
            if sequence.steps[index].status == StepStatus::Completed {
                sequence.cursor += 1;
                continue;
            }
            if executed >= self.inner.config.max_steps_per_run {
                tracing::warn!(
                    sequence_id = %sequence.id,
                    cursor = index,
                    max_steps_per_run = self.inner.config.max_steps_per_run,
                    "step budget used up; yielding"
                );
                self.persist(sequence).await?;
                return Ok(RunOutcome::Yielded { cursor: index });
            }
            executed += 1;

            match self.execute_current(sequence, ResumeMode::Continue).await? {
                StepOutcome::Completed => {
                    sequence.cursor = index + 1;
                    self.persist(sequence).await?;
                }
                StepOutcome::Suspended {
                    handle,
                    prompt,
                    input,
                } => return Ok(suspended(handle, prompt, input)),
                StepOutcome::Failed(error) => {
                    return self.fail_sequence(sequence, index, error).await
                }
            }
        }
    }

    /// Start the step under the cursor and run it to a step outcome.
    async fn execute_current(
        &self,
        sequence: &mut Sequence,
        mode: ResumeMode,
    ) -> Result<StepOutcome, EngineError> {
        let index = sequence.cursor;
        let step_id = sequence.steps[index].id.clone();
        let type_tag = sequence.steps[index].type_tag.clone();

        self.inner.bridge.unregister_resume(&step_id).await;
        let execution_id = sequence.steps[index].start();
        tracing::info!(
            sequence_id = %sequence.id,
            step_id = %step_id,
            type_tag = %type_tag,
            execution_id = %execution_id,
            "step execution started"
        );
        self.report(
            ExecutionProgressEvent::new(
                sequence.id.clone(),
                Some(step_id.clone()),
                Some(type_tag.clone()),
                PHASE_STEP_STARTED,
            )
            .with_metadata(json!({ "execution_id": execution_id, "cursor": index })),
        )
        .await;

        let prepared = match self.prepare(sequence, index).await {
            Ok(prepared) => prepared,
            Err(failure) => return self.fail_step(sequence, index, failure).await,
        };
        sequence.steps[index].input = Some(prepared.input.to_value());
        self.persist(sequence).await?;

        if prepared.interactive {
            let prompt = prepared.input.get_str("prompt").map(str::to_string);
            return self
                .suspend(sequence, index, execution_id, mode, prompt, prepared.input)
                .await;
        }

        let ctx = StepContext::new(
            sequence.id.clone(),
            step_id,
            execution_id.clone(),
            sequence.scope_id.clone(),
            prepared.scope,
        );
        let result = prepared
            .registration
            .handler
            .execute(prepared.input.clone(), ctx)
            .await;

        match result {
            StepResult::Completed { outputs } => {
                self.complete_step(sequence, index, outputs).await;
                Ok(StepOutcome::Completed)
            }
            StepResult::WaitingForAction { prompt } => {
                self.suspend(sequence, index, execution_id, mode, prompt, prepared.input)
                    .await
            }
            StepResult::Error { message } => {
                self.fail_step(sequence, index, StepFailure::execution(message))
                    .await
            }
        }
    }

    /// Resolve the handler and build the effective input of a step.
    async fn prepare(&self, sequence: &Sequence, index: usize) -> Result<PreparedStep, StepFailure> {
        let step = &sequence.steps[index];
        let registration = self
            .inner
            .ctx
            .registry
            .read()
            .await
            .resolve(&step.type_tag)
            .map_err(|err| StepFailure::config(err.to_string()))?;

        let mut effective = step.clone();
        effective.config = merge_default_config(&registration.meta.default_config, &step.config);
        let effective = registration.handler.transform_step(&effective);
        registration
            .handler
            .validate(&effective.config)
            .map_err(|message| {
                StepFailure::config(format!(
                    "invalid config for step type '{}': {}",
                    step.type_tag, message
                ))
            })?;

        let scope = self
            .inner
            .ctx
            .scopes
            .snapshot(&sequence.scope_id)
            .await
            .unwrap_or_default();

        let mut inputs = Map::new();
        for (name, scope_path) in &effective.input_mapping {
            match path::lookup(&scope, scope_path) {
                Some(value) => {
                    inputs.insert(name.clone(), value.clone());
                }
                None => tracing::debug!(
                    step_id = %step.id,
                    input = %name,
                    path = %scope_path,
                    "mapped input not found in scope; skipped"
                ),
            }
        }

        let config = template::render_value(&effective.config, &scope);
        let interactive =
            registration.meta.interactive || self.inner.config.is_interactive(&step.type_tag);
        Ok(PreparedStep {
            registration,
            input: StepInput::new(config, inputs),
            scope,
            interactive,
        })
    }

    /// Write outputs through the output mapping and mark the step completed.
    async fn complete_step(&self, sequence: &mut Sequence, index: usize, outputs: StepOutputs) {
        let step = &sequence.steps[index];
        for (name, target) in &step.output_mapping {
            match outputs.get(name) {
                Some(value) => {
                    let written = self
                        .inner
                        .ctx
                        .scopes
                        .set(&sequence.scope_id, target, value.clone())
                        .await;
                    if !written {
                        tracing::warn!(
                            sequence_id = %sequence.id,
                            step_id = %step.id,
                            output = %name,
                            target = %target,
                            "output mapping write rejected"
                        );
                    }
                }
                None => tracing::debug!(
                    sequence_id = %sequence.id,
                    step_id = %step.id,
                    output = %name,
                    "declared output missing from result; skipped"
                ),
            }
        }

        let outputs_value = Value::Object(outputs.clone());
        let step = &mut sequence.steps[index];
        step.complete(outputs);
        tracing::info!(
            sequence_id = %sequence.id,
            step_id = %step.id,
            type_tag = %step.type_tag,
            outputs = %truncate_json_for_log(&outputs_value, MAX_LOG_JSON_CHARS),
            "step execution completed"
        );
        let event = ExecutionProgressEvent::new(
            sequence.id.clone(),
            Some(step.id.clone()),
            Some(step.type_tag.clone()),
            PHASE_STEP_COMPLETED,
        )
        .with_metadata(json!({ "outputs": outputs_value }));
        self.report(event).await;
    }

    async fn fail_step(
        &self,
        sequence: &mut Sequence,
        index: usize,
        failure: StepFailure,
    ) -> Result<StepOutcome, EngineError> {
        let step = &mut sequence.steps[index];
        step.fail(failure.clone());
        tracing::warn!(
            sequence_id = %sequence.id,
            step_id = %step.id,
            type_tag = %step.type_tag,
            kind = ?failure.kind,
            error = %truncate_for_log(&failure.message, MAX_LOG_TEXT_CHARS),
            "step execution failed"
        );
        let event = ExecutionProgressEvent::new(
            sequence.id.clone(),
            Some(step.id.clone()),
            Some(step.type_tag.clone()),
            PHASE_STEP_FAILED,
        )
        .with_message(failure.message.clone());
        self.report(event).await;
        Ok(StepOutcome::Failed(failure))
    }

    /// Leave the step running and register its resume on the bridge.
    async fn suspend(
        &self,
        sequence: &mut Sequence,
        index: usize,
        execution_id: String,
        mode: ResumeMode,
        prompt: Option<String>,
        input: StepInput,
    ) -> Result<StepOutcome, EngineError> {
        let step = &sequence.steps[index];
        let handle = ResumeHandle {
            sequence_id: sequence.id.clone(),
            step_id: step.id.clone(),
            execution_id,
            mode,
        };
        self.inner
            .bridge
            .register_resume(
                handle.step_id.clone(),
                handle.execution_id.clone(),
                self.resume_callback(handle.clone()),
            )
            .await;
        sequence.touch();
        self.persist(sequence).await?;

        tracing::info!(
            sequence_id = %handle.sequence_id,
            step_id = %handle.step_id,
            type_tag = %sequence.steps[index].type_tag,
            mode = ?mode,
            "step waiting for external action"
        );
        let mut event = ExecutionProgressEvent::new(
            sequence.id.clone(),
            Some(handle.step_id.clone()),
            Some(sequence.steps[index].type_tag.clone()),
            PHASE_STEP_WAITING,
        );
        if let Some(prompt) = &prompt {
            event = event.with_message(prompt.clone());
        }
        self.report(event).await;

        Ok(StepOutcome::Suspended {
            handle,
            prompt,
            input,
        })
    }

    fn resume_callback(&self, handle: ResumeHandle) -> ResumeFn {
        let engine = Arc::downgrade(&self.inner);
        Box::new(move |outputs| resume_detached(engine, handle, outputs))
    }

    /// Completion path shared by `resume` and bridge triggers.
    async fn complete_suspended(
        &self,
        handle: &ResumeHandle,
        outputs: StepOutputs,
    ) -> Result<Option<RunOutcome>, EngineError> {
        let lock = self.sequence_lock(&handle.sequence_id).await;
        let _guard = lock.lock().await;

        let Some(mut sequence) = self.inner.ctx.sequences.load(&handle.sequence_id).await? else {
            tracing::debug!(sequence_id = %handle.sequence_id, "resume for missing sequence ignored");
            return Ok(None);
        };
        let Some(index) = sequence.step_index(&handle.step_id) else {
            tracing::debug!(step_id = %handle.step_id, "resume for removed step ignored");
            return Ok(None);
        };
        let step = &sequence.steps[index];
        if step.status != StepStatus::Running || !step.is_execution(&handle.execution_id) {
            tracing::debug!(
                step_id = %handle.step_id,
                execution_id = %handle.execution_id,
                "resume for stale execution ignored"
            );
            return Ok(None);
        }

        self.complete_step(&mut sequence, index, outputs).await;
        if sequence.cursor == index {
            sequence.cursor = index + 1;
        }

        let outcome = match handle.mode {
            ResumeMode::Continue => self.run_loop(&mut sequence).await?,
            ResumeMode::Advance => self.settle_after_advance(&mut sequence).await?,
            ResumeMode::Finish => self.complete_sequence(&mut sequence).await?,
        };
        Ok(Some(outcome))
    }

    async fn settle_after_advance(&self, sequence: &mut Sequence) -> Result<RunOutcome, EngineError> {
        if sequence.is_exhausted() {
            return self.complete_sequence(sequence).await;
        }
        sequence.touch();
        self.persist(sequence).await?;
        Ok(RunOutcome::Advanced {
            cursor: sequence.cursor,
        })
    }

    async fn complete_sequence(&self, sequence: &mut Sequence) -> Result<RunOutcome, EngineError> {
        sequence.cursor = sequence.len();
        if sequence.status != SequenceStatus::Completed {
            sequence.set_status(SequenceStatus::Completed);
            self.persist(sequence).await?;
            tracing::info!(
                sequence_id = %sequence.id,
                completed_steps = sequence.completed_count(),
                steps = sequence.len(),
                "sequence completed"
            );
            self.report(ExecutionProgressEvent::new(
                sequence.id.clone(),
                None,
                None,
                PHASE_SEQUENCE_COMPLETED,
            ))
            .await;
        } else {
            self.persist(sequence).await?;
        }
        Ok(RunOutcome::Completed)
    }

    async fn fail_sequence(
        &self,
        sequence: &mut Sequence,
        index: usize,
        error: StepFailure,
    ) -> Result<RunOutcome, EngineError> {
        sequence.set_status(SequenceStatus::Error);
        self.persist(sequence).await?;
        let step_id = sequence.steps[index].id.clone();
        tracing::warn!(
            sequence_id = %sequence.id,
            step_id = %step_id,
            "sequence halted on step error"
        );
        self.report(
            ExecutionProgressEvent::new(
                sequence.id.clone(),
                Some(step_id.clone()),
                None,
                PHASE_SEQUENCE_FAILED,
            )
            .with_message(error.message.clone()),
        )
        .await;
        Ok(RunOutcome::Failed { step_id, error })
    }

    /// Reset the current step if it is running and drop its pending resume.
    async fn abandon_current(&self, sequence: &mut Sequence) -> bool {
        let Some(step) = sequence.current_step_mut() else {
            return false;
        };
        if step.status != StepStatus::Running {
            return false;
        }
        let step_id = step.id.clone();
        step.reset();
        self.inner.bridge.unregister_resume(&step_id).await;
        sequence.touch();
        tracing::info!(sequence_id = %sequence.id, step_id = %step_id, "running step abandoned");
        true
    }

    async fn ensure_scope(&self, sequence: &Sequence) -> Result<(), EngineError> {
        if self.inner.ctx.scopes.contains(&sequence.scope_id).await {
            Ok(())
        } else {
            Err(EngineError::ScopeNotActive(sequence.scope_id.clone()))
        }
    }

    async fn load(&self, sequence_id: &str) -> Result<Sequence, EngineError> {
        self.inner
            .ctx
            .sequences
            .load(sequence_id)
            .await?
            .ok_or_else(|| EngineError::SequenceNotFound(sequence_id.to_string()))
    }

    async fn persist(&self, sequence: &Sequence) -> Result<(), EngineError> {
        self.inner.ctx.sequences.save(sequence).await?;
        Ok(())
    }

    async fn sequence_lock(&self, sequence_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.inner.locks.lock().await;
        locks
            .entry(sequence_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn release_lock(&self, sequence_id: &str) {
        self.inner.locks.lock().await.remove(sequence_id);
    }

    async fn report(&self, event: ExecutionProgressEvent) {
        if let Some(reporter) = &self.inner.progress_reporter {
            if let Err(err) = reporter.report(event).await {
                tracing::warn!("failed to report execution progress: {}", err);
            }
        }
    }
}

fn resume_detached(
    engine: Weak<EngineInner>,
    handle: ResumeHandle,
    outputs: StepOutputs,
) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        let Some(inner) = engine.upgrade() else {
            tracing::debug!(step_id = %handle.step_id, "engine dropped; resume ignored");
            return;
        };
        let engine = SequenceEngine { inner };
        if let Err(err) = engine.complete_suspended(&handle, outputs).await {
            tracing::warn!(
                sequence_id = %handle.sequence_id,
                step_id = %handle.step_id,
                error = %err,
                "resume failed"
            );
        }
    })
}

fn suspended(handle: ResumeHandle, prompt: Option<String>, input: StepInput) -> RunOutcome {
    RunOutcome::Suspended {
        step_id: handle.step_id.clone(),
        handle,
        prompt,
        input,
    }
}

/// Shallow merge: step config keys win over handler defaults.
fn merge_default_config(defaults: &Value, config: &Value) -> Value {
    match (defaults, config) {
        (Value::Object(defaults), Value::Object(config)) => {
            let mut merged = defaults.clone();
            for (key, value) in config {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        (Value::Object(_), Value::Null) => defaults.clone(),
        (_, config) => config.clone(),
    }
}
