//! Sequence authoring: create, edit, delete, reorder and reset

use std::collections::HashSet;

use serde_json::Value;

use super::{EngineError, SequenceEngine};
use crate::types::{Sequence, SequenceStatus, Step, StepId, StepPatch, StepStatus};

impl SequenceEngine {
    /// Store a new sequence. Steps are sorted by order and re-owned.
    pub async fn create_sequence(&self, sequence: Sequence) -> Result<Sequence, EngineError> {
        let mut sequence = sequence;
        let steps = std::mem::take(&mut sequence.steps);
        let mut sequence = sequence.with_steps(steps);

        let mut ids = HashSet::new();
        let mut orders = HashSet::new();
        for step in &sequence.steps {
            if !ids.insert(step.id.clone()) {
                return Err(EngineError::InvalidSequence(format!(
                    "step id '{}' used twice",
                    step.id
                )));
            }
            if !orders.insert(step.order) {
                return Err(EngineError::InvalidSequence(format!(
                    "order {} used twice",
                    step.order
                )));
            }
        }
        if self.context().sequences.load(&sequence.id).await?.is_some() {
            return Err(EngineError::InvalidSequence(format!(
                "sequence '{}' already exists",
                sequence.id
            )));
        }
        // Pending resumes are keyed by step id, so ids are unique across sequences.
        for step in &sequence.steps {
            if let Some(owner) = self.context().sequences.find_by_step(&step.id).await? {
                return Err(EngineError::InvalidSequence(format!(
                    "step id '{}' already in use by sequence '{}'",
                    step.id, owner.id
                )));
            }
        }
        sequence.cursor = sequence.cursor.min(sequence.len());
        self.persist(&sequence).await?;
        tracing::debug!(
            sequence_id = %sequence.id,
            kind = ?sequence.kind,
            steps = sequence.len(),
            "sequence created"
        );
        Ok(sequence)
    }

    pub async fn get_sequence(&self, sequence_id: &str) -> Result<Sequence, EngineError> {
        self.load(sequence_id).await
    }

    pub async fn list_sequences(&self) -> Result<Vec<Sequence>, EngineError> {
        Ok(self.context().sequences.list().await?)
    }

    /// Delete a sequence, dropping any pending resume of its steps.
    pub async fn delete_sequence(&self, sequence_id: &str) -> Result<bool, EngineError> {
        let lock = self.sequence_lock(sequence_id).await;
        let guard = lock.lock().await;

        if let Some(sequence) = self.context().sequences.load(sequence_id).await? {
            for step in sequence.steps.iter().filter(|s| s.status == StepStatus::Running) {
                self.bridge().unregister_resume(&step.id).await;
            }
        }
        let deleted = self.context().sequences.delete(sequence_id).await?;
        drop(guard);
        self.release_lock(sequence_id).await;
        Ok(deleted)
    }

    /// Append a new step of `type_tag` at the end of a sequence.
    pub async fn create_step(
        &self,
        sequence_id: &str,
        type_tag: &str,
        config: Value,
    ) -> Result<Step, EngineError> {
        let step = Step::new(StepId::generate(), sequence_id, type_tag).with_config(config);
        self.add_step(sequence_id, step).await
    }

    /// Append a fully described step at the end of a sequence.
    pub async fn add_step(&self, sequence_id: &str, step: Step) -> Result<Step, EngineError> {
        if self.context().sequences.find_by_step(&step.id).await?.is_some() {
            return Err(EngineError::InvalidSequence(format!(
                "step id '{}' already in use",
                step.id
            )));
        }

        let lock = self.sequence_lock(sequence_id).await;
        let _guard = lock.lock().await;

        let mut sequence = self.load(sequence_id).await?;
        let step_id = step.id.clone();
        sequence.push_step(step);
        self.persist(&sequence).await?;
        let step = sequence
            .step(&step_id)
            .cloned()
            .ok_or_else(|| EngineError::StepNotFound(step_id.to_string()))?;
        tracing::debug!(sequence_id = %sequence_id, step_id = %step.id, order = step.order, "step created");
        Ok(step)
    }

    /// Apply an edit to a step. The step goes back to pending.
    pub async fn edit_step(&self, step_id: &StepId, patch: StepPatch) -> Result<Step, EngineError> {
        let sequence_id = self.locate_step(step_id).await?;
        let lock = self.sequence_lock(&sequence_id).await;
        let _guard = lock.lock().await;

        let mut sequence = self.load(&sequence_id).await?;
        let step = sequence
            .step_mut(step_id)
            .ok_or_else(|| EngineError::StepNotFound(step_id.to_string()))?;
        if step.status == StepStatus::Running {
            self.bridge().unregister_resume(step_id).await;
        }
        step.apply_patch(patch);
        let edited = step.clone();
        sequence.touch();
        self.persist(&sequence).await?;
        tracing::debug!(sequence_id = %sequence_id, step_id = %step_id, "step edited");
        Ok(edited)
    }

    /// Remove a step; the cursor keeps pointing at the same logical position.
    pub async fn delete_step(&self, step_id: &StepId) -> Result<Step, EngineError> {
        let sequence_id = self.locate_step(step_id).await?;
        let lock = self.sequence_lock(&sequence_id).await;
        let _guard = lock.lock().await;

        let mut sequence = self.load(&sequence_id).await?;
        let removed = sequence
            .remove_step(step_id)
            .ok_or_else(|| EngineError::StepNotFound(step_id.to_string()))?;
        if removed.status == StepStatus::Running {
            self.bridge().unregister_resume(step_id).await;
        }
        self.persist(&sequence).await?;
        tracing::debug!(sequence_id = %sequence_id, step_id = %step_id, "step deleted");
        Ok(removed)
    }

    /// Re-number the steps densely in the given order.
    ///
    /// Rejected while the sequence is active.
    pub async fn reorder_steps(
        &self,
        sequence_id: &str,
        ordered: &[StepId],
    ) -> Result<Sequence, EngineError> {
        let lock = self.sequence_lock(sequence_id).await;
        let _guard = lock.lock().await;

        let mut sequence = self.load(sequence_id).await?;
        if sequence.status == SequenceStatus::Active {
            return Err(EngineError::ReorderWhileActive(sequence_id.to_string()));
        }
        sequence
            .reorder(ordered)
            .map_err(EngineError::InvalidReorder)?;
        self.persist(&sequence).await?;
        tracing::debug!(sequence_id = %sequence_id, "steps reordered");
        Ok(sequence)
    }

    /// Put every step back to pending, rewind the cursor and return to draft.
    ///
    /// Scope data written by earlier runs is kept.
    pub async fn reset_sequence(&self, sequence_id: &str) -> Result<Sequence, EngineError> {
        let lock = self.sequence_lock(sequence_id).await;
        let _guard = lock.lock().await;

        let mut sequence = self.load(sequence_id).await?;
        for step in sequence.steps.iter().filter(|s| s.status == StepStatus::Running) {
            self.bridge().unregister_resume(&step.id).await;
        }
        sequence.reset();
        self.persist(&sequence).await?;
        tracing::info!(sequence_id = %sequence_id, "sequence reset");
        Ok(sequence)
    }

    async fn locate_step(&self, step_id: &StepId) -> Result<String, EngineError> {
        self.context()
            .sequences
            .find_by_step(step_id)
            .await?
            .map(|s| s.id)
            .ok_or_else(|| EngineError::StepNotFound(step_id.to_string()))
    }
}
