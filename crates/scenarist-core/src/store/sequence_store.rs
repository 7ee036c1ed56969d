//! SequenceStore - sequence lookup and persistence seam

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use super::StoreError;
use crate::types::{Sequence, StepId};

/// Where the engine keeps sequences between operations.
///
/// Durable implementations belong to the embedding application.
#[async_trait]
pub trait SequenceStore: Send + Sync {
    /// Insert or replace a sequence
    async fn save(&self, sequence: &Sequence) -> Result<(), StoreError>;

    /// Load a sequence by ID
    async fn load(&self, sequence_id: &str) -> Result<Option<Sequence>, StoreError>;

    /// Find the sequence owning a step
    async fn find_by_step(&self, step_id: &StepId) -> Result<Option<Sequence>, StoreError>;

    /// List all sequences
    async fn list(&self) -> Result<Vec<Sequence>, StoreError>;

    /// Delete a sequence
    async fn delete(&self, sequence_id: &str) -> Result<bool, StoreError>;
}

/// In-memory implementation for development and testing.
#[derive(Default)]
pub struct InMemorySequenceStore {
    sequences: RwLock<HashMap<String, Sequence>>,
    step_index: RwLock<HashMap<StepId, String>>,
}

impl InMemorySequenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SequenceStore for InMemorySequenceStore {
    async fn save(&self, sequence: &Sequence) -> Result<(), StoreError> {
        let mut sequences = self
            .sequences
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        let mut step_index = self
            .step_index
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        step_index.retain(|_, owner| owner != &sequence.id);
        for step in &sequence.steps {
            step_index.insert(step.id.clone(), sequence.id.clone());
        }
        sequences.insert(sequence.id.clone(), sequence.clone());
        Ok(())
    }

    async fn load(&self, sequence_id: &str) -> Result<Option<Sequence>, StoreError> {
        let sequences = self
            .sequences
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(sequences.get(sequence_id).cloned())
    }

    async fn find_by_step(&self, step_id: &StepId) -> Result<Option<Sequence>, StoreError> {
        let owner = {
            let step_index = self
                .step_index
                .read()
                .map_err(|e| StoreError::Internal(e.to_string()))?;
            step_index.get(step_id).cloned()
        };
        match owner {
            Some(sequence_id) => self.load(&sequence_id).await,
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<Sequence>, StoreError> {
        let sequences = self
            .sequences
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        let mut all: Vec<Sequence> = sequences.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }

    async fn delete(&self, sequence_id: &str) -> Result<bool, StoreError> {
        let mut sequences = self
            .sequences
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        let removed = sequences.remove(sequence_id).is_some();
        if removed {
            let mut step_index = self
                .step_index
                .write()
                .map_err(|e| StoreError::Internal(e.to_string()))?;
            step_index.retain(|_, owner| owner != sequence_id);
        }
        Ok(removed)
    }
}
