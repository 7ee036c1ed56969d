//! Sequence type definitions
//!
//! A Sequence is an ordered list of steps with a cursor: a scenario being
//! played back, or a task being run. Both use the same shape and engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::step::{Step, StepId, StepStatus};
use super::ScopeId;

/// Type alias for Sequence ID
pub type SequenceId = String;

/// What the sequence represents to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SequenceKind {
    /// Interactive scenario playback (nodes of a flow)
    #[default]
    Scenario,
    /// Task run (task steps)
    Task,
}

/// Sequence-level run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SequenceStatus {
    #[default]
    Draft,
    Active,
    Completed,
    Error,
}

impl SequenceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SequenceStatus::Completed | SequenceStatus::Error)
    }
}

/// Ordered steps plus a cursor.
///
/// `steps` is kept sorted by `order`; `cursor` is in `[0, steps.len()]` and
/// `cursor == steps.len()` means the sequence is exhausted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    pub id: SequenceId,
    #[serde(default)]
    pub kind: SequenceKind,
    #[serde(default)]
    pub name: String,
    /// Scope this sequence reads from and writes to
    pub scope_id: ScopeId,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub cursor: usize,
    #[serde(default)]
    pub status: SequenceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Sequence {
    /// Create an empty draft sequence
    pub fn new(
        id: impl Into<SequenceId>,
        kind: SequenceKind,
        name: impl Into<String>,
        scope_id: impl Into<ScopeId>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            kind,
            name: name.into(),
            scope_id: scope_id.into(),
            steps: Vec::new(),
            cursor: 0,
            status: SequenceStatus::Draft,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the steps; they are re-owned by this sequence and sorted by order.
    pub fn with_steps(mut self, steps: Vec<Step>) -> Self {
        self.steps = steps;
        for step in &mut self.steps {
            step.sequence_id = self.id.clone();
        }
        self.steps.sort_by_key(|s| s.order);
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.steps.len()
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.steps.get(self.cursor)
    }

    pub fn current_step_mut(&mut self) -> Option<&mut Step> {
        self.steps.get_mut(self.cursor)
    }

    pub fn step_index(&self, step_id: &StepId) -> Option<usize> {
        self.steps.iter().position(|s| &s.id == step_id)
    }

    pub fn step(&self, step_id: &StepId) -> Option<&Step> {
        self.steps.iter().find(|s| &s.id == step_id)
    }

    pub fn step_mut(&mut self, step_id: &StepId) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| &s.id == step_id)
    }

    pub fn set_status(&mut self, status: SequenceStatus) {
        self.status = status;
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Append a step after the current last one.
    pub fn push_step(&mut self, mut step: Step) {
        step.order = self
            .steps
            .iter()
            .map(|s| s.order)
            .max()
            .map(|max| max.saturating_add(1))
            .unwrap_or(0);
        step.sequence_id = self.id.clone();
        self.steps.push(step);
        self.touch();
    }

    /// Remove a step, keeping the cursor on the same logical position.
    pub fn remove_step(&mut self, step_id: &StepId) -> Option<Step> {
        let index = self.step_index(step_id)?;
        let removed = self.steps.remove(index);
        if index < self.cursor {
            self.cursor -= 1;
        }
        self.cursor = self.cursor.min(self.steps.len());
        self.touch();
        Some(removed)
    }

    /// Re-number all steps densely in the given order.
    ///
    /// `ordered` must be a permutation of the current step ids. The cursor
    /// follows the identity of the step it pointed at.
    pub fn reorder(&mut self, ordered: &[StepId]) -> Result<(), String> {
        if ordered.len() != self.steps.len() {
            return Err(format!(
                "expected {} step ids, got {}",
                self.steps.len(),
                ordered.len()
            ));
        }
        let current_id = self.current_step().map(|s| s.id.clone());
        let mut reordered = Vec::with_capacity(self.steps.len());
        for (position, step_id) in ordered.iter().enumerate() {
            if reordered.iter().any(|s: &Step| &s.id == step_id) {
                return Err(format!("step '{}' listed twice", step_id));
            }
            let Some(index) = self.step_index(step_id) else {
                return Err(format!("step '{}' not in sequence '{}'", step_id, self.id));
            };
            let mut step = self.steps[index].clone();
            step.order = position as u32;
            reordered.push(step);
        }
        self.steps = reordered;
        if let Some(current_id) = current_id {
            self.cursor = self.step_index(&current_id).unwrap_or(self.cursor);
        }
        self.touch();
        Ok(())
    }

    /// Reset every step and rewind the cursor. Scope data is not touched.
    pub fn reset(&mut self) {
        for step in &mut self.steps {
            step.reset();
        }
        self.cursor = 0;
        self.set_status(SequenceStatus::Draft);
    }

    /// Number of completed steps
    pub fn completed_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count()
    }
}
