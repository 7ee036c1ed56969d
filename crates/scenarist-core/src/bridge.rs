//! Handler action bridge
//!
//! Pause/resume channel for running steps whose completion comes from
//! outside the engine: a person answering a prompt, or a remote call
//! finishing. At most one resume function is registered per step id; it is
//! removed before it runs, so a step is resumed at most once no matter how
//! many times `trigger` is called.

use std::collections::HashMap;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::handler::StepOutputs;
use crate::types::{SequenceId, StepId};

/// Resume callback. Receives the outputs supplied by the external event.
pub type ResumeFn = Box<dyn FnOnce(StepOutputs) -> BoxFuture<'static, ()> + Send>;

/// What happens after a suspended step completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeMode {
    /// Keep running the following steps
    #[default]
    Continue,
    /// Move the cursor past the step and stop
    Advance,
    /// End the sequence
    Finish,
}

/// Token returned to the caller when a sequence suspends.
///
/// Identifies one execution of one step; a handle from an earlier
/// execution never resumes a later one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeHandle {
    pub sequence_id: SequenceId,
    pub step_id: StepId,
    pub execution_id: String,
    #[serde(default)]
    pub mode: ResumeMode,
}

struct PendingResume {
    execution_id: String,
    resume: ResumeFn,
}

/// Resume registry keyed by step id
#[derive(Default)]
pub struct HandlerActionBridge {
    pending: Mutex<HashMap<StepId, PendingResume>>,
}

impl HandlerActionBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the resume function for a step execution, replacing any previous
    /// one for the same step. Returns whether a registration was replaced.
    pub async fn register_resume(
        &self,
        step_id: StepId,
        execution_id: impl Into<String>,
        resume: ResumeFn,
    ) -> bool {
        let execution_id = execution_id.into();
        tracing::debug!(step_id = %step_id, execution_id = %execution_id, "resume registered");
        self.pending
            .lock()
            .await
            .insert(
                step_id,
                PendingResume {
                    execution_id,
                    resume,
                },
            )
            .is_some()
    }

    /// Drop the registration for a step. Later triggers for it are no-ops.
    pub async fn unregister_resume(&self, step_id: &StepId) -> bool {
        self.pending.lock().await.remove(step_id).is_some()
    }

    pub async fn is_pending(&self, step_id: &StepId) -> bool {
        self.pending.lock().await.contains_key(step_id)
    }

    /// Execution id of the pending registration for a step
    pub async fn pending_execution(&self, step_id: &StepId) -> Option<String> {
        self.pending
            .lock()
            .await
            .get(step_id)
            .map(|p| p.execution_id.clone())
    }

    /// Step ids with a pending registration
    pub async fn pending_steps(&self) -> Vec<StepId> {
        let mut steps: Vec<StepId> = self.pending.lock().await.keys().cloned().collect();
        steps.sort();
        steps
    }

    /// Invoke and remove the registration for `step_id`.
    ///
    /// Returns whether a registration was found. Unknown ids are ignored.
    pub async fn trigger(&self, step_id: &StepId, outputs: StepOutputs) -> bool {
        let pending = self.pending.lock().await.remove(step_id);
        match pending {
            Some(pending) => {
                tracing::debug!(
                    step_id = %step_id,
                    execution_id = %pending.execution_id,
                    "resume triggered"
                );
                (pending.resume)(outputs).await;
                true
            }
            None => {
                tracing::debug!(step_id = %step_id, "trigger for step without registration ignored");
                false
            }
        }
    }

    /// Remove the registration only if it belongs to `execution_id`.
    ///
    /// The resume function is dropped without running; the caller takes
    /// over the completion itself.
    pub async fn take(&self, step_id: &StepId, execution_id: &str) -> bool {
        let mut pending = self.pending.lock().await;
        match pending.get(step_id) {
            Some(entry) if entry.execution_id == execution_id => {
                pending.remove(step_id);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_resume(counter: Arc<AtomicUsize>) -> ResumeFn {
        Box::new(move |_outputs| {
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[test]
    fn test_trigger_runs_once_then_ignores() {
        tokio_test::block_on(async {
            let bridge = HandlerActionBridge::new();
            let calls = Arc::new(AtomicUsize::new(0));
            bridge
                .register_resume(StepId::from("s1"), "e1", counting_resume(calls.clone()))
                .await;

            assert!(bridge.trigger(&StepId::from("s1"), StepOutputs::new()).await);
            assert!(!bridge.trigger(&StepId::from("s1"), StepOutputs::new()).await);
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn test_trigger_unknown_step_is_noop() {
        tokio_test::block_on(async {
            let bridge = HandlerActionBridge::new();
            assert!(!bridge.trigger(&StepId::from("ghost"), StepOutputs::new()).await);
        });
    }

    #[test]
    fn test_reregistration_replaces_previous_function() {
        tokio_test::block_on(async {
            let bridge = HandlerActionBridge::new();
            let first = Arc::new(AtomicUsize::new(0));
            let second = Arc::new(AtomicUsize::new(0));
            bridge
                .register_resume(StepId::from("s1"), "e1", counting_resume(first.clone()))
                .await;
            let replaced = bridge
                .register_resume(StepId::from("s1"), "e2", counting_resume(second.clone()))
                .await;
            assert!(replaced);

            bridge.trigger(&StepId::from("s1"), StepOutputs::new()).await;
            assert_eq!(first.load(Ordering::SeqCst), 0);
            assert_eq!(second.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn test_unregister_makes_trigger_noop() {
        tokio_test::block_on(async {
            let bridge = HandlerActionBridge::new();
            let calls = Arc::new(AtomicUsize::new(0));
            bridge
                .register_resume(StepId::from("s1"), "e1", counting_resume(calls.clone()))
                .await;
            assert!(bridge.unregister_resume(&StepId::from("s1")).await);
            assert!(!bridge.trigger(&StepId::from("s1"), StepOutputs::new()).await);
            assert_eq!(calls.load(Ordering::SeqCst), 0);
        });
    }

    #[test]
    fn test_take_requires_matching_execution() {
        tokio_test::block_on(async {
            let bridge = HandlerActionBridge::new();
            let calls = Arc::new(AtomicUsize::new(0));
            bridge
                .register_resume(StepId::from("s1"), "e2", counting_resume(calls.clone()))
                .await;

            assert!(!bridge.take(&StepId::from("s1"), "e1").await);
            assert!(bridge.is_pending(&StepId::from("s1")).await);
            assert!(bridge.take(&StepId::from("s1"), "e2").await);
            assert!(!bridge.is_pending(&StepId::from("s1")).await);
            assert_eq!(calls.load(Ordering::SeqCst), 0);
        });
    }

    #[test]
    fn test_resume_receives_outputs() {
        tokio_test::block_on(async {
            let bridge = HandlerActionBridge::new();
            let seen = Arc::new(tokio::sync::Mutex::new(None));
            let sink = seen.clone();
            bridge
                .register_resume(
                    StepId::from("s1"),
                    "e1",
                    Box::new(move |outputs| {
                        Box::pin(async move {
                            *sink.lock().await = outputs.get("value").cloned();
                        })
                    }),
                )
                .await;

            let mut outputs = StepOutputs::new();
            outputs.insert("value".to_string(), json!("typed"));
            bridge.trigger(&StepId::from("s1"), outputs).await;
            assert_eq!(*seen.lock().await, Some(json!("typed")));
        });
    }
}
