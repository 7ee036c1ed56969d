use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use scenarist_core::engine::{
    ExecutionProgressEvent, ExecutionProgressReporter, PHASE_STEP_COMPLETED, PHASE_STEP_FAILED,
    PHASE_STEP_STARTED,
};
use scenarist_core::types::{SequenceId, StepId};

/// Step-level hook context exposed to runtime extensions.
#[derive(Debug, Clone)]
pub struct StepHookContext {
    pub sequence_id: SequenceId,
    pub step_id: Option<StepId>,
    pub type_tag: Option<String>,
    pub phase: String,
    pub message: Option<String>,
    pub metadata: Value,
}

impl From<ExecutionProgressEvent> for StepHookContext {
    fn from(event: ExecutionProgressEvent) -> Self {
        Self {
            sequence_id: event.sequence_id,
            step_id: event.step_id,
            type_tag: event.type_tag,
            phase: event.phase,
            message: event.message,
            metadata: event.metadata,
        }
    }
}

/// Runtime hook extension point.
///
/// Hooks observe; they run while the sequence is locked and must not drive
/// the engine themselves.
#[async_trait]
pub trait RuntimeHook: Send + Sync {
    async fn on_before_step(&self, _ctx: &StepHookContext) -> Result<(), String> {
        Ok(())
    }

    async fn on_after_step(&self, _ctx: &StepHookContext) -> Result<(), String> {
        Ok(())
    }

    async fn on_step_error(&self, _ctx: &StepHookContext) -> Result<(), String> {
        Ok(())
    }

    async fn on_progress(&self, _ctx: &StepHookContext) -> Result<(), String> {
        Ok(())
    }
}

/// Which [`RuntimeHook`] method a registry call fans out to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPoint {
    BeforeStep,
    AfterStep,
    StepError,
    Progress,
}

impl HookPoint {
    /// Step hook for an engine phase; sequence-level phases only reach `Progress`.
    pub fn for_phase(phase: &str) -> Option<Self> {
        match phase {
            PHASE_STEP_STARTED => Some(Self::BeforeStep),
            PHASE_STEP_COMPLETED => Some(Self::AfterStep),
            PHASE_STEP_FAILED => Some(Self::StepError),
            _ => None,
        }
    }
}

/// Registry for runtime hooks.
#[derive(Default)]
pub struct HookRegistry {
    hooks: RwLock<Vec<Arc<dyn RuntimeHook>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self {
            hooks: RwLock::new(Vec::new()),
        }
    }

    pub async fn register(&self, hook: Arc<dyn RuntimeHook>) {
        self.hooks.write().await.push(hook);
    }

    pub async fn register_many(&self, hooks: Vec<Arc<dyn RuntimeHook>>) {
        self.hooks.write().await.extend(hooks);
    }

    pub async fn len(&self) -> usize {
        self.hooks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.hooks.read().await.is_empty()
    }

    /// Call `point` on every registered hook. Failures are logged and skipped.
    pub async fn fire(&self, point: HookPoint, ctx: &StepHookContext) {
        let hooks = self.hooks.read().await.clone();
        for hook in hooks {
            let result = match point {
                HookPoint::BeforeStep => hook.on_before_step(ctx).await,
                HookPoint::AfterStep => hook.on_after_step(ctx).await,
                HookPoint::StepError => hook.on_step_error(ctx).await,
                HookPoint::Progress => hook.on_progress(ctx).await,
            };
            if let Err(err) = result {
                tracing::warn!(
                    hook_point = ?point,
                    sequence_id = %ctx.sequence_id,
                    phase = %ctx.phase,
                    error = %err,
                    "runtime hook failed"
                );
            }
        }
    }

    /// Route one engine event to the matching step hook, then to `on_progress`.
    pub async fn dispatch(&self, event: ExecutionProgressEvent) {
        let ctx = StepHookContext::from(event);
        if let Some(point) = HookPoint::for_phase(&ctx.phase) {
            self.fire(point, &ctx).await;
        }
        self.fire(HookPoint::Progress, &ctx).await;
    }
}

/// Engine progress reporter that forwards every event to a hook registry.
pub struct HookProgressReporter {
    hooks: Arc<HookRegistry>,
}

impl HookProgressReporter {
    pub fn new(hooks: Arc<HookRegistry>) -> Self {
        Self { hooks }
    }
}

#[async_trait]
impl ExecutionProgressReporter for HookProgressReporter {
    async fn report(&self, event: ExecutionProgressEvent) -> Result<(), String> {
        self.hooks.dispatch(event).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn push(&self, call: String) -> Result<(), String> {
            self.calls.lock().map_err(|e| e.to_string())?.push(call);
            Ok(())
        }
    }

    #[async_trait]
    impl RuntimeHook for Recorder {
        async fn on_before_step(&self, ctx: &StepHookContext) -> Result<(), String> {
            self.push(format!("before:{}", ctx.phase))
        }

        async fn on_after_step(&self, ctx: &StepHookContext) -> Result<(), String> {
            self.push(format!("after:{}", ctx.phase))
        }

        async fn on_step_error(&self, ctx: &StepHookContext) -> Result<(), String> {
            self.push(format!("error:{}", ctx.message.clone().unwrap_or_default()))
        }

        async fn on_progress(&self, ctx: &StepHookContext) -> Result<(), String> {
            self.push(format!("progress:{}", ctx.phase))
        }
    }

    struct Failing;

    #[async_trait]
    impl RuntimeHook for Failing {
        async fn on_progress(&self, _ctx: &StepHookContext) -> Result<(), String> {
            Err("boom".to_string())
        }
    }

    fn event(phase: &str) -> ExecutionProgressEvent {
        ExecutionProgressEvent::new("seq", Some(StepId::from("s1")), Some("echo".to_string()), phase)
    }

    #[test]
    fn test_hook_point_for_phase() {
        assert_eq!(
            HookPoint::for_phase(PHASE_STEP_STARTED),
            Some(HookPoint::BeforeStep)
        );
        assert_eq!(
            HookPoint::for_phase(PHASE_STEP_COMPLETED),
            Some(HookPoint::AfterStep)
        );
        assert_eq!(
            HookPoint::for_phase(PHASE_STEP_FAILED),
            Some(HookPoint::StepError)
        );
        assert_eq!(HookPoint::for_phase("step_waiting"), None);
        assert_eq!(HookPoint::for_phase("sequence_completed"), None);
    }

    #[test]
    fn test_fire_reaches_only_the_named_point() {
        tokio_test::block_on(async {
            let hooks = HookRegistry::new();
            let recorder = Arc::new(Recorder::default());
            hooks.register(recorder.clone()).await;

            let ctx = StepHookContext::from(event(PHASE_STEP_COMPLETED));
            hooks.fire(HookPoint::AfterStep, &ctx).await;

            let calls = recorder.calls.lock().map(|c| c.clone()).unwrap_or_default();
            assert_eq!(calls, vec!["after:step_completed"]);
        });
    }

    #[test]
    fn test_dispatch_routes_phases_and_ignores_hook_failures() {
        tokio_test::block_on(async {
            let hooks = Arc::new(HookRegistry::new());
            let recorder = Arc::new(Recorder::default());
            let all: Vec<Arc<dyn RuntimeHook>> = vec![Arc::new(Failing), recorder.clone()];
            hooks.register_many(all).await;
            assert_eq!(hooks.len().await, 2);

            let reporter = HookProgressReporter::new(hooks.clone());
            reporter.report(event(PHASE_STEP_STARTED)).await.expect("report");
            reporter
                .report(event(PHASE_STEP_FAILED).with_message("bad"))
                .await
                .expect("report");
            reporter.report(event("sequence_completed")).await.expect("report");

            let calls = recorder.calls.lock().map(|c| c.clone()).unwrap_or_default();
            assert_eq!(
                calls,
                vec![
                    "before:step_started",
                    "progress:step_started",
                    "error:bad",
                    "progress:step_failed",
                    "progress:sequence_completed",
                ]
            );
        });
    }
}
