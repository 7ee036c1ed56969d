use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use scenarist_config::{parse_config, ScenaristConfig};
use scenarist_runtime::{
    CursorMove, EngineError, HookRegistry, RunOutcome, Runtime, RuntimeError, RuntimeHook,
    SequenceKind, SequenceStatus, Step, StepErrorKind, StepHookContext, StepId, StepPatch,
    StepStatus,
};

fn step(id: &str, type_tag: &str, order: u32) -> Step {
    Step::new(id, "", type_tag).with_order(order)
}

fn outputs(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

async fn default_runtime() -> Runtime {
    Runtime::from_config(&ScenaristConfig::default())
        .await
        .expect("runtime")
}

#[tokio::test]
async fn echo_output_feeds_template_step() {
    let runtime = default_runtime().await;
    let scope = runtime.current_scope().await.expect("scope");
    runtime
        .create_sequence(
            "greet",
            SequenceKind::Scenario,
            "Greeting",
            vec![
                step("a", "echo", 0)
                    .with_config(json!({"value": "hi"}))
                    .with_output("value", "greeting"),
                step("b", "template", 1).with_config(json!({"text": "Said: {{greeting}}"})),
            ],
        )
        .await
        .expect("create");

    let outcome = runtime.start_sequence("greet").await.expect("run");
    assert!(outcome.is_completed());
    assert_eq!(
        runtime.get_scope_value(&scope, "greeting", None).await,
        Some(json!("hi"))
    );

    let sequence = runtime.sequence().await.expect("sequence");
    assert_eq!(sequence.status, SequenceStatus::Completed);
    assert_eq!(sequence.cursor, 2);
    assert_eq!(
        sequence.steps[1].output,
        Some(outputs(json!({"text": "Said: hi"})))
    );
}

#[tokio::test]
async fn interactive_step_halts_until_triggered_once() {
    let runtime = default_runtime().await;
    let scope = runtime.current_scope().await.expect("scope");
    runtime
        .create_sequence(
            "quiz",
            SequenceKind::Scenario,
            "Quiz",
            vec![
                step("intro", "echo", 0)
                    .with_config(json!({"value": "welcome"}))
                    .with_output("value", "intro"),
                step("ask", "user_input", 1)
                    .with_config(json!({"prompt": "Your answer?"}))
                    .with_output("value", "answers.first"),
                step("sum", "template", 2)
                    .with_config(json!({"text": "Answer: {{answers.first}}"}))
                    .with_output("text", "summary"),
            ],
        )
        .await
        .expect("create");

    let outcome = runtime.start_sequence("quiz").await.expect("run");
    match &outcome {
        RunOutcome::Suspended {
            step_id, prompt, ..
        } => {
            assert_eq!(step_id.as_str(), "ask");
            assert_eq!(prompt.as_deref(), Some("Your answer?"));
        }
        other => panic!("expected suspension, got {:?}", other),
    }

    let sequence = runtime.sequence().await.expect("sequence");
    assert_eq!(sequence.cursor, 1);
    assert_eq!(sequence.steps[0].status, StepStatus::Completed);
    assert_eq!(sequence.steps[1].status, StepStatus::Running);
    assert_eq!(sequence.steps[2].status, StepStatus::Pending);
    assert_eq!(runtime.get_scope_value(&scope, "summary", None).await, None);

    let ask = StepId::from("ask");
    assert!(
        runtime
            .trigger_step_completion(&ask, outputs(json!({"value": "42"})))
            .await
    );
    let sequence = runtime.sequence().await.expect("sequence");
    assert_eq!(sequence.status, SequenceStatus::Completed);
    assert_eq!(sequence.cursor, 3);
    assert_eq!(
        runtime.get_scope_value(&scope, "summary", None).await,
        Some(json!("Answer: 42"))
    );

    assert!(
        !runtime
            .trigger_step_completion(&ask, outputs(json!({"value": "again"})))
            .await
    );
    assert_eq!(
        runtime.get_scope_value(&scope, "answers", Some("first")).await,
        Some(json!("42"))
    );
    assert_eq!(runtime.sequence().await.expect("sequence").cursor, 3);
}

#[tokio::test]
async fn unknown_handler_halts_sequence_in_error() {
    let runtime = default_runtime().await;
    let scope = runtime.current_scope().await.expect("scope");
    runtime
        .create_sequence(
            "broken",
            SequenceKind::Task,
            "Broken",
            vec![
                step("bad", "nonexistent", 0),
                step("after", "echo", 1)
                    .with_config(json!({"value": "ran"}))
                    .with_output("value", "after"),
            ],
        )
        .await
        .expect("create");

    let outcome = runtime.start_sequence("broken").await.expect("run");
    let RunOutcome::Failed { step_id, error } = outcome else {
        panic!("expected failure");
    };
    assert_eq!(step_id.as_str(), "bad");
    assert_eq!(error.kind, StepErrorKind::Config);

    let sequence = runtime.sequence().await.expect("sequence");
    assert_eq!(sequence.status, SequenceStatus::Error);
    assert_eq!(sequence.cursor, 0);
    assert_eq!(sequence.steps[1].status, StepStatus::Pending);
    assert_eq!(runtime.get_scope_value(&scope, "after", None).await, None);

    runtime
        .edit_step(
            &StepId::from("bad"),
            StepPatch {
                type_tag: Some("echo".to_string()),
                config: Some(json!({"value": "fixed"})),
                ..StepPatch::default()
            },
        )
        .await
        .expect("edit");
    let outcome = runtime.run().await.expect("rerun");
    assert!(outcome.is_completed());
    assert_eq!(
        runtime.get_scope_value(&scope, "after", None).await,
        Some(json!("ran"))
    );
}

#[tokio::test]
async fn initial_context_is_cloned_and_scope_survives_workspace_switch() {
    let config = parse_config(
        r#"
workspaces:
  - id: home
    initial_context: { a: { b: 1 } }
  - id: work
"#,
    )
    .expect("config");
    let runtime = Runtime::from_config(&config).await.expect("runtime");

    assert_eq!(
        runtime.get_scope_value("home", "a", Some("b")).await,
        Some(json!(1))
    );
    assert!(runtime.set_scope_value("home", "a", Some("b"), json!(2)).await);
    assert!(runtime.set_scope_value("home", "a", Some("c"), json!("x")).await);

    let declared = runtime
        .workspaces()
        .await
        .into_iter()
        .find(|w| w.id == "home")
        .expect("home");
    assert_eq!(declared.initial_context, json!({"a": {"b": 1}}));

    assert!(runtime.select_workspace("work").await.expect("select work"));
    assert!(!runtime.select_workspace("home").await.expect("select home"));
    assert_eq!(
        runtime.get_scope_value("home", "a", None).await,
        Some(json!({"b": 2, "c": "x"}))
    );

    assert!(matches!(
        runtime.select_workspace("missing").await,
        Err(RuntimeError::UnknownWorkspace(id)) if id == "missing"
    ));
}

#[tokio::test]
async fn templates_and_cursor_controls() {
    let runtime = default_runtime().await;
    let scope = runtime.current_scope().await.expect("scope");
    runtime
        .set_scope_value(&scope, "user", None, json!({"name": "Ada"}))
        .await;
    assert_eq!(
        runtime.render_template("Hello {{user.name}}", &scope).await,
        "Hello Ada"
    );
    assert_eq!(
        runtime.render_template("Hello {{missing.x}}", &scope).await,
        "Hello {{missing.x}}"
    );
    assert_eq!(
        runtime.render_template("Hello {{user.name}}", "inactive").await,
        "Hello {{user.name}}"
    );

    runtime
        .create_sequence("walk", SequenceKind::Scenario, "Walk", Vec::new())
        .await
        .expect("create");
    let first = runtime
        .create_step("walk", "echo", json!({"value": 1}))
        .await
        .expect("step");
    let second = runtime
        .create_step("walk", "set_value", json!({"values": {"done": true}}))
        .await
        .expect("step");
    assert!(second.order > first.order);

    runtime.open_sequence("walk").await.expect("open");
    assert!(matches!(
        runtime.advance().await.expect("advance"),
        RunOutcome::Advanced { cursor: 1 }
    ));
    assert_eq!(
        runtime.retreat().await.expect("retreat"),
        CursorMove::Moved { cursor: 0 }
    );
    assert_eq!(
        runtime.retreat().await.expect("retreat"),
        CursorMove::ExitSequence
    );
    assert!(matches!(
        runtime.advance().await,
        Err(RuntimeError::NoSequenceSelected)
    ));

    runtime.open_sequence("walk").await.expect("open");
    assert!(runtime.finish().await.expect("finish").is_completed());
    let sequence = runtime.sequence().await.expect("sequence");
    assert_eq!(sequence.cursor, 2);
    assert_eq!(sequence.steps[1].status, StepStatus::Pending);
    assert_eq!(runtime.get_scope_value(&scope, "done", None).await, None);

    let reordered = runtime
        .reorder_steps("walk", &[second.id.clone(), first.id.clone()])
        .await
        .expect("reorder");
    assert_eq!(reordered.steps[0].id, second.id);
    runtime.delete_step(&first.id).await.expect("delete");
    let reset = runtime.reset_sequence().await.expect("reset");
    assert_eq!(reset.len(), 1);
    assert_eq!(reset.cursor, 0);
}

#[tokio::test]
async fn handler_activation_controls_resolution() {
    let runtime = default_runtime().await;
    assert!(runtime.deactivate_handler("echo").await);
    assert!(!runtime.activate_handler("missing").await);
    runtime
        .create_sequence(
            "once",
            SequenceKind::Task,
            "Once",
            vec![step("e", "echo", 0).with_config(json!({"value": 1}))],
        )
        .await
        .expect("create");

    assert!(runtime.start_sequence("once").await.expect("run").is_failed());
    assert!(runtime.activate_handler("echo").await);
    assert!(runtime.retry_step().await.expect("retry").is_completed());

    let echo = runtime
        .list_handlers()
        .await
        .into_iter()
        .find(|h| h.type_tag == "echo")
        .expect("echo");
    assert!(echo.active);
    assert!(!echo.interactive);
}

#[derive(Default)]
struct PhaseRecorder {
    phases: Mutex<Vec<String>>,
}

#[async_trait]
impl RuntimeHook for PhaseRecorder {
    async fn on_progress(&self, ctx: &StepHookContext) -> Result<(), String> {
        self.phases
            .lock()
            .map_err(|e| e.to_string())?
            .push(ctx.phase.clone());
        Ok(())
    }
}

#[tokio::test]
async fn hooks_observe_engine_progress() {
    let hooks = Arc::new(HookRegistry::new());
    let recorder = Arc::new(PhaseRecorder::default());
    hooks.register(recorder.clone()).await;
    let runtime = Runtime::from_config_with_hooks(&ScenaristConfig::default(), hooks)
        .await
        .expect("runtime");
    runtime
        .create_sequence(
            "seen",
            SequenceKind::Task,
            "Seen",
            vec![
                step("e", "echo", 0).with_config(json!({"value": 1})),
                step("ask", "user_input", 1),
            ],
        )
        .await
        .expect("create");

    let outcome = runtime.start_sequence("seen").await.expect("run");
    let handle = outcome.handle().cloned().expect("handle");
    let resumed = runtime
        .resume(&handle, outputs(json!({"value": "ok"})))
        .await
        .expect("resume");
    assert!(resumed.map(|o| o.is_completed()).unwrap_or(false));
    assert!(runtime
        .resume(&handle, outputs(json!({"value": "late"})))
        .await
        .expect("stale resume")
        .is_none());

    let phases = recorder.phases.lock().map(|p| p.clone()).unwrap_or_default();
    assert_eq!(
        phases,
        vec![
            "step_started",
            "step_completed",
            "step_started",
            "step_waiting",
            "step_completed",
            "sequence_completed",
        ]
    );
}

#[tokio::test]
async fn step_ids_are_unique_across_sequences() {
    let runtime = default_runtime().await;
    runtime
        .create_sequence(
            "first",
            SequenceKind::Scenario,
            "First",
            vec![step("ask", "user_input", 0)],
        )
        .await
        .expect("create first");

    let clash = runtime
        .create_sequence(
            "second",
            SequenceKind::Scenario,
            "Second",
            vec![step("ask", "user_input", 0)],
        )
        .await;
    assert!(matches!(
        clash,
        Err(RuntimeError::Engine(EngineError::InvalidSequence(_)))
    ));
    assert!(runtime.start_sequence("first").await.expect("run").is_suspended());
    assert!(
        runtime
            .trigger_step_completion(&StepId::from("ask"), outputs(json!({"value": 1})))
            .await
    );
    assert_eq!(
        runtime.sequence().await.expect("sequence").status,
        SequenceStatus::Completed
    );
}

#[tokio::test]
async fn retreat_out_of_a_waiting_sequence_drops_its_resume() {
    let runtime = default_runtime().await;
    runtime
        .create_sequence(
            "quiz",
            SequenceKind::Scenario,
            "Quiz",
            vec![
                step("q", "user_input", 0),
                step("e", "echo", 1).with_config(json!({"value": 1})),
            ],
        )
        .await
        .expect("create");
    let outcome = runtime.start_sequence("quiz").await.expect("run");
    let handle = outcome.handle().cloned().expect("handle");

    assert_eq!(
        runtime.retreat().await.expect("retreat"),
        CursorMove::ExitSequence
    );
    assert_eq!(runtime.current_sequence().await, None);
    assert!(
        !runtime
            .trigger_step_completion(&StepId::from("q"), outputs(json!({"value": "late"})))
            .await
    );
    assert!(runtime
        .resume(&handle, outputs(json!({"value": "late"})))
        .await
        .expect("resume")
        .is_none());

    let sequence = runtime.open_sequence("quiz").await.expect("open");
    assert_eq!(sequence.cursor, 0);
    assert_eq!(sequence.steps[0].status, StepStatus::Pending);
    assert_ne!(sequence.status, SequenceStatus::Completed);
}

#[tokio::test]
async fn leaving_a_waiting_sequence_abandons_it() {
    let config = parse_config(
        r#"
workspaces:
  - id: home
  - id: work
"#,
    )
    .expect("config");
    let runtime = Runtime::from_config(&config).await.expect("runtime");
    runtime
        .create_sequence(
            "one",
            SequenceKind::Task,
            "One",
            vec![step("one-ask", "user_input", 0)],
        )
        .await
        .expect("create one");
    runtime
        .create_sequence(
            "two",
            SequenceKind::Task,
            "Two",
            vec![step("two-ask", "user_input", 0)],
        )
        .await
        .expect("create two");

    assert!(runtime.start_sequence("one").await.expect("run one").is_suspended());
    assert!(runtime.start_sequence("two").await.expect("run two").is_suspended());
    assert!(
        !runtime
            .trigger_step_completion(&StepId::from("one-ask"), outputs(json!({"value": 1})))
            .await
    );
    let one = runtime.engine().get_sequence("one").await.expect("one");
    assert_eq!(one.steps[0].status, StepStatus::Pending);

    runtime.select_workspace("work").await.expect("select work");
    assert_eq!(runtime.current_sequence().await, None);
    assert!(
        !runtime
            .trigger_step_completion(&StepId::from("two-ask"), outputs(json!({"value": 2})))
            .await
    );
    let two = runtime.engine().get_sequence("two").await.expect("two");
    assert_eq!(two.steps[0].status, StepStatus::Pending);
}
