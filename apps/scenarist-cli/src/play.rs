use std::collections::VecDeque;
use std::path::Path;

use anyhow::{bail, Context};
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use scenarist_core::handler::MessageRole;
use scenarist_runtime::{RunOutcome, Runtime};

use crate::scenario::ScenarioFile;

/// Where prompt answers come from
pub enum Answers {
    Scripted(VecDeque<String>),
    Stdin(Lines<BufReader<Stdin>>),
}

impl Answers {
    pub fn scripted(answers: Vec<String>) -> Self {
        Self::Scripted(answers.into())
    }

    pub fn stdin() -> Self {
        Self::Stdin(BufReader::new(tokio::io::stdin()).lines())
    }

    async fn next(&mut self) -> anyhow::Result<Option<String>> {
        match self {
            Answers::Scripted(answers) => {
                let answer = answers.pop_front();
                if let Some(answer) = &answer {
                    println!("> {}", answer);
                }
                Ok(answer)
            }
            Answers::Stdin(lines) => Ok(lines.next_line().await.context("read answer")?),
        }
    }
}

pub fn load_answers(path: &Path) -> anyhow::Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read answers file {}", path.display()))?;
    let answers = parse_answer_lines(&raw);
    if answers.is_empty() {
        bail!("answers file {} has no answer lines", path.display());
    }
    Ok(answers)
}

fn parse_answer_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(ToString::to_string)
        .collect()
}

/// Play a scenario to the end and print the final scope as JSON.
pub async fn play_scenario(
    runtime: &Runtime,
    scenario: ScenarioFile,
    answers: Answers,
) -> anyhow::Result<()> {
    let scope = play(runtime, &scenario, answers).await?;
    println!("{}", serde_json::to_string_pretty(&scope)?);
    Ok(())
}

async fn play(
    runtime: &Runtime,
    scenario: &ScenarioFile,
    mut answers: Answers,
) -> anyhow::Result<Value> {
    println!("=== {} ===", scenario.display_name());
    runtime
        .create_sequence(
            &scenario.id,
            scenario.kind,
            scenario.display_name(),
            scenario.to_steps(),
        )
        .await
        .with_context(|| format!("create sequence '{}'", scenario.id))?;

    let mut outcome = runtime.start_sequence(&scenario.id).await?;
    loop {
        outcome = match outcome {
            RunOutcome::Completed => break,
            RunOutcome::Advanced { .. } | RunOutcome::Yielded { .. } => runtime.run().await?,
            RunOutcome::Suspended {
                step_id,
                handle,
                prompt,
                ..
            } => {
                match runtime.preview_messages().await {
                    Ok(messages) => {
                        for message in messages {
                            println!("[{}] {}", role_label(message.role), message.content);
                        }
                    }
                    Err(err) => tracing::debug!(step_id = %step_id, error = %err, "no message preview"),
                }
                match prompt {
                    Some(prompt) => println!("? {}", prompt),
                    None => println!("? step '{}' is waiting", step_id),
                }
                let Some(answer) = answers.next().await? else {
                    bail!("no answer for step '{}'", step_id);
                };
                let mut outputs = Map::new();
                outputs.insert("value".to_string(), Value::String(answer));
                match runtime.resume(&handle, outputs).await? {
                    Some(next) => next,
                    None => bail!("step '{}' can no longer be resumed", step_id),
                }
            }
            RunOutcome::Failed { step_id, error } => {
                bail!("step '{}' failed: {}", step_id, error)
            }
        };
    }

    let scope_id = runtime.current_scope().await?;
    let scope = runtime.scope_snapshot(&scope_id).await.unwrap_or_default();
    Ok(Value::Object(scope))
}

fn role_label(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    }
}
