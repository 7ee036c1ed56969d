use std::env;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};

use scenarist_runtime::Runtime;

use crate::play::{load_answers, play_scenario, Answers};
use crate::scenario::ScenarioFile;

const DEFAULT_CONFIG: &str = "configs/scenarist.yaml";

#[derive(Debug, Parser)]
#[command(name = "scenarist", about = "Scenarist scenario player")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Play a scenario file, answering prompts from stdin
    Run(RunArgs),
    /// Report steps whose type has no active handler
    Check(CheckArgs),
    /// List registered handlers
    Handlers(HandlersArgs),
}

#[derive(Debug, Args, Clone)]
struct RunArgs {
    #[arg(long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,
    /// Workspace to play in; overrides the scenario's own
    #[arg(long)]
    workspace: Option<String>,
    /// Read prompt answers from file (one per line; '#' comments supported)
    #[arg(long)]
    answers: Option<PathBuf>,
    #[arg(long)]
    verbose: bool,
    #[arg(value_name = "SCENARIO")]
    scenario: PathBuf,
}

#[derive(Debug, Args, Clone)]
struct CheckArgs {
    #[arg(long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,
    #[arg(value_name = "SCENARIO")]
    scenario: PathBuf,
}

#[derive(Debug, Args, Clone)]
struct HandlersArgs {
    #[arg(long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,
    /// Print as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Run(args) => {
                ensure_log_filter(args.verbose);
                let scenario = ScenarioFile::load(&args.scenario)?;
                let answers = match &args.answers {
                    Some(path) => Answers::scripted(load_answers(path)?),
                    None => Answers::stdin(),
                };
                let runtime = build_runtime(&args.config).await?;
                let workspace = args.workspace.or_else(|| scenario.workspace.clone());
                if let Some(workspace) = workspace {
                    runtime
                        .select_workspace(&workspace)
                        .await
                        .with_context(|| format!("select workspace '{}'", workspace))?;
                }
                play_scenario(&runtime, scenario, answers).await
            }
            Command::Check(args) => {
                ensure_log_filter(false);
                let scenario = ScenarioFile::load(&args.scenario)?;
                let runtime = build_runtime(&args.config).await?;
                check_scenario(&runtime, &scenario).await
            }
            Command::Handlers(args) => {
                ensure_log_filter(false);
                let runtime = build_runtime(&args.config).await?;
                list_handlers(&runtime, args.json).await
            }
        }
    }
}

async fn build_runtime(config: &Path) -> anyhow::Result<Runtime> {
    Runtime::from_config_path(config)
        .await
        .with_context(|| format!("build runtime from {}", config.display()))
}

async fn check_scenario(runtime: &Runtime, scenario: &ScenarioFile) -> anyhow::Result<()> {
    let handlers = runtime.list_handlers().await;
    let mut problems = 0usize;
    for step in &scenario.steps {
        match handlers.iter().find(|h| h.type_tag == step.type_tag) {
            Some(handler) if handler.active => {}
            Some(_) => {
                problems += 1;
                println!("step '{}': handler '{}' is inactive", step.id, step.type_tag);
            }
            None => {
                problems += 1;
                println!("step '{}': no handler for type '{}'", step.id, step.type_tag);
            }
        }
    }
    if problems > 0 {
        bail!(
            "scenario '{}' has {} step(s) that cannot run",
            scenario.id,
            problems
        );
    }
    println!(
        "scenario '{}' ok ({} steps)",
        scenario.id,
        scenario.steps.len()
    );
    Ok(())
}

async fn list_handlers(runtime: &Runtime, json: bool) -> anyhow::Result<()> {
    let handlers = runtime.list_handlers().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&handlers)?);
        return Ok(());
    }
    for handler in handlers {
        let mut flags = Vec::new();
        if !handler.active {
            flags.push("inactive");
        }
        if handler.interactive {
            flags.push("interactive");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };
        println!("{}{}  {}", handler.type_tag, flags, handler.description);
    }
    Ok(())
}

fn ensure_log_filter(verbose: bool) {
    if env::var("RUST_LOG").is_ok() {
        return;
    }
    env::set_var("RUST_LOG", if verbose { "debug" } else { "warn" });
}
