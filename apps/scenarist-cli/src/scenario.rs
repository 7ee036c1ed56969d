//! Scenario file format played by the CLI.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::{bail, Context};
use serde::Deserialize;
use serde_json::Value;

use scenarist_core::types::{SequenceKind, Step, StepId};

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioFile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub kind: SequenceKind,
    /// Workspace to play in unless the command line picks one
    #[serde(default)]
    pub workspace: Option<String>,
    #[serde(default)]
    pub steps: Vec<ScenarioStep>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioStep {
    pub id: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub input_mapping: BTreeMap<String, String>,
    #[serde(default)]
    pub output_mapping: BTreeMap<String, String>,
}

impl ScenarioFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read scenario file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parse scenario file {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let scenario: ScenarioFile = serde_yaml::from_str(raw)?;
        scenario.validate()?;
        Ok(scenario)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.id.trim().is_empty() {
            bail!("scenario id must not be empty");
        }
        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                bail!("step id must not be empty");
            }
            if step.type_tag.trim().is_empty() {
                bail!("step '{}' has an empty type", step.id);
            }
            if !seen.insert(step.id.as_str()) {
                bail!("step id '{}' is used more than once", step.id);
            }
        }
        Ok(())
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Engine steps, ordered by their position in the file.
    pub fn to_steps(&self) -> Vec<Step> {
        self.steps
            .iter()
            .enumerate()
            .map(|(position, spec)| {
                let mut step = Step::new(
                    StepId::new(spec.id.clone()),
                    self.id.clone(),
                    spec.type_tag.clone(),
                )
                .with_order(position as u32)
                .with_config(spec.config.clone());
                step.input_mapping = spec.input_mapping.clone();
                step.output_mapping = spec.output_mapping.clone();
                step
            })
            .collect()
    }
}
