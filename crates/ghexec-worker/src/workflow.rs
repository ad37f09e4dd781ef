// Workflow, job and step documents, and loading workflows from a
// repository checkout.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ghexec_common::constants;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::expressions::{ExprBool, ExprFloat, ExprString};

/// One entry of a job's `steps:` list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Step {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, rename = "if", skip_serializing_if = "Option::is_none")]
    pub condition: Option<ExprBool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<ExprString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_on_error: Option<ExprBool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_minutes: Option<ExprFloat>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, ExprString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uses: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub with: BTreeMap<String, ExprString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<ExprString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<ExprString>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepType {
    Action,
    Run,
    Unknown,
}

impl Step {
    /// A step sets exactly one of `uses` and `run`; anything else is `Unknown`.
    pub fn step_type(&self) -> StepType {
        match (&self.uses, &self.run) {
            (Some(_), None) => StepType::Action,
            (None, Some(_)) => StepType::Run,
            _ => StepType::Unknown,
        }
    }

    /// Human-readable label for log headers: the name, else the action
    /// reference, else the first line of the script, else the id.
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.to_string();
        }
        if let Some(uses) = &self.uses {
            return uses.clone();
        }
        if let Some(run) = &self.run {
            let text = run.to_string();
            return text.lines().next().unwrap_or_default().trim().to_string();
        }
        self.id.clone().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub env: BTreeMap<String, ExprString>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default)]
    pub name: String,
    /// Location of the workflow file relative to the repository root.
    #[serde(skip)]
    pub path: PathBuf,
    #[serde(default)]
    pub env: BTreeMap<String, ExprString>,
    #[serde(default)]
    pub jobs: BTreeMap<String, Job>,
}

impl Workflow {
    pub fn parse(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse workflow YAML")
    }
}

/// Load every `*.yml`/`*.yaml` file directly inside `workflows_dir`
/// (default `.github/workflows`), relative to `repository_root`.
///
/// Workflows are keyed by name, or by their relative path when unnamed.
pub fn load_workflows(
    repository_root: &Path,
    workflows_dir: Option<&Path>,
) -> Result<BTreeMap<String, Workflow>> {
    let relative_dir = workflows_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(constants::path::WORKFLOWS_DIRECTORY));
    let dir = repository_root.join(&relative_dir);

    let mut workflows = BTreeMap::new();
    for entry in WalkDir::new(&dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to read workflows from '{}'", dir.display()))?;
        let path = entry.path();
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yml") | Some("yaml")
        );
        if !entry.file_type().is_file() || !is_yaml {
            continue;
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read workflow '{}'", path.display()))?;
        let mut workflow = Workflow::parse(&content)
            .with_context(|| format!("Invalid workflow '{}'", path.display()))?;
        workflow.path = relative_dir.join(entry.file_name());

        let key = if workflow.name.is_empty() {
            workflow.path.to_string_lossy().to_string()
        } else {
            workflow.name.clone()
        };
        tracing::debug!("Loaded workflow '{}' from {}", key, workflow.path.display());
        workflows.insert(key, workflow);
    }

    Ok(workflows)
}
