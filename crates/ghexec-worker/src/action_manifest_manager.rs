// Action metadata: the `action.yml` / `action.yaml` model and its loader.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use ghexec_common::constants;
use serde::{Deserialize, Serialize};

use crate::expressions::{ExprBool, ExprString};
use crate::workflow::Step;

/// The three passes an action step may take part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStage {
    Pre,
    Main,
    Post,
}

impl ActionStage {
    pub const ALL: [ActionStage; 3] = [ActionStage::Pre, ActionStage::Main, ActionStage::Post];
}

impl fmt::Display for ActionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ActionStage::Pre => "pre",
            ActionStage::Main => "main",
            ActionStage::Post => "post",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("No action manifest found in {0}. Expected action.yml or action.yaml.")]
    NotFound(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid action manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Parsed `action.yml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, ActionInput>,
    #[serde(default)]
    pub outputs: BTreeMap<String, ActionOutput>,
    pub runs: ActionRuns,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branding: Option<Branding>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ExprString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<ExprBool>,
    #[serde(default, rename = "deprecationMessage", skip_serializing_if = "Option::is_none")]
    pub deprecation_message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ExprString>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionRunsUsing {
    Composite,
    Docker,
    Node12,
    Node16,
    #[default]
    Node20,
    Node24,
}

impl ActionRunsUsing {
    pub fn is_node(self) -> bool {
        matches!(
            self,
            ActionRunsUsing::Node12
                | ActionRunsUsing::Node16
                | ActionRunsUsing::Node20
                | ActionRunsUsing::Node24
        )
    }
}

impl fmt::Display for ActionRunsUsing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ActionRunsUsing::Composite => "composite",
            ActionRunsUsing::Docker => "docker",
            ActionRunsUsing::Node12 => "node12",
            ActionRunsUsing::Node16 => "node16",
            ActionRunsUsing::Node20 => "node20",
            ActionRunsUsing::Node24 => "node24",
        })
    }
}

/// The `runs:` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ActionRuns {
    pub using: ActionRunsUsing,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, ExprString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_if: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_if: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_entrypoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_entrypoint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Branding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl Action {
    /// Script for `stage`, or `None` when the action declares nothing (or
    /// an empty path) for it.
    pub fn entrypoint(&self, stage: ActionStage) -> Option<&str> {
        let entry = match stage {
            ActionStage::Pre => self.runs.pre.as_deref(),
            ActionStage::Main => self.runs.main.as_deref(),
            ActionStage::Post => self.runs.post.as_deref(),
        };
        entry.filter(|e| !e.trim().is_empty())
    }
}

/// Loads action metadata from an action's directory.
pub struct ActionManifestManager;

impl ActionManifestManager {
    /// Load `action.yml`, else `action.yaml`, from the directory root.
    pub fn load_action(action_directory: &Path) -> Result<Action, ManifestError> {
        let candidates = [
            action_directory.join(constants::path::ACTION_MANIFEST_YML),
            action_directory.join(constants::path::ACTION_MANIFEST_YAML),
        ];
        let path = candidates
            .into_iter()
            .find(|p| p.is_file())
            .ok_or_else(|| ManifestError::NotFound(action_directory.to_path_buf()))?;

        let content = std::fs::read_to_string(&path).map_err(|source| ManifestError::Read {
            path: path.clone(),
            source,
        })?;
        Self::parse_action_yaml(&content).map_err(|source| ManifestError::Parse { path, source })
    }

    pub fn parse_action_yaml(content: &str) -> Result<Action, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expressions::ExprValue;

    #[test]
    fn test_parse_node_action() {
        let yaml = r#"
name: 'My Action'
author: octocat
description: 'A test action'
inputs:
  name:
    description: 'Name input'
    required: true
    default: 'world'
  token:
    default: ${{ github.token }}
    deprecationMessage: use GH_TOKEN
outputs:
  result:
    description: 'The result'
runs:
  using: 'node20'
  main: 'dist/index.js'
  pre: 'dist/setup.js'
  post: 'dist/cleanup.js'
  post-if: success()
branding:
  color: blue
  icon: box
"#;

        let def = ActionManifestManager::parse_action_yaml(yaml).unwrap();
        assert_eq!(def.name, "My Action");
        assert_eq!(def.author, "octocat");
        assert_eq!(def.runs.using, ActionRunsUsing::Node20);
        assert!(def.runs.using.is_node());
        assert_eq!(def.entrypoint(ActionStage::Main), Some("dist/index.js"));
        assert_eq!(def.entrypoint(ActionStage::Pre), Some("dist/setup.js"));
        assert_eq!(def.entrypoint(ActionStage::Post), Some("dist/cleanup.js"));
        assert_eq!(def.runs.post_if.as_deref(), Some("success()"));
        assert_eq!(def.inputs["name"].default, Some(ExprValue::Literal("world".into())));
        assert_eq!(def.inputs["name"].required, Some(ExprValue::Literal(true)));
        assert!(def.inputs["token"].default.as_ref().unwrap().is_expression());
        assert_eq!(def.inputs["token"].deprecation_message.as_deref(), Some("use GH_TOKEN"));
        assert!(def.outputs.contains_key("result"));
        assert_eq!(def.branding.unwrap().icon.as_deref(), Some("box"));
    }

    #[test]
    fn test_parse_composite_action() {
        let yaml = r#"
name: 'Composite Action'
runs:
  using: 'composite'
  steps:
    - id: greet
      run: echo "Hello ${{ inputs.who-to-greet }}"
      shell: bash
    - uses: actions/checkout@v4
"#;

        let def = ActionManifestManager::parse_action_yaml(yaml).unwrap();
        assert_eq!(def.runs.using, ActionRunsUsing::Composite);
        assert_eq!(def.runs.steps.len(), 2);
        assert_eq!(def.runs.steps[0].id.as_deref(), Some("greet"));
        assert_eq!(def.runs.steps[1].uses.as_deref(), Some("actions/checkout@v4"));
        assert_eq!(def.entrypoint(ActionStage::Main), None);
    }

    #[test]
    fn test_parse_docker_action() {
        let yaml = r#"
name: 'Docker Action'
runs:
  using: 'docker'
  image: 'Dockerfile'
  entrypoint: '/entrypoint.sh'
  args:
    - '--flag'
    - 'value'
  env:
    MY_VAR: hello
"#;

        let def = ActionManifestManager::parse_action_yaml(yaml).unwrap();
        assert_eq!(def.runs.using, ActionRunsUsing::Docker);
        assert_eq!(def.runs.image.as_deref(), Some("Dockerfile"));
        assert_eq!(def.runs.entrypoint.as_deref(), Some("/entrypoint.sh"));
        assert_eq!(def.runs.args, vec!["--flag", "value"]);
        assert_eq!(def.runs.env["MY_VAR"], ExprValue::Literal("hello".into()));
    }

    #[test]
    fn empty_entrypoint_counts_as_absent() {
        let def = ActionManifestManager::parse_action_yaml(
            "runs:\n  using: node16\n  main: index.js\n  post: ''\n",
        )
        .unwrap();
        assert_eq!(def.entrypoint(ActionStage::Post), None);
    }

    #[test]
    fn unknown_runtime_is_rejected() {
        assert!(ActionManifestManager::parse_action_yaml("runs:\n  using: python3\n").is_err());
        assert!(ActionManifestManager::parse_action_yaml("name: no runs\n").is_err());
    }

    #[test]
    fn load_prefers_yml_over_yaml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("action.yml"), "name: yml\nruns:\n  using: node20\n  main: a.js\n").unwrap();
        std::fs::write(dir.path().join("action.yaml"), "name: yaml\nruns:\n  using: node20\n  main: b.js\n").unwrap();

        let action = ActionManifestManager::load_action(dir.path()).unwrap();
        assert_eq!(action.name, "yml");
    }

    #[test]
    fn load_falls_back_to_yaml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("action.yaml"), "name: yaml\nruns:\n  using: node20\n  main: b.js\n").unwrap();

        let action = ActionManifestManager::load_action(dir.path()).unwrap();
        assert_eq!(action.name, "yaml");
    }

    #[test]
    fn load_without_manifest_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/action.yml"), "runs:\n  using: node20\n").unwrap();

        let err = ActionManifestManager::load_action(dir.path()).unwrap_err();
        assert!(matches!(err, ManifestError::NotFound(_)));
    }
}
