// The engine's live environment and the per-step environment built from it.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use ghexec_common::constants::{self, variables};

use crate::action_manifest_manager::Action;
use crate::expressions::EvaluationContext;
use crate::file_command_manager::FileCommandPaths;
use crate::run_state::StepState;

/// Environment owned by the runner for the duration of a run.
///
/// Starts as a copy of the process environment; `set-env`, `add-path` and
/// the `GITHUB_ENV`/`GITHUB_PATH` files mutate it so later steps see the
/// change. The process's own environment is never touched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunnerEnvironment {
    variables: BTreeMap<String, String>,
}

impl RunnerEnvironment {
    pub fn new(variables: BTreeMap<String, String>) -> Self {
        Self { variables }
    }

    pub fn from_process() -> Self {
        Self::new(std::env::vars().collect())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    /// Append `segment` to the end of `PATH`.
    pub fn append_path(&mut self, segment: &str) {
        let path = match self.get(constants::PATH_VARIABLE) {
            Some(current) if !current.is_empty() => {
                format!("{current}{}{segment}", constants::PATH_LIST_SEPARATOR)
            }
            _ => segment.to_string(),
        };
        self.set(constants::PATH_VARIABLE, path);
    }

    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }
}

fn input_variable(name: &str) -> String {
    format!(
        "{}{}",
        variables::INPUT_PREFIX,
        name.replace(' ', "_").to_uppercase()
    )
}

/// Compose the environment a step's process starts with.
///
/// Later layers win: the runner environment, the run env, saved state as
/// `STATE_*`, `with:` inputs as `INPUT_*`, action input defaults not given
/// in `with:`, the action's `runs.env`, the step's own `env`, and finally
/// the file command paths.
pub fn build_step_environment(
    current: &RunnerEnvironment,
    run_env: &BTreeMap<String, String>,
    step_state: &StepState,
    action: Option<&Action>,
    context: &EvaluationContext,
    file_commands: &FileCommandPaths,
) -> Result<BTreeMap<String, String>> {
    let mut env = current.variables().clone();

    env.extend(run_env.iter().map(|(k, v)| (k.clone(), v.clone())));

    for (key, value) in &step_state.state {
        env.insert(format!("{}{}", variables::STATE_PREFIX, key), value.clone());
    }

    if let Some(action) = action {
        for (name, value) in &step_state.step.with {
            let value = value
                .eval(context)
                .with_context(|| format!("Failed to evaluate input '{name}'"))?;
            env.insert(input_variable(name), value);
        }

        for (name, input) in &action.inputs {
            if step_state.step.with.contains_key(name) {
                continue;
            }
            let Some(default) = &input.default else {
                continue;
            };
            let value = default
                .eval(context)
                .with_context(|| format!("Failed to evaluate default for input '{name}'"))?;
            if !value.is_empty() {
                env.insert(input_variable(name), value);
            }
        }

        for (key, value) in &action.runs.env {
            let value = value
                .eval(context)
                .with_context(|| format!("Failed to evaluate action env '{key}'"))?;
            env.insert(key.clone(), value);
        }
    }

    for (key, value) in &step_state.step.env {
        let value = value
            .eval(context)
            .with_context(|| format!("Failed to evaluate env '{key}'"))?;
        env.insert(key.clone(), value);
    }

    for (name, path) in file_commands.variables() {
        env.insert(name.to_string(), path.to_string_lossy().to_string());
    }

    Ok(env)
}
