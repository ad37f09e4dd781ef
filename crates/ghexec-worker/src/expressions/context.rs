// The variables visible to `${{ }}` expressions while a job runs.

use std::collections::BTreeMap;

use anyhow::{Context as _, Result};
use serde::Serialize;

use super::{ExpressionError, Value, VariableProvider};
use crate::github_context::GitHubContext;
use crate::run_state::RunState;
use crate::runner_context::RunnerContext;
use crate::steps_context::StepResult;

/// The `job` context.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobContext {
    pub status: String,
}

/// The `strategy` context. Matrix expansion is not performed, so this
/// always describes a single job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct StrategyContext {
    pub fail_fast: bool,
    pub job_index: i64,
    pub job_total: i64,
    pub max_parallel: i64,
}

impl Default for StrategyContext {
    fn default() -> Self {
        Self {
            fail_fast: true,
            job_index: 0,
            job_total: 1,
            max_parallel: 1,
        }
    }
}

/// Snapshot of every namespace an expression may read.
///
/// Rebuilt from the run state and the live environment before each
/// evaluation so `steps` reflects results recorded so far.
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    pub github: GitHubContext,
    pub env: BTreeMap<String, String>,
    pub vars: BTreeMap<String, String>,
    pub job: JobContext,
    pub steps: BTreeMap<String, StepResult>,
    pub runner: RunnerContext,
    pub secrets: BTreeMap<String, String>,
    pub strategy: StrategyContext,
    pub matrix: BTreeMap<String, serde_json::Value>,
    pub needs: BTreeMap<String, serde_json::Value>,
}

impl EvaluationContext {
    /// Build the context for a run. `environment` is the engine's current
    /// environment, which feeds the `github` and `runner` contexts.
    pub fn for_run(state: &RunState, environment: &BTreeMap<String, String>) -> Result<Self> {
        let github = GitHubContext::from_environment(environment)
            .context("Failed to build github context")?;

        let steps = state
            .step_order
            .iter()
            .filter_map(|id| state.steps.get(id).map(|s| (id.clone(), s.result.clone())))
            .collect();

        Ok(Self {
            github,
            env: state.env.clone(),
            job: JobContext {
                status: "success".to_string(),
            },
            steps,
            runner: RunnerContext::from_environment(environment),
            ..Default::default()
        })
    }
}

impl EvaluationContext {
    /// Context for evaluating `step_id`'s own fields. The step is left out
    /// of `steps`: its result is still being produced.
    pub fn for_step(
        state: &RunState,
        step_id: &str,
        environment: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let mut context = Self::for_run(state, environment)?;
        context.steps.remove(step_id);
        Ok(context)
    }
}

fn to_value<T: Serialize>(name: &str, data: &T) -> Result<Value, ExpressionError> {
    serde_json::to_value(data)
        .map(Value::from)
        .map_err(|e| ExpressionError::InvalidArguments {
            function: name.to_string(),
            message: e.to_string(),
        })
}

impl VariableProvider for EvaluationContext {
    fn get_variable(&self, name: &str) -> Result<Value, ExpressionError> {
        match name {
            "github" => to_value(name, &self.github),
            "env" => Ok(Value::from(self.env.clone())),
            "vars" => Ok(Value::from(self.vars.clone())),
            "job" => to_value(name, &self.job),
            "steps" => to_value(name, &self.steps),
            "runner" => to_value(name, &self.runner),
            "secrets" => Ok(Value::from(self.secrets.clone())),
            "strategy" => to_value(name, &self.strategy),
            "matrix" => to_value(name, &self.matrix),
            "needs" => to_value(name, &self.needs),
            "infinity" => Ok(Value::Number(f64::INFINITY)),
            "nan" => Ok(Value::Number(f64::NAN)),
            _ => Err(ExpressionError::UnknownVariable(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expressions::{interpolate, ExprBool, ExprString};
    use crate::steps_context::StepStatus;
    use crate::workflow::Step;

    fn state_with_output() -> RunState {
        let mut state = RunState::default();
        state.env.insert("GREETING".into(), "hello".into());
        state
            .add_step(Step {
                id: Some("build".into()),
                run: Some("make".into()),
                ..Default::default()
            })
            .unwrap();
        let build = state.steps.get_mut("build").unwrap();
        build.result.set_status(StepStatus::Success);
        build.result.outputs.insert("artifact".into(), "app.tar".into());
        state
    }

    fn environment() -> BTreeMap<String, String> {
        [("GITHUB_REPOSITORY", "octo/hello"), ("RUNNER_OS", "Linux")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn resolves_each_namespace() {
        let ctx = EvaluationContext::for_run(&state_with_output(), &environment()).unwrap();

        let text = interpolate(
            "${{ env.GREETING }} ${{ github.repository }} ${{ runner.os }} \
             ${{ steps.build.outputs.artifact }} ${{ steps.build.outcome }} \
             ${{ job.status }} ${{ strategy.job-total }}",
            &ctx,
        )
        .unwrap();
        assert_eq!(text, "hello octo/hello Linux app.tar success success 1");
    }

    #[test]
    fn empty_namespaces_resolve_to_empty_objects() {
        let ctx = EvaluationContext::default();
        for name in ["vars", "secrets", "matrix", "needs"] {
            assert_eq!(ctx.get_variable(name).unwrap(), Value::Object(BTreeMap::new()));
        }
        assert_eq!(interpolate("[${{ secrets.TOKEN }}]", &ctx).unwrap(), "[]");
    }

    #[test]
    fn numeric_constants() {
        let ctx = EvaluationContext::default();
        assert_eq!(ctx.get_variable("infinity").unwrap(), Value::Number(f64::INFINITY));
        assert!(matches!(ctx.get_variable("nan").unwrap(), Value::Number(n) if n.is_nan()));
    }

    #[test]
    fn unknown_namespace_is_an_error() {
        let ctx = EvaluationContext::default();
        assert_eq!(
            ctx.get_variable("inputs"),
            Err(ExpressionError::UnknownVariable("inputs".into()))
        );

        let value = ExprString::from("${{ inputs.name }}");
        assert!(value.eval(&ctx).is_err());
    }

    #[test]
    fn typed_values_evaluate_against_context() {
        let ctx = EvaluationContext::for_run(&state_with_output(), &environment()).unwrap();

        let cond = ExprBool::from_text("${{ steps.build.outcome == 'success' }}").unwrap();
        assert!(cond.eval(&ctx).unwrap());

        let mismatch = ExprBool::from_text("${{ env.GREETING }}").unwrap();
        assert!(mismatch.eval(&ctx).is_err());
    }

    #[test]
    fn pending_steps_have_no_outcome() {
        let mut state = state_with_output();
        state
            .add_step(Step {
                run: Some("later".into()),
                ..Default::default()
            })
            .unwrap();
        let ctx = EvaluationContext::for_run(&state, &BTreeMap::new()).unwrap();
        assert_eq!(interpolate("[${{ steps['1'].outcome }}]", &ctx).unwrap(), "[]");
    }

    #[test]
    fn step_does_not_see_its_own_result() {
        let mut state = state_with_output();
        state
            .add_step(Step {
                id: Some("deploy".into()),
                run: Some("ship".into()),
                ..Default::default()
            })
            .unwrap();
        let deploy = state.steps.get_mut("deploy").unwrap();
        deploy.result.outputs.insert("secret".into(), "from-pre".into());

        let ctx = EvaluationContext::for_step(&state, "deploy", &BTreeMap::new()).unwrap();
        assert_eq!(
            interpolate("[${{ steps.deploy.outputs.secret }}]", &ctx).unwrap(),
            "[]"
        );
        assert_eq!(
            interpolate("${{ steps.build.outputs.artifact }}", &ctx).unwrap(),
            "app.tar"
        );
    }
}
