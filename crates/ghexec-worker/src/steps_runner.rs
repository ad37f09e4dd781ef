// StepsRunner: runs every registered step through the pre, main and post
// stages, in registration order, stopping at the first failure.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use ghexec_common::constants;
use ghexec_common::{HostContext, JobLogger};
use tokio_util::sync::CancellationToken;

use crate::action_manager::ActionManager;
use crate::action_manifest_manager::ActionStage;
use crate::environment::{build_step_environment, RunnerEnvironment};
use crate::execution_context::ExecutionContext;
use crate::expressions::EvaluationContext;
use crate::file_command_manager::FileCommandManager;
use crate::handlers::{HandlerData, HandlerFactory};
use crate::run_state::RunState;
use crate::steps_context::StepStatus;
use crate::workflow::StepType;

/// What happened to one step at one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Succeeded,
    Skipped,
}

/// Executes all steps in a job, in order.
pub struct StepsRunner {
    host: Arc<HostContext>,
    action_manager: ActionManager,
    logger: JobLogger,
}

impl StepsRunner {
    pub fn new(host: Arc<HostContext>, action_manager: ActionManager) -> Self {
        Self {
            host,
            action_manager,
            logger: JobLogger::new(),
        }
    }

    /// Run the job: set up, then one full pass over the steps per stage.
    ///
    /// Returns the first failure; step results up to that point are kept
    /// in `state`.
    pub async fn run_async(
        &self,
        state: &mut RunState,
        environment: &mut RunnerEnvironment,
        cancel_token: CancellationToken,
    ) -> Result<()> {
        self.set_up_job(state).await?;

        for stage in ActionStage::ALL {
            for id in state.step_order.clone() {
                if cancel_token.is_cancelled() {
                    bail!("run was cancelled");
                }
                self.run_step(state, environment, &id, stage, cancel_token.clone())
                    .await
                    .with_context(|| format!("Step '{}' failed at {} stage", id, stage))?;
            }
        }

        Ok(())
    }

    /// Validate every step and resolve every action before anything runs.
    async fn set_up_job(&self, state: &mut RunState) -> Result<()> {
        self.logger.start_group("Set up job");
        let result = self.resolve_actions(state).await;
        self.logger.end_group();
        result
    }

    async fn resolve_actions(&self, state: &mut RunState) -> Result<()> {
        for id in state.step_order.clone() {
            let step = &state
                .steps
                .get(&id)
                .with_context(|| format!("step with id {} does not exist", id))?
                .step;

            let uses = match step.step_type() {
                StepType::Run => continue,
                StepType::Unknown => bail!("step {} must set exactly one of 'uses' and 'run'", id),
                StepType::Action => step.uses.clone().unwrap_or_default(),
            };

            match self.action_manager.resolve(state, &uses).await {
                Ok(action) => {
                    self.logger.info(&format!(
                        "Prepared action '{}' ({})",
                        uses,
                        action.metadata.runs.using
                    ));
                    if !HandlerFactory::is_supported(action.metadata.runs.using) {
                        self.logger.debug(&format!(
                            "Action '{}' uses '{}', which cannot be executed",
                            uses, action.metadata.runs.using
                        ));
                    }
                }
                Err(e) => {
                    mark(state, &id, StepStatus::Failure);
                    return Err(e.context(format!("Failed to prepare action for step '{}'", id)));
                }
            }
        }
        Ok(())
    }

    /// Run a single step at `stage`, recording its status unless skipped.
    pub async fn run_step(
        &self,
        state: &mut RunState,
        environment: &mut RunnerEnvironment,
        id: &str,
        stage: ActionStage,
        cancel_token: CancellationToken,
    ) -> Result<StageOutcome> {
        match self.execute_step(state, environment, id, stage, cancel_token).await {
            Ok(StageOutcome::Skipped) => Ok(StageOutcome::Skipped),
            Ok(StageOutcome::Succeeded) => {
                mark(state, id, StepStatus::Success);
                Ok(StageOutcome::Succeeded)
            }
            Err(e) => {
                mark(state, id, StepStatus::Failure);
                Err(e)
            }
        }
    }

    async fn execute_step(
        &self,
        state: &mut RunState,
        environment: &mut RunnerEnvironment,
        id: &str,
        stage: ActionStage,
        cancel_token: CancellationToken,
    ) -> Result<StageOutcome> {
        let step_state = state
            .steps
            .get(id)
            .with_context(|| format!("step with id {} does not exist", id))?;
        let step = &step_state.step;
        let action = step.uses.as_deref().and_then(|uses| state.actions.get(uses));

        if step.condition.is_some() || step.continue_on_error.is_some() {
            self.logger.debug(&format!(
                "Step '{}' declares 'if' or 'continue-on-error'; neither is evaluated",
                id
            ));
        }

        let eval = EvaluationContext::for_step(state, id, environment.variables())?;
        let Some(handler) = HandlerFactory::create(step_state, action, stage, &eval)? else {
            self.logger
                .debug(&format!("Skipping step '{}' at {} stage", id, stage));
            return Ok(StageOutcome::Skipped);
        };

        let file_commands_dir = self
            .host
            .step_stage_directory(id, stage)
            .join(constants::path::FILE_COMMANDS_DIRECTORY);
        let paths = FileCommandManager::initialize_file_commands(&file_commands_dir)?;

        let step_env = build_step_environment(
            environment,
            &state.env,
            step_state,
            action.map(|a| &a.metadata),
            &eval,
            &paths,
        )?;
        let working_directory = match &step.working_directory {
            Some(dir) => Some(PathBuf::from(
                dir.eval(&eval).context("Failed to evaluate working-directory")?,
            )),
            None => None,
        };
        let title = group_title(stage, &step.display_name());

        let step_state = state
            .steps
            .get_mut(id)
            .with_context(|| format!("step with id {} does not exist", id))?;
        let mut context = ExecutionContext::new(
            &self.host,
            step_state,
            environment,
            &self.logger,
            stage,
            cancel_token,
        );

        self.logger.start_group(&title);
        let data = HandlerData {
            environment: step_env,
            working_directory,
        };
        let result = handler.run_async(&mut context, data).await;
        self.logger.end_group();

        result.map(|()| StageOutcome::Succeeded)
    }
}

fn mark(state: &mut RunState, id: &str, status: StepStatus) {
    if let Some(step) = state.steps.get_mut(id) {
        step.result.set_status(status);
    }
}

fn group_title(stage: ActionStage, name: &str) -> String {
    match stage {
        ActionStage::Pre => format!("Pre Run {}", name),
        ActionStage::Main => format!("Run {}", name),
        ActionStage::Post => format!("Post Run {}", name),
    }
}
