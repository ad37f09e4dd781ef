// ExecutionContext: the mutable view of the run a single step stage works
// through. Holds the step being run, the live environment, the job logger
// and the cancellation token.

use std::path::PathBuf;

use ghexec_common::constants;
use ghexec_common::{Annotation, HostContext, JobLogger};
use tokio_util::sync::CancellationToken;

use crate::action_manifest_manager::ActionStage;
use crate::environment::RunnerEnvironment;
use crate::run_state::StepState;

/// Context for one step at one stage.
///
/// Borrowed from the runner for the duration of the stage so that command
/// processing writes straight into the run's state.
pub struct ExecutionContext<'a> {
    host: &'a HostContext,
    pub step: &'a mut StepState,
    pub environment: &'a mut RunnerEnvironment,
    logger: &'a JobLogger,
    stage: ActionStage,
    cancel_token: CancellationToken,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        host: &'a HostContext,
        step: &'a mut StepState,
        environment: &'a mut RunnerEnvironment,
        logger: &'a JobLogger,
        stage: ActionStage,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            host,
            step,
            environment,
            logger,
            stage,
            cancel_token,
        }
    }

    pub fn host(&self) -> &HostContext {
        self.host
    }

    pub fn logger(&self) -> &JobLogger {
        self.logger
    }

    pub fn step_id(&self) -> &str {
        self.step.id()
    }

    pub fn stage(&self) -> ActionStage {
        self.stage
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// `steps/<id>/<stage>`
    pub fn stage_directory(&self) -> PathBuf {
        self.host.step_stage_directory(self.step_id(), self.stage)
    }

    pub fn file_commands_directory(&self) -> PathBuf {
        self.stage_directory().join(constants::path::FILE_COMMANDS_DIRECTORY)
    }

    pub fn logs_directory(&self) -> PathBuf {
        self.stage_directory().join(constants::path::LOGS_DIRECTORY)
    }

    // -- State mutation --------------------------------------------------

    pub fn set_output(&mut self, name: &str, value: &str) {
        self.step
            .result
            .outputs
            .insert(name.to_string(), value.to_string());
    }

    pub fn save_state(&mut self, name: &str, value: &str) {
        self.step.state.insert(name.to_string(), value.to_string());
    }

    pub fn set_env(&mut self, name: &str, value: &str) {
        self.environment.set(name, value);
    }

    pub fn add_path(&mut self, segment: &str) {
        self.environment.append_path(segment);
    }

    // -- Logging ---------------------------------------------------------

    pub fn info(&self, message: &str) {
        self.logger.info(message);
    }

    pub fn debug(&self, message: &str) {
        self.logger.debug(message);
    }

    pub fn warning(&self, message: &str) {
        self.logger.warning(message, &Annotation::default());
    }

    pub fn error(&self, message: &str) {
        self.logger.error(message, &Annotation::default());
    }
}
