// ghexec-worker: runs GitHub Actions steps on the local machine.
//
// Architecture:
//   cli::execute → JobRunner::run_async → StepsRunner::run_async
//     → HandlerFactory → Handler::run_async → StepHost

pub mod action_command_manager;
pub mod action_manager;
pub mod action_manifest_manager;
pub mod cli;
pub mod environment;
pub mod execution_context;
pub mod expressions;
pub mod file_command_manager;
pub mod github_context;
pub mod handlers;
pub mod job_runner;
pub mod run_state;
pub mod runner_context;
pub mod steps_context;
pub mod steps_runner;
pub mod workflow;
