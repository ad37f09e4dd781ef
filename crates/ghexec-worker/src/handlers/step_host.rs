// StepHost: runs a step's process on the host and folds its output back
// into the execution context.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ghexec_sdk::trace::TracingTraceWriter;
use ghexec_sdk::{ProcessInvoker, ProcessStartInfo};

use crate::execution_context::ExecutionContext;
use crate::file_command_manager::FileCommandManager;
use crate::handlers::output_manager::OutputManager;

/// Trait for step execution hosts.
#[async_trait]
pub trait StepHost: Send + Sync {
    /// Run the process to completion, applying workflow and file commands.
    ///
    /// Fails when the process cannot start, exits non-zero or is cancelled.
    async fn execute_async(
        &self,
        context: &mut ExecutionContext<'_>,
        start_info: ProcessStartInfo,
    ) -> Result<()>;
}

/// Default step host - runs processes directly on the host OS.
#[derive(Debug, Default)]
pub struct DefaultStepHost;

impl DefaultStepHost {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StepHost for DefaultStepHost {
    async fn execute_async(
        &self,
        context: &mut ExecutionContext<'_>,
        start_info: ProcessStartInfo,
    ) -> Result<()> {
        let mut invoker = ProcessInvoker::new(Arc::new(TracingTraceWriter::new("step_host")));
        let mut stdout = invoker
            .take_stdout_receiver()
            .context("stdout receiver already taken")?;
        let cancel_token = context.cancel_token();
        let file_name = start_info.argv.first().cloned().unwrap_or_default();

        let mut output = OutputManager::new();
        let (outcome, ()) = tokio::join!(invoker.execute(start_info, cancel_token), async {
            while let Some(line) = stdout.recv().await {
                output.on_stdout_line(context, &line);
            }
        });

        let stderr = outcome.as_ref().map(|o| o.stderr.as_slice()).unwrap_or_default();
        for e in output.write_artifacts(&context.logs_directory(), stderr) {
            context.debug(&format!("Failed to write step log: {:#}", e));
        }

        let outcome = outcome.with_context(|| format!("Failed to run '{}'", file_name))?;

        let file_commands = if outcome.cancelled {
            Ok(())
        } else {
            FileCommandManager::process_file_commands(context)
        };

        if outcome.cancelled {
            context.error("The operation was canceled.");
        } else if outcome.exit_code != 0 {
            context.error(&format!("Process completed with exit code {}.", outcome.exit_code));
        }
        outcome.ensure_success()?;
        file_commands
    }
}
