// OutputManager: consumes a step process's stdout line by line.
// Workflow commands are applied through ActionCommandManager; everything
// else is job output. Raw text is kept for the stage's log artifacts.

use std::path::Path;

use anyhow::{Context, Result};
use ghexec_common::constants::logs;
use ghexec_common::ActionCommand;
use ghexec_sdk::IOUtil;

use crate::action_command_manager::ActionCommandManager;
use crate::execution_context::ExecutionContext;

/// Processes output lines from step execution.
#[derive(Default)]
pub struct OutputManager {
    command_manager: ActionCommandManager,
    stdout: String,
    raw_commands: String,
    commands: Vec<ActionCommand>,
}

impl OutputManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a single line of stdout output.
    pub fn on_stdout_line(&mut self, context: &mut ExecutionContext<'_>, line: &str) {
        self.stdout.push_str(line);
        self.stdout.push('\n');

        match self.command_manager.try_process_command(context, line) {
            Some(command) => {
                self.raw_commands.push_str(line);
                self.raw_commands.push('\n');
                self.commands.push(command);
            }
            None => context.info(line),
        }
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn commands(&self) -> &[ActionCommand] {
        &self.commands
    }

    /// Write the non-empty captures into `logs_directory`.
    ///
    /// Every artifact is attempted; the failures are returned, not raised.
    pub fn write_artifacts(&self, logs_directory: &Path, stderr: &[u8]) -> Vec<anyhow::Error> {
        let mut artifacts: Vec<(&str, Result<Vec<u8>>)> = Vec::new();
        if !self.stdout.is_empty() {
            artifacts.push((logs::STDOUT, Ok(self.stdout.clone().into_bytes())));
        }
        if !stderr.is_empty() {
            artifacts.push((logs::STDERR, Ok(stderr.to_vec())));
        }
        if !self.raw_commands.is_empty() {
            artifacts.push((logs::WORKFLOW_COMMANDS, Ok(self.raw_commands.clone().into_bytes())));
        }
        if !self.commands.is_empty() {
            let json = serde_json::to_vec_pretty(&self.commands)
                .context("Failed to serialize workflow commands");
            artifacts.push((logs::WORKFLOW_COMMANDS_JSON, json));
        }

        artifacts
            .into_iter()
            .filter_map(|(name, contents)| {
                contents
                    .and_then(|bytes| IOUtil::write_file(&logs_directory.join(name), bytes))
                    .err()
            })
            .collect()
    }
}
