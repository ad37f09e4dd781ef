// NodeScriptActionHandler: executes JavaScript actions with the `node`
// found on the step's PATH.

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use ghexec_sdk::ProcessStartInfo;

use crate::execution_context::ExecutionContext;
use crate::handlers::handler::{Handler, HandlerData};
use crate::handlers::step_host::{DefaultStepHost, StepHost};

/// Handler for Node.js-based actions (node12, node16, node20, node24).
pub struct NodeScriptActionHandler {
    action_directory: PathBuf,
    /// The stage's script, relative to the action directory.
    entrypoint: String,
}

impl NodeScriptActionHandler {
    pub fn new(action_directory: PathBuf, entrypoint: String) -> Self {
        Self {
            action_directory,
            entrypoint,
        }
    }

    pub fn argv(&self) -> Vec<String> {
        vec![
            "node".to_string(),
            self.action_directory
                .join(&self.entrypoint)
                .to_string_lossy()
                .to_string(),
        ]
    }
}

#[async_trait]
impl Handler for NodeScriptActionHandler {
    async fn run_async(&self, context: &mut ExecutionContext<'_>, data: HandlerData) -> Result<()> {
        let argv = self.argv();
        context.debug(&format!("Script: {}", argv[1]));

        let mut start_info = ProcessStartInfo::new(argv);
        start_info.environment = data.environment;
        start_info.environment.insert(
            "GITHUB_ACTION_PATH".to_string(),
            self.action_directory.to_string_lossy().to_string(),
        );
        start_info.working_directory = data.working_directory;

        DefaultStepHost::new().execute_async(context, start_info).await
    }
}
