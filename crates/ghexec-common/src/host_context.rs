// HostContext: where ghexec keeps its files, and the process-wide
// shutdown token.

use crate::constants::{self, WellKnownDirectory, WellKnownFile};

use std::collections::HashMap;
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Directory resolution and shutdown coordination shared by every component.
///
/// The data home is resolved once at construction:
/// `GHEXEC_DATA_HOME`, else `$RUNNER_TEMP/ghexec`, else
/// `/home/runner/_temp/ghexec`.
pub struct HostContext {
    root: PathBuf,
    shutdown_token: CancellationToken,
}

impl HostContext {
    /// Create a context rooted at the data home resolved from the process environment.
    pub fn new() -> Arc<Self> {
        let vars: HashMap<String, String> = env::vars().collect();
        Self::with_root(Self::resolve_data_home(&vars))
    }

    /// Create a context rooted at `root` (used by tests).
    pub fn with_root(root: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            root: root.into(),
            shutdown_token: CancellationToken::new(),
        })
    }

    /// Resolve the data home from a set of environment variables.
    pub fn resolve_data_home(vars: &HashMap<String, String>) -> PathBuf {
        let non_empty = |name: &str| vars.get(name).filter(|v| !v.is_empty());

        if let Some(home) = non_empty(constants::variables::DATA_HOME) {
            return PathBuf::from(home);
        }
        if let Some(temp) = non_empty(constants::variables::RUNNER_TEMP) {
            return PathBuf::from(temp).join(constants::path::DATA_HOME_DIRECTORY);
        }
        PathBuf::from(constants::path::DEFAULT_DATA_HOME)
    }

    pub fn get_directory(&self, directory: WellKnownDirectory) -> PathBuf {
        match directory {
            WellKnownDirectory::Root => self.root.clone(),
            WellKnownDirectory::Actions => self.root.join(constants::path::ACTIONS_DIRECTORY),
            WellKnownDirectory::Scripts => self.root.join(constants::path::SCRIPTS_DIRECTORY),
            WellKnownDirectory::Steps => self.root.join(constants::path::STEPS_DIRECTORY),
        }
    }

    pub fn get_file(&self, file: WellKnownFile) -> PathBuf {
        match file {
            WellKnownFile::State => self.root.join(constants::path::STATE_FILE),
            WellKnownFile::ExitCode => self.root.join(constants::path::EXIT_CODE_FILE),
        }
    }

    /// `steps/<id>/<stage>`: parent of a stage's `file_commands` and `logs` directories.
    pub fn step_stage_directory(&self, step_id: &str, stage: impl Display) -> PathBuf {
        self.get_directory(WellKnownDirectory::Steps)
            .join(step_id)
            .join(stage.to_string())
    }

    /// `scripts/<id>/run.sh`
    pub fn step_script_file(&self, step_id: &str) -> PathBuf {
        self.get_directory(WellKnownDirectory::Scripts)
            .join(step_id)
            .join(constants::path::RUN_SCRIPT_FILE)
    }

    /// Token cancelled when ghexec is asked to stop (Ctrl-C).
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn shutdown(&self, reason: &str) {
        tracing::info!("ghexec will be shut down: {}", reason);
        self.shutdown_token.cancel();
    }
}
