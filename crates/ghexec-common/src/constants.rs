// Constants shared by every ghexec crate: directory layout under the data
// home, well-known file names and environment variable names.

use std::fmt;

/// Well-known directories under the data home.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellKnownDirectory {
    Root,
    Actions,
    Scripts,
    Steps,
}

impl fmt::Display for WellKnownDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Well-known files under the data home.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellKnownFile {
    State,
    ExitCode,
}

impl fmt::Display for WellKnownFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(target_os = "windows")]
pub const PATH_VARIABLE: &str = "Path";
#[cfg(not(target_os = "windows"))]
pub const PATH_VARIABLE: &str = "PATH";

#[cfg(target_os = "windows")]
pub const PATH_LIST_SEPARATOR: &str = ";";
#[cfg(not(target_os = "windows"))]
pub const PATH_LIST_SEPARATOR: &str = ":";

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

pub const USER_AGENT: &str = concat!("ghexec/", env!("CARGO_PKG_VERSION"));

pub mod path {
    /// Fallback data home when neither `GHEXEC_DATA_HOME` nor `RUNNER_TEMP` is set.
    pub const DEFAULT_DATA_HOME: &str = "/home/runner/_temp/ghexec";
    /// Name of the data home directory under `RUNNER_TEMP`.
    pub const DATA_HOME_DIRECTORY: &str = "ghexec";

    pub const ACTIONS_DIRECTORY: &str = "actions";
    pub const SCRIPTS_DIRECTORY: &str = "scripts";
    pub const STEPS_DIRECTORY: &str = "steps";
    pub const FILE_COMMANDS_DIRECTORY: &str = "file_commands";
    pub const LOGS_DIRECTORY: &str = "logs";

    pub const STATE_FILE: &str = "state.json";
    pub const EXIT_CODE_FILE: &str = "exit-code";
    pub const RUN_SCRIPT_FILE: &str = "run.sh";

    pub const ACTION_MANIFEST_YML: &str = "action.yml";
    pub const ACTION_MANIFEST_YAML: &str = "action.yaml";

    pub const WORKFLOWS_DIRECTORY: &str = ".github/workflows";
}

/// File names inside a stage's `file_commands` directory.
pub mod file_commands {
    pub const ENV: &str = "env";
    pub const PATH: &str = "path";
    pub const STEP_SUMMARY: &str = "step_summary";
    pub const OUTPUT: &str = "output";
}

/// File names inside a stage's `logs` directory.
pub mod logs {
    pub const STDOUT: &str = "stdout.log";
    pub const STDERR: &str = "stderr.log";
    pub const WORKFLOW_COMMANDS: &str = "workflow_commands.log";
    pub const WORKFLOW_COMMANDS_JSON: &str = "workflow_commands.json";
}

pub mod variables {
    pub const DATA_HOME: &str = "GHEXEC_DATA_HOME";
    pub const RUNNER_TEMP: &str = "RUNNER_TEMP";
    pub const RUNNER_DEBUG: &str = "RUNNER_DEBUG";

    pub const GITHUB_TOKEN: &str = "GITHUB_TOKEN";
    pub const GITHUB_API_URL: &str = "GITHUB_API_URL";

    pub const GITHUB_ENV: &str = "GITHUB_ENV";
    pub const GITHUB_PATH: &str = "GITHUB_PATH";
    pub const GITHUB_STEP_SUMMARY: &str = "GITHUB_STEP_SUMMARY";
    pub const GITHUB_OUTPUT: &str = "GITHUB_OUTPUT";

    pub const INPUT_PREFIX: &str = "INPUT_";
    pub const STATE_PREFIX: &str = "STATE_";
}
