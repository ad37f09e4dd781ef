// ScriptHandler: executes inline `run:` scripts by writing them to the
// step's script file and invoking the selected shell on it.

use std::path::Path;

use anyhow::{bail, Result};
use async_trait::async_trait;
use ghexec_sdk::{IOUtil, ProcessStartInfo};

use crate::execution_context::ExecutionContext;
use crate::handlers::handler::{Handler, HandlerData};
use crate::handlers::step_host::{DefaultStepHost, StepHost};

/// Script handler for `run:` steps.
pub struct ScriptHandler {
    /// The evaluated `run` text.
    script: String,
    shell: Option<String>,
}

impl ScriptHandler {
    pub fn new(script: String, shell: Option<String>) -> Self {
        Self { script, shell }
    }
}

#[async_trait]
impl Handler for ScriptHandler {
    async fn run_async(&self, context: &mut ExecutionContext<'_>, data: HandlerData) -> Result<()> {
        let script_file = context.host().step_script_file(context.step_id());
        IOUtil::write_executable(&script_file, format!("#!/bin/bash\n{}", self.script))?;
        context.debug(&format!("Script file: {}", script_file.display()));

        let shell = self
            .shell
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| ScriptHandlerHelpers::get_default_shell());
        let argv = ScriptHandlerHelpers::shell_argv(shell, &script_file)?;
        context.debug(&format!("Shell: {}", argv.join(" ")));

        let mut start_info = ProcessStartInfo::new(argv);
        start_info.environment = data.environment;
        start_info.working_directory = data.working_directory;

        DefaultStepHost::new().execute_async(context, start_info).await
    }
}

/// Helper functions for shell resolution.
pub struct ScriptHandlerHelpers;

impl ScriptHandlerHelpers {
    pub fn get_default_shell() -> &'static str {
        "bash"
    }

    /// Build the argument vector that runs `script` with `shell`.
    ///
    /// - `bash` → `bash --noprofile --norc -e -o pipefail <script>`
    /// - `sh` → `sh -e <script>`
    /// - `python` → `python <script>`
    /// - anything else must contain `{0}`, which is replaced by the script
    ///   path after splitting on whitespace.
    pub fn shell_argv(shell: &str, script: &Path) -> Result<Vec<String>> {
        let script = script.to_string_lossy().to_string();
        let argv = match shell.trim() {
            "bash" => vec![
                "bash".to_string(),
                "--noprofile".to_string(),
                "--norc".to_string(),
                "-e".to_string(),
                "-o".to_string(),
                "pipefail".to_string(),
                script,
            ],
            "sh" => vec!["sh".to_string(), "-e".to_string(), script],
            "python" => vec!["python".to_string(), script],
            custom if custom.contains("{0}") => custom
                .split_whitespace()
                .map(|part| part.replace("{0}", &script))
                .collect(),
            other => bail!(
                "Invalid shell option '{}'. A custom shell must reference the script as {{0}}.",
                other
            ),
        };
        Ok(argv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action_manifest_manager::ActionStage;
    use crate::environment::RunnerEnvironment;
    use crate::run_state::StepState;
    use crate::workflow::Step;
    use ghexec_common::{HostContext, JobLogger};
    use std::collections::BTreeMap;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_bash_argv() {
        let argv = ScriptHandlerHelpers::shell_argv("bash", Path::new("/s/run.sh")).unwrap();
        assert_eq!(
            argv,
            vec!["bash", "--noprofile", "--norc", "-e", "-o", "pipefail", "/s/run.sh"]
        );
    }

    #[test]
    fn test_sh_and_python_argv() {
        assert_eq!(
            ScriptHandlerHelpers::shell_argv("sh", Path::new("/s/run.sh")).unwrap(),
            vec!["sh", "-e", "/s/run.sh"]
        );
        assert_eq!(
            ScriptHandlerHelpers::shell_argv("python", Path::new("/s/run.sh")).unwrap(),
            vec!["python", "/s/run.sh"]
        );
    }

    #[test]
    fn test_custom_shell() {
        let argv =
            ScriptHandlerHelpers::shell_argv("perl -w {0}", Path::new("/s/run.sh")).unwrap();
        assert_eq!(argv, vec!["perl", "-w", "/s/run.sh"]);
        assert!(ScriptHandlerHelpers::shell_argv("zsh", Path::new("/s/run.sh")).is_err());
    }

    #[test]
    fn test_default_shell() {
        assert_eq!(ScriptHandlerHelpers::get_default_shell(), "bash");
    }

    #[tokio::test]
    async fn writes_script_and_runs_it() {
        let dir = tempfile::tempdir().unwrap();
        let host = HostContext::with_root(dir.path());
        let logger = JobLogger::new();
        let mut step = StepState::new(Step {
            id: Some("greet".into()),
            run: Some("echo hi".into()),
            ..Default::default()
        });
        let mut env = RunnerEnvironment::default();
        let mut context = ExecutionContext::new(
            &host,
            &mut step,
            &mut env,
            &logger,
            ActionStage::Main,
            CancellationToken::new(),
        );

        let work = dir.path().join("work");
        std::fs::create_dir_all(&work).unwrap();
        let data = HandlerData {
            environment: BTreeMap::from([
                ("PATH".to_string(), std::env::var("PATH").unwrap_or_default()),
                ("WHO".to_string(), "world".to_string()),
            ]),
            working_directory: Some(work.clone()),
        };

        ScriptHandler::new("echo \"hi $WHO from $(pwd)\"".into(), Some("sh".into()))
            .run_async(&mut context, data)
            .await
            .unwrap();

        let script = dir.path().join("scripts/greet/run.sh");
        assert_eq!(
            std::fs::read_to_string(&script).unwrap(),
            "#!/bin/bash\necho \"hi $WHO from $(pwd)\""
        );
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&script).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
        let stdout = std::fs::read_to_string(dir.path().join("steps/greet/main/logs/stdout.log")).unwrap();
        assert_eq!(stdout, format!("hi world from {}\n", work.display()));
    }
}
