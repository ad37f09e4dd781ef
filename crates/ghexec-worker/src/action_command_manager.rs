// ActionCommandManager: applies workflow commands (::command key=val::data)
// found in step output lines.

use std::collections::HashSet;

use ghexec_common::{ActionCommand, Annotation};

use crate::execution_context::ExecutionContext;

/// All recognized workflow command names.
const WORKFLOW_COMMANDS: &[&str] = &[
    "group",
    "endgroup",
    "debug",
    "error",
    "warning",
    "notice",
    "set-env",
    "set-output",
    "save-state",
    "add-mask",
    "add-matcher",
    "add-path",
];

/// Parses workflow commands out of stdout lines and applies their effects.
pub struct ActionCommandManager {
    registered_commands: HashSet<String>,
}

impl Default for ActionCommandManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionCommandManager {
    /// Create a new `ActionCommandManager` with all standard commands registered.
    pub fn new() -> Self {
        let registered_commands = WORKFLOW_COMMANDS.iter().map(|s| s.to_string()).collect();
        Self {
            registered_commands,
        }
    }

    /// Try to process a workflow command from a line of output.
    ///
    /// Returns the command if the line was one; ordinary output yields `None`.
    pub fn try_process_command(
        &self,
        context: &mut ExecutionContext<'_>,
        line: &str,
    ) -> Option<ActionCommand> {
        if line.is_empty() {
            return None;
        }
        let cmd = ActionCommand::try_parse(line, &self.registered_commands)?;
        self.dispatch_command(context, &cmd);
        Some(cmd)
    }

    fn dispatch_command(&self, context: &mut ExecutionContext<'_>, cmd: &ActionCommand) {
        match cmd.command.as_str() {
            "group" => context.logger().start_group(&cmd.data),
            "endgroup" => context.logger().end_group(),
            "debug" => context.logger().debug_at(&cmd.data, &annotation(cmd)),
            "error" => context.logger().error(&cmd.data, &annotation(cmd)),
            "warning" => context.logger().warning(&cmd.data, &annotation(cmd)),
            "notice" => context.logger().notice(&cmd.data, &annotation(cmd)),
            "set-env" => {
                if let Some(name) = required_name(context, cmd) {
                    context.debug(&format!("Setting env {}={}", name, cmd.data));
                    context.set_env(&name, &cmd.data);
                }
            }
            "set-output" => {
                if let Some(name) = required_name(context, cmd) {
                    context.debug(&format!("Set output {}={}", name, cmd.data));
                    context.set_output(&name, &cmd.data);
                }
            }
            "save-state" => {
                if let Some(name) = required_name(context, cmd) {
                    context.debug(&format!("Save state {}={}", name, cmd.data));
                    context.save_state(&name, &cmd.data);
                }
            }
            // Masking and problem matchers are acknowledged but not applied.
            "add-mask" => context.debug("Received add-mask command"),
            "add-matcher" => context.debug(&format!("Received add-matcher command: {}", cmd.data)),
            "add-path" => {
                let path = cmd.data.trim();
                if path.is_empty() {
                    context.warning("'add-path' command requires a non-empty path.");
                    return;
                }
                context.debug(&format!("Appending PATH: {}", path));
                context.add_path(path);
            }
            unknown => context.warning(&format!("Unknown workflow command: {}", unknown)),
        }
    }
}

fn required_name(context: &ExecutionContext<'_>, cmd: &ActionCommand) -> Option<String> {
    match cmd.property("name") {
        Some(name) if !name.is_empty() => Some(name.to_string()),
        _ => {
            context.warning(&format!("'{}' command requires a 'name' property.", cmd.command));
            None
        }
    }
}

fn annotation(cmd: &ActionCommand) -> Annotation {
    let prop = |name: &str| cmd.property(name).map(str::to_string);
    Annotation {
        file: prop("file"),
        line: prop("line"),
        col: prop("col"),
        end_line: prop("endLine"),
        end_col: prop("endColumn").or_else(|| prop("endCol")),
        title: prop("title"),
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
    use tokio_util::sync::CancellationToken;

    struct Fixture {
        host: std::sync::Arc<HostContext>,
        logger: JobLogger,
        step: StepState,
        env: RunnerEnvironment,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                host: HostContext::with_root("/tmp/ghexec-test"),
                logger: JobLogger::new(),
                step: StepState::new(Step {
                    id: Some("s".into()),
                    run: Some("true".into()),
                    ..Default::default()
                }),
                env: RunnerEnvironment::default(),
            }
        }

        fn process(&mut self, lines: &[&str]) -> Vec<Option<ActionCommand>> {
            let manager = ActionCommandManager::new();
            let mut context = ExecutionContext::new(
                &self.host,
                &mut self.step,
                &mut self.env,
                &self.logger,
                ActionStage::Main,
                CancellationToken::new(),
            );
            lines
                .iter()
                .map(|line| manager.try_process_command(&mut context, line))
                .collect()
        }
    }

    #[test]
    fn set_output_writes_step_outputs() {
        let mut fx = Fixture::new();
        let results = fx.process(&["::set-output name=foo::bar"]);
        assert_eq!(results[0].as_ref().unwrap().command, "set-output");
        assert_eq!(fx.step.result.outputs["foo"], "bar");
    }

    #[test]
    fn set_env_save_state_and_add_path() {
        let mut fx = Fixture::new();
        fx.process(&[
            "::set-env name=MODE::release",
            "::save-state name=pid::1234",
            "::add-path::/opt/tool/bin",
        ]);
        assert_eq!(fx.env.get("MODE"), Some("release"));
        assert_eq!(fx.step.state["pid"], "1234");
        assert_eq!(fx.env.get("PATH"), Some("/opt/tool/bin"));
    }

    #[test]
    fn missing_name_is_ignored() {
        let mut fx = Fixture::new();
        let results = fx.process(&["::set-output::orphan", "::save-state::x"]);
        assert!(results.iter().all(Option::is_some));
        assert!(fx.step.result.outputs.is_empty());
        assert!(fx.step.state.is_empty());
    }

    #[test]
    fn groups_nest_in_logger() {
        let mut fx = Fixture::new();
        fx.process(&["::group::Outer", "::group::Inner", "::endgroup::"]);
        assert_eq!(fx.logger.depth(), 1);
    }

    #[test]
    fn plain_and_unregistered_lines_are_not_commands() {
        let mut fx = Fixture::new();
        let results = fx.process(&["hello world", "", "::stop-commands::token", "::debug::visible"]);
        assert!(results[0].is_none());
        assert!(results[1].is_none());
        assert!(results[2].is_none());
        assert!(results[3].is_some());
    }

    #[test]
    fn annotation_properties_are_collected() {
        let cmd = ActionCommand::try_parse(
            "::error file=app.js,line=10,col=15,endLine=12,endColumn=3,title=Bad::Something failed",
            &WORKFLOW_COMMANDS.iter().map(|s| s.to_string()).collect(),
        )
        .unwrap();
        let a = annotation(&cmd);
        assert_eq!(a.file.as_deref(), Some("app.js"));
        assert_eq!(a.line.as_deref(), Some("10"));
        assert_eq!(a.col.as_deref(), Some("15"));
        assert_eq!(a.end_line.as_deref(), Some("12"));
        assert_eq!(a.end_col.as_deref(), Some("3"));
        assert_eq!(a.title.as_deref(), Some("Bad"));
    }
}
