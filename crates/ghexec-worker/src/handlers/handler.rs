// Handler trait and HandlerFactory.
// A handler runs one step at one stage; the factory decides which handler
// a step needs, or that the stage has nothing to run.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use crate::action_manifest_manager::{ActionRunsUsing, ActionStage};
use crate::execution_context::ExecutionContext;
use crate::expressions::EvaluationContext;
use crate::handlers::node_script_handler::NodeScriptActionHandler;
use crate::handlers::script_handler::ScriptHandler;
use crate::run_state::{ActionState, StepState};
use crate::workflow::StepType;

/// Process settings shared by all handler types.
#[derive(Debug, Clone, Default)]
pub struct HandlerData {
    /// Complete environment for the step's process.
    pub environment: BTreeMap<String, String>,

    pub working_directory: Option<PathBuf>,
}

/// Trait for step execution handlers.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Execute the step. Any error fails the step at this stage.
    async fn run_async(&self, context: &mut ExecutionContext<'_>, data: HandlerData) -> Result<()>;
}

/// Factory for creating the appropriate handler for a step.
pub struct HandlerFactory;

impl HandlerFactory {
    /// Pick the handler for `step_state` at `stage`.
    ///
    /// `Ok(None)` means the stage is skipped: run steps have no pre or post,
    /// and actions may not declare one. An action without a main
    /// entrypoint, or of a kind that cannot be executed, is an error when
    /// its main stage comes up.
    pub fn create(
        step_state: &StepState,
        action: Option<&ActionState>,
        stage: ActionStage,
        context: &EvaluationContext,
    ) -> Result<Option<Box<dyn Handler>>> {
        let step = &step_state.step;
        match step.step_type() {
            StepType::Run => {
                if stage != ActionStage::Main {
                    return Ok(None);
                }
                let script = match &step.run {
                    Some(run) => run.eval(context).context("Failed to evaluate run script")?,
                    None => String::new(),
                };
                Ok(Some(Box::new(ScriptHandler::new(script, step.shell.clone()))))
            }
            StepType::Action => {
                let uses = step.uses.as_deref().unwrap_or_default();
                let Some(action) = action else {
                    bail!("action '{}' has not been resolved", uses);
                };
                let using = action.metadata.runs.using;

                if !using.is_node() {
                    if stage == ActionStage::Main {
                        bail!("unsupported action type '{}' for action '{}'", using, uses);
                    }
                    return Ok(None);
                }

                match action.metadata.entrypoint(stage) {
                    Some(entrypoint) => Ok(Some(Box::new(NodeScriptActionHandler::new(
                        action.path.clone(),
                        entrypoint.to_string(),
                    )))),
                    None if stage == ActionStage::Main => {
                        bail!("action '{}' has no main entrypoint", uses)
                    }
                    None => Ok(None),
                }
            }
            StepType::Unknown => bail!(
                "step {} must set exactly one of 'uses' and 'run'",
                step_state.id()
            ),
        }
    }

    /// Whether `using` can be executed at all.
    pub fn is_supported(using: ActionRunsUsing) -> bool {
        using.is_node()
    }
}
