// Command-line surface of the `ghexec` binary.
//
//   ghexec with step ...   register one step
//   ghexec with job ...    register every step of a workflow job
//   ghexec run             execute the registered steps
//
// Registration commands are short-lived: load the state, change it, save it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use ghexec_common::{HostContext, WellKnownFile};
use ghexec_sdk::IOUtil;

use crate::action_manager::GitHubActionFetcher;
use crate::environment::RunnerEnvironment;
use crate::expressions::ExprString;
use crate::job_runner::JobRunner;
use crate::run_state::{self, FileStateStore, RunState};
use crate::workflow::{load_workflows, Step};

#[derive(Parser, Debug)]
#[command(name = "ghexec", version, about = "Run GitHub Actions steps on this machine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Register work for the next `run`.
    With {
        #[command(subcommand)]
        target: WithCommand,
    },
    /// Execute every registered step.
    Run,
}

#[derive(Subcommand, Debug)]
pub enum WithCommand {
    /// Register a single step.
    Step(StepArgs),
    /// Register all steps of a job from a workflow file.
    Job(JobArgs),
}

#[derive(Args, Debug, Default, Clone)]
pub struct StepArgs {
    #[arg(long)]
    pub id: Option<String>,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub uses: Option<String>,
    /// Environment variable for the step, as KEY=VALUE. Repeatable.
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,
    /// Action input, as KEY=VALUE. Repeatable.
    #[arg(long = "with", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub with: Vec<(String, String)>,
    #[arg(long)]
    pub run: Option<String>,
    #[arg(long)]
    pub shell: Option<String>,
    /// Full step document as JSON; replaces the individual field flags.
    #[arg(long)]
    pub json: Option<String>,
    /// Replace the already registered step with the same id.
    #[arg(long = "override")]
    pub override_step: bool,
}

#[derive(Args, Debug, Default, Clone)]
pub struct JobArgs {
    /// Workflow name, or its path relative to the repository root when unnamed.
    #[arg(long)]
    pub workflow: Option<String>,
    /// Job id inside the workflow.
    #[arg(long)]
    pub job: Option<String>,
    /// Directory holding workflow files, relative to the current directory.
    #[arg(long)]
    pub workflows_dir: Option<PathBuf>,
}

/// Parse a `KEY=VALUE` flag value. The value may itself contain `=`.
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

fn expr_map(pairs: &[(String, String)]) -> BTreeMap<String, ExprString> {
    pairs
        .iter()
        .map(|(k, v)| (k.clone(), ExprString::from(v.as_str())))
        .collect()
}

impl StepArgs {
    pub fn to_step(&self) -> Result<Step> {
        if let Some(json) = &self.json {
            return serde_json::from_str(json).context("Failed to parse step JSON");
        }
        Ok(Step {
            id: self.id.clone(),
            name: self.name.as_deref().map(ExprString::from),
            uses: self.uses.clone(),
            env: expr_map(&self.env),
            with: expr_map(&self.with),
            run: self.run.as_deref().map(ExprString::from),
            shell: self.shell.clone(),
            ..Default::default()
        })
    }
}

/// Add or override a step. Returns the id it was registered under.
pub fn register_step(state: &mut RunState, args: &StepArgs) -> Result<String> {
    let step = args.to_step()?;
    let registered = if args.override_step {
        if step.id.as_deref().unwrap_or_default().is_empty() {
            bail!("step id must be provided to override");
        }
        state.override_step(step)?
    } else {
        state.add_step(step)?
    };
    Ok(registered.id().to_string())
}

/// Register every step of `args.job` from `args.workflow`, found under
/// `repository_root`.
pub fn register_job(state: &mut RunState, repository_root: &Path, args: &JobArgs) -> Result<()> {
    let (Some(workflow_name), Some(job_id)) = (
        args.workflow.as_deref().filter(|w| !w.is_empty()),
        args.job.as_deref().filter(|j| !j.is_empty()),
    ) else {
        bail!("workflow and job name must be provided");
    };

    let workflows = load_workflows(repository_root, args.workflows_dir.as_deref())?;
    let workflow = workflows
        .get(workflow_name)
        .with_context(|| format!("workflow {} not found", workflow_name))?;
    let job = workflow
        .jobs
        .get(job_id)
        .with_context(|| format!("job {}/{} not found", workflow_name, job_id))?;

    let job_name = if job.name.is_empty() { job_id } else { job.name.as_str() };
    state.add_job(job_name, workflow, job)?;
    Ok(())
}

/// Execute the registered steps. Failures are recorded in `exit-code`
/// and returned for reporting.
pub async fn run(host: Arc<HostContext>) -> Result<()> {
    let environment = RunnerEnvironment::from_process();
    let fetcher = GitHubActionFetcher::from_environment(&host, environment.variables())?;
    let store = FileStateStore::for_host(&host);

    JobRunner::new(host, Arc::new(store), Arc::new(fetcher))
        .run_async(environment)
        .await
}

/// Dispatch a parsed command line.
pub async fn execute(cli: Cli, host: Arc<HostContext>) -> Result<()> {
    let store = FileStateStore::for_host(&host);
    match cli.command {
        Command::With {
            target: WithCommand::Step(args),
        } => {
            let id = run_state::update(&store, |state| register_step(state, &args))?;
            tracing::info!("Registered step '{}'", id);
            Ok(())
        }
        Command::With {
            target: WithCommand::Job(args),
        } => {
            let root = std::env::current_dir().context("Failed to determine current directory")?;
            run_state::update(&store, |state| register_job(state, &root, &args))?;
            tracing::info!(
                "Registered job '{}'",
                args.job.as_deref().unwrap_or_default()
            );
            Ok(())
        }
        Command::Run => {
            let exit_code_file = host.get_file(WellKnownFile::ExitCode);
            if let Err(e) = run(host).await {
                eprintln!("Error: {:#}", e);
                IOUtil::write_file(&exit_code_file, "1")?;
            }
            Ok(())
        }
    }
}
