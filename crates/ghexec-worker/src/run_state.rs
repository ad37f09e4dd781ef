// Persisted state shared by every `ghexec` invocation against one data home.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use ghexec_common::constants::WellKnownFile;
use ghexec_common::HostContext;
use ghexec_sdk::IOUtil;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::action_manifest_manager::Action;
use crate::steps_context::StepResult;
use crate::workflow::{Job, StepType, Step, Workflow};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunStateError {
    #[error("step with id {0} already exists")]
    DuplicateStep(String),

    #[error("step with id {0} does not exist")]
    UnknownStep(String),

    #[error("step {0} must set exactly one of 'uses' and 'run'")]
    UnknownStepType(String),
}

/// A resolved action: where its files live and what its manifest says.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionState {
    pub source: String,
    pub path: PathBuf,
    pub metadata: Action,
}

/// A registered step together with everything recorded about it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepState {
    pub step: Step,
    #[serde(default)]
    pub result: StepResult,
    /// Values saved with `save-state`, exposed to later stages as `STATE_*`.
    #[serde(default)]
    pub state: BTreeMap<String, String>,
}

impl StepState {
    pub fn new(step: Step) -> Self {
        Self {
            step,
            ..Default::default()
        }
    }

    pub fn id(&self) -> &str {
        self.step.id.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RunState {
    pub job_name: String,
    /// Resolved actions keyed by their `uses` reference.
    pub actions: BTreeMap<String, ActionState>,
    pub env: BTreeMap<String, String>,
    /// Execution order; holds every key of `steps` exactly once.
    pub step_order: Vec<String>,
    pub steps: BTreeMap<String, StepState>,
}

impl RunState {
    /// Register a new step at the end of the run.
    ///
    /// Steps without an id get their zero-based registration index.
    pub fn add_step(&mut self, mut step: Step) -> Result<&mut StepState, RunStateError> {
        let id = match step.id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => self.steps.len().to_string(),
        };
        if self.steps.contains_key(&id) {
            return Err(RunStateError::DuplicateStep(id));
        }
        if step.step_type() == StepType::Unknown {
            return Err(RunStateError::UnknownStepType(id));
        }

        step.id = Some(id.clone());
        self.step_order.push(id.clone());
        Ok(self.steps.entry(id).or_insert(StepState::new(step)))
    }

    /// Replace an existing step, resetting its result and saved state.
    /// Its position in the run is unchanged.
    pub fn override_step(&mut self, step: Step) -> Result<&mut StepState, RunStateError> {
        let id = step.id.clone().unwrap_or_default();
        if step.step_type() == StepType::Unknown {
            return Err(RunStateError::UnknownStepType(id));
        }
        match self.steps.get_mut(&id) {
            Some(existing) => {
                *existing = StepState::new(step);
                Ok(existing)
            }
            None => Err(RunStateError::UnknownStep(id)),
        }
    }

    /// Adopt a workflow job: its name, the workflow env overlaid by the job
    /// env, and each of its steps in order.
    pub fn add_job(&mut self, job_name: &str, workflow: &Workflow, job: &Job) -> Result<(), RunStateError> {
        self.job_name = job_name.to_string();
        for (key, value) in workflow.env.iter().chain(job.env.iter()) {
            self.env.insert(key.clone(), value.to_string());
        }
        for step in &job.steps {
            self.add_step(step.clone())?;
        }
        Ok(())
    }

    pub fn action(&self, source: &str) -> Option<&ActionState> {
        self.actions.get(source)
    }
}

/// Where the run state lives between invocations.
pub trait StateStore: Send + Sync {
    fn load(&self) -> Result<RunState>;
    fn save(&self, state: &RunState) -> Result<()>;
}

/// Load, apply `f`, and save. Nothing is written when `f` fails.
pub fn update<S, T, F>(store: &S, f: F) -> Result<T>
where
    S: StateStore + ?Sized,
    F: FnOnce(&mut RunState) -> Result<T>,
{
    let mut state = store.load()?;
    let value = f(&mut state)?;
    store.save(&state)?;
    Ok(value)
}

/// JSON file under the data home.
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn for_host(host: &HostContext) -> Self {
        Self::new(host.get_file(WellKnownFile::State))
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<RunState> {
        IOUtil::load_object_or_default(&self.path)
            .with_context(|| format!("Failed to load run state from '{}'", self.path.display()))
    }

    fn save(&self, state: &RunState) -> Result<()> {
        tracing::debug!("Saving run state to {}", self.path.display());
        IOUtil::save_object(&self.path, state)
    }
}

/// In-process store used by tests and embedders.
#[derive(Clone, Default)]
pub struct MemoryStateStore {
    state: Arc<Mutex<RunState>>,
}

impl MemoryStateStore {
    pub fn new(state: RunState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn snapshot(&self) -> RunState {
        self.state.lock().clone()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<RunState> {
        Ok(self.state.lock().clone())
    }

    fn save(&self, state: &RunState) -> Result<()> {
        *self.state.lock() = state.clone();
        Ok(())
    }
}
