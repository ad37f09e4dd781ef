// JobRunner: one `ghexec run` invocation. Loads the persisted run state,
// drives the steps runner, then persists the results and the exit code.

use std::sync::Arc;

use anyhow::{Context, Result};
use ghexec_common::{HostContext, WellKnownFile};
use ghexec_sdk::IOUtil;

use crate::action_manager::{ActionManager, ActionSourceFetcher};
use crate::environment::RunnerEnvironment;
use crate::run_state::StateStore;
use crate::steps_runner::StepsRunner;

/// Orchestrates a single run of every registered step.
pub struct JobRunner {
    host_context: Arc<HostContext>,
    store: Arc<dyn StateStore>,
    fetcher: Arc<dyn ActionSourceFetcher>,
}

impl JobRunner {
    pub fn new(
        host_context: Arc<HostContext>,
        store: Arc<dyn StateStore>,
        fetcher: Arc<dyn ActionSourceFetcher>,
    ) -> Self {
        Self {
            host_context,
            store,
            fetcher,
        }
    }

    /// Run the job to completion.
    ///
    /// The state is saved whether or not a step failed, and `exit-code`
    /// is written as `0` or `1` to match the overall result.
    pub async fn run_async(&self, mut environment: RunnerEnvironment) -> Result<()> {
        let mut state = self.store.load().context("Failed to load run state")?;
        tracing::info!(
            "Starting job '{}' with {} step(s)",
            state.job_name,
            state.step_order.len()
        );

        let runner = StepsRunner::new(
            Arc::clone(&self.host_context),
            ActionManager::new(Arc::clone(&self.fetcher)),
        );
        let result = runner
            .run_async(
                &mut state,
                &mut environment,
                self.host_context.shutdown_token(),
            )
            .await;

        let saved = self.store.save(&state).context("Failed to save run state");
        let result = result.and(saved);

        let exit_code = if result.is_ok() { "0" } else { "1" };
        IOUtil::write_file(
            &self.host_context.get_file(WellKnownFile::ExitCode),
            exit_code,
        )?;

        match &result {
            Ok(()) => tracing::info!("Job completed successfully"),
            Err(e) => tracing::error!("Job failed: {:#}", e),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action_manager::ActionReference;
    use crate::run_state::{MemoryStateStore, RunState};
    use crate::steps_context::StepStatus;
    use crate::workflow::Step;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    struct NoFetch;

    #[async_trait]
    impl ActionSourceFetcher for NoFetch {
        async fn fetch(&self, reference: &ActionReference) -> Result<PathBuf> {
            anyhow::bail!("unexpected fetch of {}", reference)
        }
    }

    fn state_with(scripts: &[(&str, &str)]) -> RunState {
        let mut state = RunState::default();
        for (id, script) in scripts {
            state
                .add_step(Step {
                    id: Some(id.to_string()),
                    run: Some((*script).into()),
                    ..Default::default()
                })
                .unwrap();
        }
        state
    }

    fn environment() -> RunnerEnvironment {
        RunnerEnvironment::new(BTreeMap::from([(
            "PATH".to_string(),
            std::env::var("PATH").unwrap_or_default(),
        )]))
    }

    #[tokio::test]
    async fn successful_run_saves_results_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let host = HostContext::with_root(dir.path());
        let store = Arc::new(MemoryStateStore::new(state_with(&[("a", "echo a")])));

        JobRunner::new(host, store.clone(), Arc::new(NoFetch))
            .run_async(environment())
            .await
            .unwrap();

        let saved = store.snapshot();
        assert_eq!(saved.steps["a"].result.outcome, Some(StepStatus::Success));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("exit-code")).unwrap(),
            "0"
        );
    }

    #[tokio::test]
    async fn failed_run_still_saves_state() {
        let dir = tempfile::tempdir().unwrap();
        let host = HostContext::with_root(dir.path());
        let store = Arc::new(MemoryStateStore::new(state_with(&[
            ("bad", "exit 3"),
            ("good", "echo never"),
        ])));

        let err = JobRunner::new(host, store.clone(), Arc::new(NoFetch))
            .run_async(environment())
            .await
            .unwrap_err();

        assert!(format!("{err:#}").contains("bad"));
        let saved = store.snapshot();
        assert_eq!(saved.steps["bad"].result.conclusion, Some(StepStatus::Failure));
        assert_eq!(saved.steps["good"].result.conclusion, None);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("exit-code")).unwrap(),
            "1"
        );
    }

    #[tokio::test]
    async fn shutdown_before_run_fails_the_job() {
        let dir = tempfile::tempdir().unwrap();
        let host = HostContext::with_root(dir.path());
        host.shutdown("test");
        let store = Arc::new(MemoryStateStore::new(state_with(&[("a", "echo a")])));

        let err = JobRunner::new(host, store.clone(), Arc::new(NoFetch))
            .run_async(environment())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "run was cancelled");
        assert_eq!(store.snapshot().steps["a"].result.outcome, None);
    }
}
