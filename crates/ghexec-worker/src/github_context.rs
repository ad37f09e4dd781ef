// The `github` expression context, populated from `GITHUB_*` variables.

use std::collections::BTreeMap;

use anyhow::{bail, Result};

/// The `github` context available in expressions.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct GitHubContext {
    pub ci: bool,
    pub action: String,
    pub action_path: String,
    pub action_ref: String,
    pub action_repository: String,
    pub action_status: String,
    pub actions: bool,
    pub actor: String,
    pub actor_id: String,
    pub api_url: String,
    pub base_ref: String,
    pub env: String,
    /// The webhook payload read from `GITHUB_EVENT_PATH`.
    pub event: serde_json::Value,
    pub event_name: String,
    pub event_path: String,
    pub graphql_url: String,
    pub head_ref: String,
    pub job: String,
    pub job_workflow_sha: String,
    pub path: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub ref_name: String,
    pub ref_protected: bool,
    pub ref_type: String,
    pub repository: String,
    pub repository_id: String,
    pub repository_owner: String,
    pub repository_owner_id: String,
    #[serde(rename = "repositoryUrl")]
    pub repository_url: String,
    pub retention_days: i64,
    pub run_id: String,
    pub run_number: String,
    pub run_attempt: String,
    pub secret_source: String,
    pub server_url: String,
    pub sha: String,
    pub token: String,
    pub triggering_actor: String,
    pub workflow: String,
    pub workflow_ref: String,
    pub workflow_sha: String,
    pub workspace: String,
}

impl GitHubContext {
    /// Build the context from the given environment.
    ///
    /// Fails only when `GITHUB_RETENTION_DAYS` is set but is not an integer.
    pub fn from_environment(env: &BTreeMap<String, String>) -> Result<Self> {
        let var = |name: &str| env.get(name).cloned().unwrap_or_default();
        let flag = |name: &str| env.get(name).map(String::as_str) == Some("true");

        let retention_days = match env.get("GITHUB_RETENTION_DAYS").filter(|v| !v.is_empty()) {
            Some(value) => match value.parse::<i64>() {
                Ok(days) => days,
                Err(_) => bail!("GITHUB_RETENTION_DAYS {value} is not a valid integer"),
            },
            None => 0,
        };

        let event_path = var("GITHUB_EVENT_PATH");

        Ok(Self {
            ci: flag("CI"),
            action: var("GITHUB_ACTION"),
            action_path: var("GITHUB_ACTION_PATH"),
            action_ref: var("GITHUB_ACTION_REF"),
            action_repository: var("GITHUB_ACTION_REPOSITORY"),
            action_status: String::new(),
            actions: flag("GITHUB_ACTIONS"),
            actor: var("GITHUB_ACTOR"),
            actor_id: var("GITHUB_ACTOR_ID"),
            api_url: var("GITHUB_API_URL"),
            base_ref: var("GITHUB_BASE_REF"),
            env: var("GITHUB_ENV"),
            event: load_event(&event_path),
            event_name: var("GITHUB_EVENT_NAME"),
            event_path,
            graphql_url: var("GITHUB_GRAPHQL_URL"),
            head_ref: var("GITHUB_HEAD_REF"),
            job: var("GITHUB_JOB"),
            job_workflow_sha: var("GITHUB_JOB_WORKFLOW_SHA"),
            path: var("GITHUB_PATH"),
            git_ref: var("GITHUB_REF"),
            ref_name: var("GITHUB_REF_NAME"),
            ref_protected: flag("GITHUB_REF_PROTECTED"),
            ref_type: var("GITHUB_REF_TYPE"),
            repository: var("GITHUB_REPOSITORY"),
            repository_id: var("GITHUB_REPOSITORY_ID"),
            repository_owner: var("GITHUB_REPOSITORY_OWNER"),
            repository_owner_id: var("GITHUB_REPOSITORY_OWNER_ID"),
            repository_url: var("GITHUB_REPOSITORY_URL"),
            retention_days,
            run_id: var("GITHUB_RUN_ID"),
            run_number: var("GITHUB_RUN_NUMBER"),
            run_attempt: var("GITHUB_RUN_ATTEMPT"),
            secret_source: String::new(),
            server_url: var("GITHUB_SERVER_URL"),
            sha: var("GITHUB_SHA"),
            token: var("GITHUB_TOKEN"),
            triggering_actor: var("GITHUB_TRIGGERING_ACTOR"),
            workflow: var("GITHUB_WORKFLOW"),
            workflow_ref: var("GITHUB_WORKFLOW_REF"),
            workflow_sha: var("GITHUB_WORKFLOW_SHA"),
            workspace: var("GITHUB_WORKSPACE"),
        })
    }
}

/// Read the event payload; a missing or unreadable file yields an empty object.
fn load_event(path: &str) -> serde_json::Value {
    let empty = serde_json::Value::Object(Default::default());
    if path.is_empty() {
        return empty;
    }
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
            tracing::debug!("Ignoring malformed event payload at {}: {}", path, e);
            empty
        }),
        Err(e) => {
            tracing::debug!("Event payload {} not readable: {}", path, e);
            empty
        }
    }
}
