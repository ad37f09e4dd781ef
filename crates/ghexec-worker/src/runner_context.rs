// The `runner` expression context, populated from `RUNNER_*` variables.

use std::collections::BTreeMap;

/// The `runner` context available in expressions.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RunnerContext {
    pub name: String,
    pub os: String,
    pub arch: String,
    pub temp: String,
    pub tool_cache: String,
    pub debug: String,
}

impl RunnerContext {
    pub fn from_environment(env: &BTreeMap<String, String>) -> Self {
        let var = |name: &str| env.get(name).cloned().unwrap_or_default();
        Self {
            name: var("RUNNER_NAME"),
            os: var("RUNNER_OS"),
            arch: var("RUNNER_ARCH"),
            temp: var("RUNNER_TEMP"),
            tool_cache: var("RUNNER_TOOL_CACHE"),
            debug: var("RUNNER_DEBUG"),
        }
    }
}
