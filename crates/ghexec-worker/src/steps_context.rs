// Step results: what `steps.<id>.outcome`, `.conclusion` and `.outputs`
// resolve to.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failure,
    Skipped,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StepStatus::Success => "success",
            StepStatus::Failure => "failure",
            StepStatus::Skipped => "skipped",
        })
    }
}

/// Recorded result for a single step.
///
/// `outcome` and `conclusion` are always set together; they would only
/// differ under `continue-on-error`, which is not applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<StepStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<StepStatus>,
}

impl StepResult {
    pub fn set_status(&mut self, status: StepStatus) {
        self.outcome = Some(status);
        self.conclusion = Some(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        let mut result = StepResult::default();
        result.set_status(StepStatus::Failure);
        result.outputs.insert("version".into(), "1.0".into());

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"outputs": {"version": "1.0"}, "conclusion": "failure", "outcome": "failure"})
        );
    }

    #[test]
    fn pending_result_has_no_status() {
        let json = serde_json::to_value(StepResult::default()).unwrap();
        assert_eq!(json, serde_json::json!({"outputs": {}}));
        let back: StepResult = serde_json::from_value(json).unwrap();
        assert_eq!(back.outcome, None);
    }
}
