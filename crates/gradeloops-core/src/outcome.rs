use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::record::RunRecord;

/// The final outcome of one cycle for one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopResult {
    pub success: bool,
    pub final_attempt: u32,
    /// Score of the last successful evaluation, if any
    pub final_score: Option<f64>,
    /// `final.md`, only set on success
    pub artifact_path: Option<PathBuf>,
    pub all_runs: Vec<RunRecord>,
    pub escalated: bool,
    pub escalation_reason: Option<String>,
}

impl LoopResult {
    pub fn passed(
        attempt: u32,
        score: f64,
        artifact_path: PathBuf,
        all_runs: Vec<RunRecord>,
    ) -> Self {
        Self {
            success: true,
            final_attempt: attempt,
            final_score: Some(score),
            artifact_path: Some(artifact_path),
            all_runs,
            escalated: false,
            escalation_reason: None,
        }
    }

    /// All attempts used without passing. The reason is only kept when the
    /// agent escalates on failure.
    pub fn exhausted(
        max_attempts: u32,
        last_score: Option<f64>,
        all_runs: Vec<RunRecord>,
        escalate: bool,
        reason: String,
    ) -> Self {
        Self {
            success: false,
            final_attempt: max_attempts,
            final_score: last_score,
            artifact_path: None,
            all_runs,
            escalated: escalate,
            escalation_reason: escalate.then_some(reason),
        }
    }

    pub fn exit_code(&self) -> i32 {
        if self.success {
            0
        } else {
            1
        }
    }
}

/// Human-readable reason for exhausting all attempts
pub fn exhaustion_reason(threshold: f64, max_attempts: u32, last_score: Option<f64>) -> String {
    let score = last_score
        .map(|s| format!("{:.2}", s))
        .unwrap_or_else(|| "N/A".to_string());
    format!(
        "Failed to reach threshold ({}) after {} attempts. Last score: {}",
        threshold, max_attempts, score
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhaustion_reason() {
        assert_eq!(
            exhaustion_reason(0.85, 3, Some(0.6)),
            "Failed to reach threshold (0.85) after 3 attempts. Last score: 0.60"
        );
        assert!(exhaustion_reason(0.9, 2, None).ends_with("Last score: N/A"));
    }

    #[test]
    fn test_serializes_camel_case() {
        let result = LoopResult::exhausted(3, Some(0.6), vec![], true, "reason".to_string());
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["finalAttempt"], 3);
        assert_eq!(json["escalationReason"], "reason");
        assert!(json["artifactPath"].is_null());
        assert_eq!(result.exit_code(), 1);
    }

    #[test]
    fn test_no_reason_without_escalation() {
        let result = LoopResult::exhausted(3, None, vec![], false, "reason".to_string());
        assert!(!result.escalated);
        assert!(result.escalation_reason.is_none());
    }
}
