use chrono::{DateTime, Utc};
use gradeloops_evaluator::EvaluationResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Lifecycle state a run record captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Produced,
    Evaluated,
    Revised,
    Passed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Produced => "produced",
            RunStatus::Evaluated => "evaluated",
            RunStatus::Revised => "revised",
            RunStatus::Passed => "passed",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit entry per state transition of a cycle.
///
/// Records are created once and never changed; absent fields serialize as
/// `null` so every entry in `run-log.json` has the same keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub cycle_id: String,
    pub agent_name: String,
    pub attempt: u32,
    pub status: RunStatus,
    #[serde(default)]
    pub overall_score: Option<f64>,
    #[serde(default)]
    pub dimension_scores: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub suggested_fixes: Option<Vec<String>>,
    #[serde(default)]
    pub artifact_path: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub rubric_version: Option<String>,
}

impl RunRecord {
    pub fn new(cycle_id: &str, agent_name: &str, attempt: u32, status: RunStatus) -> Self {
        Self {
            cycle_id: cycle_id.to_string(),
            agent_name: agent_name.to_string(),
            attempt,
            status,
            overall_score: None,
            dimension_scores: None,
            feedback: None,
            suggested_fixes: None,
            artifact_path: None,
            created_at: Utc::now(),
            duration_ms: None,
            rubric_version: None,
        }
    }

    /// Project an evaluation's fields into the record
    pub fn with_evaluation(mut self, evaluation: &EvaluationResult) -> Self {
        self.overall_score = Some(evaluation.overall_score);
        self.dimension_scores = Some(evaluation.dimension_scores.clone());
        self.feedback = Some(evaluation.feedback.clone());
        self.suggested_fixes = Some(evaluation.suggested_fixes.clone());
        self
    }

    pub fn with_artifact(mut self, path: Option<&Path>) -> Self {
        self.artifact_path = path.map(|p| p.display().to_string());
        self
    }

    pub fn with_feedback(mut self, feedback: String) -> Self {
        self.feedback = Some(feedback);
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_rubric_version(mut self, version: &str) -> Self {
        self.rubric_version = Some(version.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_fields_serialize_as_null() {
        let record = RunRecord::new("2026-01-31-001", "target_builder", 1, RunStatus::Produced)
            .with_artifact(Some(Path::new("/out/attempt-1.md")));
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["status"], "produced");
        assert_eq!(json["artifact_path"], "/out/attempt-1.md");
        assert!(json["overall_score"].is_null());
        assert!(json["rubric_version"].is_null());
        assert!(json["created_at"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_with_evaluation_copies_score_payload() {
        let evaluation = EvaluationResult {
            overall_score: 0.6,
            passed: false,
            dimension_scores: BTreeMap::from([("clarity".to_string(), 0.6)]),
            feedback: "Too vague".to_string(),
            suggested_fixes: vec!["Cite triggers".to_string()],
        };
        let record =
            RunRecord::new("c", "a", 2, RunStatus::Evaluated).with_evaluation(&evaluation);

        assert_eq!(record.overall_score, Some(0.6));
        assert_eq!(record.feedback.as_deref(), Some("Too vague"));
        assert_eq!(record.suggested_fixes.unwrap().len(), 1);
        assert_eq!(record.dimension_scores.unwrap()["clarity"], 0.6);
    }
}
