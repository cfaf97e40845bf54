use gradeloops_config::RubricSpec;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// The exact key set of an evaluator response.
pub const REQUIRED_KEYS: [&str; 5] = [
    "overallScore",
    "passed",
    "dimensionScores",
    "feedback",
    "suggestedFixes",
];

/// A validated evaluator response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    /// Overall score in [0, 1]
    pub overall_score: f64,
    /// Always equal to `overall_score >= threshold` once validated
    pub passed: bool,
    /// Exactly the rubric's dimensions, each in [0, 1]
    pub dimension_scores: BTreeMap<String, f64>,
    pub feedback: String,
    pub suggested_fixes: Vec<String>,
}

impl EvaluationResult {
    /// Get a short description of the result for logging
    pub fn short_description(&self) -> String {
        let verdict = if self.passed { "PASS" } else { "FAIL" };
        if self.suggested_fixes.is_empty() {
            format!("{} ({:.2})", verdict, self.overall_score)
        } else {
            format!(
                "{} ({:.2}, {} fixes)",
                verdict,
                self.overall_score,
                self.suggested_fixes.len()
            )
        }
    }
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Evaluator response is not pure JSON")]
    NotJson,

    #[error("Evaluator response is not valid JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("Evaluator response failed schema validation: {0}")]
    SchemaMismatch(String),

    #[error(
        "Evaluator pass flag is inconsistent: passed={passed} but overallScore={overall_score} against threshold {threshold}"
    )]
    PassFlagInconsistent {
        passed: bool,
        overall_score: f64,
        threshold: f64,
    },
}

/// Parse and strictly validate raw evaluator output.
///
/// Every field is checked on its own; wrong types are rejected rather than
/// coerced, and the model's `passed` flag must agree with
/// `overallScore >= pass_threshold`.
pub fn validate(
    raw: &str,
    rubric: &RubricSpec,
    pass_threshold: f64,
) -> Result<EvaluationResult, ValidationError> {
    debug!(output_len = raw.len(), "Validating evaluator output");

    let trimmed = raw.trim();
    if !trimmed.starts_with('{') || !trimmed.ends_with('}') {
        return Err(ValidationError::NotJson);
    }

    let value: Value = serde_json::from_str(trimmed)?;
    let object = value
        .as_object()
        .ok_or_else(|| mismatch("response is not a JSON object"))?;

    check_key_set(object)?;

    let overall_score = unit_score("overallScore", &object["overallScore"])?;

    let passed = object["passed"]
        .as_bool()
        .ok_or_else(|| mismatch("`passed` must be a boolean"))?;

    let feedback = object["feedback"]
        .as_str()
        .ok_or_else(|| mismatch("`feedback` must be a string"))?
        .to_string();

    let suggested_fixes = object["suggestedFixes"]
        .as_array()
        .ok_or_else(|| mismatch("`suggestedFixes` must be an array"))?
        .iter()
        .map(|fix| {
            fix.as_str()
                .map(String::from)
                .ok_or_else(|| mismatch("`suggestedFixes` must contain only strings"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let dimension_scores = check_dimensions(&object["dimensionScores"], rubric)?;

    let should_pass = overall_score >= pass_threshold;
    if passed != should_pass {
        return Err(ValidationError::PassFlagInconsistent {
            passed,
            overall_score,
            threshold: pass_threshold,
        });
    }

    Ok(EvaluationResult {
        overall_score,
        passed,
        dimension_scores,
        feedback,
        suggested_fixes,
    })
}

fn mismatch(message: impl Into<String>) -> ValidationError {
    ValidationError::SchemaMismatch(message.into())
}

fn check_key_set(object: &Map<String, Value>) -> Result<(), ValidationError> {
    let missing: Vec<&str> = REQUIRED_KEYS
        .iter()
        .copied()
        .filter(|key| !object.contains_key(*key))
        .collect();
    let unexpected: Vec<&str> = object
        .keys()
        .map(String::as_str)
        .filter(|key| !REQUIRED_KEYS.contains(key))
        .collect();

    if !missing.is_empty() || !unexpected.is_empty() {
        return Err(mismatch(format!(
            "expected keys {:?}; missing {:?}, unexpected {:?}",
            REQUIRED_KEYS, missing, unexpected
        )));
    }
    Ok(())
}

fn check_dimensions(
    value: &Value,
    rubric: &RubricSpec,
) -> Result<BTreeMap<String, f64>, ValidationError> {
    let scores = value
        .as_object()
        .ok_or_else(|| mismatch("`dimensionScores` must be an object"))?;

    let missing: Vec<&str> = rubric
        .dimension_names()
        .filter(|name| !scores.contains_key(*name))
        .collect();
    let unexpected: Vec<&str> = scores
        .keys()
        .map(String::as_str)
        .filter(|key| !rubric.has_dimension(key))
        .collect();

    if !missing.is_empty() || !unexpected.is_empty() {
        return Err(mismatch(format!(
            "`dimensionScores` must match the rubric exactly; missing {:?}, unexpected {:?}",
            missing, unexpected
        )));
    }

    scores
        .iter()
        .map(|(name, score)| {
            let field = format!("dimensionScores.{}", name);
            Ok((name.clone(), unit_score(&field, score)?))
        })
        .collect()
}

fn unit_score(field: &str, value: &Value) -> Result<f64, ValidationError> {
    let score = value
        .as_f64()
        .filter(|s| s.is_finite())
        .ok_or_else(|| mismatch(format!("`{}` must be a finite number", field)))?;

    if !(0.0..=1.0).contains(&score) {
        return Err(mismatch(format!(
            "`{}` must be within [0, 1], found {}",
            field, score
        )));
    }
    Ok(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rubric() -> RubricSpec {
        RubricSpec::parse(
            "dimensions:\n  clarity:\n    weight: 0.5\n  completeness:\n    weight: 0.5\n",
        )
        .unwrap()
    }

    fn candidate() -> Value {
        json!({
            "overallScore": 0.9,
            "passed": true,
            "dimensionScores": {"clarity": 0.9, "completeness": 0.8},
            "feedback": "Solid list.",
            "suggestedFixes": []
        })
    }

    fn check(value: &Value, threshold: f64) -> Result<EvaluationResult, ValidationError> {
        validate(&value.to_string(), &rubric(), threshold)
    }

    #[test]
    fn test_valid_candidate() {
        let result = check(&candidate(), 0.85).unwrap();
        assert_eq!(result.overall_score, 0.9);
        assert!(result.passed);
        assert_eq!(result.dimension_scores.len(), 2);
        assert_eq!(result.dimension_scores["completeness"], 0.8);
        assert_eq!(result.feedback, "Solid list.");
        assert_eq!(result.short_description(), "PASS (0.90)");
    }

    #[test]
    fn test_surrounding_whitespace_allowed() {
        let raw = format!("\n  {}  \n", candidate());
        assert!(validate(&raw, &rubric(), 0.85).is_ok());
    }

    #[test]
    fn test_prose_wrapped_json_is_not_json() {
        let raw = format!("Sure! ```json\n{}\n```", candidate());
        assert!(matches!(
            validate(&raw, &rubric(), 0.85),
            Err(ValidationError::NotJson)
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            validate("{\"overallScore\": 0.9,}", &rubric(), 0.85),
            Err(ValidationError::MalformedJson(_))
        ));
    }

    #[test]
    fn test_each_missing_key_is_schema_mismatch() {
        for key in REQUIRED_KEYS {
            let mut value = candidate();
            value.as_object_mut().unwrap().remove(key);
            assert!(
                matches!(check(&value, 0.85), Err(ValidationError::SchemaMismatch(_))),
                "removing {} should fail",
                key
            );
        }
    }

    #[test]
    fn test_extra_key_is_schema_mismatch() {
        let mut value = candidate();
        value
            .as_object_mut()
            .unwrap()
            .insert("confidence".into(), json!(0.9));
        assert!(matches!(
            check(&value, 0.85),
            Err(ValidationError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_extra_dimension_is_schema_mismatch() {
        let mut value = candidate();
        value["dimensionScores"] = json!({"clarity": 0.9, "completeness": 0.8, "tone": 0.5});
        match check(&value, 0.85) {
            Err(ValidationError::SchemaMismatch(message)) => assert!(message.contains("tone")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_missing_dimension_is_schema_mismatch() {
        let mut value = candidate();
        value["dimensionScores"] = json!({"clarity": 0.9});
        assert!(matches!(
            check(&value, 0.85),
            Err(ValidationError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_renamed_dimension_is_schema_mismatch() {
        let mut value = candidate();
        value["dimensionScores"] = json!({"clarity": 0.9, "complete": 0.8});
        assert!(matches!(
            check(&value, 0.85),
            Err(ValidationError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_numeric_string_score_rejected() {
        let mut value = candidate();
        value["overallScore"] = json!("0.9");
        assert!(matches!(
            check(&value, 0.85),
            Err(ValidationError::SchemaMismatch(_))
        ));

        let mut value = candidate();
        value["dimensionScores"]["clarity"] = json!("0.9");
        assert!(matches!(
            check(&value, 0.85),
            Err(ValidationError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_out_of_range_scores_rejected() {
        let mut value = candidate();
        value["overallScore"] = json!(1.2);
        assert!(matches!(
            check(&value, 0.85),
            Err(ValidationError::SchemaMismatch(_))
        ));

        let mut value = candidate();
        value["dimensionScores"]["completeness"] = json!(-0.1);
        assert!(matches!(
            check(&value, 0.85),
            Err(ValidationError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_wrong_types_rejected() {
        let cases = [
            ("passed", json!("true")),
            ("feedback", json!(null)),
            ("suggestedFixes", json!("fix it")),
            ("suggestedFixes", json!(["ok", 3])),
            ("dimensionScores", json!([0.9, 0.8])),
        ];
        for (key, bad) in cases {
            let mut value = candidate();
            value[key] = bad;
            assert!(
                matches!(check(&value, 0.85), Err(ValidationError::SchemaMismatch(_))),
                "bad {} should fail",
                key
            );
        }
    }

    #[test]
    fn test_integer_scores_accepted() {
        let mut value = candidate();
        value["overallScore"] = json!(1);
        value["dimensionScores"] = json!({"clarity": 1, "completeness": 0});
        let result = check(&value, 0.85).unwrap();
        assert_eq!(result.overall_score, 1.0);
    }

    #[test]
    fn test_exactly_at_threshold_passes() {
        let mut value = candidate();
        value["overallScore"] = json!(0.85);
        value["passed"] = json!(true);
        assert!(check(&value, 0.85).is_ok());
    }

    #[test]
    fn test_pass_flag_must_match_threshold() {
        let mut value = candidate();
        value["overallScore"] = json!(0.85);
        value["passed"] = json!(false);
        assert!(matches!(
            check(&value, 0.85),
            Err(ValidationError::PassFlagInconsistent { passed: false, .. })
        ));

        let mut value = candidate();
        value["overallScore"] = json!(0.6);
        value["passed"] = json!(true);
        assert!(matches!(
            check(&value, 0.85),
            Err(ValidationError::PassFlagInconsistent { passed: true, .. })
        ));
    }

    #[test]
    fn test_failing_score_with_false_flag_is_valid() {
        let mut value = candidate();
        value["overallScore"] = json!(0.6);
        value["passed"] = json!(false);
        value["suggestedFixes"] = json!(["Add triggers", "Cite sources"]);
        let result = check(&value, 0.85).unwrap();
        assert!(!result.passed);
        assert_eq!(result.short_description(), "FAIL (0.60, 2 fixes)");
    }
}
