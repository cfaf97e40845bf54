use gradeloops_config::RubricSpec;
use gradeloops_model::{ChatMessage, InvokeOptions, ModelClient, ModelError};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{validate, EvaluationResult, LoopPrompts, ValidationError};

/// Called with the first validation failure, right before the repair request.
pub type RepairCallback = Arc<dyn Fn(&ValidationError) + Send + Sync>;

/// Inputs required to evaluate one artifact.
#[derive(Clone, Copy)]
pub struct EvaluationInput<'a> {
    /// Evaluator prompt template
    pub prompt: &'a str,
    pub artifact: &'a str,
    pub rubric: &'a RubricSpec,
    pub inputs_block: &'a str,
    pub pass_threshold: f64,
    pub attempt: u32,
}

/// A validated evaluation and how it was obtained
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub result: EvaluationResult,
    /// Whether the first response failed validation and the repair request succeeded
    pub repaired: bool,
}

/// Runs the evaluator phase against a model, with one repair round-trip
pub struct Evaluator<'a> {
    model: &'a dyn ModelClient,
}

impl<'a> Evaluator<'a> {
    pub fn new(model: &'a dyn ModelClient) -> Self {
        Self { model }
    }

    /// Evaluate an artifact against the rubric
    pub async fn evaluate(&self, input: EvaluationInput<'_>) -> Result<Evaluation, EvaluationError> {
        self.evaluate_with_callback(input, None).await
    }

    /// Evaluate an artifact, notifying `on_repair` if a repair request is issued.
    ///
    /// A model failure on the first request is returned as-is; only a
    /// validation failure triggers the repair request, and a second validation
    /// failure is returned to the caller.
    pub async fn evaluate_with_callback(
        &self,
        input: EvaluationInput<'_>,
        on_repair: Option<RepairCallback>,
    ) -> Result<Evaluation, EvaluationError> {
        let schema_instruction = LoopPrompts::build_schema_instruction(
            input.rubric.dimension_names(),
            input.pass_threshold,
        );
        let system_message =
            LoopPrompts::build_evaluator_system_message(input.prompt, &schema_instruction);
        let user_message = LoopPrompts::build_evaluator_message(
            input.artifact,
            &input.rubric.source,
            input.inputs_block,
        );
        let options = InvokeOptions::new(0.0).with_strict_json();

        debug!(
            attempt = input.attempt,
            system_len = system_message.len(),
            user_len = user_message.len(),
            "Running evaluator"
        );

        let initial = self
            .model
            .invoke(
                &[
                    ChatMessage::system(system_message.as_str()),
                    ChatMessage::user(user_message.as_str()),
                ],
                &options,
            )
            .await?;

        let first_error = match validate(&initial, input.rubric, input.pass_threshold) {
            Ok(result) => {
                return Ok(Evaluation {
                    result,
                    repaired: false,
                })
            }
            Err(e) => e,
        };

        warn!(
            attempt = input.attempt,
            error = %first_error,
            "Evaluator response invalid, requesting repair"
        );
        if let Some(callback) = on_repair {
            callback(&first_error);
        }

        let repair_system = LoopPrompts::build_repair_system_message(&system_message);
        let repaired = self
            .model
            .invoke(
                &[
                    ChatMessage::system(repair_system),
                    ChatMessage::user(user_message),
                ],
                &options,
            )
            .await?;

        let result = validate(&repaired, input.rubric, input.pass_threshold)?;
        info!(attempt = input.attempt, "Evaluator response repaired");

        Ok(Evaluation {
            result,
            repaired: true,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("Evaluator model error: {0}")]
    Model(#[from] ModelError),

    #[error("{0}")]
    Validation(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use gradeloops_model::fakes::ScriptedModel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const VALID: &str = r#"{"overallScore":0.9,"passed":true,"dimensionScores":{"clarity":0.9,"completeness":0.8},"feedback":"Good","suggestedFixes":[]}"#;

    fn rubric() -> RubricSpec {
        RubricSpec::parse(
            "dimensions:\n  clarity:\n    weight: 0.5\n  completeness:\n    weight: 0.5\n",
        )
        .unwrap()
    }

    fn input<'a>(rubric: &'a RubricSpec) -> EvaluationInput<'a> {
        EvaluationInput {
            prompt: "You are a strict evaluator.",
            artifact: "# Targets",
            rubric,
            inputs_block: "## thesis\n```text\nLATAM\n```",
            pass_threshold: 0.85,
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn test_valid_first_response() {
        let model = ScriptedModel::new().respond(VALID);
        let rubric = rubric();

        let evaluation = Evaluator::new(&model).evaluate(input(&rubric)).await.unwrap();

        assert!(!evaluation.repaired);
        assert_eq!(evaluation.result.overall_score, 0.9);
        assert_eq!(model.call_count(), 1);

        let call = &model.calls()[0];
        assert_eq!(call.options.temperature, 0.0);
        assert!(call.options.strict_json);
        let system = call.system().unwrap();
        assert!(system.starts_with("You are a strict evaluator.\n\nReturn ONLY valid JSON"));
        assert!(system.contains(r#""clarity": number, "completeness": number"#));
        assert!(call.user().unwrap().contains("```yaml\ndimensions:"));
    }

    #[tokio::test]
    async fn test_fenced_response_repaired_once() {
        let fenced = format!("Sure! ```json\n{}\n```", VALID);
        let model = ScriptedModel::new().respond(fenced).respond(VALID);
        let rubric = rubric();

        let repairs = Arc::new(AtomicUsize::new(0));
        let seen = repairs.clone();
        let callback: RepairCallback = Arc::new(move |error: &ValidationError| {
            assert!(matches!(error, ValidationError::NotJson));
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let evaluation = Evaluator::new(&model)
            .evaluate_with_callback(input(&rubric), Some(callback))
            .await
            .unwrap();

        assert!(evaluation.repaired);
        assert_eq!(repairs.load(Ordering::SeqCst), 1);
        assert_eq!(model.call_count(), 2);

        let calls = model.calls();
        assert!(calls[1]
            .system()
            .unwrap()
            .ends_with(crate::prompts::REPAIR_INSTRUCTION));
        assert_eq!(calls[0].user(), calls[1].user());
    }

    #[tokio::test]
    async fn test_second_invalid_response_is_returned() {
        let model = ScriptedModel::new()
            .respond("not json")
            .respond(r#"{"overallScore":0.9}"#);
        let rubric = rubric();

        let err = Evaluator::new(&model).evaluate(input(&rubric)).await.unwrap_err();

        assert!(matches!(
            err,
            EvaluationError::Validation(ValidationError::SchemaMismatch(_))
        ));
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn test_model_error_skips_repair() {
        let model = ScriptedModel::new()
            .fail(ModelError::TransportFailure("timeout".into()))
            .respond(VALID);
        let rubric = rubric();

        let err = Evaluator::new(&model).evaluate(input(&rubric)).await.unwrap_err();

        assert!(matches!(err, EvaluationError::Model(ModelError::TransportFailure(_))));
        assert_eq!(model.call_count(), 1);
        assert_eq!(model.remaining(), 1);
    }

    #[tokio::test]
    async fn test_inconsistent_pass_flag_triggers_repair() {
        let inconsistent = r#"{"overallScore":0.6,"passed":true,"dimensionScores":{"clarity":0.6,"completeness":0.6},"feedback":"","suggestedFixes":[]}"#;
        let model = ScriptedModel::new().respond(inconsistent).respond(VALID);
        let rubric = rubric();

        let evaluation = Evaluator::new(&model).evaluate(input(&rubric)).await.unwrap();
        assert!(evaluation.repaired);
        assert!(evaluation.result.passed);
    }
}
