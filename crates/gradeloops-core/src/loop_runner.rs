use gradeloops_evaluator::{
    EvaluationInput, EvaluationResult, Evaluator, LoopPrompts, RepairCallback, ValidationError,
};
use gradeloops_logging::{LogEvent, Logger, Phase};
use gradeloops_model::{ChatMessage, InvokeOptions, ModelClient};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::artifacts::ArtifactStore;
use crate::error::{LoopError, PersistenceError, PhaseError};
use crate::outcome::{exhaustion_reason, LoopResult};
use crate::recorder::{RunMirror, RunRecorder};
use crate::record::{RunRecord, RunStatus};
use crate::LoopContext;

const PRODUCER_TEMPERATURE: f32 = 0.4;
const REVISER_TEMPERATURE: f32 = 0.3;

/// How an attempt that ran to completion ended
enum AttemptOutcome {
    Passed(LoopResult),
    Failed,
}

/// Why an attempt stopped early
enum AttemptError {
    /// Absorbed: recorded as `failed`, consumes the attempt
    Phase {
        phase: Phase,
        error: PhaseError,
        artifact_path: Option<PathBuf>,
    },
    /// Aborts the cycle
    Fatal(LoopError),
}

impl From<LoopError> for AttemptError {
    fn from(e: LoopError) -> Self {
        AttemptError::Fatal(e)
    }
}

impl From<PersistenceError> for AttemptError {
    fn from(e: PersistenceError) -> Self {
        AttemptError::Fatal(e.into())
    }
}

/// Orchestrates the producer / evaluator / reviser loop
pub struct LoopRunner<'a> {
    model: &'a dyn ModelClient,
    mirror: Option<&'a dyn RunMirror>,
    logger: Arc<Logger>,
    interrupted: Arc<AtomicBool>,
}

impl<'a> LoopRunner<'a> {
    pub fn new(
        model: &'a dyn ModelClient,
        mirror: Option<&'a dyn RunMirror>,
        logger: Arc<Logger>,
    ) -> Self {
        Self {
            model,
            mirror,
            logger,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a handle to signal interruption.
    ///
    /// Checked before each attempt; a running attempt always completes.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    /// Run attempts until one passes or the attempt budget is spent
    pub async fn run(&self, mut context: LoopContext) -> Result<LoopResult, LoopError> {
        let store = ArtifactStore::new(context.config.agent_dir());
        store.prepare().await?;
        let recorder = RunRecorder::new(
            context.config.run_log_path(),
            self.mirror,
            self.logger.clone(),
        );

        let max_attempts = context.config.agent.max_attempts;
        self.logger.log(&LogEvent::LoopStarted {
            cycle_id: context.config.cycle_id.clone(),
            agent_name: context.config.agent.name.clone(),
            pass_threshold: context.config.pass_threshold,
            max_attempts,
            output_dir: store.dir().to_path_buf(),
        });
        info!(
            cycle = %context.config.cycle_id,
            agent = %context.config.agent.name,
            model = %self.model.model(),
            "Starting loop"
        );

        while context.should_continue() {
            if self.interrupted.load(Ordering::SeqCst) {
                info!(attempt = context.attempt, "Loop interrupted by user");
                return Err(LoopError::Interrupted);
            }

            self.logger.log(&LogEvent::AttemptStarted {
                attempt: context.attempt,
                max_attempts,
            });

            let started = Instant::now();
            match self
                .run_attempt(&mut context, &store, &recorder, started)
                .await
            {
                Ok(AttemptOutcome::Passed(result)) => return Ok(result),
                Ok(AttemptOutcome::Failed) => {}
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Phase {
                    phase,
                    error,
                    artifact_path,
                }) => {
                    warn!(
                        attempt = context.attempt,
                        %phase,
                        error = %error,
                        "Attempt failed"
                    );
                    self.logger.log(&LogEvent::AttemptErrored {
                        attempt: context.attempt,
                        phase,
                        error: error.to_string(),
                    });
                    let record = context
                        .new_record(RunStatus::Failed)
                        .with_artifact(artifact_path.as_deref())
                        .with_feedback(error.to_string())
                        .with_duration_ms(elapsed_ms(started))
                        .with_rubric_version(&context.config.rubric.version);
                    self.emit(&mut context, &recorder, record).await?;
                }
            }

            context.increment_attempt();
        }

        let last_score = context.last_score();
        let escalate = context.config.agent.escalate_on_fail;
        let reason = exhaustion_reason(context.config.pass_threshold, max_attempts, last_score);

        self.logger.log(&LogEvent::LoopExhausted {
            attempts: max_attempts,
            reason: reason.clone(),
            escalated: escalate,
        });
        info!(
            attempts = max_attempts,
            escalated = escalate,
            duration_secs = context.total_duration().as_secs_f64(),
            "Loop exhausted"
        );

        Ok(LoopResult::exhausted(
            max_attempts,
            last_score,
            context.runs,
            escalate,
            reason,
        ))
    }

    /// Run a single attempt: generate, persist, evaluate, persist, decide
    async fn run_attempt(
        &self,
        context: &mut LoopContext,
        store: &ArtifactStore,
        recorder: &RunRecorder<'_>,
        started: Instant,
    ) -> Result<AttemptOutcome, AttemptError> {
        let attempt = context.attempt;

        // Revise only when a prior attempt produced an evaluated artifact
        let revising = attempt > 1 && context.revision_source().is_some();
        let phase = if revising { Phase::Revise } else { Phase::Produce };
        let phase_error = |error: PhaseError| AttemptError::Phase {
            phase,
            error,
            artifact_path: None,
        };

        let inputs_block = context
            .config
            .inputs
            .render(&context.config.layout)
            .await
            .map_err(phase_error)?;

        let output = match context.revision_source() {
            Some((previous, evaluation)) if revising => {
                self.revise(context, previous, evaluation, &inputs_block).await
            }
            _ => self.produce(context, &inputs_block).await,
        }
        .map_err(phase_error)?;

        let saved = store.save_attempt(attempt, &output).await?;
        self.logger.log(&LogEvent::ArtifactSaved {
            attempt,
            path: saved.path.clone(),
            bytes: saved.bytes,
            digest: saved.digest.clone(),
        });

        let status = if revising {
            RunStatus::Revised
        } else {
            RunStatus::Produced
        };
        let record = context
            .new_record(status)
            .with_artifact(Some(saved.path.as_path()));
        self.emit(context, recorder, record).await?;

        let evaluation = self
            .evaluate(context, &output, &inputs_block)
            .await
            .map_err(|error| AttemptError::Phase {
                phase: Phase::Evaluate,
                error,
                artifact_path: Some(saved.path.clone()),
            })?;

        let eval_path = store.save_evaluation(attempt, &evaluation).await?;
        self.logger.log(&LogEvent::EvaluationSaved {
            attempt,
            path: eval_path,
        });

        let threshold = context.config.pass_threshold;
        let duration_ms = elapsed_ms(started);
        let passed = evaluation.passed && evaluation.overall_score >= threshold;
        self.logger.log(&LogEvent::EvaluationCompleted {
            attempt,
            score: evaluation.overall_score,
            threshold,
            passed,
            duration_ms,
        });

        let scored = |status: RunStatus, context: &LoopContext| -> RunRecord {
            context
                .new_record(status)
                .with_evaluation(&evaluation)
                .with_artifact(Some(saved.path.as_path()))
                .with_duration_ms(duration_ms)
                .with_rubric_version(&context.config.rubric.version)
        };

        let record = scored(RunStatus::Evaluated, &*context);
        self.emit(context, recorder, record).await?;

        if passed {
            let record = scored(RunStatus::Passed, &*context);
            self.emit(context, recorder, record).await?;

            let final_path = store.promote(&saved.path).await?;
            self.logger.log(&LogEvent::LoopPassed {
                attempt,
                score: evaluation.overall_score,
                final_path: final_path.clone(),
            });
            info!(
                attempt,
                score = evaluation.overall_score,
                duration_secs = context.total_duration().as_secs_f64(),
                "Loop passed"
            );

            let runs = std::mem::take(&mut context.runs);
            return Ok(AttemptOutcome::Passed(LoopResult::passed(
                attempt,
                evaluation.overall_score,
                final_path,
                runs,
            )));
        }

        self.logger.log(&LogEvent::AttemptFailed {
            attempt,
            score: evaluation.overall_score,
            feedback: evaluation.feedback.clone(),
            suggested_fixes: evaluation.suggested_fixes.clone(),
        });
        let record = scored(RunStatus::Failed, &*context);
        self.emit(context, recorder, record).await?;

        context.retain(output, evaluation);
        Ok(AttemptOutcome::Failed)
    }

    async fn produce(&self, context: &LoopContext, inputs_block: &str) -> Result<String, PhaseError> {
        self.logger.log(&LogEvent::ProducerStarted {
            attempt: context.attempt,
        });

        let prompt = read_prompt(&context.config.prompt_path(&context.config.agent.producer_prompt))
            .await?;
        let user_message = LoopPrompts::build_producer_message(inputs_block);

        debug!(attempt = context.attempt, "Running producer");
        let output = self
            .model
            .invoke(
                &[ChatMessage::system(prompt), ChatMessage::user(user_message)],
                &InvokeOptions::new(PRODUCER_TEMPERATURE),
            )
            .await?;
        Ok(output)
    }

    async fn revise(
        &self,
        context: &LoopContext,
        previous: &str,
        evaluation: &EvaluationResult,
        inputs_block: &str,
    ) -> Result<String, PhaseError> {
        self.logger.log(&LogEvent::ReviserStarted {
            attempt: context.attempt,
        });

        let prompt = read_prompt(&context.config.prompt_path(&context.config.agent.reviser_prompt))
            .await?;
        let user_message =
            LoopPrompts::build_reviser_message(previous, evaluation, context.attempt, inputs_block);

        debug!(attempt = context.attempt, "Running reviser");
        let output = self
            .model
            .invoke(
                &[ChatMessage::system(prompt), ChatMessage::user(user_message)],
                &InvokeOptions::new(REVISER_TEMPERATURE),
            )
            .await?;
        Ok(output)
    }

    async fn evaluate(
        &self,
        context: &LoopContext,
        artifact: &str,
        inputs_block: &str,
    ) -> Result<EvaluationResult, PhaseError> {
        let attempt = context.attempt;
        self.logger.log(&LogEvent::EvaluatorStarted { attempt });

        let prompt =
            read_prompt(&context.config.prompt_path(&context.config.agent.evaluator_prompt)).await?;

        let logger = self.logger.clone();
        let on_repair: RepairCallback = Arc::new(move |error: &ValidationError| {
            logger.log(&LogEvent::RepairRequested {
                attempt,
                reason: error.to_string(),
            });
        });

        let evaluator = Evaluator::new(self.model);
        let evaluation = evaluator
            .evaluate_with_callback(
                EvaluationInput {
                    prompt: &prompt,
                    artifact,
                    rubric: &context.config.rubric,
                    inputs_block,
                    pass_threshold: context.config.pass_threshold,
                    attempt,
                },
                Some(on_repair),
            )
            .await?;

        debug!(
            attempt,
            decision = %evaluation.result.short_description(),
            repaired = evaluation.repaired,
            "Evaluation complete"
        );
        Ok(evaluation.result)
    }

    /// Persist a record, then keep it for the final result
    async fn emit(
        &self,
        context: &mut LoopContext,
        recorder: &RunRecorder<'_>,
        record: RunRecord,
    ) -> Result<(), LoopError> {
        recorder.record(&record).await?;
        context.push_run(record);
        Ok(())
    }
}

async fn read_prompt(path: &Path) -> Result<String, PhaseError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| PhaseError::PromptUnreadable {
            path: path.to_path_buf(),
            source,
        })
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
