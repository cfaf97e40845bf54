use gradeloops_config::{
    AgentRegistry, AgentSpec, ConfigError, ProjectLayout, RubricSpec, DEFAULT_OUTPUT_DIR,
};
use gradeloops_evaluator::EvaluationResult;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::inputs::ProducerInputs;
use crate::record::{RunRecord, RunStatus};

/// Resolved, immutable configuration for one cycle of one agent
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub cycle_id: String,
    pub agent: AgentSpec,
    pub rubric: RubricSpec,
    pub layout: ProjectLayout,
    /// Absolute output root; artifacts go to `<root>/<cycle>/<agent>/`
    pub output_root: PathBuf,
    pub inputs: ProducerInputs,
    pub pass_threshold: f64,
}

impl LoopConfig {
    pub fn new(
        layout: ProjectLayout,
        cycle_id: &str,
        agent: AgentSpec,
        rubric: RubricSpec,
    ) -> Result<Self, ConfigError> {
        check_path_component("cycle_id", cycle_id)?;
        check_path_component("agent_name", &agent.name)?;

        let pass_threshold = agent.effective_threshold(&rubric);
        let output_root = layout.resolve_output(Path::new(DEFAULT_OUTPUT_DIR));
        let inputs = ProducerInputs::from_entries(agent.inputs.clone());

        Ok(Self {
            cycle_id: cycle_id.to_string(),
            agent,
            rubric,
            layout,
            output_root,
            inputs,
            pass_threshold,
        })
    }

    /// Load the agent and its rubric from the project's registry
    pub fn load(
        layout: ProjectLayout,
        cycle_id: &str,
        agent_name: &str,
    ) -> Result<Self, ConfigError> {
        let registry = AgentRegistry::load(&layout.registry_path())?;
        let agent = registry.agent(agent_name)?;
        let rubric = RubricSpec::load(&layout.resolve_system(&agent.rubric))?;
        debug!(
            agent = %agent.name,
            rubric = %agent.rubric,
            rubric_version = %rubric.version,
            "Resolved agent"
        );
        Self::new(layout, cycle_id, agent, rubric)
    }

    pub fn with_output_dir(mut self, output_dir: &Path) -> Self {
        self.output_root = self.layout.resolve_output(output_dir);
        self
    }

    /// Override or add a producer input
    pub fn with_input(mut self, key: impl Into<String>, value: Value) -> Self {
        self.inputs.set(key, value);
        self
    }

    pub fn cycle_dir(&self) -> PathBuf {
        self.output_root.join(&self.cycle_id)
    }

    pub fn agent_dir(&self) -> PathBuf {
        self.cycle_dir().join(&self.agent.name)
    }

    pub fn run_log_path(&self) -> PathBuf {
        self.cycle_dir().join("run-log.json")
    }

    pub fn prompt_path(&self, reference: &str) -> PathBuf {
        self.layout.resolve_system(reference)
    }
}

fn check_path_component(field: &str, value: &str) -> Result<(), ConfigError> {
    let invalid = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\'])
        || value.chars().any(char::is_control);
    if invalid {
        return Err(ConfigError::InvalidField {
            path: field.to_string(),
            message: format!("{:?} is not usable as a directory name", value),
        });
    }
    Ok(())
}

/// Mutable state of one running cycle
#[derive(Debug)]
pub struct LoopContext {
    pub config: LoopConfig,
    /// Current attempt number (1-based)
    pub attempt: u32,
    /// Records emitted so far, in order
    pub runs: Vec<RunRecord>,
    last_artifact: Option<String>,
    last_evaluation: Option<EvaluationResult>,
    started_at: Instant,
}

impl LoopContext {
    pub fn new(config: LoopConfig) -> Self {
        Self {
            config,
            attempt: 1,
            runs: Vec::new(),
            last_artifact: None,
            last_evaluation: None,
            started_at: Instant::now(),
        }
    }

    pub fn should_continue(&self) -> bool {
        self.attempt <= self.config.agent.max_attempts
    }

    pub fn increment_attempt(&mut self) {
        self.attempt += 1;
    }

    /// A new record for the current attempt
    pub fn new_record(&self, status: RunStatus) -> RunRecord {
        RunRecord::new(
            &self.config.cycle_id,
            &self.config.agent.name,
            self.attempt,
            status,
        )
    }

    pub fn push_run(&mut self, record: RunRecord) {
        self.runs.push(record);
    }

    /// Keep a failed attempt's output as the next revision's input
    pub fn retain(&mut self, artifact: String, evaluation: EvaluationResult) {
        self.last_artifact = Some(artifact);
        self.last_evaluation = Some(evaluation);
    }

    /// Prior artifact and evaluation to revise, if an attempt got that far
    pub fn revision_source(&self) -> Option<(&str, &EvaluationResult)> {
        match (&self.last_artifact, &self.last_evaluation) {
            (Some(artifact), Some(evaluation)) => Some((artifact.as_str(), evaluation)),
            _ => None,
        }
    }

    pub fn last_score(&self) -> Option<f64> {
        self.last_evaluation.as_ref().map(|e| e.overall_score)
    }

    pub fn total_duration(&self) -> Duration {
        self.started_at.elapsed()
    }
}
