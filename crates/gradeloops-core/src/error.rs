use gradeloops_config::ConfigError;
use gradeloops_evaluator::EvaluationError;
use gradeloops_model::ModelError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoopError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Loop was interrupted")]
    Interrupted,
}

/// Failure to durably write an artifact or run record.
///
/// Never absorbed by the loop: an attempt whose evidence cannot be stored
/// is not complete.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Run log at {} is not a valid record array: {source}", .path.display())]
    CorruptLog {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure inside one phase of an attempt.
///
/// Recorded as a `failed` run and absorbed by consuming the attempt.
#[derive(Error, Debug)]
pub enum PhaseError {
    #[error("Prompt unreadable at {}: {source}", .path.display())]
    PromptUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Input file unreadable at {}: {source}", .path.display())]
    InputUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}
