use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading the agent registry or a rubric.
///
/// All of them are fatal to starting a cycle.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Agent \"{name}\" not found in config. Available: {}", .available.join(", "))]
    AgentNotFound { name: String, available: Vec<String> },

    #[error("Rubric unreadable at {}: {reason}", .path.display())]
    RubricUnreadable { path: PathBuf, reason: String },

    #[error("Agent registry unreadable at {}: {source}", .path.display())]
    RegistryUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Invalid field `{path}`: {message}")]
    InvalidField { path: String, message: String },
}
