//! # gradeloops-config
//!
//! Configuration loading for the gradeloops evaluation loop.
//!
//! ## Key Types
//!
//! - [`AgentRegistry`] - The agent registry (`SYSTEM/config/agents.yaml`)
//! - [`AgentSpec`] - Resolved per-agent configuration
//! - [`RubricSpec`] - Scoring dimensions that define the evaluator's output schema
//! - [`ProjectLayout`] - Where prompts, rubrics and artifacts live
//!
//! Both documents use a small indentation-based `key: value` format, see
//! [`parser`] for its grammar.

mod error;
mod layout;
pub mod parser;
mod registry;
mod rubric;

pub use error::ConfigError;
pub use layout::{ProjectLayout, DEFAULT_OUTPUT_DIR, REGISTRY_PATH, SYSTEM_DIR};
pub use parser::{ConfigValue, Mapping, Scalar};
pub use registry::{
    AgentRegistry, AgentSpec, RegistryDefaults, DEFAULT_MAX_ATTEMPTS, DEFAULT_PASS_THRESHOLD,
};
pub use rubric::{Dimension, RubricSpec, DEFAULT_RUBRIC_VERSION};
