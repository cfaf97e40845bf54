//! # gradeloops-core
//!
//! The bounded producer → evaluator → reviser loop.
//!
//! [`LoopRunner`] drives one cycle for one agent: it produces an artifact,
//! has it scored against the agent's rubric, and revises it until it passes
//! or the attempt budget is spent. Every state transition is appended to the
//! cycle's `run-log.json` through [`RunRecorder`] before the loop moves on.

mod artifacts;
mod context;
mod error;
mod inputs;
mod loop_runner;
mod outcome;
mod record;
mod recorder;

pub use artifacts::{ArtifactStore, SavedArtifact};
pub use context::{LoopConfig, LoopContext};
pub use error::{LoopError, PersistenceError, PhaseError};
pub use inputs::ProducerInputs;
pub use loop_runner::LoopRunner;
pub use outcome::{exhaustion_reason, LoopResult};
pub use record::{RunRecord, RunStatus};
pub use recorder::{read_run_log, RunMirror, RunRecorder};
