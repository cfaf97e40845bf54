mod evaluation;
pub mod evaluator;
pub mod prompts;

pub use evaluation::{validate, EvaluationResult, ValidationError, REQUIRED_KEYS};
pub use evaluator::{Evaluation, EvaluationError, EvaluationInput, Evaluator, RepairCallback};
pub use prompts::{LoopPrompts, REPAIR_INSTRUCTION};
