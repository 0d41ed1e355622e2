//! 流程层：一个单元从旁白到回复的完整顺序

pub mod exercise_ctx;
pub mod phase;
pub mod step_flow;

pub use exercise_ctx::ExerciseCtx;
pub use phase::{FlowEvent, Phase};
pub use step_flow::{StepFlow, StepOutcome, UnitContent, FALLBACK_NARRATION};
