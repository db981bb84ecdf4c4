pub mod config;
pub mod evaluator;

pub use config::{GuardConfig, GuardConfigError};
pub use evaluator::{
    GuardAssessment, GuardEvaluator, GuardFactor, GuardInputs, GuardLevel, GuardReason,
    HardTriggerCounts,
};
