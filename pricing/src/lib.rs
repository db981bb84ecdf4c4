pub mod config;
pub mod estimator;

pub use config::SpreadConfig;
pub use estimator::{FactorScores, SpreadDecision, SpreadEstimator};
