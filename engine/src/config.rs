use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum EngineConfigError {
    #[error("quote_depth must be > 0")]
    ZeroQuoteDepth,

    #[error("base_spread_bps ({0}) must be > 0")]
    NonPositiveBaseSpread(f64),
}

/// Top-level quoting parameters. Spread shaping and guard thresholds live
/// in their own component configs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Book depth requested from the cache on every tick.
    pub quote_depth: usize,

    /// Spread before any factor adjustment, in basis points.
    pub base_spread_bps: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quote_depth: 20,
            base_spread_bps: 1.0,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineConfigError> {
        if self.quote_depth == 0 {
            return Err(EngineConfigError::ZeroQuoteDepth);
        }
        if self.base_spread_bps <= 0.0 {
            return Err(EngineConfigError::NonPositiveBaseSpread(
                self.base_spread_bps,
            ));
        }
        Ok(())
    }
}
