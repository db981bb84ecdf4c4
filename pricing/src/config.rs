//! Spread estimator configuration, validated once at construction.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SpreadConfigError {
    #[error("min_spread_bps ({min}) must be below max_spread_bps ({max})")]
    MinAboveMax { min: f64, max: f64 },

    #[error("min_spread_bps must be >= 0")]
    NegativeMin,

    #[error("step_bps must be > 0")]
    ZeroStep,

    #[error("{name} soft threshold ({soft}) must be below hard threshold ({hard})")]
    SoftAboveHard {
        name: &'static str,
        soft: f64,
        hard: f64,
    },

    #[error("{name} weight ({value}) must lie in [0, 1]")]
    WeightOutOfRange { name: &'static str, value: f64 },

    #[error("pnl_z_floor ({0}) must be negative")]
    NonNegativePnlFloor(f64),

    #[error("liquidity_baseline must be > 0")]
    ZeroLiquidityBaseline,

    #[error("depth_levels must be > 0")]
    ZeroDepthLevels,

    #[error("vol_window_secs must be > 0")]
    ZeroVolWindow,
}

/// Bounds, ramps and sensitivity weights for the adaptive spread.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpreadConfig {
    pub min_spread_bps: f64,
    pub max_spread_bps: f64,
    /// Maximum change of the emitted spread per tick.
    pub step_bps: f64,
    /// Minimum interval between two real changes of the emitted spread.
    pub cooloff_ms: u64,

    /// EMA window for the volatility tracker, seconds-equivalent.
    pub vol_window_secs: u64,
    /// Volatility ramp: score 0 at soft, 1 at hard (EMA bps).
    pub vol_soft_bps: f64,
    pub vol_hard_bps: f64,

    /// Latency ramp over the p95 of the sample ring (ms).
    pub latency_soft_ms: f64,
    pub latency_hard_ms: f64,

    /// P&L drawdown ramp: z-score of 0 scores 0, `pnl_z_floor` scores 1.
    /// Only negative z contributes.
    pub pnl_z_floor: f64,

    /// Top-of-book levels summed per side for the liquidity score.
    pub depth_levels: usize,
    /// Depth volume considered "healthy"; score ramps up as the observed
    /// average falls below it.
    pub liquidity_baseline: f64,

    /// Per-factor sensitivity weights, each in [0, 1].
    pub vol_weight: f64,
    pub liquidity_weight: f64,
    pub latency_weight: f64,
    pub pnl_weight: f64,
}

impl Default for SpreadConfig {
    fn default() -> Self {
        Self {
            min_spread_bps: 0.2,
            max_spread_bps: 5.0,
            step_bps: 0.25,
            cooloff_ms: 500,
            vol_window_secs: 60,
            vol_soft_bps: 10.0,
            vol_hard_bps: 20.0,
            latency_soft_ms: 150.0,
            latency_hard_ms: 400.0,
            pnl_z_floor: -2.0,
            depth_levels: 5,
            liquidity_baseline: 10.0,
            vol_weight: 1.0,
            liquidity_weight: 0.8,
            latency_weight: 0.6,
            pnl_weight: 0.8,
        }
    }
}

impl SpreadConfig {
    pub fn validate(&self) -> Result<(), SpreadConfigError> {
        if self.min_spread_bps < 0.0 {
            return Err(SpreadConfigError::NegativeMin);
        }
        if self.min_spread_bps >= self.max_spread_bps {
            return Err(SpreadConfigError::MinAboveMax {
                min: self.min_spread_bps,
                max: self.max_spread_bps,
            });
        }
        if self.step_bps <= 0.0 {
            return Err(SpreadConfigError::ZeroStep);
        }
        if self.vol_soft_bps >= self.vol_hard_bps {
            return Err(SpreadConfigError::SoftAboveHard {
                name: "volatility",
                soft: self.vol_soft_bps,
                hard: self.vol_hard_bps,
            });
        }
        if self.latency_soft_ms >= self.latency_hard_ms {
            return Err(SpreadConfigError::SoftAboveHard {
                name: "latency",
                soft: self.latency_soft_ms,
                hard: self.latency_hard_ms,
            });
        }
        if self.pnl_z_floor >= 0.0 {
            return Err(SpreadConfigError::NonNegativePnlFloor(self.pnl_z_floor));
        }
        if self.liquidity_baseline <= 0.0 {
            return Err(SpreadConfigError::ZeroLiquidityBaseline);
        }
        if self.depth_levels == 0 {
            return Err(SpreadConfigError::ZeroDepthLevels);
        }
        if self.vol_window_secs == 0 {
            return Err(SpreadConfigError::ZeroVolWindow);
        }

        for (name, value) in [
            ("volatility", self.vol_weight),
            ("liquidity", self.liquidity_weight),
            ("latency", self.latency_weight),
            ("pnl", self.pnl_weight),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SpreadConfigError::WeightOutOfRange { name, value });
            }
        }

        Ok(())
    }
}
