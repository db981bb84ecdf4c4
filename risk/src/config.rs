//! Risk guard configuration: five SOFT/HARD threshold pairs plus the
//! action parameters, validated once at construction.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum GuardConfigError {
    #[error("{name} soft threshold ({soft}) must be below hard threshold ({hard})")]
    SoftAboveHard {
        name: &'static str,
        soft: f64,
        hard: f64,
    },

    #[error("pnl soft z ({soft}) must be above hard z ({hard}); both negative")]
    PnlThresholdOrdering { soft: f64, hard: f64 },

    #[error("taker_fills soft ({soft}) must be below hard ({hard})")]
    TakerThresholdOrdering { soft: u32, hard: u32 },

    #[error("taker_window_ms must be > 0")]
    ZeroTakerWindow,

    #[error("halt_duration_ms must be > 0")]
    ZeroHaltDuration,

    #[error("soft_size_scale ({0}) must lie in (0, 1]")]
    SizeScaleOutOfRange(f64),

    #[error("soft_spread_widen_bps ({0}) must be >= 0")]
    NegativeSpreadWiden(f64),

    #[error("vol_window_secs must be > 0")]
    ZeroVolWindow,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// EMA window for the volatility tracker, seconds-equivalent.
    pub vol_window_secs: u64,

    /// Volatility EMA thresholds (bps, triggers above).
    pub vol_soft_bps: f64,
    pub vol_hard_bps: f64,

    /// Latency p95 thresholds (ms, triggers above).
    pub latency_soft_ms: f64,
    pub latency_hard_ms: f64,

    /// P&L z-score thresholds (triggers below; hard is more negative).
    pub pnl_soft_z: f64,
    pub pnl_hard_z: f64,

    /// Absolute inventory thresholds (% of max position, triggers above).
    pub inventory_soft_pct: f64,
    pub inventory_hard_pct: f64,

    /// Taker-fill count thresholds over the trailing window (triggers at
    /// or above).
    pub taker_fills_soft: u32,
    pub taker_fills_hard: u32,
    pub taker_window_ms: u64,

    /// HARD action: quoting halts for this long.
    pub halt_duration_ms: u64,

    /// SOFT action: intended size is scaled by this factor and the spread
    /// widened by this additive amount.
    pub soft_size_scale: f64,
    pub soft_spread_widen_bps: f64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            vol_window_secs: 60,
            vol_soft_bps: 10.0,
            vol_hard_bps: 20.0,
            latency_soft_ms: 150.0,
            latency_hard_ms: 400.0,
            pnl_soft_z: -1.5,
            pnl_hard_z: -2.5,
            inventory_soft_pct: 60.0,
            inventory_hard_pct: 85.0,
            taker_fills_soft: 5,
            taker_fills_hard: 10,
            taker_window_ms: 60_000,
            halt_duration_ms: 30_000,
            soft_size_scale: 0.5,
            soft_spread_widen_bps: 0.5,
        }
    }
}

impl GuardConfig {
    pub fn validate(&self) -> Result<(), GuardConfigError> {
        for (name, soft, hard) in [
            ("volatility", self.vol_soft_bps, self.vol_hard_bps),
            ("latency", self.latency_soft_ms, self.latency_hard_ms),
            (
                "inventory",
                self.inventory_soft_pct,
                self.inventory_hard_pct,
            ),
        ] {
            if soft >= hard {
                return Err(GuardConfigError::SoftAboveHard { name, soft, hard });
            }
        }

        if self.pnl_soft_z <= self.pnl_hard_z || self.pnl_soft_z >= 0.0 {
            return Err(GuardConfigError::PnlThresholdOrdering {
                soft: self.pnl_soft_z,
                hard: self.pnl_hard_z,
            });
        }

        if self.taker_fills_soft >= self.taker_fills_hard {
            return Err(GuardConfigError::TakerThresholdOrdering {
                soft: self.taker_fills_soft,
                hard: self.taker_fills_hard,
            });
        }

        if self.taker_window_ms == 0 {
            return Err(GuardConfigError::ZeroTakerWindow);
        }
        if self.halt_duration_ms == 0 {
            return Err(GuardConfigError::ZeroHaltDuration);
        }
        if !(self.soft_size_scale > 0.0 && self.soft_size_scale <= 1.0) {
            return Err(GuardConfigError::SizeScaleOutOfRange(self.soft_size_scale));
        }
        if self.soft_spread_widen_bps < 0.0 {
            return Err(GuardConfigError::NegativeSpreadWiden(
                self.soft_spread_widen_bps,
            ));
        }
        if self.vol_window_secs == 0 {
            return Err(GuardConfigError::ZeroVolWindow);
        }

        Ok(())
    }
}
