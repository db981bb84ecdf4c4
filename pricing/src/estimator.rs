//! Adaptive spread estimator.
//!
//! Per tick, the estimator folds the latest market view and execution
//! samples into four normalized scores:
//!   • volatility: EMA of relative mid-price movement
//!   • liquidity:  top-of-book depth versus a healthy baseline
//!   • latency:    p95 of the recent sample ring
//!   • P&L:        rolling z-score, drawdowns only
//!
//! The weighted total widens the base spread, and the result is shaped by
//! a hard [min, max] clamp, a per-tick step limit, and a cooloff interval
//! between real changes.
//!
//! The estimator is a pure, synchronous transform over per-instrument
//! owned state. It never fails: degraded inputs (missing samples, a cache
//! miss) reduce to neutral scores or a flagged passthrough of the last
//! emitted value.

use std::collections::HashMap;

use tracing::debug;

use common::stats::{LatencyRing, PnlWindow, VolatilityEma};
use marketdata::types::{CacheRead, Instrument};

use crate::config::{SpreadConfig, SpreadConfigError};

/// Emitted changes smaller than this do not count as a "real change" for
/// cooloff purposes.
const CHANGE_EPSILON_BPS: f64 = 1e-3;

/// The four factor scores, each in [0, 1], plus their weighted total.
/// Exposed for logging and metrics export.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FactorScores {
    pub volatility: f64,
    pub liquidity: f64,
    pub latency: f64,
    pub pnl: f64,
    pub total: f64,
}

/// Output of one spread computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpreadDecision {
    pub spread_bps: f64,
    pub scores: FactorScores,
    /// The cache read carried no usable snapshot; the previous value was
    /// returned unchanged.
    pub stale_input: bool,
}

/// Per-instrument rolling state. Owned by the estimator, mutated only by
/// its own calls.
#[derive(Debug)]
struct SpreadState {
    vol: VolatilityEma,
    latency: LatencyRing,
    pnl: PnlWindow,
    last_spread_bps: Option<f64>,
    last_change_ms: Option<u64>,
}

impl SpreadState {
    fn new(cfg: &SpreadConfig) -> Self {
        Self {
            vol: VolatilityEma::new(cfg.vol_window_secs),
            latency: LatencyRing::default(),
            pnl: PnlWindow::default(),
            last_spread_bps: None,
            last_change_ms: None,
        }
    }
}

pub struct SpreadEstimator {
    cfg: SpreadConfig,
    states: HashMap<Instrument, SpreadState>,
}

impl SpreadEstimator {
    pub fn new(cfg: SpreadConfig) -> Result<Self, SpreadConfigError> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            states: HashMap::new(),
        })
    }

    pub fn config(&self) -> &SpreadConfig {
        &self.cfg
    }

    /// Last emitted spread for an instrument, if any tick has run.
    pub fn last_spread_bps(&self, instrument: &Instrument) -> Option<f64> {
        self.states
            .get(instrument)
            .and_then(|s| s.last_spread_bps)
    }

    /// Compute the spread for one tick.
    ///
    /// `latency_ms` and `pnl_delta` are this tick's samples from execution
    /// and accounting; either may be absent, excluding that factor's
    /// update for the tick.
    pub fn compute_spread(
        &mut self,
        instrument: &Instrument,
        base_spread_bps: f64,
        read: &CacheRead,
        latency_ms: Option<f64>,
        pnl_delta: Option<f64>,
        now_ms: u64,
    ) -> SpreadDecision {
        let cfg = self.cfg.clone();
        let state = self
            .states
            .entry(instrument.clone())
            .or_insert_with(|| SpreadState::new(&cfg));

        if let Some(sample) = latency_ms {
            state.latency.push(sample);
        }
        if let Some(delta) = pnl_delta {
            state.pnl.push(delta);
        }

        let Some(book) = read.book.as_ref() else {
            // No usable market view: hold the previous value rather than
            // quoting off nothing. A first tick with no data anchors the
            // clamped base so later ticks step away from it normally.
            let held = match state.last_spread_bps {
                Some(last) => last,
                None => {
                    let anchored =
                        clamp(base_spread_bps, cfg.min_spread_bps, cfg.max_spread_bps);
                    state.last_spread_bps = Some(anchored);
                    state.last_change_ms = Some(now_ms);
                    anchored
                }
            };
            debug!(instrument = %instrument, spread_bps = held, "stale input, holding spread");
            return SpreadDecision {
                spread_bps: held,
                scores: FactorScores::default(),
                stale_input: true,
            };
        };

        if let Some(mid) = book.mid() {
            state.vol.observe_mid(mid);
        }

        let scores = {
            let volatility = ramp(state.vol.value_bps(), cfg.vol_soft_bps, cfg.vol_hard_bps);

            let avg_depth =
                (book.bid_volume(cfg.depth_levels) + book.ask_volume(cfg.depth_levels)) / 2.0;
            let liquidity = (1.0 - avg_depth / cfg.liquidity_baseline).clamp(0.0, 1.0);

            let latency = match state.latency.p95() {
                Some(p95) => ramp(p95, cfg.latency_soft_ms, cfg.latency_hard_ms),
                None => 0.0,
            };

            let z = state.pnl.z_score();
            let pnl = if z >= 0.0 {
                0.0
            } else {
                (z / cfg.pnl_z_floor).clamp(0.0, 1.0)
            };

            let total = cfg.vol_weight * volatility
                + cfg.liquidity_weight * liquidity
                + cfg.latency_weight * latency
                + cfg.pnl_weight * pnl;

            FactorScores {
                volatility,
                liquidity,
                latency,
                pnl,
                total,
            }
        };

        let target = clamp(
            base_spread_bps * (1.0 + scores.total),
            cfg.min_spread_bps,
            cfg.max_spread_bps,
        );

        // Cooloff: a recent real change freezes the emitted value, even if
        // the recomputed target moved.
        if let (Some(last), Some(changed_at)) = (state.last_spread_bps, state.last_change_ms)
            && now_ms.saturating_sub(changed_at) < cfg.cooloff_ms
        {
            return SpreadDecision {
                spread_bps: last,
                scores,
                stale_input: false,
            };
        }

        let emitted = match state.last_spread_bps {
            // First emission is unconstrained by the step limit.
            None => target,
            Some(last) => last + (target - last).clamp(-cfg.step_bps, cfg.step_bps),
        };

        let moved = match state.last_spread_bps {
            None => true,
            Some(last) => (emitted - last).abs() > CHANGE_EPSILON_BPS,
        };
        if moved {
            state.last_change_ms = Some(now_ms);
        }
        state.last_spread_bps = Some(emitted);

        debug!(
            instrument = %instrument,
            base = base_spread_bps,
            vol = scores.volatility,
            liq = scores.liquidity,
            lat = scores.latency,
            pnl = scores.pnl,
            total = scores.total,
            spread_bps = emitted,
            "spread computed"
        );

        SpreadDecision {
            spread_bps: emitted,
            scores,
            stale_input: false,
        }
    }
}

/// Linear ramp: 0 at or below `soft`, 1 at or above `hard`.
fn ramp(value: f64, soft: f64, hard: f64) -> f64 {
    ((value - soft) / (hard - soft)).clamp(0.0, 1.0)
}

fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.clamp(min, max)
}
