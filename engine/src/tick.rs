//! The per-tick evaluation pass.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use marketdata::cache::MarketDataCache;
use marketdata::config::CacheConfigError;
use marketdata::fetch::BookFetcher;
use marketdata::types::{FreshnessMode, Instrument};
use pricing::config::{SpreadConfig, SpreadConfigError};
use pricing::estimator::SpreadEstimator;
use risk::config::{GuardConfig, GuardConfigError};
use risk::evaluator::{GuardEvaluator, GuardInputs, GuardLevel, GuardReason};

use crate::config::{EngineConfig, EngineConfigError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Engine(#[from] EngineConfigError),

    #[error(transparent)]
    Cache(#[from] CacheConfigError),

    #[error(transparent)]
    Spread(#[from] SpreadConfigError),

    #[error(transparent)]
    Guard(#[from] GuardConfigError),
}

/// This tick's execution and accounting samples for one instrument.
/// Everything is optional; the pipeline degrades rather than fails.
#[derive(Debug, Clone, Default)]
pub struct TickInputs {
    /// Round-trip latency sample from the execution path, ms.
    pub latency_ms: Option<f64>,
    /// Realized P&L change since the previous tick.
    pub pnl_delta: Option<f64>,
    /// Inventory as a signed percentage of the max position.
    pub inventory_pct: Option<f64>,
    /// Timestamps of taker fills observed since the previous tick.
    pub taker_fill_ts_ms: Vec<u64>,
    /// Latest sequence number seen on the upstream feed, when known.
    pub expected_sequence: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteAction {
    /// Quote at full size.
    Quote,
    /// Quote at reduced size with a widened spread (SOFT guard).
    QuoteReduced,
    /// Pull quotes entirely (HARD guard).
    Halt,
}

/// What the quoting layer should do this tick, with the evidence behind
/// it.
#[derive(Debug, Clone)]
pub struct QuoteDecision {
    pub action: QuoteAction,
    /// Final spread, including any guard widening. `None` when halted.
    pub spread_bps: Option<f64>,
    pub size_scale: f64,
    pub guard_level: GuardLevel,
    pub guard_reasons: Vec<GuardReason>,
    pub halt_until_ms: Option<u64>,
    /// The decision was made from a degraded market view. While halted
    /// this reflects the strict read (stale served or no data at all);
    /// otherwise the pricing read carried no usable snapshot and the
    /// spread is a held previous value.
    pub stale_input: bool,
}

/// One evaluation pass per instrument per tick.
///
/// Owns the estimator and guard state; the cache is shared with whatever
/// feeds it snapshots.
pub struct TickEngine<F> {
    cfg: EngineConfig,
    cache: Arc<MarketDataCache<F>>,
    estimator: SpreadEstimator,
    guards: GuardEvaluator,
}

impl<F: BookFetcher> TickEngine<F> {
    pub fn new(
        cfg: EngineConfig,
        cache: Arc<MarketDataCache<F>>,
        spread_cfg: SpreadConfig,
        guard_cfg: GuardConfig,
    ) -> Result<Self, EngineError> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            cache,
            estimator: SpreadEstimator::new(spread_cfg)?,
            guards: GuardEvaluator::new(guard_cfg)?,
        })
    }

    pub fn cache(&self) -> &MarketDataCache<F> {
        &self.cache
    }

    pub fn guard_level(&self, instrument: &Instrument) -> GuardLevel {
        self.guards.current_level(instrument)
    }

    /// Evaluate one tick for `instrument`.
    ///
    /// Guards run first, on a strict read, so that a halt is decided from
    /// the freshest available view and pricing work is skipped entirely
    /// while halted.
    pub async fn evaluate_tick(
        &mut self,
        instrument: &Instrument,
        inputs: &TickInputs,
        now_ms: u64,
    ) -> QuoteDecision {
        for ts in &inputs.taker_fill_ts_ms {
            self.guards.record_taker_fill(instrument, *ts);
        }

        let strict = self
            .cache
            .read(
                instrument,
                self.cfg.quote_depth,
                FreshnessMode::Strict,
                inputs.expected_sequence,
                now_ms,
            )
            .await;

        let assessment = self.guards.assess(
            instrument,
            GuardInputs {
                mid: strict.mid(),
                latency_ms: inputs.latency_ms,
                pnl_delta: inputs.pnl_delta,
                inventory_pct: inputs.inventory_pct,
            },
            now_ms,
        );

        if assessment.level == GuardLevel::Hard {
            info!(
                instrument = %instrument,
                halt_until_ms = assessment.halt_until_ms,
                "tick halted"
            );
            return QuoteDecision {
                action: QuoteAction::Halt,
                spread_bps: None,
                size_scale: 0.0,
                guard_level: GuardLevel::Hard,
                guard_reasons: assessment.reasons,
                halt_until_ms: assessment.halt_until_ms,
                stale_input: strict.used_stale || strict.is_no_data(),
            };
        }

        let pricing_read = self
            .cache
            .read(
                instrument,
                self.cfg.quote_depth,
                FreshnessMode::Pricing,
                inputs.expected_sequence,
                now_ms,
            )
            .await;

        let decision = self.estimator.compute_spread(
            instrument,
            self.cfg.base_spread_bps,
            &pricing_read,
            inputs.latency_ms,
            inputs.pnl_delta,
            now_ms,
        );

        let spread_bps = decision.spread_bps + assessment.spread_widen_bps;
        let action = match assessment.level {
            GuardLevel::Soft => QuoteAction::QuoteReduced,
            _ => QuoteAction::Quote,
        };

        debug!(
            instrument = %instrument,
            spread_bps,
            size_scale = assessment.size_scale,
            level = ?assessment.level,
            stale = decision.stale_input,
            "tick evaluated"
        );

        QuoteDecision {
            action,
            spread_bps: Some(spread_bps),
            size_scale: assessment.size_scale,
            guard_level: assessment.level,
            guard_reasons: assessment.reasons,
            halt_until_ms: None,
            stale_input: decision.stale_input,
        }
    }
}
