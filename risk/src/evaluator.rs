//! Risk guard evaluator.
//!
//! Five independent conditions (volatility EMA, latency p95, P&L z-score,
//! absolute inventory, taker fills in a trailing window) are classified
//! against their own SOFT/HARD thresholds every tick (level-triggered, not
//! edge-triggered). The overall level is HARD if any condition is HARD,
//! else SOFT if any is SOFT, else NONE.
//!
//! HARD arms a halt: quoting stays suspended until `halt_until`, and an
//! evaluation at expiry runs from scratch. A still-bad condition re-arms
//! the full duration, with no partial credit.
//!
//! The evaluator never fails. A missing sample excludes only that
//! condition for the tick; the overall level is formed from the rest.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use tracing::{debug, warn};

use common::stats::{LatencyRing, PNL_MIN_SAMPLES, PnlWindow, VolatilityEma};
use marketdata::types::Instrument;

use crate::config::{GuardConfig, GuardConfigError};

/// Bound on retained taker-fill timestamps per instrument.
const TAKER_FILLS_CAPACITY: usize = 100;

/// Guard severity. `Hard` always dominates `Soft`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum GuardLevel {
    #[default]
    None,
    Soft,
    Hard,
}

/// The condition behind a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardFactor {
    Volatility,
    Latency,
    Pnl,
    Inventory,
    TakerFills,
    /// Not a scored condition: reported while a previously armed halt is
    /// still running down.
    HaltCooldown,
}

impl fmt::Display for GuardFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GuardFactor::Volatility => "volatility",
            GuardFactor::Latency => "latency",
            GuardFactor::Pnl => "pnl",
            GuardFactor::Inventory => "inventory",
            GuardFactor::TakerFills => "taker_fills",
            GuardFactor::HaltCooldown => "halt_cooldown",
        };
        f.write_str(name)
    }
}

/// One triggered condition, with the observed value and the threshold it
/// crossed. All simultaneously-triggering conditions are reported, not
/// just the first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuardReason {
    pub factor: GuardFactor,
    pub severity: GuardLevel,
    pub observed: f64,
    pub threshold: f64,
}

impl fmt::Display for GuardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tier = match self.severity {
            GuardLevel::Hard => "hard",
            GuardLevel::Soft => "soft",
            GuardLevel::None => "none",
        };
        write!(
            f,
            "{}: {:.2} vs {} {:.2}",
            self.factor, self.observed, tier, self.threshold
        )
    }
}

/// Per-tick samples. Every field is optional: a missing sample excludes
/// only that condition from this tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardInputs {
    pub mid: Option<f64>,
    pub latency_ms: Option<f64>,
    pub pnl_delta: Option<f64>,
    /// Inventory as a signed percentage of the max position.
    pub inventory_pct: Option<f64>,
}

/// Outcome of one assessment, consumed by quote construction.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardAssessment {
    pub level: GuardLevel,
    pub reasons: Vec<GuardReason>,
    pub halt_until_ms: Option<u64>,
    /// Factor the caller applies to its intended quote size.
    pub size_scale: f64,
    /// Additive widening the caller applies to the computed spread.
    pub spread_widen_bps: f64,
}

/// Per-instrument rolling state. Owned by the evaluator.
#[derive(Debug)]
struct GuardState {
    vol: VolatilityEma,
    latency: LatencyRing,
    pnl: PnlWindow,
    inventory_pct: Option<f64>,
    taker_fills: VecDeque<u64>,
    level: GuardLevel,
    halt_until_ms: Option<u64>,
}

impl GuardState {
    fn new(cfg: &GuardConfig) -> Self {
        Self {
            vol: VolatilityEma::new(cfg.vol_window_secs),
            latency: LatencyRing::default(),
            pnl: PnlWindow::default(),
            inventory_pct: None,
            taker_fills: VecDeque::with_capacity(TAKER_FILLS_CAPACITY),
            level: GuardLevel::None,
            halt_until_ms: None,
        }
    }

    fn recent_taker_fills(&self, now_ms: u64, window_ms: u64) -> u32 {
        let cutoff = now_ms.saturating_sub(window_ms);
        self.taker_fills.iter().filter(|ts| **ts >= cutoff).count() as u32
    }
}

/// Per-factor HARD trigger counters, for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HardTriggerCounts {
    pub volatility: u64,
    pub latency: u64,
    pub pnl: u64,
    pub inventory: u64,
    pub taker_fills: u64,
}

pub struct GuardEvaluator {
    cfg: GuardConfig,
    states: HashMap<Instrument, GuardState>,
    hard_triggers: HardTriggerCounts,
}

impl GuardEvaluator {
    pub fn new(cfg: GuardConfig) -> Result<Self, GuardConfigError> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            states: HashMap::new(),
            hard_triggers: HardTriggerCounts::default(),
        })
    }

    pub fn config(&self) -> &GuardConfig {
        &self.cfg
    }

    pub fn hard_trigger_counts(&self) -> HardTriggerCounts {
        self.hard_triggers
    }

    pub fn current_level(&self, instrument: &Instrument) -> GuardLevel {
        self.states
            .get(instrument)
            .map(|s| s.level)
            .unwrap_or_default()
    }

    /// Record a taker fill event. Fills are events rather than per-tick
    /// samples, so they arrive through their own path.
    pub fn record_taker_fill(&mut self, instrument: &Instrument, ts_ms: u64) {
        let cfg = &self.cfg;
        let state = self
            .states
            .entry(instrument.clone())
            .or_insert_with(|| GuardState::new(cfg));

        if state.taker_fills.len() == TAKER_FILLS_CAPACITY {
            state.taker_fills.pop_front();
        }
        state.taker_fills.push_back(ts_ms);
    }

    /// Assess the guard level for one tick.
    pub fn assess(
        &mut self,
        instrument: &Instrument,
        inputs: GuardInputs,
        now_ms: u64,
    ) -> GuardAssessment {
        let cfg = self.cfg.clone();
        let state = self
            .states
            .entry(instrument.clone())
            .or_insert_with(|| GuardState::new(&cfg));

        // Samples are folded in on every tick, halted or not, so the
        // rolling windows track the market through a halt and the
        // re-evaluation at expiry sees current conditions.
        if let Some(mid) = inputs.mid {
            state.vol.observe_mid(mid);
        }
        if let Some(sample) = inputs.latency_ms {
            state.latency.push(sample);
        }
        if let Some(delta) = inputs.pnl_delta {
            state.pnl.push(delta);
        }
        if let Some(pct) = inputs.inventory_pct {
            state.inventory_pct = Some(pct);
        }

        // An armed halt runs down before anything is re-scored.
        if let Some(halt_until) = state.halt_until_ms {
            if now_ms < halt_until {
                state.level = GuardLevel::Hard;
                debug!(
                    instrument = %instrument,
                    remaining_ms = halt_until - now_ms,
                    "halt cooldown active"
                );
                return GuardAssessment {
                    level: GuardLevel::Hard,
                    reasons: vec![GuardReason {
                        factor: GuardFactor::HaltCooldown,
                        severity: GuardLevel::Hard,
                        observed: (halt_until - now_ms) as f64,
                        threshold: 0.0,
                    }],
                    halt_until_ms: Some(halt_until),
                    size_scale: 0.0,
                    spread_widen_bps: 0.0,
                };
            }
            state.halt_until_ms = None;
        }

        let mut reasons = Vec::new();

        // 1. Volatility EMA (needs at least one mid-to-mid change)
        if state.vol.has_samples() {
            let vol = state.vol.value_bps();
            push_reason(
                &mut reasons,
                GuardFactor::Volatility,
                vol,
                classify_above(vol, cfg.vol_soft_bps, cfg.vol_hard_bps),
                cfg.vol_soft_bps,
                cfg.vol_hard_bps,
            );
        }

        // 2. Latency p95 (needs the minimum ring fill)
        if let Some(p95) = state.latency.p95() {
            push_reason(
                &mut reasons,
                GuardFactor::Latency,
                p95,
                classify_above(p95, cfg.latency_soft_ms, cfg.latency_hard_ms),
                cfg.latency_soft_ms,
                cfg.latency_hard_ms,
            );
        }

        // 3. P&L z-score (needs a filled window; triggers below)
        if state.pnl.len() >= PNL_MIN_SAMPLES {
            let z = state.pnl.z_score();
            let severity = if z < cfg.pnl_hard_z {
                GuardLevel::Hard
            } else if z < cfg.pnl_soft_z {
                GuardLevel::Soft
            } else {
                GuardLevel::None
            };
            push_reason(
                &mut reasons,
                GuardFactor::Pnl,
                z,
                severity,
                cfg.pnl_soft_z,
                cfg.pnl_hard_z,
            );
        }

        // 4. Inventory (absolute percentage)
        if let Some(pct) = state.inventory_pct {
            let abs = pct.abs();
            push_reason(
                &mut reasons,
                GuardFactor::Inventory,
                pct,
                classify_above(abs, cfg.inventory_soft_pct, cfg.inventory_hard_pct),
                cfg.inventory_soft_pct,
                cfg.inventory_hard_pct,
            );
        }

        // 5. Taker fills in the trailing window (triggers at-or-above)
        let fills = state.recent_taker_fills(now_ms, cfg.taker_window_ms);
        let severity = if fills >= cfg.taker_fills_hard {
            GuardLevel::Hard
        } else if fills >= cfg.taker_fills_soft {
            GuardLevel::Soft
        } else {
            GuardLevel::None
        };
        push_reason(
            &mut reasons,
            GuardFactor::TakerFills,
            fills as f64,
            severity,
            cfg.taker_fills_soft as f64,
            cfg.taker_fills_hard as f64,
        );

        let level = reasons
            .iter()
            .map(|r| r.severity)
            .max()
            .unwrap_or(GuardLevel::None);

        let mut halt_until_ms = None;
        if level == GuardLevel::Hard {
            let until = now_ms + cfg.halt_duration_ms;
            state.halt_until_ms = Some(until);
            halt_until_ms = Some(until);

            for reason in reasons.iter().filter(|r| r.severity == GuardLevel::Hard) {
                match reason.factor {
                    GuardFactor::Volatility => self.hard_triggers.volatility += 1,
                    GuardFactor::Latency => self.hard_triggers.latency += 1,
                    GuardFactor::Pnl => self.hard_triggers.pnl += 1,
                    GuardFactor::Inventory => self.hard_triggers.inventory += 1,
                    GuardFactor::TakerFills => self.hard_triggers.taker_fills += 1,
                    GuardFactor::HaltCooldown => {}
                }
            }
        }

        if let Some(state) = self.states.get_mut(instrument) {
            state.level = level;
        }

        if level != GuardLevel::None {
            warn!(
                instrument = %instrument,
                level = ?level,
                reasons = %format_reasons(&reasons),
                halt_until_ms,
                "risk guard triggered"
            );
        }

        let (size_scale, spread_widen_bps) = match level {
            GuardLevel::None => (1.0, 0.0),
            GuardLevel::Soft => (cfg.soft_size_scale, cfg.soft_spread_widen_bps),
            GuardLevel::Hard => (0.0, 0.0),
        };

        GuardAssessment {
            level,
            reasons,
            halt_until_ms,
            size_scale,
            spread_widen_bps,
        }
    }
}

fn classify_above(value: f64, soft: f64, hard: f64) -> GuardLevel {
    if value > hard {
        GuardLevel::Hard
    } else if value > soft {
        GuardLevel::Soft
    } else {
        GuardLevel::None
    }
}

/// Record the condition when it triggered; quiet conditions are omitted
/// from the reason list.
fn push_reason(
    reasons: &mut Vec<GuardReason>,
    factor: GuardFactor,
    observed: f64,
    severity: GuardLevel,
    soft_threshold: f64,
    hard_threshold: f64,
) {
    if severity == GuardLevel::None {
        return;
    }
    let threshold = match severity {
        GuardLevel::Hard => hard_threshold,
        _ => soft_threshold,
    };
    reasons.push(GuardReason {
        factor,
        severity,
        observed,
        threshold,
    });
}

fn format_reasons(reasons: &[GuardReason]) -> String {
    reasons
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
