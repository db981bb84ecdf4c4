//! End-to-end tick evaluation against a mock exchange connector.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use engine::{EngineConfig, QuoteAction, TickEngine, TickInputs};
use marketdata::{BookFetcher, BookLevel, BookSnapshot, CacheConfig, Instrument, MarketDataCache};
use pricing::SpreadConfig;
use risk::{GuardConfig, GuardFactor, GuardLevel};

/// Serves a calm, deep book on every fetch.
struct HealthyFetcher {
    fetches: AtomicU64,
}

impl HealthyFetcher {
    fn new() -> Self {
        Self {
            fetches: AtomicU64::new(0),
        }
    }

    fn book() -> BookSnapshot {
        let bids = (0..25)
            .map(|i| BookLevel {
                price: 100.0 - i as f64 * 0.1,
                qty: 4.0,
            })
            .collect();
        let asks = (0..25)
            .map(|i| BookLevel {
                price: 100.1 + i as f64 * 0.1,
                qty: 4.0,
            })
            .collect();
        BookSnapshot {
            bids,
            asks,
            sequence: 1,
        }
    }
}

#[async_trait]
impl BookFetcher for HealthyFetcher {
    async fn fetch_book(
        &self,
        _instrument: &Instrument,
        _depth: usize,
    ) -> anyhow::Result<BookSnapshot> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        Ok(Self::book())
    }
}

struct FailingFetcher;

#[async_trait]
impl BookFetcher for FailingFetcher {
    async fn fetch_book(
        &self,
        _instrument: &Instrument,
        _depth: usize,
    ) -> anyhow::Result<BookSnapshot> {
        anyhow::bail!("connector down")
    }
}

fn engine_with<F: BookFetcher>(fetcher: F) -> TickEngine<F> {
    common::logger::init_logger("engine-tests");
    let cache = Arc::new(
        MarketDataCache::new(CacheConfig::default(), Arc::new(fetcher))
            .expect("valid cache config"),
    );
    TickEngine::new(
        EngineConfig::default(),
        cache,
        SpreadConfig {
            cooloff_ms: 0,
            ..SpreadConfig::default()
        },
        GuardConfig::default(),
    )
    .expect("valid engine config")
}

fn inst() -> Instrument {
    Instrument::new("BTCUSDT")
}

#[tokio::test]
async fn healthy_tick_quotes_at_base_spread() {
    let mut engine = engine_with(HealthyFetcher::new());
    let i = inst();

    let out = engine
        .evaluate_tick(
            &i,
            &TickInputs {
                latency_ms: Some(20.0),
                pnl_delta: Some(0.5),
                inventory_pct: Some(5.0),
                ..TickInputs::default()
            },
            0,
        )
        .await;

    assert_eq!(out.action, QuoteAction::Quote);
    assert_eq!(out.spread_bps, Some(1.0));
    assert_eq!(out.size_scale, 1.0);
    assert_eq!(out.guard_level, GuardLevel::None);
    assert!(out.guard_reasons.is_empty());
    assert!(!out.stale_input);
}

#[tokio::test]
async fn soft_guard_reduces_size_and_widens_spread() {
    let mut engine = engine_with(HealthyFetcher::new());
    let i = inst();

    // inventory 70% sits between soft 60 and hard 85
    let out = engine
        .evaluate_tick(
            &i,
            &TickInputs {
                inventory_pct: Some(70.0),
                ..TickInputs::default()
            },
            0,
        )
        .await;

    assert_eq!(out.action, QuoteAction::QuoteReduced);
    assert_eq!(out.size_scale, 0.5);
    assert_eq!(out.spread_bps, Some(1.0 + 0.5));
    assert_eq!(out.guard_level, GuardLevel::Soft);
    assert_eq!(out.guard_reasons.len(), 1);
    assert_eq!(out.guard_reasons[0].factor, GuardFactor::Inventory);
}

#[tokio::test]
async fn hard_guard_halts_and_outlasts_recovery() {
    let mut engine = engine_with(HealthyFetcher::new());
    let i = inst();

    let halted = engine
        .evaluate_tick(
            &i,
            &TickInputs {
                inventory_pct: Some(90.0),
                ..TickInputs::default()
            },
            0,
        )
        .await;

    assert_eq!(halted.action, QuoteAction::Halt);
    assert_eq!(halted.spread_bps, None);
    assert_eq!(halted.size_scale, 0.0);
    let halt_until = halted.halt_until_ms.expect("halt armed");
    assert_eq!(halt_until, 30_000);

    // inventory is back to normal, but the halt has not expired
    let held = engine
        .evaluate_tick(
            &i,
            &TickInputs {
                inventory_pct: Some(5.0),
                ..TickInputs::default()
            },
            halt_until - 1,
        )
        .await;

    assert_eq!(held.action, QuoteAction::Halt);
    assert_eq!(held.guard_reasons[0].factor, GuardFactor::HaltCooldown);

    // at expiry, with healthy inputs, quoting resumes
    let resumed = engine
        .evaluate_tick(
            &i,
            &TickInputs {
                inventory_pct: Some(5.0),
                ..TickInputs::default()
            },
            halt_until,
        )
        .await;

    assert_eq!(resumed.action, QuoteAction::Quote);
    assert_eq!(resumed.guard_level, GuardLevel::None);
}

#[tokio::test]
async fn taker_fill_burst_halts_quoting() {
    let mut engine = engine_with(HealthyFetcher::new());
    let i = inst();

    let out = engine
        .evaluate_tick(
            &i,
            &TickInputs {
                taker_fill_ts_ms: (0..10).map(|k| 900 + k).collect(),
                ..TickInputs::default()
            },
            1_000,
        )
        .await;

    assert_eq!(out.action, QuoteAction::Halt);
    assert_eq!(out.guard_reasons[0].factor, GuardFactor::TakerFills);
}

#[tokio::test]
async fn connector_outage_degrades_to_held_spread() {
    let mut engine = engine_with(FailingFetcher);
    let i = inst();

    let out = engine.evaluate_tick(&i, &TickInputs::default(), 0).await;

    // no market data at all: guards stay quiet (no samples) and the
    // estimator anchors the clamped base instead of quoting off nothing
    assert_eq!(out.action, QuoteAction::Quote);
    assert_eq!(out.guard_level, GuardLevel::None);
    assert!(out.stale_input);
    assert_eq!(out.spread_bps, Some(1.0));
}

#[tokio::test]
async fn halt_during_outage_reports_degraded_view() {
    let mut engine = engine_with(FailingFetcher);
    let i = inst();

    // hard inventory guard with no market data behind the strict read
    let out = engine
        .evaluate_tick(
            &i,
            &TickInputs {
                inventory_pct: Some(90.0),
                ..TickInputs::default()
            },
            0,
        )
        .await;

    assert_eq!(out.action, QuoteAction::Halt);
    assert!(out.stale_input);
}

#[tokio::test]
async fn strict_and_pricing_reads_share_one_fetch_per_tick() {
    let mut engine = engine_with(HealthyFetcher::new());
    let i = inst();

    engine.evaluate_tick(&i, &TickInputs::default(), 0).await;

    // the strict read populated the cache; the pricing read hit it
    let counters = engine.cache().counters();
    assert_eq!(counters.refreshes, 1);
    assert_eq!(counters.hits, 1);
}
