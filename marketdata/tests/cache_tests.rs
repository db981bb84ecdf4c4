//! Integration tests for the refresh path: single-flight collapsing,
//! strict-mode timeout behaviour, and background revalidation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use marketdata::{
    BookFetcher, BookLevel, BookSnapshot, CacheConfig, FreshnessMode, Instrument, MarketDataCache,
};

fn book(sequence: u64, levels: usize) -> BookSnapshot {
    let bids = (0..levels)
        .map(|i| BookLevel {
            price: 100.0 - i as f64,
            qty: 2.0,
        })
        .collect();
    let asks = (0..levels)
        .map(|i| BookLevel {
            price: 101.0 + i as f64,
            qty: 2.0,
        })
        .collect();
    BookSnapshot {
        bids,
        asks,
        sequence,
    }
}

/// Fetcher that blocks until released, counting every call.
struct GatedFetcher {
    calls: AtomicU64,
    gate: Notify,
}

impl GatedFetcher {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU64::new(0),
            gate: Notify::new(),
        })
    }

    fn release(&self) {
        self.gate.notify_waiters();
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BookFetcher for GatedFetcher {
    async fn fetch_book(
        &self,
        _instrument: &Instrument,
        depth: usize,
    ) -> anyhow::Result<BookSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.notified().await;
        Ok(book(42, depth))
    }
}

/// Fetcher whose fetches never complete.
struct StuckFetcher;

#[async_trait]
impl BookFetcher for StuckFetcher {
    async fn fetch_book(
        &self,
        _instrument: &Instrument,
        _depth: usize,
    ) -> anyhow::Result<BookSnapshot> {
        futures::future::pending().await
    }
}

/// Fetcher that completes immediately with a fixed sequence.
struct InstantFetcher {
    calls: AtomicU64,
}

#[async_trait]
impl BookFetcher for InstantFetcher {
    async fn fetch_book(
        &self,
        _instrument: &Instrument,
        depth: usize,
    ) -> anyhow::Result<BookSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(book(900, depth))
    }
}

#[tokio::test]
async fn concurrent_readers_collapse_into_one_fetch() {
    let fetcher = GatedFetcher::new();
    let cache = Arc::new(
        MarketDataCache::new(CacheConfig::default(), Arc::clone(&fetcher)).unwrap(),
    );
    let inst = Instrument::new("BTCUSDT");

    // Three cold readers race on the same instrument.
    let mut handles = Vec::new();
    for _ in 0..3 {
        let cache = Arc::clone(&cache);
        let inst = inst.clone();
        handles.push(tokio::spawn(async move {
            cache
                .read(&inst, 10, FreshnessMode::General, None, 1_000)
                .await
        }));
    }

    // Give all readers time to attach to the in-flight slot, then release.
    tokio::time::sleep(Duration::from_millis(20)).await;
    fetcher.release();

    for handle in handles {
        let read = handle.await.unwrap();
        assert!(read.book.is_some());
        assert_eq!(read.book.unwrap().sequence, 42);
    }

    assert_eq!(fetcher.calls(), 1);
    assert_eq!(cache.counters().refreshes, 1);
}

#[tokio::test(start_paused = true)]
async fn strict_timeout_falls_back_to_flagged_stale() {
    let cache = MarketDataCache::new(CacheConfig::default(), Arc::new(StuckFetcher)).unwrap();
    let inst = Instrument::new("BTCUSDT");

    cache.apply_snapshot(&inst, book(7, 10), 10, 1_000);

    // Entry is 200ms old, far beyond fresh_ms: strict read must attempt a
    // refresh, give up after strict_timeout_ms, and serve the stale entry.
    let read = cache
        .read(&inst, 10, FreshnessMode::Strict, None, 1_200)
        .await;

    assert!(read.used_stale);
    assert!(!read.hit);
    assert_eq!(read.book.unwrap().sequence, 7);
    assert_eq!(read.age_ms, 200);
    assert_eq!(cache.counters().stale_served_to_guard, 1);
}

#[tokio::test(start_paused = true)]
async fn strict_timeout_without_prior_data_is_no_data() {
    let cache = MarketDataCache::new(CacheConfig::default(), Arc::new(StuckFetcher)).unwrap();
    let inst = Instrument::new("BTCUSDT");

    let read = cache
        .read(&inst, 10, FreshnessMode::Strict, None, 1_000)
        .await;

    assert!(read.is_no_data());
}

#[tokio::test]
async fn pricing_stale_returns_immediately_and_revalidates() {
    let fetcher = Arc::new(InstantFetcher {
        calls: AtomicU64::new(0),
    });
    let cache = MarketDataCache::new(CacheConfig::default(), Arc::clone(&fetcher)).unwrap();
    let inst = Instrument::new("BTCUSDT");

    cache.apply_snapshot(&inst, book(7, 10), 10, 1_000);

    // Past pricing_fresh_ms (30) but inside fresh_ms: pricing sees stale,
    // general still sees fresh.
    let read = cache
        .read(&inst, 10, FreshnessMode::Pricing, None, 1_040)
        .await;

    assert!(read.used_stale);
    assert!(!read.hit);
    assert_eq!(read.book.as_ref().unwrap().sequence, 7);

    // Let the background refresh land.
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    let read = cache
        .read(&inst, 10, FreshnessMode::Pricing, None, 1_041)
        .await;
    assert!(read.hit);
    assert_eq!(read.book.unwrap().sequence, 900);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn general_swr_band_serves_stale_and_revalidates() {
    let fetcher = Arc::new(InstantFetcher {
        calls: AtomicU64::new(0),
    });
    let cache = MarketDataCache::new(CacheConfig::default(), Arc::clone(&fetcher)).unwrap();
    let inst = Instrument::new("BTCUSDT");

    cache.apply_snapshot(&inst, book(7, 10), 10, 1_000);

    // Between fresh_ms (50) and ttl_ms (100): serve stale, revalidate.
    let read = cache
        .read(&inst, 10, FreshnessMode::General, None, 1_080)
        .await;

    assert!(read.hit);
    assert!(read.used_stale);
    assert_eq!(read.book.unwrap().sequence, 7);

    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

    let read = cache
        .read(&inst, 10, FreshnessMode::General, None, 1_081)
        .await;
    assert!(read.hit);
    assert!(!read.used_stale);
    assert_eq!(read.book.unwrap().sequence, 900);
}

#[tokio::test]
async fn instruments_fail_independently() {
    /// Fails for one symbol only.
    struct SelectiveFetcher;

    #[async_trait]
    impl BookFetcher for SelectiveFetcher {
        async fn fetch_book(
            &self,
            instrument: &Instrument,
            depth: usize,
        ) -> anyhow::Result<BookSnapshot> {
            if instrument.as_str() == "BADUSDT" {
                anyhow::bail!("feed broken for this symbol");
            }
            Ok(book(1, depth))
        }
    }

    let cache = MarketDataCache::new(CacheConfig::default(), Arc::new(SelectiveFetcher)).unwrap();

    let bad = cache
        .read(
            &Instrument::new("BADUSDT"),
            10,
            FreshnessMode::General,
            None,
            1_000,
        )
        .await;
    assert!(bad.is_no_data());

    let good = cache
        .read(
            &Instrument::new("ETHUSDT"),
            10,
            FreshnessMode::General,
            None,
            1_000,
        )
        .await;
    assert!(good.book.is_some());
}
