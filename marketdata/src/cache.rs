//! Staleness-aware, consistency-checked order-book snapshot cache.
//!
//! Responsibilities:
//!   • Hold the authoritative per-instrument `CacheEntry`
//!   • Serve freshness-qualified reads (`Strict` / `Pricing` / `General`)
//!   • Enforce depth and sequence consistency (no silent upscaling,
//!     invalidation on rewind)
//!   • Collapse concurrent refreshes into one in-flight fetch per
//!     instrument; late callers await the shared result
//!
//! Suspension is isolated to the refresh path. Refresh failures degrade to
//! flagged stale data (or an explicit no-data result), never a crash, and
//! one instrument's data problem never affects another.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::Shared;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{CacheConfig, CacheConfigError};
use crate::counters::{CacheCounters, CountersSnapshot};
use crate::fetch::BookFetcher;
use crate::types::{BookSnapshot, CacheEntry, CacheRead, FreshnessMode, Instrument};

/// Cloneable refresh failure, shared by every caller attached to the same
/// in-flight fetch.
#[derive(Debug, Clone, Error)]
#[error("order book refresh failed: {0}")]
pub struct RefreshError(pub String);

type SharedRefresh =
    Shared<Pin<Box<dyn Future<Output = Result<Arc<BookSnapshot>, RefreshError>> + Send>>>;

pub struct MarketDataCache<F> {
    cfg: CacheConfig,
    fetcher: Arc<F>,
    entries: Arc<Mutex<HashMap<Instrument, CacheEntry>>>,
    /// Per-instrument refresh-in-progress slot. Late callers clone the
    /// shared future instead of duplicating the fetch.
    inflight: Arc<Mutex<HashMap<Instrument, SharedRefresh>>>,
    counters: CacheCounters,
}

impl<F: BookFetcher> MarketDataCache<F> {
    pub fn new(cfg: CacheConfig, fetcher: Arc<F>) -> Result<Self, CacheConfigError> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            fetcher,
            entries: Arc::new(Mutex::new(HashMap::new())),
            inflight: Arc::new(Mutex::new(HashMap::new())),
            counters: CacheCounters::default(),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.cfg
    }

    pub fn counters(&self) -> CountersSnapshot {
        self.counters.snapshot()
    }

    pub fn hit_ratio(&self) -> f64 {
        self.counters.hit_ratio()
    }

    /// Age of the cached entry for `instrument`, if any.
    pub fn age_ms(&self, instrument: &Instrument, now_ms: u64) -> Option<u64> {
        self.entries.lock().get(instrument).map(|e| e.age_ms(now_ms))
    }

    /// Ingest path for the out-of-scope exchange feed: replace the entry
    /// for `instrument` with a fresh snapshot.
    pub fn apply_snapshot(
        &self,
        instrument: &Instrument,
        book: BookSnapshot,
        depth: usize,
        now_ms: u64,
    ) {
        let entry = CacheEntry::new(Arc::new(book), depth, now_ms);
        debug!(instrument = %instrument, sequence = entry.sequence, depth, "snapshot applied");
        self.entries.lock().insert(instrument.clone(), entry);
    }

    pub fn invalidate(&self, instrument: &Instrument, reason: &str) {
        if self.entries.lock().remove(instrument).is_some() {
            CacheCounters::bump(&self.counters.invalidations);
            warn!(instrument = %instrument, reason, "cache entry invalidated");
        }
    }

    pub fn invalidate_all(&self, reason: &str) {
        let mut entries = self.entries.lock();
        let count = entries.len();
        entries.clear();
        drop(entries);

        for _ in 0..count {
            CacheCounters::bump(&self.counters.invalidations);
        }
        warn!(count, reason, "all cache entries invalidated");
    }

    /// Freshness-qualified read.
    ///
    /// `expected_sequence` is the upstream feed's latest sequence number,
    /// when the caller knows it; it drives gap and rewind detection.
    /// `now_ms` is supplied by the caller so that ticks stay deterministic.
    ///
    /// This never returns an error: data problems are expressed through the
    /// flags on `CacheRead`, and total unavailability as `book == None`.
    pub async fn read(
        &self,
        instrument: &Instrument,
        depth: usize,
        mode: FreshnessMode,
        expected_sequence: Option<u64>,
        now_ms: u64,
    ) -> CacheRead {
        let mut read = CacheRead::default();

        let entry = self.entries.lock().get(instrument).cloned();
        let Some(entry) = entry else {
            // Cold miss: block for one refresh cycle.
            CacheCounters::bump(&self.counters.misses);
            debug!(instrument = %instrument, ?mode, "cache miss (cold), refreshing");
            return self.refresh_into(read, instrument, depth, mode, now_ms, None).await;
        };

        read.age_ms = entry.age_ms(now_ms);

        // Consistency checks run before any freshness decision. Depth and
        // sequence are evaluated independently; both flags may be set on
        // the same read, served by a single forced refresh.
        let mut forced = false;
        let mut fallback = Some(entry.clone());

        if entry.depth < depth {
            read.depth_miss = true;
            forced = true;
            CacheCounters::bump(&self.counters.depth_misses);
            debug!(
                instrument = %instrument,
                have = entry.depth,
                need = depth,
                "depth shortfall, forcing refresh"
            );
        }

        if let Some(expected) = expected_sequence {
            if expected > entry.sequence + 1 {
                read.sequence_gap = true;
                forced = true;
                CacheCounters::bump(&self.counters.sequence_gaps);
                warn!(
                    instrument = %instrument,
                    expected,
                    cached = entry.sequence,
                    "sequence gap, forcing refresh"
                );
            } else if expected < entry.sequence {
                read.invalidated = true;
                forced = true;
                CacheCounters::bump(&self.counters.rewinds);
                warn!(
                    instrument = %instrument,
                    expected,
                    cached = entry.sequence,
                    "sequence rewind, invalidating entry"
                );
                self.invalidate(instrument, "sequence_rewind");
                // A rewound entry must never be served, not even as a
                // stale fallback.
                fallback = None;
            }
        }

        if forced {
            CacheCounters::bump(&self.counters.misses);
            return self
                .refresh_into(read, instrument, depth, mode, now_ms, fallback)
                .await;
        }

        let fresh_bound = match mode {
            FreshnessMode::Pricing => self.cfg.pricing_fresh_ms,
            FreshnessMode::Strict | FreshnessMode::General => self.cfg.fresh_ms,
        };

        if read.age_ms <= fresh_bound {
            CacheCounters::bump(&self.counters.hits);
            read.hit = true;
            read.book = Some(entry.book);
            return read;
        }

        match mode {
            FreshnessMode::Strict => {
                // Guards need the freshest view available; block for a
                // bounded refresh, then fall back to flagged stale data.
                CacheCounters::bump(&self.counters.misses);
                self.refresh_into(read, instrument, depth, mode, now_ms, Some(entry))
                    .await
            }
            FreshnessMode::Pricing => {
                // Serve stale immediately so the caller can widen or skip;
                // revalidate in the background.
                CacheCounters::bump(&self.counters.misses);
                read.used_stale = true;
                read.book = Some(entry.book);
                self.spawn_refresh(instrument, depth, now_ms);
                debug!(
                    instrument = %instrument,
                    age_ms = read.age_ms,
                    "stale for pricing, background refresh triggered"
                );
                read
            }
            FreshnessMode::General => {
                if read.age_ms <= self.cfg.ttl_ms {
                    // Stale-while-revalidate band.
                    CacheCounters::bump(&self.counters.hits);
                    read.hit = true;
                    read.used_stale = true;
                    read.book = Some(entry.book);
                    self.spawn_refresh(instrument, depth, now_ms);
                    read
                } else {
                    CacheCounters::bump(&self.counters.misses);
                    self.refresh_into(read, instrument, depth, mode, now_ms, Some(entry))
                        .await
                }
            }
        }
    }

    /// Run (or join) a refresh and fold the outcome into `read`.
    ///
    /// Strict mode bounds the wait by `strict_timeout_ms`; on timeout or
    /// failure the stale `fallback` is served flagged, or no-data when
    /// there is nothing to fall back to.
    async fn refresh_into(
        &self,
        mut read: CacheRead,
        instrument: &Instrument,
        depth: usize,
        mode: FreshnessMode,
        now_ms: u64,
        fallback: Option<CacheEntry>,
    ) -> CacheRead {
        let refresh = self.join_refresh(instrument, depth, now_ms);

        let outcome = if mode == FreshnessMode::Strict {
            match tokio::time::timeout(Duration::from_millis(self.cfg.strict_timeout_ms), refresh)
                .await
            {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        instrument = %instrument,
                        timeout_ms = self.cfg.strict_timeout_ms,
                        "strict refresh timed out"
                    );
                    Err(RefreshError("strict refresh timed out".into()))
                }
            }
        } else {
            refresh.await
        };

        match outcome {
            Ok(book) => {
                read.age_ms = 0;
                read.book = Some(book);
                read
            }
            Err(err) => match fallback {
                Some(entry) => {
                    read.used_stale = true;
                    read.book = Some(entry.book);
                    if mode == FreshnessMode::Strict {
                        CacheCounters::bump(&self.counters.stale_served_to_guard);
                    }
                    warn!(
                        instrument = %instrument,
                        age_ms = read.age_ms,
                        error = %err,
                        "refresh unavailable, serving stale entry"
                    );
                    read
                }
                None => {
                    warn!(instrument = %instrument, error = %err, "refresh failed with no cached data");
                    read
                }
            },
        }
    }

    /// Attach to the in-flight refresh for `instrument`, creating and
    /// driving a new one if none exists.
    fn join_refresh(
        &self,
        instrument: &Instrument,
        depth: usize,
        now_ms: u64,
    ) -> SharedRefresh {
        let mut inflight = self.inflight.lock();

        if let Some(existing) = inflight.get(instrument) {
            return existing.clone();
        }

        let fetcher = Arc::clone(&self.fetcher);
        let entries = Arc::clone(&self.entries);
        let inflight_map = Arc::clone(&self.inflight);
        let counters = self.counters.clone();
        let inst = instrument.clone();

        let fut: Pin<Box<dyn Future<Output = Result<Arc<BookSnapshot>, RefreshError>> + Send>> =
            Box::pin(async move {
                CacheCounters::bump(&counters.refreshes);

                let result = match fetcher.fetch_book(&inst, depth).await {
                    Ok(book) => {
                        let book = Arc::new(book);
                        let entry = CacheEntry::new(Arc::clone(&book), depth, now_ms);
                        debug!(
                            instrument = %inst,
                            sequence = entry.sequence,
                            depth,
                            "refresh complete"
                        );
                        entries.lock().insert(inst.clone(), entry);
                        Ok(book)
                    }
                    Err(err) => {
                        CacheCounters::bump(&counters.refresh_failures);
                        warn!(instrument = %inst, error = %err, "refresh fetch failed");
                        Err(RefreshError(err.to_string()))
                    }
                };

                inflight_map.lock().remove(&inst);
                result
            });

        let shared = fut.shared();
        inflight.insert(instrument.clone(), shared.clone());

        // Drive the refresh independently of the caller, so a caller that
        // times out (strict mode) cannot stall the shared slot.
        tokio::spawn(shared.clone());

        shared
    }

    /// Fire-and-forget revalidation; a no-op when a refresh is already in
    /// flight for the instrument.
    fn spawn_refresh(&self, instrument: &Instrument, depth: usize, now_ms: u64) {
        let _ = self.join_refresh(instrument, depth, now_ms);
    }

    /// Warm the cache for an instrument at the configured default depth,
    /// blocking until the snapshot lands or the fetch fails.
    pub async fn prefetch(&self, instrument: &Instrument, now_ms: u64) -> Result<(), RefreshError> {
        self.join_refresh(instrument, self.cfg.default_depth, now_ms)
            .await
            .map(|_| ())
    }
}
