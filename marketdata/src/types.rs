//! Shared order-book and cache-read types.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

/// Trading instrument identifier ("BTCUSDT", "TON/USDT", ...).
///
/// All cache, estimator and guard state is partitioned by this key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct Instrument(String);

impl Instrument {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One price level of an order-book side.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub qty: f64,
}

/// Immutable order-book snapshot as delivered by the exchange connector.
///
/// Levels are expected best-first (bids descending, asks ascending).
/// `sequence` is the upstream feed's monotonic update counter.
#[derive(Debug, Clone, Deserialize)]
pub struct BookSnapshot {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    pub sequence: u64,
}

impl BookSnapshot {
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.price)
    }

    /// Mid-price from top of book, if both sides are present and sane.
    pub fn mid(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) if bid > 0.0 && ask > 0.0 => Some((bid + ask) / 2.0),
            _ => None,
        }
    }

    /// Total quantity across the top `n` levels of one side.
    pub fn depth_volume(levels: &[BookLevel], n: usize) -> f64 {
        levels.iter().take(n).map(|l| l.qty).sum()
    }

    pub fn bid_volume(&self, n: usize) -> f64 {
        Self::depth_volume(&self.bids, n)
    }

    pub fn ask_volume(&self, n: usize) -> f64 {
        Self::depth_volume(&self.asks, n)
    }
}

/// Cached per-instrument snapshot. Replaced atomically on refresh, never
/// mutated in place.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub book: Arc<BookSnapshot>,
    pub captured_at_ms: u64,
    /// Depth the snapshot was fetched at. A read requesting more depth than
    /// this is a miss, never padded.
    pub depth: usize,
    pub sequence: u64,
}

impl CacheEntry {
    pub fn new(book: Arc<BookSnapshot>, depth: usize, captured_at_ms: u64) -> Self {
        let sequence = book.sequence;
        Self {
            book,
            captured_at_ms,
            depth,
            sequence,
        }
    }

    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.captured_at_ms)
    }
}

/// Named freshness policy governing how stale data may be before a refresh
/// is forced and how the call blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessMode {
    /// Used by risk guards: any staleness triggers a bounded-timeout
    /// synchronous refresh; on timeout the stale entry is returned flagged.
    Strict,
    /// Used by the spread estimator: a tighter threshold triggers a
    /// background refresh while the flagged stale entry is returned
    /// immediately.
    Pricing,
    /// Stale-while-revalidate inside the TTL; beyond the TTL the call
    /// blocks for one refresh cycle.
    General,
}

/// Result of a single cache read. Produced fresh per read, never persisted.
#[derive(Debug, Clone, Default)]
pub struct CacheRead {
    /// The snapshot, or `None` when no data could be obtained at all.
    pub book: Option<Arc<BookSnapshot>>,
    /// Served straight from cache without any refresh.
    pub hit: bool,
    /// Age of the served snapshot at read time.
    pub age_ms: u64,
    /// A stale snapshot was served (refresh pending, timed out, or failed).
    pub used_stale: bool,
    /// Cached depth was below the requested depth.
    pub depth_miss: bool,
    /// Upstream sequence ran ahead of the cached entry (missed updates).
    pub sequence_gap: bool,
    /// Upstream sequence ran behind the cached entry; the entry was
    /// invalidated (disconnect/rewind).
    pub invalidated: bool,
}

impl CacheRead {
    pub fn is_no_data(&self) -> bool {
        self.book.is_none()
    }

    pub fn mid(&self) -> Option<f64> {
        self.book.as_ref().and_then(|b| b.mid())
    }
}
