//! Operational counters for cache behaviour.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Minimal counters for operational visibility. Cheap to clone; all clones
/// share the same underlying counters.
#[derive(Clone, Default)]
pub struct CacheCounters {
    pub hits: Arc<AtomicU64>,
    pub misses: Arc<AtomicU64>,
    pub depth_misses: Arc<AtomicU64>,
    pub sequence_gaps: Arc<AtomicU64>,
    pub rewinds: Arc<AtomicU64>,
    pub invalidations: Arc<AtomicU64>,
    pub stale_served_to_guard: Arc<AtomicU64>,
    pub refreshes: Arc<AtomicU64>,
    pub refresh_failures: Arc<AtomicU64>,
}

/// Point-in-time snapshot for metrics export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub depth_misses: u64,
    pub sequence_gaps: u64,
    pub rewinds: u64,
    pub invalidations: u64,
    pub stale_served_to_guard: u64,
    pub refreshes: u64,
    pub refresh_failures: u64,
}

impl CacheCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            depth_misses: self.depth_misses.load(Ordering::Relaxed),
            sequence_gaps: self.sequence_gaps.load(Ordering::Relaxed),
            rewinds: self.rewinds.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            stale_served_to_guard: self.stale_served_to_guard.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
        }
    }

    /// Hit ratio over all reads so far, 0.0 when nothing was read yet.
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64
    }
}
