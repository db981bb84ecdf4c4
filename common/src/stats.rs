//! Rolling statistics shared by the spread estimator and the risk guards.
//!
//! All three trackers are bounded, allocation-stable after warm-up, and
//! purely synchronous. Any I/O (cache refresh, logging) lives outside
//! this module.

use std::collections::VecDeque;

/// Default EMA window, expressed in seconds of tick coverage.
pub const DEFAULT_VOL_WINDOW_SECS: u64 = 60;

/// Latency ring capacity (matches the upstream feed's sampling cadence).
pub const LATENCY_RING_CAPACITY: usize = 100;

/// Minimum latency samples before a p95 is considered meaningful.
pub const LATENCY_MIN_SAMPLES: usize = 5;

/// P&L window capacity.
pub const PNL_WINDOW_CAPACITY: usize = 60;

/// Minimum P&L samples before a z-score is considered meaningful.
pub const PNL_MIN_SAMPLES: usize = 10;

/// Exponential moving average of relative mid-price movement, in basis
/// points. `alpha = 2 / (window_secs + 1)`.
#[derive(Debug, Clone)]
pub struct VolatilityEma {
    alpha: f64,
    ema_bps: f64,
    last_mid: Option<f64>,
    samples: u64,
}

impl VolatilityEma {
    pub fn new(window_secs: u64) -> Self {
        Self {
            alpha: 2.0 / (window_secs as f64 + 1.0),
            ema_bps: 0.0,
            last_mid: None,
            samples: 0,
        }
    }

    /// Feed the next observed mid-price. The first observation only seeds
    /// the reference point; non-positive mids are ignored.
    pub fn observe_mid(&mut self, mid: f64) {
        if !mid.is_finite() || mid <= 0.0 {
            return;
        }

        if let Some(last) = self.last_mid {
            let change_bps = ((mid - last) / last).abs() * 10_000.0;
            self.ema_bps = self.alpha * change_bps + (1.0 - self.alpha) * self.ema_bps;
            self.samples += 1;
        }

        self.last_mid = Some(mid);
    }

    pub fn value_bps(&self) -> f64 {
        self.ema_bps
    }

    /// True once at least one mid-to-mid change has been folded in.
    pub fn has_samples(&self) -> bool {
        self.samples > 0
    }
}

/// Bounded ring of latency samples with p95 lookup.
#[derive(Debug, Clone)]
pub struct LatencyRing {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl Default for LatencyRing {
    fn default() -> Self {
        Self::new(LATENCY_RING_CAPACITY)
    }
}

impl LatencyRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, sample_ms: f64) {
        if !sample_ms.is_finite() || sample_ms < 0.0 {
            return;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample_ms);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// p95 over the current ring, or `None` below the minimum sample count.
    pub fn p95(&self) -> Option<f64> {
        if self.samples.len() < LATENCY_MIN_SAMPLES {
            return None;
        }

        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let idx = ((sorted.len() as f64) * 0.95) as usize;
        Some(sorted[idx.min(sorted.len() - 1)])
    }
}

/// Bounded rolling window of P&L deltas with running sum / sum-of-squares,
/// giving O(1) mean and variance.
#[derive(Debug, Clone)]
pub struct PnlWindow {
    window: VecDeque<f64>,
    sum: f64,
    sq_sum: f64,
    capacity: usize,
}

impl Default for PnlWindow {
    fn default() -> Self {
        Self::new(PNL_WINDOW_CAPACITY)
    }
}

impl PnlWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            sum: 0.0,
            sq_sum: 0.0,
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, delta: f64) {
        if !delta.is_finite() {
            return;
        }

        if self.window.len() == self.capacity {
            // oldest sample falls out of both accumulators
            let oldest = self.window.pop_front().unwrap_or(0.0);
            self.sum -= oldest;
            self.sq_sum -= oldest * oldest;
        }

        self.window.push_back(delta);
        self.sum += delta;
        self.sq_sum += delta * delta;
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.sum / self.window.len() as f64
    }

    /// z-score of the most recent delta against the rolling window.
    ///
    /// Returns 0.0 while the window is short or has zero variance, so that
    /// downstream ramps and thresholds stay inert rather than exploding.
    pub fn z_score(&self) -> f64 {
        let n = self.window.len();
        if n < PNL_MIN_SAMPLES {
            return 0.0;
        }

        let mean = self.sum / n as f64;
        let variance = (self.sq_sum / n as f64) - mean * mean;
        let std = variance.max(0.0).sqrt();
        if std <= 1e-6 {
            return 0.0;
        }

        let last = *self.window.back().unwrap_or(&0.0);
        (last - mean) / std
    }
}
