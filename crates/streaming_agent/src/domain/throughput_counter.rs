use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;

/// Running count of processed events, shared by all partition workers.
#[derive(Debug, Default)]
pub struct ThroughputCounter {
    processed: AtomicU64,
}

impl ThroughputCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, count: u64) {
        self.processed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn total(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }
}

/// Turns successive counter totals into a rate.
#[derive(Debug, Default)]
pub struct ThroughputSampler {
    last: Option<(u64, Instant)>,
}

impl ThroughputSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events per second since the previous sample; the first sample only
    /// sets the baseline.
    pub fn sample(&mut self, total: u64, now: Instant) -> Option<f64> {
        let previous = self.last.replace((total, now));
        let (last_total, last_at) = previous?;

        let elapsed = now.saturating_duration_since(last_at).as_secs_f64();
        if elapsed <= 0.0 {
            return None;
        }
        Some(total.saturating_sub(last_total) as f64 / elapsed)
    }
}
