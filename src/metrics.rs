//! Process-wide conversion metrics
//!
//! Updated atomically on each URL outcome across all jobs and
//! single-URL requests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Atomic counter for thread-safe incrementing
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Aggregate pipeline counters
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    pub total_processed: Counter,
    pub success_count: Counter,
    pub fail_count: Counter,
    pub total_time_ms: Counter,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Record one URL outcome.
    pub fn record(&self, success: bool, duration: Duration) {
        self.total_processed.inc();
        if success {
            self.success_count.inc();
        } else {
            self.fail_count.inc();
        }
        self.total_time_ms.add(duration.as_millis() as u64);
    }

    /// Mean per-URL processing time in milliseconds.
    pub fn avg_processing_time_ms(&self) -> f64 {
        let processed = self.total_processed.get();
        if processed == 0 {
            return 0.0;
        }
        self.total_time_ms.get() as f64 / processed as f64
    }

    /// Take a point-in-time snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_processed: self.total_processed.get(),
            success_count: self.success_count.get(),
            fail_count: self.fail_count.get(),
            total_time_ms: self.total_time_ms.get(),
            avg_processing_time_ms: self.avg_processing_time_ms(),
        }
    }
}

/// Point-in-time snapshot of pipeline metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_processed: u64,
    pub success_count: u64,
    pub fail_count: u64,
    pub total_time_ms: u64,
    pub avg_processing_time_ms: f64,
}
