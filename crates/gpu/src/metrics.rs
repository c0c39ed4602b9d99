//! Arbiter metrics
//!
//! Per accelerator-key counters plus bounded windows of queue-wait and
//! hold-time samples. Pure bookkeeping: nothing in here makes scheduling
//! decisions. Every event is also emitted through the `metrics` facade so an
//! external exporter can scrape the node.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use metrics::{counter, histogram};
use parking_lot::Mutex;

use crate::lease::SkipReason;

/// Default number of wait/hold samples kept per key.
pub const DEFAULT_SAMPLE_WINDOW: usize = 100;

#[derive(Debug, Default, Clone)]
struct KeyMetrics {
    acquired_total: u64,
    skipped_busy_total: u64,
    queue_full_total: u64,
    timeouts_total: u64,
    fallback_cpu_total: u64,
    releases_total: u64,
    watchdog_exceeded_total: u64,
    queue_wait_ms: VecDeque<u64>,
    hold_ms: VecDeque<u64>,
}

/// Point-in-time view of one accelerator key, for external observability
/// collaborators to compute percentiles from.
#[derive(Debug, Clone, Default)]
pub struct GpuMetricsSnapshot {
    pub gpu_key: String,
    pub acquired_total: u64,
    pub skipped_busy_total: u64,
    pub queue_full_total: u64,
    pub timeouts_total: u64,
    pub fallback_cpu_total: u64,
    pub releases_total: u64,
    pub watchdog_exceeded_total: u64,
    /// Most recent queue-wait samples, oldest first (bounded window)
    pub queue_wait_ms: Vec<u64>,
    /// Most recent hold-time samples, oldest first (bounded window)
    pub hold_ms: Vec<u64>,
    /// Current wait-queue depth
    pub queue_depth: usize,
    /// Whether the key currently has a holder
    pub holder_busy: bool,
}

/// Per-key metrics bookkeeping for the arbiter.
#[derive(Debug)]
pub struct MetricsManager {
    window: usize,
    keys: Mutex<HashMap<String, KeyMetrics>>,
}

impl MetricsManager {
    pub(crate) fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            keys: Mutex::new(HashMap::new()),
        }
    }

    fn with_key(&self, gpu_key: &str, f: impl FnOnce(&mut KeyMetrics, usize)) {
        let mut keys = self.keys.lock();
        let entry = keys.entry(gpu_key.to_string()).or_default();
        f(entry, self.window);
    }

    pub(crate) fn record_acquired(&self, gpu_key: &str, waited: Duration) {
        let waited_ms = waited.as_millis() as u64;
        self.with_key(gpu_key, |m, window| {
            m.acquired_total += 1;
            push_sample(&mut m.queue_wait_ms, window, waited_ms);
        });
        counter!(
            "babel_edge_gpu_acquire_total",
            "gpu_key" => gpu_key.to_string(),
            "outcome" => "acquired"
        )
        .increment(1);
        histogram!("babel_edge_gpu_queue_wait_ms", "gpu_key" => gpu_key.to_string())
            .record(waited_ms as f64);
    }

    pub(crate) fn record_skipped(&self, gpu_key: &str, reason: SkipReason) {
        self.with_key(gpu_key, |m, _| match reason {
            SkipReason::Busy => m.skipped_busy_total += 1,
            SkipReason::QueueFull => m.queue_full_total += 1,
            SkipReason::Timeout => m.timeouts_total += 1,
        });
        counter!(
            "babel_edge_gpu_acquire_total",
            "gpu_key" => gpu_key.to_string(),
            "outcome" => reason.as_str()
        )
        .increment(1);
    }

    pub(crate) fn record_fallback(&self, gpu_key: &str) {
        self.with_key(gpu_key, |m, _| m.fallback_cpu_total += 1);
        counter!(
            "babel_edge_gpu_acquire_total",
            "gpu_key" => gpu_key.to_string(),
            "outcome" => "fallback_cpu"
        )
        .increment(1);
    }

    pub(crate) fn record_release(&self, gpu_key: &str, held: Duration) {
        let held_ms = held.as_millis() as u64;
        self.with_key(gpu_key, |m, window| {
            m.releases_total += 1;
            push_sample(&mut m.hold_ms, window, held_ms);
        });
        histogram!("babel_edge_gpu_hold_ms", "gpu_key" => gpu_key.to_string())
            .record(held_ms as f64);
    }

    pub(crate) fn record_watchdog_reclaim(&self, gpu_key: &str, held: Duration) {
        let held_ms = held.as_millis() as u64;
        self.with_key(gpu_key, |m, window| {
            m.watchdog_exceeded_total += 1;
            push_sample(&mut m.hold_ms, window, held_ms);
        });
        counter!(
            "babel_edge_gpu_watchdog_reclaims_total",
            "gpu_key" => gpu_key.to_string()
        )
        .increment(1);
        histogram!("babel_edge_gpu_hold_ms", "gpu_key" => gpu_key.to_string())
            .record(held_ms as f64);
    }

    pub(crate) fn snapshot(
        &self,
        gpu_key: &str,
        queue_depth: usize,
        holder_busy: bool,
    ) -> GpuMetricsSnapshot {
        let keys = self.keys.lock();
        let m = keys.get(gpu_key).cloned().unwrap_or_default();
        GpuMetricsSnapshot {
            gpu_key: gpu_key.to_string(),
            acquired_total: m.acquired_total,
            skipped_busy_total: m.skipped_busy_total,
            queue_full_total: m.queue_full_total,
            timeouts_total: m.timeouts_total,
            fallback_cpu_total: m.fallback_cpu_total,
            releases_total: m.releases_total,
            watchdog_exceeded_total: m.watchdog_exceeded_total,
            queue_wait_ms: m.queue_wait_ms.iter().copied().collect(),
            hold_ms: m.hold_ms.iter().copied().collect(),
            queue_depth,
            holder_busy,
        }
    }
}

fn push_sample(buf: &mut VecDeque<u64>, window: usize, sample_ms: u64) {
    if buf.len() >= window {
        buf.pop_front();
    }
    buf.push_back(sample_ms);
}
