//! Lock-free metrics collection and periodic reporting
//!
//! Counters are plain atomics updated by the cycle runner. The periodic
//! reporter calls `report()`, which resets the per-interval values; the
//! Prometheus endpoint reads `snapshot()`, which resets nothing.
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only and must not be used for coordination.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Cycle duration bucket boundaries (milliseconds)
/// Buckets: ≤250, ≤500, ≤1000, ≤2000, ≤4000, ≤8000, ≤16000, ≤32000, ≤64000, ≤128000, >128000
const BUCKET_BOUNDS: [u64; 10] = [250, 500, 1000, 2000, 4000, 8000, 16000, 32000, 64000, 128000];
const NUM_BUCKETS: usize = 11;

#[inline]
fn bucket_index(duration_ms: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < duration_ms)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.load(Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = ((total as f64 * percentile).ceil() as u64).max(1);
    let mut cumulative = 0u64;

    // Last bucket uses 2x the previous bound
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [250, 500, 1000, 2000, 4000, 8000, 16000, 32000, 64000, 128000, 256000];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Completed cycles (monotonic)
    cycles_total: AtomicU64,
    /// Cycles aborted by a fetch failure (monotonic)
    cycles_failed_total: AtomicU64,
    /// Completed cycles since last report (reset on report)
    cycles_since_report: AtomicU64,
    /// Cycle duration histogram (cumulative)
    cycle_latency_buckets: [AtomicU64; NUM_BUCKETS],
    cycle_latency_sum_ms: AtomicU64,
    /// Max cycle duration (reset on report)
    cycle_latency_max_ms: AtomicU64,
    /// Valid positions received (monotonic)
    positions_total: AtomicU64,
    /// Records dropped as invalid (monotonic)
    positions_rejected_total: AtomicU64,
    /// Transition events emitted (monotonic)
    events_total: AtomicU64,
    /// Payloads handed to the dispatcher (monotonic)
    dispatches_total: AtomicU64,
    channel_deliveries_total: AtomicU64,
    channel_failures_total: AtomicU64,
    zone_reload_failures_total: AtomicU64,
    persistence_failures_total: AtomicU64,
    /// Vessels currently retained by the state tracker
    tracked_vessels: AtomicU64,
    /// Custom zones in the current snapshot
    custom_zones: AtomicU64,
    last_report_time: Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            cycles_total: AtomicU64::new(0),
            cycles_failed_total: AtomicU64::new(0),
            cycles_since_report: AtomicU64::new(0),
            cycle_latency_buckets: Default::default(),
            cycle_latency_sum_ms: AtomicU64::new(0),
            cycle_latency_max_ms: AtomicU64::new(0),
            positions_total: AtomicU64::new(0),
            positions_rejected_total: AtomicU64::new(0),
            events_total: AtomicU64::new(0),
            dispatches_total: AtomicU64::new(0),
            channel_deliveries_total: AtomicU64::new(0),
            channel_failures_total: AtomicU64::new(0),
            zone_reload_failures_total: AtomicU64::new(0),
            persistence_failures_total: AtomicU64::new(0),
            tracked_vessels: AtomicU64::new(0),
            custom_zones: AtomicU64::new(0),
            last_report_time: Mutex::new(Instant::now()),
        }
    }

    /// Record a completed cycle with its duration and event count
    #[inline]
    pub fn record_cycle_completed(&self, duration_ms: u64, events: u64) {
        self.cycles_total.fetch_add(1, Ordering::Relaxed);
        self.cycles_since_report.fetch_add(1, Ordering::Relaxed);
        self.events_total.fetch_add(events, Ordering::Relaxed);
        self.cycle_latency_buckets[bucket_index(duration_ms)].fetch_add(1, Ordering::Relaxed);
        self.cycle_latency_sum_ms.fetch_add(duration_ms, Ordering::Relaxed);
        update_atomic_max(&self.cycle_latency_max_ms, duration_ms);
    }

    #[inline]
    pub fn record_cycle_failed(&self) {
        self.cycles_failed_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_positions(&self, accepted: u64, rejected: u64) {
        self.positions_total.fetch_add(accepted, Ordering::Relaxed);
        self.positions_rejected_total.fetch_add(rejected, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dispatch(&self, delivered: u64, failed: u64) {
        self.dispatches_total.fetch_add(1, Ordering::Relaxed);
        self.channel_deliveries_total.fetch_add(delivered, Ordering::Relaxed);
        self.channel_failures_total.fetch_add(failed, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_zone_reload_failed(&self) {
        self.zone_reload_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_persistence_failed(&self) {
        self.persistence_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_tracked_vessels(&self, count: u64) {
        self.tracked_vessels.store(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_custom_zones(&self, count: u64) {
        self.custom_zones.store(count, Ordering::Relaxed);
    }

    pub fn cycles_total(&self) -> u64 {
        self.cycles_total.load(Ordering::Relaxed)
    }

    pub fn cycles_failed_total(&self) -> u64 {
        self.cycles_failed_total.load(Ordering::Relaxed)
    }

    /// Current values without resetting anything (scrape path)
    pub fn snapshot(&self) -> MetricsSummary {
        let elapsed = self.last_report_time.lock().elapsed();
        self.summarize(
            self.cycles_since_report.load(Ordering::Relaxed),
            self.cycle_latency_max_ms.load(Ordering::Relaxed),
            elapsed.as_secs(),
        )
    }

    /// Summary for the periodic log; resets the per-interval counters
    pub fn report(&self) -> MetricsSummary {
        let cycles_since_report = self.cycles_since_report.swap(0, Ordering::Relaxed);
        let max_ms = self.cycle_latency_max_ms.swap(0, Ordering::Relaxed);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        self.summarize(cycles_since_report, max_ms, elapsed.as_secs())
    }

    fn summarize(&self, cycles_since_report: u64, max_ms: u64, interval_secs: u64) -> MetricsSummary {
        let cycle_latency_buckets = load_buckets(&self.cycle_latency_buckets);
        let count: u64 = cycle_latency_buckets.iter().sum();
        let sum = self.cycle_latency_sum_ms.load(Ordering::Relaxed);

        MetricsSummary {
            cycles_total: self.cycles_total.load(Ordering::Relaxed),
            cycles_failed_total: self.cycles_failed_total.load(Ordering::Relaxed),
            cycles_since_report,
            interval_secs,
            cycle_latency_buckets,
            cycle_latency_avg_ms: if count > 0 { sum / count } else { 0 },
            cycle_latency_max_ms: max_ms,
            cycle_latency_p50_ms: percentile_from_buckets(&cycle_latency_buckets, 0.50),
            cycle_latency_p99_ms: percentile_from_buckets(&cycle_latency_buckets, 0.99),
            positions_total: self.positions_total.load(Ordering::Relaxed),
            positions_rejected_total: self.positions_rejected_total.load(Ordering::Relaxed),
            events_total: self.events_total.load(Ordering::Relaxed),
            dispatches_total: self.dispatches_total.load(Ordering::Relaxed),
            channel_deliveries_total: self.channel_deliveries_total.load(Ordering::Relaxed),
            channel_failures_total: self.channel_failures_total.load(Ordering::Relaxed),
            zone_reload_failures_total: self.zone_reload_failures_total.load(Ordering::Relaxed),
            persistence_failures_total: self.persistence_failures_total.load(Ordering::Relaxed),
            tracked_vessels: self.tracked_vessels.load(Ordering::Relaxed),
            custom_zones: self.custom_zones.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of histogram buckets (exported for Prometheus formatting)
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Exported bucket bounds for Prometheus formatting
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;

#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub cycles_total: u64,
    pub cycles_failed_total: u64,
    pub cycles_since_report: u64,
    pub interval_secs: u64,
    /// Cycle duration histogram buckets
    /// Bounds: ≤250, ≤500, ≤1000, ≤2000, ≤4000, ≤8000, ≤16000, ≤32000, ≤64000, ≤128000, >128000 ms
    pub cycle_latency_buckets: [u64; NUM_BUCKETS],
    pub cycle_latency_avg_ms: u64,
    pub cycle_latency_max_ms: u64,
    pub cycle_latency_p50_ms: u64,
    pub cycle_latency_p99_ms: u64,
    pub positions_total: u64,
    pub positions_rejected_total: u64,
    pub events_total: u64,
    pub dispatches_total: u64,
    pub channel_deliveries_total: u64,
    pub channel_failures_total: u64,
    pub zone_reload_failures_total: u64,
    pub persistence_failures_total: u64,
    pub tracked_vessels: u64,
    pub custom_zones: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            cycles = %self.cycles_since_report,
            interval_secs = %self.interval_secs,
            cycles_total = %self.cycles_total,
            cycles_failed = %self.cycles_failed_total,
            cycle_avg_ms = %self.cycle_latency_avg_ms,
            cycle_max_ms = %self.cycle_latency_max_ms,
            cycle_p99_ms = %self.cycle_latency_p99_ms,
            positions = %self.positions_total,
            rejected = %self.positions_rejected_total,
            events = %self.events_total,
            dispatches = %self.dispatches_total,
            channel_failures = %self.channel_failures_total,
            tracked_vessels = %self.tracked_vessels,
            custom_zones = %self.custom_zones,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.cycles_total(), 0);
        assert_eq!(metrics.cycles_failed_total(), 0);
    }

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(250), 0);
        assert_eq!(bucket_index(251), 1);
        assert_eq!(bucket_index(128000), 9);
        assert_eq!(bucket_index(500000), 10);
    }

    #[test]
    fn test_report_resets_interval_values_only() {
        let metrics = Metrics::new();
        metrics.record_cycle_completed(300, 2);
        metrics.record_cycle_completed(900, 1);
        metrics.record_positions(40, 3);
        metrics.record_dispatch(2, 1);

        let summary = metrics.report();
        assert_eq!(summary.cycles_total, 2);
        assert_eq!(summary.cycles_since_report, 2);
        assert_eq!(summary.cycle_latency_avg_ms, 600);
        assert_eq!(summary.cycle_latency_max_ms, 900);
        assert_eq!(summary.events_total, 3);
        assert_eq!(summary.positions_rejected_total, 3);
        assert_eq!(summary.channel_failures_total, 1);

        let summary = metrics.report();
        assert_eq!(summary.cycles_since_report, 0);
        assert_eq!(summary.cycle_latency_max_ms, 0);
        assert_eq!(summary.cycles_total, 2);
        assert_eq!(summary.cycle_latency_buckets.iter().sum::<u64>(), 2);
    }

    #[test]
    fn test_snapshot_does_not_reset() {
        let metrics = Metrics::new();
        metrics.record_cycle_completed(100, 0);
        assert_eq!(metrics.snapshot().cycles_since_report, 1);
        assert_eq!(metrics.snapshot().cycles_since_report, 1);
    }

    #[test]
    fn test_percentiles() {
        let metrics = Metrics::new();
        for _ in 0..99 {
            metrics.record_cycle_completed(200, 0);
        }
        metrics.record_cycle_completed(20000, 0);

        assert_eq!(metrics.snapshot().cycle_latency_p50_ms, 250);

        for _ in 0..10 {
            metrics.record_cycle_completed(20000, 0);
        }
        let summary = metrics.snapshot();
        assert_eq!(summary.cycle_latency_p50_ms, 250);
        assert_eq!(summary.cycle_latency_p99_ms, 32000);
    }

    #[test]
    fn test_report_empty() {
        let summary = Metrics::new().report();
        assert_eq!(summary.cycle_latency_avg_ms, 0);
        assert_eq!(summary.cycle_latency_p99_ms, 0);
    }
}
