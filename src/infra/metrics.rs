//! Lock-free metrics collection and periodic reporting
//!
//! Counters are updated from concurrent event tasks with atomics. The log
//! reporter swaps its periodic window to zero with `report()`; scrapes read
//! the cumulative histogram through `snapshot()`, which never resets.
//!
//! NOTE: All atomics use Relaxed ordering. They are statistical counters
//! only; do not use them for coordination.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
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

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    std::array::from_fn(|i| buckets[i].swap(0, Ordering::Relaxed))
}

#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    std::array::from_fn(|i| buckets[i].load(Ordering::Relaxed))
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// Latency is kept twice: a periodic window that `report()` drains, and a
/// cumulative histogram that only grows.
pub struct Metrics {
    /// Events decoded from the inbound channel (monotonic)
    events_received: AtomicU64,
    /// Events dropped because the pipeline channel was full (monotonic)
    events_dropped: AtomicU64,
    /// Inbound payloads that failed to decode (monotonic)
    invalid_payloads: AtomicU64,
    /// Total events processed to a terminal outcome (monotonic)
    events_total: AtomicU64,
    /// Events since last report (reset on report)
    events_since_report: AtomicU64,
    /// Sum of latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    /// Event processing latency histogram buckets (reset on report)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Lifetime latency sum in microseconds (monotonic)
    latency_sum_total_us: AtomicU64,
    /// Lifetime latency histogram buckets (monotonic)
    latency_buckets_total: [AtomicU64; NUM_BUCKETS],
    /// Events whose state change was persisted (monotonic)
    events_applied: AtomicU64,
    /// Events rejected as older than the recorded state (monotonic)
    events_stale: AtomicU64,
    /// Events that failed processing (monotonic)
    events_failed: AtomicU64,
    /// Trigger notifications published (monotonic)
    triggers_published: AtomicU64,
    /// Trigger notifications that failed to publish (monotonic)
    publish_failures: AtomicU64,
    /// Raw event audit writes that failed (monotonic)
    audit_failures: AtomicU64,
    /// Order writes rejected by a revision conflict (monotonic)
    write_conflicts: AtomicU64,
    /// Events currently being processed (gauge)
    in_flight: AtomicU64,
    /// Last report time (only accessed from reporter, not atomic)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            events_received: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            invalid_payloads: AtomicU64::new(0),
            events_total: AtomicU64::new(0),
            events_since_report: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            latency_sum_total_us: AtomicU64::new(0),
            latency_buckets_total: std::array::from_fn(|_| AtomicU64::new(0)),
            events_applied: AtomicU64::new(0),
            events_stale: AtomicU64::new(0),
            events_failed: AtomicU64::new(0),
            triggers_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            audit_failures: AtomicU64::new(0),
            write_conflicts: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_event_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_invalid_payload(&self) {
        self.invalid_payloads.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an event reached a terminal outcome with given latency (lock-free)
    #[inline]
    pub fn record_event_processed(&self, latency_us: u64) {
        self.events_total.fetch_add(1, Ordering::Relaxed);
        self.events_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_sum_total_us.fetch_add(latency_us, Ordering::Relaxed);

        let bucket = bucket_index(latency_us);
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.latency_buckets_total[bucket].fetch_add(1, Ordering::Relaxed);

        // Update max
        update_atomic_max(&self.latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_applied(&self) {
        self.events_applied.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_stale(&self) {
        self.events_stale.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_failed(&self) {
        self.events_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_trigger_published(&self) {
        self.triggers_published.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_audit_failure(&self) {
        self.audit_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_write_conflict(&self) {
        self.write_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn in_flight_inc(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn in_flight_dec(&self) {
        // Saturating to avoid wrapping if inc/dec ever get out of step
        let _ = self
            .in_flight
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1)));
    }

    pub fn events_total(&self) -> u64 {
        self.events_total.load(Ordering::Relaxed)
    }

    pub fn events_applied(&self) -> u64 {
        self.events_applied.load(Ordering::Relaxed)
    }

    pub fn events_stale(&self) -> u64 {
        self.events_stale.load(Ordering::Relaxed)
    }

    pub fn events_failed(&self) -> u64 {
        self.events_failed.load(Ordering::Relaxed)
    }

    pub fn triggers_published(&self) -> u64 {
        self.triggers_published.load(Ordering::Relaxed)
    }

    pub fn publish_failures(&self) -> u64 {
        self.publish_failures.load(Ordering::Relaxed)
    }

    pub fn audit_failures(&self) -> u64 {
        self.audit_failures.load(Ordering::Relaxed)
    }

    pub fn write_conflicts(&self) -> u64 {
        self.write_conflicts.load(Ordering::Relaxed)
    }

    /// Read every cumulative value without touching the report window
    pub fn snapshot(&self) -> MetricsSnapshot {
        let lat_buckets = load_buckets(&self.latency_buckets_total);
        MetricsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            invalid_payloads: self.invalid_payloads.load(Ordering::Relaxed),
            events_total: self.events_total(),
            lat_buckets,
            lat_sum_us: self.latency_sum_total_us.load(Ordering::Relaxed),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            events_applied: self.events_applied(),
            events_stale: self.events_stale(),
            events_failed: self.events_failed(),
            triggers_published: self.triggers_published(),
            publish_failures: self.publish_failures(),
            audit_failures: self.audit_failures(),
            write_conflicts: self.write_conflicts(),
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }

    /// Generate a report and reset periodic counters
    ///
    /// Only the periodic log line should call this; every call starts a new
    /// window.
    pub fn report(&self) -> MetricsSummary {
        // Swap periodic counters to zero and get their values
        let events_count = self.events_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.latency_max_us.swap(0, Ordering::Relaxed);
        let lat_buckets = swap_buckets(&self.latency_buckets);

        // Calculate elapsed time and reset
        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let events_per_sec = if elapsed.as_secs_f64() > 0.0 {
            events_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let avg_latency = if events_count > 0 { latency_sum / events_count } else { 0 };

        MetricsSummary {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            invalid_payloads: self.invalid_payloads.load(Ordering::Relaxed),
            events_total: self.events_total(),
            events_per_sec,
            avg_process_latency_us: avg_latency,
            max_process_latency_us: max_latency,
            lat_buckets,
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p95_us: percentile_from_buckets(&lat_buckets, 0.95),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            events_applied: self.events_applied(),
            events_stale: self.events_stale(),
            events_failed: self.events_failed(),
            triggers_published: self.triggers_published(),
            publish_failures: self.publish_failures(),
            audit_failures: self.audit_failures(),
            write_conflicts: self.write_conflicts(),
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }
}

/// Summary of metrics for a reporting period
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub events_received: u64,
    pub events_dropped: u64,
    pub invalid_payloads: u64,
    pub events_total: u64,
    pub events_per_sec: f64,
    pub avg_process_latency_us: u64,
    pub max_process_latency_us: u64,
    /// Event processing latency histogram buckets
    /// Bounds: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200 µs
    pub lat_buckets: [u64; NUM_BUCKETS],
    pub lat_p50_us: u64,
    pub lat_p95_us: u64,
    pub lat_p99_us: u64,
    pub events_applied: u64,
    pub events_stale: u64,
    pub events_failed: u64,
    pub triggers_published: u64,
    pub publish_failures: u64,
    pub audit_failures: u64,
    pub write_conflicts: u64,
    pub in_flight: u64,
}

/// Cumulative view of the counters for scraping
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub events_received: u64,
    pub events_dropped: u64,
    pub invalid_payloads: u64,
    pub events_total: u64,
    /// Lifetime latency histogram buckets, not cumulative across bounds
    pub lat_buckets: [u64; NUM_BUCKETS],
    pub lat_sum_us: u64,
    pub lat_p99_us: u64,
    pub events_applied: u64,
    pub events_stale: u64,
    pub events_failed: u64,
    pub triggers_published: u64,
    pub publish_failures: u64,
    pub audit_failures: u64,
    pub write_conflicts: u64,
    pub in_flight: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            events_total = %self.events_total,
            events_per_sec = format!("{:.1}", self.events_per_sec),
            avg_latency_us = %self.avg_process_latency_us,
            max_latency_us = %self.max_process_latency_us,
            p99_us = %self.lat_p99_us,
            applied = %self.events_applied,
            stale = %self.events_stale,
            failed = %self.events_failed,
            triggers = %self.triggers_published,
            publish_failures = %self.publish_failures,
            write_conflicts = %self.write_conflicts,
            dropped = %self.events_dropped,
            "metrics"
        );
    }
}
