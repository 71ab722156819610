use crate::entry::TimelineEntry;
use chrono::{DateTime, Utc};
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use qpsim_domain::MetricsSink;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Lower/upper bounds of the latency histogram, expressed in nanoseconds:
/// 1 microsecond to 60 seconds, matching the range queries in this
/// simulator are expected to fall in.
const HISTOGRAM_LOW_NS: u64 = 1_000;
const HISTOGRAM_HIGH_NS: u64 = 60_000_000_000;
const HISTOGRAM_SIG_FIGS: u8 = 3;

/// Accumulates counters and a latency histogram for one aggregation
/// interval. Not itself periodic — a background loop calls `to_entry`, hands
/// the result to a writer, then calls `reset`.
pub struct IntervalCollector {
    total: AtomicU64,
    errors: AtomicU64,
    reads: AtomicU64,
    writes: AtomicU64,
    histogram: Mutex<Histogram<u64>>,
    interval_started_at: Mutex<DateTime<Utc>>,
}

impl IntervalCollector {
    pub fn new() -> Self {
        Self {
            total: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            histogram: Mutex::new(
                Histogram::new_with_bounds(HISTOGRAM_LOW_NS, HISTOGRAM_HIGH_NS, HISTOGRAM_SIG_FIGS)
                    .expect("valid histogram bounds"),
            ),
            interval_started_at: Mutex::new(Utc::now()),
        }
    }

    pub fn has_data(&self) -> bool {
        self.total.load(Ordering::Relaxed) > 0
    }

    /// Snapshot counters and histogram percentiles into a [`TimelineEntry`].
    /// Does not reset — the caller decides when the interval is over.
    pub fn to_entry(&self, simulated_time: DateTime<Utc>, target_qps: u64, multiplier: f64, active_workers: usize) -> TimelineEntry {
        let started = *self.interval_started_at.lock();
        let now = Utc::now();
        let interval_sec = (now - started).num_milliseconds() as f64 / 1000.0;

        let total = self.total.load(Ordering::Relaxed);
        let errors = self.errors.load(Ordering::Relaxed);
        let reads = self.reads.load(Ordering::Relaxed);
        let writes = self.writes.load(Ordering::Relaxed);

        let histogram = self.histogram.lock();
        let avg_latency_us = histogram.mean() / 1000.0;
        let p50_latency_us = histogram.value_at_quantile(0.50) as f64 / 1000.0;
        let p95_latency_us = histogram.value_at_quantile(0.95) as f64 / 1000.0;
        let p99_latency_us = histogram.value_at_quantile(0.99) as f64 / 1000.0;

        let actual_qps = if interval_sec > 0.0 { total as f64 / interval_sec } else { 0.0 };

        TimelineEntry {
            timestamp: now,
            simulated_time,
            interval_sec,
            multiplier,
            target_qps: target_qps as f64,
            actual_qps,
            total_queries: total,
            total_errors: errors,
            active_workers,
            avg_latency_us,
            p50_latency_us,
            p95_latency_us,
            p99_latency_us,
            read_queries: reads,
            write_queries: writes,
        }
    }

    /// Zero counters, reset the histogram, and re-anchor the interval start
    /// to wall-clock now. `_simulated_time` is accepted for call-site
    /// symmetry with `to_entry` but isn't otherwise consulted.
    pub fn reset(&self, _simulated_time: DateTime<Utc>) {
        self.total.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.reads.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
        self.histogram.lock().reset();
        *self.interval_started_at.lock() = Utc::now();
    }
}

impl Default for IntervalCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for IntervalCollector {
    fn record(&self, _template_name: &str, latency: Duration, is_read: bool, error_category: Option<String>) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if is_read {
            self.reads.fetch_add(1, Ordering::Relaxed);
        } else {
            self.writes.fetch_add(1, Ordering::Relaxed);
        }
        if error_category.is_some() {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }

        let ns = (latency.as_nanos() as u64).clamp(HISTOGRAM_LOW_NS, HISTOGRAM_HIGH_NS);
        let _ = self.histogram.lock().record(ns);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_updates_counters_by_kind() {
        let collector = IntervalCollector::new();
        collector.record("q1", Duration::from_micros(100), true, None);
        collector.record("q2", Duration::from_micros(200), false, Some("deadlock".to_string()));
        assert!(collector.has_data());
        let entry = collector.to_entry(Utc::now(), 10, 1.0, 4);
        assert_eq!(entry.total_queries, 2);
        assert_eq!(entry.read_queries, 1);
        assert_eq!(entry.write_queries, 1);
        assert_eq!(entry.total_errors, 1);
    }

    #[test]
    fn reset_zeroes_everything() {
        let collector = IntervalCollector::new();
        collector.record("q1", Duration::from_micros(100), true, None);
        collector.reset(Utc::now());
        assert!(!collector.has_data());
        let entry = collector.to_entry(Utc::now(), 10, 1.0, 4);
        assert_eq!(entry.total_queries, 0);
        assert_eq!(entry.p50_latency_us, 0.0);
    }

    #[test]
    fn latency_outside_histogram_range_is_clamped_not_dropped() {
        let collector = IntervalCollector::new();
        collector.record("slow", Duration::from_secs(120), true, None);
        let entry = collector.to_entry(Utc::now(), 1, 1.0, 1);
        assert_eq!(entry.total_queries, 1);
        assert!(entry.p99_latency_us > 0.0);
    }
}
