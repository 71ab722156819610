use chrono::{DateTime, Duration as ChronoDuration, Utc};
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

const HISTOGRAM_LOW_NS: u64 = 1;
const HISTOGRAM_HIGH_NS: u64 = 60_000_000_000;
const HISTOGRAM_SIG_FIGS: u8 = 3;

/// Per-operation accumulator for one completed or in-progress interval
/// bucket. Holds both the cheap scalar summary stats (min/max/sum/sum of
/// squares, for mean/stddev) and a fixed-range HDR histogram for
/// percentiles, since the scalar stats alone can't answer "p95".
pub struct OpAccumulator {
    pub count: u64,
    pub errors: u64,
    pub min_ns: u64,
    pub max_ns: u64,
    pub sum_ns: f64,
    pub sum_squares_ns: f64,
    pub histogram: Histogram<u64>,
}

impl OpAccumulator {
    fn new() -> Self {
        Self {
            count: 0,
            errors: 0,
            min_ns: u64::MAX,
            max_ns: 0,
            sum_ns: 0.0,
            sum_squares_ns: 0.0,
            histogram: Histogram::new_with_bounds(HISTOGRAM_LOW_NS, HISTOGRAM_HIGH_NS, HISTOGRAM_SIG_FIGS)
                .expect("valid histogram bounds"),
        }
    }

    fn record(&mut self, latency: Duration, success: bool) {
        let ns = (latency.as_nanos() as u64).clamp(HISTOGRAM_LOW_NS, HISTOGRAM_HIGH_NS);
        self.count += 1;
        if !success {
            self.errors += 1;
        }
        self.min_ns = self.min_ns.min(ns);
        self.max_ns = self.max_ns.max(ns);
        self.sum_ns += ns as f64;
        self.sum_squares_ns += (ns as f64) * (ns as f64);
        let _ = self.histogram.record(ns);
    }

    pub fn mean_ns(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.sum_ns / self.count as f64 }
    }

    pub fn stddev_ns(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let mean = self.mean_ns();
        let variance = (self.sum_squares_ns / self.count as f64) - mean * mean;
        variance.max(0.0).sqrt()
    }

    pub fn error_rate_pct(&self) -> f64 {
        if self.count == 0 { 0.0 } else { (self.errors as f64 / self.count as f64) * 100.0 }
    }

    pub fn percentile_ns(&self, q: f64) -> u64 {
        self.histogram.value_at_quantile(q)
    }
}

/// A bucket of per-operation accumulators, all sharing the same interval
/// start time.
pub struct AggregateBucket {
    pub start: DateTime<Utc>,
    pub interval: Duration,
    pub ops: HashMap<String, OpAccumulator>,
}

impl AggregateBucket {
    pub fn end(&self) -> DateTime<Utc> {
        self.start + ChronoDuration::from_std(self.interval).unwrap_or_default()
    }
}

fn floor_to_interval(t: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let interval_secs = interval.as_secs().max(1) as i64;
    let epoch_secs = t.timestamp();
    let floored = epoch_secs - epoch_secs.rem_euclid(interval_secs);
    DateTime::from_timestamp(floored, 0).unwrap_or(t)
}

/// Accumulates per-operation latency/error statistics bucketed by interval,
/// and lets the flush loop drain buckets that are no longer "current".
pub struct Aggregator {
    interval: Duration,
    buckets: Mutex<HashMap<DateTime<Utc>, HashMap<String, OpAccumulator>>>,
}

impl Aggregator {
    pub fn new(interval: Duration) -> Self {
        Self { interval, buckets: Mutex::new(HashMap::new()) }
    }

    pub fn record(&self, t: DateTime<Utc>, operation: &str, latency: Duration, success: bool) {
        let bucket_start = floor_to_interval(t, self.interval);
        let mut buckets = self.buckets.lock();
        let ops = buckets.entry(bucket_start).or_default();
        ops.entry(operation.to_string()).or_insert_with(OpAccumulator::new).record(latency, success);
    }

    /// Remove and return every bucket whose end time is `<=` the start of
    /// the bucket containing `now`, sorted oldest-first. A bucket is
    /// "completed" once the wall clock has moved past its end.
    pub fn flush_completed_buckets(&self, now: DateTime<Utc>) -> Vec<AggregateBucket> {
        let current_start = floor_to_interval(now, self.interval);
        let mut buckets = self.buckets.lock();
        let completed_keys: Vec<DateTime<Utc>> = buckets
            .keys()
            .copied()
            .filter(|&start| start + ChronoDuration::from_std(self.interval).unwrap_or_default() <= current_start)
            .collect();

        let mut out: Vec<AggregateBucket> = completed_keys
            .into_iter()
            .filter_map(|start| buckets.remove(&start).map(|ops| AggregateBucket { start, interval: self.interval, ops }))
            .collect();
        out.sort_by_key(|b| b.start);
        out
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }
}
