use chrono::{DateTime, Utc};
use qpsim_domain::{Error, Result};

/// One row of the streamed timeline: everything observed during a single
/// aggregation interval.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub timestamp: DateTime<Utc>,
    pub simulated_time: DateTime<Utc>,
    pub interval_sec: f64,
    pub multiplier: f64,
    pub target_qps: f64,
    pub actual_qps: f64,
    pub total_queries: u64,
    pub total_errors: u64,
    pub active_workers: usize,
    pub avg_latency_us: f64,
    pub p50_latency_us: f64,
    pub p95_latency_us: f64,
    pub p99_latency_us: f64,
    pub read_queries: u64,
    pub write_queries: u64,
}

impl TimelineEntry {
    pub const HEADER: [&'static str; 15] = [
        "timestamp",
        "simulated_time",
        "interval_sec",
        "multiplier",
        "target_qps",
        "actual_qps",
        "total_queries",
        "total_errors",
        "active_workers",
        "avg_latency_us",
        "p50_latency_us",
        "p95_latency_us",
        "p99_latency_us",
        "read_queries",
        "write_queries",
    ];

    /// Render as the fixed-precision CSV row: RFC3339 timestamps, 4-decimal
    /// multiplier, 2-decimal everything else that's a float.
    pub fn to_csv_record(&self) -> [String; 15] {
        [
            self.timestamp.to_rfc3339(),
            self.simulated_time.to_rfc3339(),
            format!("{:.2}", self.interval_sec),
            format!("{:.4}", self.multiplier),
            format!("{:.2}", self.target_qps),
            format!("{:.2}", self.actual_qps),
            self.total_queries.to_string(),
            self.total_errors.to_string(),
            self.active_workers.to_string(),
            format!("{:.2}", self.avg_latency_us),
            format!("{:.2}", self.p50_latency_us),
            format!("{:.2}", self.p95_latency_us),
            format!("{:.2}", self.p99_latency_us),
            self.read_queries.to_string(),
            self.write_queries.to_string(),
        ]
    }

    /// Parse a row produced by [`Self::to_csv_record`] back into an entry.
    /// Round-trips every field exactly except for the fixed-precision
    /// rounding `to_csv_record` already applies to the float columns.
    pub fn from_csv_record(record: &[String; 15]) -> Result<Self> {
        let field = |i: usize| -> &str { record[i].as_str() };
        let parse_time = |i: usize| -> Result<DateTime<Utc>> {
            DateTime::parse_from_rfc3339(field(i))
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| Error::Storage(format!("timeline row: bad timestamp '{}': {e}", field(i))))
        };
        let parse_f64 = |i: usize| -> Result<f64> {
            field(i)
                .parse()
                .map_err(|e| Error::Storage(format!("timeline row: bad float '{}': {e}", field(i))))
        };
        let parse_u64 = |i: usize| -> Result<u64> {
            field(i)
                .parse()
                .map_err(|e| Error::Storage(format!("timeline row: bad integer '{}': {e}", field(i))))
        };
        let parse_usize = |i: usize| -> Result<usize> {
            field(i)
                .parse()
                .map_err(|e| Error::Storage(format!("timeline row: bad integer '{}': {e}", field(i))))
        };

        Ok(Self {
            timestamp: parse_time(0)?,
            simulated_time: parse_time(1)?,
            interval_sec: parse_f64(2)?,
            multiplier: parse_f64(3)?,
            target_qps: parse_f64(4)?,
            actual_qps: parse_f64(5)?,
            total_queries: parse_u64(6)?,
            total_errors: parse_u64(7)?,
            active_workers: parse_usize(8)?,
            avg_latency_us: parse_f64(9)?,
            p50_latency_us: parse_f64(10)?,
            p95_latency_us: parse_f64(11)?,
            p99_latency_us: parse_f64(12)?,
            read_queries: parse_u64(13)?,
            write_queries: parse_u64(14)?,
        })
    }
}
