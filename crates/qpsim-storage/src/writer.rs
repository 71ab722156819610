use crate::aggregate::AggregateBucket;
use crate::ring::RawEntry;
use chrono::Utc;
use parking_lot::Mutex;
use qpsim_domain::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Default cap (bytes) a single `.jsonl` file is allowed to grow to before
/// the writer rotates to a new one.
pub const DEFAULT_ROTATE_BYTES: u64 = 100 * 1024 * 1024;

#[derive(Debug, Serialize)]
struct OpSummary {
    count: u64,
    errors: u64,
    error_rate_pct: f64,
    min_ns: u64,
    max_ns: u64,
    mean_ns: f64,
    stddev_ns: f64,
    p50_ns: u64,
    p90_ns: u64,
    p95_ns: u64,
    p99_ns: u64,
}

#[derive(Debug, Serialize)]
struct AggregateBucketSummary {
    timestamp: String,
    duration: String,
    operations: BTreeMap<String, OpSummary>,
}

fn summarize(bucket: &AggregateBucket) -> AggregateBucketSummary {
    let operations = bucket
        .ops
        .iter()
        .map(|(name, op)| {
            (
                name.clone(),
                OpSummary {
                    count: op.count,
                    errors: op.errors,
                    error_rate_pct: op.error_rate_pct(),
                    min_ns: if op.count == 0 { 0 } else { op.min_ns },
                    max_ns: op.max_ns,
                    mean_ns: op.mean_ns(),
                    stddev_ns: op.stddev_ns(),
                    p50_ns: op.percentile_ns(0.50),
                    p90_ns: op.percentile_ns(0.90),
                    p95_ns: op.percentile_ns(0.95),
                    p99_ns: op.percentile_ns(0.99),
                },
            )
        })
        .collect();
    AggregateBucketSummary {
        timestamp: bucket.start.to_rfc3339(),
        duration: humantime::format_duration(bucket.interval).to_string(),
        operations,
    }
}

#[derive(Debug, Serialize)]
struct RawEntryLine<'a> {
    timestamp: String,
    operation: &'a str,
    latency_ns: u128,
    success: bool,
    error_category: &'a Option<String>,
}

/// A single rotating `.jsonl` output file. `prefix` names the file family
/// (`aggregate` or `raw`); a new file is opened whenever the current one
/// would exceed `rotate_bytes`.
struct RotatingFile {
    dir: PathBuf,
    prefix: &'static str,
    rotate_bytes: u64,
    current_path: PathBuf,
    current_size: u64,
    handle: File,
}

impl RotatingFile {
    fn open(dir: &Path, prefix: &'static str, rotate_bytes: u64) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(Error::Io)?;
        let path = Self::new_filename(dir, prefix);
        let handle = OpenOptions::new().create(true).append(true).open(&path).map_err(Error::Io)?;
        Ok(Self { dir: dir.to_path_buf(), prefix, rotate_bytes, current_path: path, current_size: 0, handle })
    }

    fn new_filename(dir: &Path, prefix: &'static str) -> PathBuf {
        let ts = Utc::now().format("%Y%m%dT%H%M%S%.3f");
        dir.join(format!("{prefix}_{ts}.jsonl"))
    }

    fn rotate_if_needed(&mut self, incoming_bytes: u64) -> Result<()> {
        if self.current_size > 0 && self.current_size + incoming_bytes > self.rotate_bytes {
            let path = Self::new_filename(&self.dir, self.prefix);
            self.handle = OpenOptions::new().create(true).append(true).open(&path).map_err(Error::Io)?;
            self.current_path = path;
            self.current_size = 0;
        }
        Ok(())
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        let bytes = line.len() as u64 + 1;
        self.rotate_if_needed(bytes)?;
        writeln!(self.handle, "{line}").map_err(Error::Io)?;
        self.current_size += bytes;
        Ok(())
    }

    fn current_path(&self) -> &Path {
        &self.current_path
    }
}

/// Writes completed aggregate bucket summaries (and, optionally, raw query
/// entries) to rotating JSON-Lines files under a shared output directory.
pub struct StorageFileWriter {
    aggregate: Mutex<RotatingFile>,
    raw: Mutex<Option<RotatingFile>>,
}

impl StorageFileWriter {
    pub fn create(dir: impl AsRef<Path>, rotate_bytes: u64, write_raw: bool) -> Result<Self> {
        let dir = dir.as_ref();
        let aggregate = RotatingFile::open(dir, "aggregate", rotate_bytes)?;
        let raw = if write_raw { Some(RotatingFile::open(dir, "raw", rotate_bytes)?) } else { None };
        Ok(Self { aggregate: Mutex::new(aggregate), raw: Mutex::new(raw) })
    }

    pub fn write_aggregate_bucket(&self, bucket: &AggregateBucket) -> Result<()> {
        let summary = summarize(bucket);
        let line = serde_json::to_string(&summary).map_err(|e| Error::Storage(format!("serialize aggregate bucket: {e}")))?;
        self.aggregate.lock().write_line(&line)
    }

    pub fn write_raw_entry(&self, entry: &RawEntry) -> Result<()> {
        let mut guard = self.raw.lock();
        let Some(raw) = guard.as_mut() else { return Ok(()) };
        let line = RawEntryLine {
            timestamp: entry.timestamp.to_rfc3339(),
            operation: &entry.operation,
            latency_ns: entry.latency.as_nanos(),
            success: entry.success,
            error_category: &entry.error_category,
        };
        let line = serde_json::to_string(&line).map_err(|e| Error::Storage(format!("serialize raw entry: {e}")))?;
        raw.write_line(&line)
    }

    /// Paths of the currently open files — never eligible for cleanup
    /// eviction.
    pub fn open_file_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.aggregate.lock().current_path().to_path_buf()];
        if let Some(raw) = self.raw.lock().as_ref() {
            paths.push(raw.current_path().to_path_buf());
        }
        paths
    }
}
