//! Raw event ring buffer, per-interval aggregation, and a rotating JSONL
//! file writer, tied together by two background loops: a flush loop that
//! prunes/aggregates/persists on a timer, and a cleanup loop that evicts the
//! oldest output files once disk usage crosses a byte-cap threshold.

pub mod aggregate;
pub mod ring;
pub mod writer;

pub use aggregate::{AggregateBucket, Aggregator, OpAccumulator};
pub use ring::{RawEntry, RawRingBuffer};
pub use writer::StorageFileWriter;

use chrono::Utc;
use parking_lot::Mutex;
use qpsim_domain::Result;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub output_dir: PathBuf,
    pub memory_budget_bytes: u64,
    pub max_storage_bytes: u64,
    pub raw_retention: Duration,
    pub aggregate_interval: Duration,
    pub flush_interval: Duration,
    pub cleanup_interval: Duration,
    pub write_raw: bool,
    pub rotate_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            memory_budget_bytes: ring::DEFAULT_MEMORY_BUDGET_BYTES,
            max_storage_bytes: writer::DEFAULT_ROTATE_BYTES * 10,
            raw_retention: Duration::from_secs(3600),
            aggregate_interval: Duration::from_secs(60),
            flush_interval: Duration::from_secs(10),
            cleanup_interval: Duration::from_secs(30),
            write_raw: false,
            rotate_bytes: writer::DEFAULT_ROTATE_BYTES,
        }
    }
}

/// Fraction-of-cap thresholds and eviction targets from §4.10.
const NEAR_LIMIT_THRESHOLD: f64 = 0.90;
const NEAR_LIMIT_TARGET: f64 = 0.85;
const AT_LIMIT_THRESHOLD: f64 = 1.0;
const AT_LIMIT_TARGET: f64 = 0.80;

type LimitCallback = Arc<dyn Fn() + Send + Sync>;

pub struct StorageManager {
    config: StorageConfig,
    ring: Mutex<RawRingBuffer>,
    aggregator: Aggregator,
    writer: Arc<StorageFileWriter>,
    usage_bytes: AtomicU64,
    on_near_limit: Mutex<Option<LimitCallback>>,
    on_at_limit: Mutex<Option<LimitCallback>>,
    started: AtomicBool,
    root: CancellationToken,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl StorageManager {
    pub fn new(config: StorageConfig) -> Result<Self> {
        let writer = StorageFileWriter::create(&config.output_dir, config.rotate_bytes, config.write_raw)?;
        Ok(Self {
            ring: Mutex::new(RawRingBuffer::from_memory_budget(config.memory_budget_bytes)),
            aggregator: Aggregator::new(config.aggregate_interval),
            writer: Arc::new(writer),
            usage_bytes: AtomicU64::new(0),
            on_near_limit: Mutex::new(None),
            on_at_limit: Mutex::new(None),
            started: AtomicBool::new(false),
            root: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            config,
        })
    }

    pub fn set_on_near_limit(&self, cb: LimitCallback) {
        *self.on_near_limit.lock() = Some(cb);
    }

    pub fn set_on_at_limit(&self, cb: LimitCallback) {
        *self.on_at_limit.lock() = Some(cb);
    }

    /// Record one query outcome: appended to the raw ring buffer and folded
    /// into the current aggregate bucket.
    pub fn record(&self, entry: RawEntry) {
        self.aggregator.record(entry.timestamp, &entry.operation, entry.latency, entry.success);
        self.ring.lock().add(entry);
    }

    pub fn usage_bytes(&self) -> u64 {
        self.usage_bytes.load(Ordering::Relaxed)
    }

    pub fn usage_fraction(&self) -> f64 {
        if self.config.max_storage_bytes == 0 {
            0.0
        } else {
            self.usage_bytes() as f64 / self.config.max_storage_bytes as f64
        }
    }

    pub fn is_near_limit(&self) -> bool {
        self.usage_fraction() >= NEAR_LIMIT_THRESHOLD
    }

    pub fn is_at_limit(&self) -> bool {
        self.usage_fraction() >= AT_LIMIT_THRESHOLD
    }

    fn recompute_usage(&self) -> u64 {
        let total = directory_jsonl_bytes(&self.config.output_dir);
        self.usage_bytes.store(total, Ordering::Relaxed);
        total
    }

    /// One flush iteration: prune the raw buffer by retention (writing
    /// evicted entries if raw persistence is enabled), flush completed
    /// aggregate buckets to disk, then recompute usage. Write failures are
    /// logged and not otherwise propagated — retried on the next tick.
    pub fn flush_once(&self) {
        let now = Utc::now();

        let evicted = self.ring.lock().prune(now, self.config.raw_retention);
        if self.config.write_raw {
            for entry in &evicted {
                if let Err(e) = self.writer.write_raw_entry(entry) {
                    tracing::error!(error = %e, "failed to write raw entry");
                }
            }
        }

        for bucket in self.aggregator.flush_completed_buckets(now) {
            if let Err(e) = self.writer.write_aggregate_bucket(&bucket) {
                tracing::error!(error = %e, "failed to write aggregate bucket");
            }
        }

        self.recompute_usage();
    }

    /// One cleanup iteration: recompute usage, then evict the oldest
    /// `.jsonl` files (never a currently-open one) down to the target
    /// fraction if over threshold.
    pub fn cleanup_once(&self) {
        let usage = self.recompute_usage();
        let fraction = if self.config.max_storage_bytes == 0 { 0.0 } else { usage as f64 / self.config.max_storage_bytes as f64 };

        if fraction >= AT_LIMIT_THRESHOLD {
            if let Some(cb) = self.on_at_limit.lock().clone() {
                cb();
            }
            self.evict_down_to(AT_LIMIT_TARGET);
        } else if fraction >= NEAR_LIMIT_THRESHOLD {
            if let Some(cb) = self.on_near_limit.lock().clone() {
                cb();
            }
            self.evict_down_to(NEAR_LIMIT_TARGET);
        }
    }

    fn evict_down_to(&self, target_fraction: f64) {
        let target_bytes = (self.config.max_storage_bytes as f64 * target_fraction) as u64;
        let open_paths: std::collections::HashSet<PathBuf> = self.writer.open_file_paths().into_iter().collect();

        let mut files = list_jsonl_files(&self.config.output_dir);
        files.sort_by_key(|(_, modified)| *modified);

        let mut usage = self.usage_bytes();
        for (path, _modified) in files {
            if usage <= target_bytes {
                break;
            }
            if open_paths.contains(&path) {
                continue;
            }
            let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            if std::fs::remove_file(&path).is_ok() {
                usage = usage.saturating_sub(size);
                tracing::info!(path = %path.display(), "evicted storage file under cap pressure");
            }
        }
        self.usage_bytes.store(usage, Ordering::Relaxed);
    }

    pub fn stop(&self) {
        self.root.cancel();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

fn directory_jsonl_bytes(dir: &Path) -> u64 {
    list_jsonl_files(dir).into_iter().map(|(path, _)| std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0)).sum()
}

fn list_jsonl_files(dir: &Path) -> Vec<(PathBuf, std::time::SystemTime)> {
    let Ok(read_dir) = std::fs::read_dir(dir) else { return Vec::new() };
    read_dir
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().map(|e| e == "jsonl").unwrap_or(false))
        .filter_map(|entry| {
            let modified = entry.metadata().ok()?.modified().ok()?;
            Some((entry.path(), modified))
        })
        .collect()
}

/// Spawn the flush and cleanup background loops. Idempotent.
pub fn spawn(manager: Arc<StorageManager>) {
    if manager.started.swap(true, Ordering::SeqCst) {
        return;
    }

    let flush_mgr = manager.clone();
    let flush_interval = manager.config.flush_interval;
    let flush_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(flush_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => flush_mgr.flush_once(),
                _ = flush_mgr.root.cancelled() => break,
            }
        }
    });

    let cleanup_mgr = manager.clone();
    let cleanup_interval = manager.config.cleanup_interval;
    let cleanup_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => cleanup_mgr.cleanup_once(),
                _ = cleanup_mgr.root.cancelled() => break,
            }
        }
    });

    *manager.tasks.lock() = vec![flush_task, cleanup_task];
}
