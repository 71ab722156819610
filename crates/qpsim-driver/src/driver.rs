//! Wires every `qpsim-*` component together into one running simulation:
//! clock, event scheduler, load controller, rate limiter, connection pool,
//! query selector, worker pool, timeline collector, and storage manager.

use crate::cli::RunArgs;
use crate::config::SimulationProfile;
use anyhow::Context;
use chrono::Utc;
use qpsim_clock::{Clock, SimulatedClock};
use qpsim_controller::{ControllerConfig, LoadController};
use qpsim_dbiface::{ConnectionPool, MockPool, MockPoolConfig};
use qpsim_domain::MetricsSink;
use qpsim_limiter::RateLimiter;
use qpsim_query::{EntityCounts, QuerySelector};
use qpsim_scheduler::EventScheduler;
use qpsim_storage::{RawEntry, StorageConfig, StorageManager};
use qpsim_timeline::{CsvTimelineWriter, IntervalCollector, LoadSnapshot};
use qpsim_workers::{work_fn, DynamicWorkerPool, PoolConfig, WorkerContext};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Fans a query outcome out to both the in-process interval collector (for
/// the CSV timeline) and the storage manager (for aggregate/raw JSONL).
struct FanOutSink {
    collector: Arc<IntervalCollector>,
    storage: Arc<StorageManager>,
}

impl MetricsSink for FanOutSink {
    fn record(&self, template_name: &str, latency: Duration, is_read: bool, error_category: Option<String>) {
        self.collector.record(template_name, latency, is_read, error_category.clone());

        let now = Utc::now();
        let entry = match error_category {
            Some(category) => RawEntry::failure(now, template_name, latency, category),
            None => RawEntry::success(now, template_name, latency),
        };
        self.storage.record(entry);
    }
}

/// Everything the driver needs to run and then tear down, in the order it
/// was started.
pub struct SimulationDriver {
    clock: Arc<dyn Clock>,
    scheduler: Arc<EventScheduler>,
    controller: Arc<LoadController>,
    limiter: Arc<RateLimiter>,
    pool: Arc<DynamicWorkerPool>,
    storage: Arc<StorageManager>,
    collector: Arc<IntervalCollector>,
    timeline_writer: Arc<CsvTimelineWriter>,
    aggregate_interval: Duration,
    wall_duration: Duration,
    reconcile_cancel: CancellationToken,
}

impl SimulationDriver {
    pub fn build(args: &RunArgs) -> anyhow::Result<Self> {
        let profile = SimulationProfile::load(&args.profile).map_err(anyhow::Error::msg)?;
        let issues = profile.validate();
        for issue in &issues {
            match issue.severity {
                qpsim_domain::config::ConfigSeverity::Warning => tracing::warn!("profile: {issue}"),
                qpsim_domain::config::ConfigSeverity::Error => tracing::error!("profile: {issue}"),
            }
        }
        if qpsim_domain::config::has_errors(&issues) {
            anyhow::bail!("profile validation failed with {} error(s)", issues.iter().filter(|i| i.severity == qpsim_domain::config::ConfigSeverity::Error).count());
        }

        let wall_duration = args.parsed_duration()?;
        let time_scale = args.clamped_time_scale();
        let start_time = args.parsed_start_time()?;
        let aggregate_interval = args.parsed_aggregate_interval()?;
        let raw_retention = args.parsed_raw_retention()?;

        // ── Clock ─────────────────────────────────────────────────
        let clock: Arc<dyn Clock> = Arc::new(SimulatedClock::new(start_time, time_scale));
        tracing::info!(time_scale, start_time = %start_time, "simulated clock ready");

        // ── Event scheduler ──────────────────────────────────────
        let scheduler = Arc::new(EventScheduler::new(clock.clone()));
        for event_cfg in &profile.events {
            let event = event_cfg.to_scheduled_event().map_err(anyhow::Error::msg)?;
            scheduler.add_event(event).map_err(|issues| anyhow::anyhow!("event {}: {:?}", event_cfg.name, issues))?;
        }
        tracing::info!(events = profile.events.len(), "event scheduler ready");

        // ── Load controller ──────────────────────────────────────
        let base_workers = args.workers.unwrap_or(4).max(1);
        let controller_config = ControllerConfig {
            base_workers,
            min_workers: 1,
            max_workers: (base_workers * 16).max(64),
            update_interval: Duration::from_secs(1),
        };
        let controller = Arc::new(
            LoadController::new(profile.pattern.clone(), scheduler.clone(), clock.clone(), controller_config)
                .map_err(|issues| anyhow::anyhow!("controller config: {:?}", issues))?,
        );
        tracing::info!(base_workers, "load controller ready");

        // ── Rate limiter ──────────────────────────────────────────
        let limiter = Arc::new(RateLimiter::new(controller.clone()));

        // ── Connection pool (mock; a real deployment swaps this for a
        // `sqlx`/`tokio-postgres`/`deadpool`-backed implementation) ──
        let db_pool: Arc<dyn ConnectionPool> = Arc::new(MockPool::new(MockPoolConfig::default()));

        // ── Query selector ────────────────────────────────────────
        let selector = Arc::new(
            QuerySelector::new(crate::catalog::demo_catalog(), args.seed)
                .map_err(|issues| anyhow::anyhow!("query catalog: {:?}", issues))?,
        );

        // ── Storage ───────────────────────────────────────────────
        std::fs::create_dir_all(&args.output_dir).context("creating output directory")?;
        let storage = Arc::new(StorageManager::new(StorageConfig {
            output_dir: args.output_dir.clone(),
            max_storage_bytes: args.max_storage,
            raw_retention,
            aggregate_interval,
            write_raw: args.write_raw,
            ..StorageConfig::default()
        })?);
        storage.set_on_near_limit(Arc::new(|| tracing::warn!("storage usage crossed 90% of max-storage, evicting oldest files")));
        storage.set_on_at_limit(Arc::new(|| tracing::warn!("storage usage reached max-storage cap, evicting oldest files")));

        // ── Timeline ──────────────────────────────────────────────
        let collector = Arc::new(IntervalCollector::new());
        let timeline_path = if args.timeline_output.is_absolute() {
            args.timeline_output.clone()
        } else {
            args.output_dir.join(&args.timeline_output)
        };
        let timeline_writer = Arc::new(CsvTimelineWriter::create(&timeline_path)?);

        // ── Worker pool ───────────────────────────────────────────
        let sink: Arc<dyn MetricsSink> = Arc::new(FanOutSink {
            collector: collector.clone(),
            storage: storage.clone(),
        });
        let ctx = Arc::new(WorkerContext {
            selector,
            limiter: limiter.clone(),
            pool: db_pool,
            sink,
            clock: clock.clone(),
            entity_counts: EntityCounts::default(),
            base_seed: args.seed,
        });
        let pool_config = PoolConfig {
            min_workers: 1,
            max_workers: controller_config.max_workers,
            max_delta: 2,
        };
        let pool = Arc::new(DynamicWorkerPool::new(pool_config, controller.clone(), work_fn(ctx)));

        Ok(Self {
            clock,
            scheduler,
            controller,
            limiter,
            pool,
            storage,
            collector,
            timeline_writer,
            aggregate_interval,
            wall_duration,
            reconcile_cancel: CancellationToken::new(),
        })
    }

    /// Start every background task, run until `wall_duration` elapses, a
    /// Ctrl-C arrives, or storage hits its hard cap, then shut everything
    /// down in reverse order.
    pub async fn run(self) -> anyhow::Result<()> {
        qpsim_scheduler::spawn(self.scheduler.clone());
        qpsim_controller::spawn(self.controller.clone());
        qpsim_limiter::spawn(self.limiter.clone());
        qpsim_storage::spawn(self.storage.clone());
        self.pool.start();
        tracing::info!(workers = self.pool.worker_count(), "worker pool started");

        let reconcile_handle = self.spawn_reconciler();

        let collector_cancel = CancellationToken::new();
        let controller_for_snapshot = self.controller.clone();
        let pool_for_snapshot = self.pool.clone();
        let snapshot = Arc::new(move || LoadSnapshot {
            target_qps: controller_for_snapshot.target_qps(),
            multiplier: controller_for_snapshot.multiplier(),
            active_workers: pool_for_snapshot.worker_count(),
        });
        let timeline_handle = qpsim_timeline::spawn(
            self.collector.clone(),
            self.timeline_writer.clone(),
            self.clock.clone(),
            self.aggregate_interval,
            snapshot,
            collector_cancel.clone(),
        );

        tracing::info!(wall_duration = ?self.wall_duration, "simulation running");
        tokio::select! {
            _ = tokio::time::sleep(self.wall_duration) => {
                tracing::info!("wall-clock duration elapsed, shutting down");
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received ctrl-c, shutting down");
            }
            _ = self.wait_for_storage_cap() => {
                tracing::warn!("storage reached its hard cap, shutting down early");
            }
        }

        // ── Shutdown, reverse of startup order ─────────────────────
        collector_cancel.cancel();
        let _ = timeline_handle.await;
        self.reconcile_cancel.cancel();
        let _ = reconcile_handle.await;
        self.pool.stop().await;
        self.limiter.stop();
        self.storage.flush_once();
        self.storage.stop();
        self.controller.stop();
        self.scheduler.stop();
        self.clock.stop();
        tracing::info!("simulation shut down cleanly");
        Ok(())
    }

    fn spawn_reconciler(&self) -> tokio::task::JoinHandle<()> {
        let pool = self.pool.clone();
        let clock = self.clock.clone();
        let cancel = self.reconcile_cancel.clone();
        tokio::spawn(async move {
            let mut ticker = clock.ticker(Duration::from_secs(1));
            loop {
                tokio::select! {
                    tick = ticker.tick() => {
                        if tick.is_none() {
                            break;
                        }
                        let delta = pool.adjust();
                        if delta != 0 {
                            tracing::debug!(delta, workers = pool.worker_count(), "worker pool reconciled");
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        })
    }

    async fn wait_for_storage_cap(&self) {
        let storage = self.storage.clone();
        loop {
            if storage.is_at_limit() {
                return;
            }
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    }
}
