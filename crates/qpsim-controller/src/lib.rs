//! Periodically recomputes the target load (multiplier, QPS, worker count)
//! from the load pattern and currently active scheduled events, and
//! publishes the result for the rate limiter and worker pool to read.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use qpsim_clock::Clock;
use qpsim_domain::config::ConfigIssue;
use qpsim_pattern::LoadPattern;
use qpsim_scheduler::EventScheduler;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Bounded history kept for observability / post-run review, one entry per
/// update tick. At a 1-minute tick this covers 24 hours.
const HISTORY_CAPACITY: usize = 1440;

#[derive(Debug, Clone, Copy)]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    pub multiplier: f64,
    pub target_qps: u64,
    pub target_workers: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct ControllerConfig {
    pub base_workers: usize,
    pub min_workers: usize,
    pub max_workers: usize,
    pub update_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            base_workers: 4,
            min_workers: 1,
            max_workers: 64,
            update_interval: Duration::from_secs(1),
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.update_interval < Duration::from_secs(1) {
            issues.push(ConfigIssue::error(
                "update_interval",
                "must be at least 1 second",
            ));
        }
        if self.min_workers < 1 {
            issues.push(ConfigIssue::error("min_workers", "must be >= 1"));
        }
        if self.max_workers < self.min_workers {
            issues.push(ConfigIssue::error(
                "max_workers",
                format!(
                    "max_workers ({}) must be >= min_workers ({})",
                    self.max_workers, self.min_workers
                ),
            ));
        }
        if self.base_workers < self.min_workers || self.base_workers > self.max_workers {
            issues.push(ConfigIssue::error(
                "base_workers",
                format!(
                    "base_workers ({}) must be within [min_workers ({}), max_workers ({})]",
                    self.base_workers, self.min_workers, self.max_workers
                ),
            ));
        }
        issues
    }
}

pub struct LoadController {
    pattern: LoadPattern,
    scheduler: Arc<EventScheduler>,
    clock: Arc<dyn Clock>,
    config: ControllerConfig,
    multiplier_bits: AtomicU64,
    target_qps: AtomicI64,
    target_workers: AtomicI64,
    history: Mutex<VecDeque<HistoryEntry>>,
    started: AtomicBool,
    root: CancellationToken,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl LoadController {
    pub fn new(
        pattern: LoadPattern,
        scheduler: Arc<EventScheduler>,
        clock: Arc<dyn Clock>,
        config: ControllerConfig,
    ) -> Result<Self, Vec<ConfigIssue>> {
        let mut issues = config.validate();
        issues.extend(pattern.validate());
        if qpsim_domain::config::has_errors(&issues) {
            return Err(issues);
        }
        Ok(Self {
            pattern,
            scheduler,
            clock,
            config,
            multiplier_bits: AtomicU64::new(1.0f64.to_bits()),
            target_qps: AtomicI64::new(1),
            target_workers: AtomicI64::new(config.base_workers as i64),
            history: Mutex::new(VecDeque::with_capacity(HISTORY_CAPACITY)),
            started: AtomicBool::new(false),
            root: CancellationToken::new(),
            task: Mutex::new(None),
        })
    }

    pub fn multiplier(&self) -> f64 {
        f64::from_bits(self.multiplier_bits.load(Ordering::Acquire))
    }

    pub fn target_qps(&self) -> u64 {
        self.target_qps.load(Ordering::Acquire).max(1) as u64
    }

    pub fn target_workers(&self) -> usize {
        self.target_workers.load(Ordering::Acquire).max(0) as usize
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.lock().iter().copied().collect()
    }

    /// Run one update iteration synchronously.
    pub fn force_update(&self) {
        let now = self.clock.now();

        let pattern_mult = self.pattern.get_multiplier_smooth(now);
        let mult = self
            .scheduler
            .effective_multiplier(pattern_mult)
            .clamp(self.pattern.min, self.pattern.max);
        self.multiplier_bits.store(mult.to_bits(), Ordering::Release);

        let target_qps = ((self.pattern.baseline as f64) * mult).floor().max(1.0) as u64;
        self.target_qps.store(target_qps as i64, Ordering::Release);

        let target_workers = (((self.config.base_workers as f64) * mult).floor() as i64)
            .clamp(self.config.min_workers as i64, self.config.max_workers as i64);
        self.target_workers.store(target_workers, Ordering::Release);

        let mut history = self.history.lock();
        if history.len() == HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back(HistoryEntry {
            at: now,
            multiplier: mult,
            target_qps,
            target_workers: target_workers as usize,
        });
    }

    pub fn stop(&self) {
        self.root.cancel();
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }
}

/// Spawn the controller's background update task. Idempotent: a second call
/// (even from a different `Arc` clone) is a no-op.
pub fn spawn(controller: Arc<LoadController>) {
    if controller.started.swap(true, Ordering::SeqCst) {
        return;
    }
    controller.force_update();
    let interval = controller.config.update_interval;
    let clock = controller.clock.clone();
    let ctl = controller.clone();
    let handle = tokio::spawn(async move {
        let mut ticker = clock.ticker(interval);
        loop {
            tokio::select! {
                tick = ticker.tick() => {
                    if tick.is_none() {
                        break;
                    }
                    ctl.force_update();
                }
                _ = ctl.root.cancelled() => break,
            }
        }
    });
    *controller.task.lock() = Some(handle);
}

#[cfg(test)]
mod tests {
    use super::*;
    use qpsim_clock::SimulatedClock;
    use qpsim_pattern::PatternType;
    use std::collections::HashMap;

    fn pattern() -> LoadPattern {
        let mut hourly = HashMap::new();
        hourly.insert(9, 2.0);
        hourly.insert(10, 2.0);
        LoadPattern {
            pattern_type: PatternType::Hourly,
            baseline: 100,
            hourly,
            min: 0.1,
            max: 10.0,
        }
    }

    #[test]
    fn rejects_invalid_config() {
        let cfg = ControllerConfig {
            base_workers: 4,
            min_workers: 10,
            max_workers: 5,
            update_interval: Duration::from_secs(1),
        };
        let clock: Arc<dyn Clock> = Arc::new(SimulatedClock::new(Utc::now(), 60));
        let scheduler = Arc::new(EventScheduler::new(clock.clone()));
        assert!(LoadController::new(pattern(), scheduler, clock, cfg).is_err());
    }

    #[test]
    fn force_update_publishes_target_qps_and_workers() {
        let t0 = "2024-01-01T09:30:00Z".parse::<DateTime<Utc>>().unwrap();
        let clock: Arc<dyn Clock> = Arc::new(SimulatedClock::new(t0, 60));
        let scheduler = Arc::new(EventScheduler::new(clock.clone()));
        let ctl = LoadController::new(pattern(), scheduler, clock, ControllerConfig::default()).unwrap();
        ctl.force_update();
        assert_eq!(ctl.multiplier(), 2.0);
        assert_eq!(ctl.target_qps(), 200);
        assert_eq!(ctl.target_workers(), 8); // base_workers(4) * 2.0, clamped within [1, 64]
        assert_eq!(ctl.history().len(), 1);
    }

    #[test]
    fn history_is_capped() {
        let clock: Arc<dyn Clock> = Arc::new(SimulatedClock::new(Utc::now(), 60));
        let scheduler = Arc::new(EventScheduler::new(clock.clone()));
        let ctl = LoadController::new(pattern(), scheduler, clock, ControllerConfig::default()).unwrap();
        for _ in 0..(HISTORY_CAPACITY + 10) {
            ctl.force_update();
        }
        assert_eq!(ctl.history().len(), HISTORY_CAPACITY);
    }
}
