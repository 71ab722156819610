//! Cron-triggered event scheduler. Activates/deactivates bounded-duration
//! events and lets the load controller ask for the "effective" multiplier,
//! read/write ratio, or workload name once overrides from active events are
//! applied.

mod event;
mod merge;

pub use event::{ActiveEvent, ScheduledEvent};
pub use merge::MergeStrategy;

use parking_lot::RwLock;
use qpsim_clock::Clock;
use qpsim_domain::config::ConfigIssue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio_util::sync::CancellationToken;

/// Capability set for reacting to event activation/deactivation. A plain
/// trait with default no-op methods rather than a class hierarchy, per the
/// polymorphic-listener design note.
pub trait EventListener: Send + Sync {
    fn on_event_start(&self, _active: &ActiveEvent) {}
    fn on_event_end(&self, _active: &ActiveEvent) {}
}

struct Inner {
    events: Vec<ScheduledEvent>,
    cron_cache: HashMap<String, qpsim_cron::CronExpr>,
    active: Vec<ActiveEvent>,
}

pub struct EventScheduler {
    inner: RwLock<Inner>,
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
    merge_strategy: MergeStrategy,
    clock: Arc<dyn Clock>,
    started: AtomicBool,
    root: CancellationToken,
    task: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl EventScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_merge_strategy(clock, MergeStrategy::HighestPriority)
    }

    pub fn with_merge_strategy(clock: Arc<dyn Clock>, merge_strategy: MergeStrategy) -> Self {
        Self {
            inner: RwLock::new(Inner {
                events: Vec::new(),
                cron_cache: HashMap::new(),
                active: Vec::new(),
            }),
            listeners: RwLock::new(Vec::new()),
            merge_strategy,
            clock,
            started: AtomicBool::new(false),
            root: CancellationToken::new(),
            task: parking_lot::Mutex::new(None),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn EventListener>) {
        self.listeners.write().push(listener);
    }

    /// Validate, then add or replace (by name) a scheduled event. Replacing
    /// invalidates the cached parsed cron expression.
    pub fn add_event(&self, event: ScheduledEvent) -> Result<(), Vec<ConfigIssue>> {
        let issues = event.validate();
        if qpsim_domain::config::has_errors(&issues) {
            return Err(issues);
        }
        let mut inner = self.inner.write();
        inner.cron_cache.remove(&event.name);
        if let Some(existing) = inner.events.iter_mut().find(|e| e.name == event.name) {
            *existing = event;
        } else {
            inner.events.push(event);
        }
        Ok(())
    }

    /// Remove a scheduled event by name, ending any currently active
    /// instance.
    pub fn remove_event(&self, name: &str) {
        let mut inner = self.inner.write();
        inner.events.retain(|e| e.name != name);
        inner.cron_cache.remove(name);
        if let Some(pos) = inner.active.iter().position(|a| a.event.name == name) {
            let ended = inner.active.remove(pos);
            for listener in self.listeners.read().iter() {
                listener.on_event_end(&ended);
            }
        }
    }

    pub fn scheduled_events(&self) -> Vec<ScheduledEvent> {
        self.inner.read().events.clone()
    }

    pub fn active_events(&self) -> Vec<ActiveEvent> {
        self.inner.read().active.clone()
    }

    fn check_events(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.write();
        let listeners = self.listeners.read();

        let mut still_active = Vec::with_capacity(inner.active.len());
        for active in std::mem::take(&mut inner.active) {
            if now >= active.end_time {
                for l in listeners.iter() {
                    l.on_event_end(&active);
                }
            } else {
                still_active.push(active);
            }
        }
        inner.active = still_active;

        let active_names: std::collections::HashSet<String> =
            inner.active.iter().map(|a| a.event.name.clone()).collect();

        let events = inner.events.clone();
        for event in events.iter().filter(|e| e.enabled && !active_names.contains(&e.name)) {
            let cron = match inner.cron_cache.get(&event.name) {
                Some(c) => c.clone(),
                None => match qpsim_cron::CronExpr::parse(&event.cron) {
                    Ok(c) => {
                        inner.cron_cache.insert(event.name.clone(), c.clone());
                        c
                    }
                    Err(e) => {
                        tracing::warn!(event = %event.name, error = %e, "invalid cron expression, skipping event at check time");
                        continue;
                    }
                },
            };
            if cron.matches(now) {
                let active = ActiveEvent {
                    event: event.clone(),
                    start_time: now,
                    end_time: now + chrono::Duration::from_std(event.duration).unwrap_or_default(),
                };
                for l in listeners.iter() {
                    l.on_event_start(&active);
                }
                inner.active.push(active);
            }
        }

        inner.active.sort_by(|a, b| b.event.priority.cmp(&a.event.priority));
    }

    /// Run one `check_events` pass synchronously (used by tests and
    /// `ForceUpdate`-style manual triggers).
    pub fn force_check(&self) {
        self.check_events();
    }

    pub fn stop(&self) {
        self.root.cancel();
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }

    /// Effective multiplier after applying this scheduler's merge strategy
    /// across every active event carrying `multiplier_override > 0`.
    pub fn effective_multiplier(&self, base: f64) -> f64 {
        let inner = self.inner.read();
        let overrides: Vec<(i64, f64)> = inner
            .active
            .iter()
            .filter_map(|a| a.event.multiplier_override.filter(|&m| m > 0.0).map(|m| (a.event.priority, m)))
            .collect();
        merge::merge_multipliers(base, &overrides, self.merge_strategy)
    }

    /// Effective read/write ratio: the highest-priority active event's
    /// override, else the given default.
    pub fn effective_read_write_ratio(&self, read: u32, write: u32) -> (u32, u32) {
        let inner = self.inner.read();
        inner
            .active
            .iter()
            .find_map(|a| a.event.read_write_ratio)
            .unwrap_or((read, write))
    }

    /// Effective workload profile name: the highest-priority active
    /// event's override, else the given default.
    pub fn effective_workload(&self, name: &str) -> String {
        let inner = self.inner.read();
        inner
            .active
            .iter()
            .find_map(|a| a.event.workload_override.clone())
            .unwrap_or_else(|| name.to_string())
    }
}

/// Spawn the scheduler's background ticker task. Kept as a free function
/// (rather than inside `start`) because it needs an `Arc<EventScheduler>`
/// to satisfy the `'static` bound `tokio::spawn` requires.
pub fn spawn(scheduler: Arc<EventScheduler>) {
    if scheduler.started.swap(true, Ordering::SeqCst) {
        return;
    }
    scheduler.check_events();
    let clock = scheduler.clock.clone();
    let sched = scheduler.clone();
    let handle = tokio::spawn(async move {
        let mut ticker = clock.ticker(StdDuration::from_secs(60));
        loop {
            tokio::select! {
                tick = ticker.tick() => {
                    if tick.is_none() {
                        break;
                    }
                    sched.check_events();
                }
                _ = sched.root.cancelled() => break,
            }
        }
    });
    *scheduler.task.lock() = Some(handle);
}
