//! Token-bucket rate limiter whose fill rate tracks the load controller's
//! current target QPS. The bucket is a `tokio::sync::Semaphore`: acquiring a
//! permit consumes a token, and a permit is never returned by the consumer —
//! it is "spent", and only the refill task replaces it via `add_permits`.

use qpsim_controller::LoadController;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

/// Refill cadence. Deliberately wall-clock (not driven by the simulated
/// clock): bucket refill granularity is an implementation detail of the
/// limiter, not part of the simulated timeline.
const REFILL_INTERVAL: Duration = Duration::from_millis(10);
const REFILL_TICKS_PER_SECOND: f64 = 100.0;
const MAX_CAPACITY: usize = 10_000;

/// Outcomes of a blocked [`RateLimiter::wait`]/[`RateLimiter::wait_with_timeout`]
/// call. Kept as three distinct variants (rather than a single `Canceled`
/// marker) because a caller needs to tell "my own deadline elapsed" apart
/// from "the caller-supplied context fired" apart from "the limiter itself
/// was stopped out from under me".
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    #[error("rate limiter wait canceled by caller context")]
    Canceled,
    #[error("rate limiter stopped")]
    Stopped,
    #[error("rate limiter wait timed out")]
    TimedOut,
}

pub struct RateLimiter {
    controller: Arc<LoadController>,
    semaphore: Arc<Semaphore>,
    capacity: usize,
    current_limit: AtomicI64,
    accumulator: parking_lot::Mutex<f64>,
    acquired: AtomicU64,
    rejected: AtomicU64,
    started: AtomicBool,
    root: CancellationToken,
    task: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl RateLimiter {
    pub fn new(controller: Arc<LoadController>) -> Self {
        let capacity = (controller.target_qps().max(1) as usize).min(MAX_CAPACITY);
        Self {
            controller,
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            current_limit: AtomicI64::new(capacity as i64),
            accumulator: parking_lot::Mutex::new(0.0),
            acquired: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            started: AtomicBool::new(false),
            root: CancellationToken::new(),
            task: parking_lot::Mutex::new(None),
        }
    }

    pub fn current_limit(&self) -> i64 {
        self.current_limit.load(Ordering::Acquire)
    }

    pub fn acquired_count(&self) -> u64 {
        self.acquired.load(Ordering::Relaxed)
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Block until a token is available, a caller-supplied cancellation
    /// fires, or the limiter itself is stopped. FIFO among waiters, courtesy
    /// of `tokio::sync::Semaphore`.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), WaitError> {
        tokio::select! {
            res = self.semaphore.acquire() => {
                match res {
                    Ok(permit) => {
                        permit.forget();
                        self.acquired.fetch_add(1, Ordering::Relaxed);
                        Ok(())
                    }
                    Err(_) => {
                        self.rejected.fetch_add(1, Ordering::Relaxed);
                        Err(WaitError::Stopped)
                    }
                }
            }
            _ = cancel.cancelled() => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                Err(WaitError::Canceled)
            }
            _ = self.root.cancelled() => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                Err(WaitError::Stopped)
            }
        }
    }

    /// As [`Self::wait`], but bounded by `timeout`. A timeout is reported as
    /// [`WaitError::TimedOut`], distinct from [`WaitError::Canceled`] (the
    /// caller's own context fired first) and [`WaitError::Stopped`] (the
    /// limiter was stopped first).
    pub async fn wait_with_timeout(
        &self,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> Result<(), WaitError> {
        match tokio::time::timeout(timeout, self.wait(cancel)).await {
            Ok(result) => result,
            Err(_) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                Err(WaitError::TimedOut)
            }
        }
    }

    /// Non-blocking: grabs a token only if one is immediately available.
    pub fn try_acquire(&self) -> bool {
        match self.semaphore.try_acquire() {
            Ok(permit) => {
                permit.forget();
                self.acquired.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Alias for [`Self::try_acquire`]; kept as a distinct name for call
    /// sites that want the shorter, ctx-free spelling.
    pub fn acquire(&self) -> bool {
        self.try_acquire()
    }

    fn refill_tick(&self) {
        let target_qps = self.controller.target_qps().max(1);
        self.current_limit.store(target_qps as i64, Ordering::Release);

        let tokens_per_tick = target_qps as f64 / REFILL_TICKS_PER_SECOND;
        let mut accumulator = self.accumulator.lock();
        *accumulator += tokens_per_tick;

        let available = self.semaphore.available_permits();
        let headroom = self.capacity.saturating_sub(available);
        let to_deposit = accumulator.floor().max(0.0) as usize;

        if to_deposit > headroom {
            // Would overflow the bucket's original capacity; drop the
            // excess rather than letting the semaphore grow unbounded.
            self.semaphore.add_permits(headroom);
            *accumulator = 0.0;
        } else if to_deposit > 0 {
            self.semaphore.add_permits(to_deposit);
            *accumulator -= to_deposit as f64;
        }
    }

    pub fn stop(&self) {
        self.root.cancel();
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }
}

/// Spawn the limiter's background refill task. Idempotent.
pub fn spawn(limiter: Arc<RateLimiter>) {
    if limiter.started.swap(true, Ordering::SeqCst) {
        return;
    }
    let lim = limiter.clone();
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(REFILL_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => lim.refill_tick(),
                _ = lim.root.cancelled() => break,
            }
        }
    });
    *limiter.task.lock() = Some(handle);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use qpsim_clock::{Clock, SimulatedClock};
    use qpsim_controller::ControllerConfig;
    use qpsim_pattern::LoadPattern;
    use qpsim_scheduler::EventScheduler;

    fn make_controller(baseline: u64) -> Arc<LoadController> {
        let clock: Arc<dyn Clock> = Arc::new(SimulatedClock::new(Utc::now(), 1));
        let scheduler = Arc::new(EventScheduler::new(clock.clone()));
        let pattern = LoadPattern {
            baseline,
            ..LoadPattern::default()
        };
        let ctl = LoadController::new(pattern, scheduler, clock, ControllerConfig::default()).unwrap();
        ctl.force_update();
        Arc::new(ctl)
    }

    #[test]
    fn capacity_is_clamped_to_max() {
        let controller = make_controller(50_000);
        let limiter = RateLimiter::new(controller);
        assert_eq!(limiter.capacity, MAX_CAPACITY);
    }

    #[tokio::test]
    async fn try_acquire_drains_initial_bucket() {
        let controller = make_controller(5);
        let limiter = RateLimiter::new(controller);
        for _ in 0..5 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());
        assert_eq!(limiter.acquired_count(), 5);
        assert_eq!(limiter.rejected_count(), 1);
    }

    #[tokio::test]
    async fn wait_is_canceled_by_caller_token() {
        let controller = make_controller(1);
        let limiter = RateLimiter::new(controller);
        assert!(limiter.try_acquire()); // drain the single initial token

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = limiter.wait(&cancel).await;
        assert_eq!(result, Err(WaitError::Canceled));
    }

    #[tokio::test]
    async fn wait_is_stopped_by_limiter_stop() {
        let controller = make_controller(1);
        let limiter = Arc::new(RateLimiter::new(controller));
        assert!(limiter.try_acquire()); // drain the single initial token
        limiter.stop();

        let cancel = CancellationToken::new();
        let result = limiter.wait(&cancel).await;
        assert_eq!(result, Err(WaitError::Stopped));
    }

    #[tokio::test]
    async fn wait_with_timeout_is_distinguishable_from_cancel_and_stop() {
        let controller = make_controller(1);
        let limiter = RateLimiter::new(controller);
        assert!(limiter.try_acquire()); // drain the single initial token, no refill task running

        let cancel = CancellationToken::new();
        let result = limiter
            .wait_with_timeout(&cancel, Duration::from_millis(20))
            .await;
        assert_eq!(result, Err(WaitError::TimedOut));
        assert_ne!(result, Err(WaitError::Canceled));
        assert_ne!(result, Err(WaitError::Stopped));
    }

    #[tokio::test]
    async fn refill_tick_deposits_tokens_without_exceeding_capacity() {
        let controller = make_controller(100); // capacity 100, 1 token/tick
        let limiter = RateLimiter::new(controller);
        for _ in 0..100 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());
        limiter.refill_tick();
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }
}
