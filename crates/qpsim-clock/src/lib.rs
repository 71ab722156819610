//! Virtual clock: a uniform time API backed by either the wall clock or a
//! scaled wall clock, so every time-driven component (controller, scheduler,
//! rate limiter, interval collector) runs identically whether the simulation
//! is real-time or accelerated.

mod real;
mod simulated;
mod ticker;

pub use real::RealClock;
pub use simulated::SimulatedClock;
pub use ticker::Ticker;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Common capability set shared by the real and simulated clocks. Modeled as
/// a trait (not inheritance) per the polymorphic-clock design note: both
/// variants are plain structs behind `Arc<dyn Clock>`.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current simulated (or wall) time.
    fn now(&self) -> DateTime<Utc>;

    /// Elapsed time since `t`, measured on this clock's time axis.
    fn since(&self, t: DateTime<Utc>) -> chrono::Duration {
        self.now() - t
    }

    /// Suspend the caller for `d` (scaled, for the simulated clock).
    /// Returns early if `stop()` has been called.
    async fn sleep(&self, d: Duration);

    /// Like `sleep`, but resolves to `None` if cancelled rather than
    /// completing normally. Mirrors a single-shot "after" timer channel.
    async fn after(&self, d: Duration) -> Option<DateTime<Utc>> {
        self.sleep(d).await;
        if self.done().is_cancelled() {
            None
        } else {
            Some(self.now())
        }
    }

    /// A periodic ticker. Each tick carries the clock's `now()` at fire
    /// time. A slow consumer only ever observes the latest tick (at-most-one
    /// pending) rather than an unbounded backlog.
    fn ticker(&self, period: Duration) -> Ticker;

    /// Cancellation signal, closed exactly once by `stop()`.
    fn done(&self) -> CancellationToken;

    /// Idempotent: stop this clock and cancel every outstanding sleep,
    /// after, and ticker derived from it.
    fn stop(&self);
}
