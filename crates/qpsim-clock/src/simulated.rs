use crate::{Clock, Ticker};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Scaled wall-clock implementation. `now()` advances at `scale` times the
/// rate of real time, anchored at the instant this clock was constructed.
pub struct SimulatedClock {
    t0: DateTime<Utc>,
    wall_start: Instant,
    scale: u32,
    root: CancellationToken,
}

impl SimulatedClock {
    /// `scale < 1` is coerced to `1` (no slow-motion, only acceleration).
    pub fn new(t0: DateTime<Utc>, scale: u32) -> Self {
        let scale = scale.max(1);
        tracing::debug!(scale, start = %t0, "simulated clock constructed");
        Self {
            t0,
            wall_start: Instant::now(),
            scale,
            root: CancellationToken::new(),
        }
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.t0
    }

    /// Scale a simulated-time duration down into a wall-clock duration,
    /// floored at 1ms so callers never busy-loop on a zero sleep.
    fn to_wall_duration(&self, simulated: Duration) -> Duration {
        (simulated / self.scale).max(Duration::from_millis(1))
    }
}

#[async_trait]
impl Clock for SimulatedClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed_wall = self.wall_start.elapsed();
        let scaled_nanos = elapsed_wall.as_nanos().saturating_mul(self.scale as u128);
        let scaled = Duration::from_nanos(scaled_nanos.min(u64::MAX as u128) as u64);
        self.t0
            + chrono::Duration::from_std(scaled).unwrap_or_else(|_| chrono::Duration::zero())
    }

    async fn sleep(&self, d: Duration) {
        let wall = self.to_wall_duration(d);
        tokio::select! {
            _ = tokio::time::sleep(wall) => {}
            _ = self.root.cancelled() => {}
        }
    }

    fn ticker(&self, period: Duration) -> Ticker {
        let wall_period = self.to_wall_duration(period);
        let t0 = self.t0;
        let wall_start = self.wall_start;
        let scale = self.scale;
        let now_fn = move || {
            let elapsed_wall = wall_start.elapsed();
            let scaled_nanos = elapsed_wall.as_nanos().saturating_mul(scale as u128);
            let scaled = Duration::from_nanos(scaled_nanos.min(u64::MAX as u128) as u64);
            t0 + chrono::Duration::from_std(scaled).unwrap_or_else(|_| chrono::Duration::zero())
        };
        Ticker::spawn(wall_period, now_fn, &self.root)
    }

    fn done(&self) -> CancellationToken {
        self.root.clone()
    }

    fn stop(&self) {
        tracing::debug!("simulated clock stopped");
        self.root.cancel();
    }
}
