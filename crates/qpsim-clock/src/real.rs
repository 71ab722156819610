use crate::{Clock, Ticker};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Wall-clock backed implementation. Every primitive passes through to
/// `tokio::time`, made cancellable via a root `CancellationToken`.
pub struct RealClock {
    root: CancellationToken,
}

impl RealClock {
    pub fn new() -> Self {
        Self { root: CancellationToken::new() }
    }
}

impl Default for RealClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for RealClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, d: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(d) => {}
            _ = self.root.cancelled() => {}
        }
    }

    fn ticker(&self, period: Duration) -> Ticker {
        Ticker::spawn(period, Utc::now, &self.root)
    }

    fn done(&self) -> CancellationToken {
        self.root.clone()
    }

    fn stop(&self) {
        tracing::debug!("real clock stopped");
        self.root.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn sleep_blocks_for_roughly_the_requested_duration() {
        let clock = RealClock::new();
        let start = Instant::now();
        clock.sleep(Duration::from_millis(30)).await;
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[tokio::test]
    async fn stop_releases_an_in_flight_sleep_promptly() {
        let clock = std::sync::Arc::new(RealClock::new());
        let c = clock.clone();
        let handle = tokio::spawn(async move {
            c.sleep(Duration::from_secs(60)).await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        clock.stop();
        tokio::time::timeout(Duration::from_millis(200), handle)
            .await
            .expect("sleep should have been released by stop()")
            .unwrap();
    }

    #[tokio::test]
    async fn ticker_fires_and_stops() {
        let clock = RealClock::new();
        let mut ticker = clock.ticker(Duration::from_millis(10));
        assert!(ticker.tick().await.is_some());
        ticker.stop();
        assert!(ticker.tick().await.is_none());
    }
}
