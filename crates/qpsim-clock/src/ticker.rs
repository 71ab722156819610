use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// A periodic source of timestamps, backed by a `watch` channel so a slow
/// consumer coalesces to the latest tick instead of building up a backlog.
pub struct Ticker {
    rx: watch::Receiver<DateTime<Utc>>,
    cancel: CancellationToken,
    _task: tokio::task::JoinHandle<()>,
}

impl Ticker {
    /// Spawn a background task that fires every `wall_period` of real wall
    /// time, sampling `now_fn` at each fire. `parent` is the clock's root
    /// cancellation token; the ticker derives a child so `stop()` on the
    /// clock also stops every ticker spawned from it.
    pub(crate) fn spawn(
        wall_period: Duration,
        now_fn: impl Fn() -> DateTime<Utc> + Send + Sync + 'static,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        let (tx, rx) = watch::channel(now_fn());
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(wall_period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if tx.send(now_fn()).is_err() {
                            break;
                        }
                    }
                    _ = task_cancel.cancelled() => break,
                }
            }
        });
        Self { rx, cancel, _task: task }
    }

    /// Wait for the next tick. Returns `None` once the ticker (or its
    /// parent clock) has been stopped.
    pub async fn tick(&mut self) -> Option<DateTime<Utc>> {
        tokio::select! {
            changed = self.rx.changed() => {
                if changed.is_err() {
                    return None;
                }
                Some(*self.rx.borrow())
            }
            _ = self.cancel.cancelled() => None,
        }
    }

    /// Stop this ticker. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
