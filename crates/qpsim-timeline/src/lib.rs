//! Per-interval query counters and latency percentiles, streamed to a CSV
//! file as the simulation runs.

mod collector;
mod csv_writer;
mod entry;

pub use collector::IntervalCollector;
pub use csv_writer::{CsvTimelineReader, CsvTimelineWriter};
pub use entry::TimelineEntry;

use qpsim_clock::Clock;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// The load-side values a `TimelineEntry` needs that the collector itself
/// doesn't track (it only sees individual query outcomes).
#[derive(Debug, Clone, Copy)]
pub struct LoadSnapshot {
    pub target_qps: u64,
    pub multiplier: f64,
    pub active_workers: usize,
}

/// Drive the collector on `clock`'s `aggregate_interval` ticker: each tick,
/// snapshot into a `TimelineEntry`, write it, then reset for the next
/// interval. On cancellation, emits one final entry if data accumulated
/// since the last tick.
pub fn spawn(
    collector: Arc<IntervalCollector>,
    writer: Arc<CsvTimelineWriter>,
    clock: Arc<dyn Clock>,
    aggregate_interval: Duration,
    snapshot: Arc<dyn Fn() -> LoadSnapshot + Send + Sync>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = clock.ticker(aggregate_interval);
        loop {
            tokio::select! {
                tick = ticker.tick() => {
                    if tick.is_none() {
                        break;
                    }
                    emit_and_reset(&collector, &writer, clock.now(), snapshot());
                }
                _ = cancel.cancelled() => break,
            }
        }
        if collector.has_data() {
            emit_and_reset(&collector, &writer, clock.now(), snapshot());
        }
    })
}

fn emit_and_reset(
    collector: &IntervalCollector,
    writer: &CsvTimelineWriter,
    simulated_now: chrono::DateTime<chrono::Utc>,
    snapshot: LoadSnapshot,
) {
    let entry = collector.to_entry(simulated_now, snapshot.target_qps, snapshot.multiplier, snapshot.active_workers);
    if let Err(e) = writer.write(&entry) {
        tracing::error!(error = %e, "failed to write timeline entry");
    }
    collector.reset(simulated_now);
}
