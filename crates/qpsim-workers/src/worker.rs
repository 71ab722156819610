use qpsim_clock::Clock;
use qpsim_dbiface::ConnectionPool;
use qpsim_domain::MetricsSink;
use qpsim_limiter::RateLimiter;
use qpsim_query::{generate_args, EntityCounts, QueryKind, QuerySelector};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything a worker closure needs, bundled so the pool's work function
/// only has to thread `(id, cancel)` through per spawn.
pub struct WorkerContext {
    pub selector: Arc<QuerySelector>,
    pub limiter: Arc<RateLimiter>,
    pub pool: Arc<dyn ConnectionPool>,
    pub sink: Arc<dyn MetricsSink>,
    pub clock: Arc<dyn Clock>,
    pub entity_counts: EntityCounts,
    pub base_seed: u64,
}

/// One producer's loop: wait for a rate-limiter token, pick a query,
/// generate its arguments, run it against a borrowed connection, and record
/// the outcome. Runs until `cancel` fires or the rate limiter itself is
/// stopped.
pub async fn worker_loop(ctx: Arc<WorkerContext>, id: u64, cancel: CancellationToken) {
    let mut rng = StdRng::seed_from_u64(ctx.base_seed.wrapping_add(id));

    loop {
        if cancel.is_cancelled() {
            break;
        }
        if ctx.limiter.wait(&cancel).await.is_err() {
            break;
        }

        let template = ctx.selector.next();
        let args = generate_args(template, &mut rng, &ctx.entity_counts);
        let is_read = template.kind == QueryKind::Read;

        let conn = match ctx.pool.acquire(&cancel).await {
            Ok(conn) => conn,
            Err(e) => {
                ctx.sink.record(&template.name, std::time::Duration::ZERO, is_read, Some(e.category.to_string()));
                continue;
            }
        };

        let start = ctx.clock.now();
        let result = conn.exec(&template.sql, &args).await;
        let latency = ctx.clock.since(start).to_std().unwrap_or_default();
        drop(conn);

        match result {
            Ok(_) => ctx.sink.record(&template.name, latency, is_read, None),
            Err(e) => ctx.sink.record(&template.name, latency, is_read, Some(e.category.to_string())),
        }
    }
}
