//! Long-running producers of synthetic database load, and a pool that keeps
//! their count reconciled toward the load controller's current target.

mod pool;
mod worker;

pub use pool::{DynamicWorkerPool, PoolConfig, WorkFn};
pub use worker::{worker_loop, WorkerContext};

use futures_util::future::BoxFuture;
use std::sync::Arc;

/// Build a [`WorkFn`] that runs [`worker_loop`] against a shared
/// [`WorkerContext`] — the glue the driver uses to hand a pool something it
/// can spawn without knowing about workers at all.
pub fn work_fn(ctx: Arc<WorkerContext>) -> WorkFn {
    Arc::new(move |id, cancel| -> BoxFuture<'static, ()> {
        let ctx = ctx.clone();
        Box::pin(worker_loop(ctx, id, cancel))
    })
}
