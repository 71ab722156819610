use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use qpsim_controller::LoadController;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The pool's unit of work: given a freshly allocated worker id and its own
/// cancellation token, produce the task future to spawn. Boxed so the pool
/// doesn't need to be generic over the closure's concrete future type.
pub type WorkFn = Arc<dyn Fn(u64, CancellationToken) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub min_workers: usize,
    pub max_workers: usize,
    pub max_delta: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_workers: 1,
            max_workers: 64,
            max_delta: 2,
        }
    }
}

struct WorkerHandle {
    #[allow(dead_code)]
    id: u64,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

/// A pool of worker tasks whose size is reconciled toward the load
/// controller's `target_workers()` in bounded steps, so a sudden multiplier
/// spike doesn't spawn (or kill) hundreds of workers in one tick.
pub struct DynamicWorkerPool {
    handles: Mutex<Vec<WorkerHandle>>,
    next_id: AtomicU64,
    config: PoolConfig,
    controller: Arc<LoadController>,
    root: CancellationToken,
    work: WorkFn,
    scale_ups: AtomicU64,
    scale_downs: AtomicU64,
}

impl DynamicWorkerPool {
    pub fn new(config: PoolConfig, controller: Arc<LoadController>, work: WorkFn) -> Self {
        Self {
            handles: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            config,
            controller,
            root: CancellationToken::new(),
            work,
            scale_ups: AtomicU64::new(0),
            scale_downs: AtomicU64::new(0),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn scale_ups(&self) -> u64 {
        self.scale_ups.load(Ordering::Relaxed)
    }

    pub fn scale_downs(&self) -> u64 {
        self.scale_downs.load(Ordering::Relaxed)
    }

    fn spawn_one(&self) -> WorkerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.root.child_token();
        let join = tokio::spawn((self.work)(id, cancel.clone()));
        WorkerHandle { id, cancel, join }
    }

    /// Spawn `clamp(controller.target_workers(), min, max)` workers.
    pub fn start(&self) {
        let target = self
            .controller
            .target_workers()
            .clamp(self.config.min_workers, self.config.max_workers);
        let mut handles = self.handles.lock();
        for _ in 0..target {
            handles.push(self.spawn_one());
        }
    }

    /// Reconcile the pool size one bounded step toward the controller's
    /// current target. Returns the delta actually applied (positive =
    /// workers added, negative = workers removed).
    pub fn adjust(&self) -> i64 {
        let target = self
            .controller
            .target_workers()
            .clamp(self.config.min_workers, self.config.max_workers) as i64;

        let mut handles = self.handles.lock();
        let current = handles.len() as i64;
        let raw_delta = target - current;
        let max_delta = self.config.max_delta as i64;
        let delta = raw_delta.clamp(-max_delta, max_delta);

        if delta > 0 {
            for _ in 0..delta {
                handles.push(self.spawn_one());
            }
            self.scale_ups.fetch_add(delta as u64, Ordering::Relaxed);
        } else if delta < 0 {
            let remove = (-delta) as usize;
            let split_at = handles.len() - remove;
            let retired: Vec<WorkerHandle> = handles.split_off(split_at);
            for h in &retired {
                h.cancel.cancel();
            }
            tokio::spawn(async move {
                for h in retired {
                    let _ = h.join.await;
                }
            });
            self.scale_downs.fetch_add(remove as u64, Ordering::Relaxed);
        }
        delta
    }

    /// Cancel every worker and wait for all of them to finish.
    pub async fn stop(&self) {
        self.root.cancel();
        let handles = {
            let mut guard = self.handles.lock();
            std::mem::take(&mut *guard)
        };
        for h in handles {
            let _ = h.join.await;
        }
    }
}
