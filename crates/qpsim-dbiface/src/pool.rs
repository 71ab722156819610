use crate::error::DbError;
use async_trait::async_trait;
use qpsim_query::QueryParam;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Result of a successful `exec`. Minimal: the core only needs to know the
/// call succeeded and roughly what it did, not the row payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOutcome {
    pub rows_affected: u64,
}

/// A single checked-out database connection.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn exec(&self, sql: &str, args: &[QueryParam]) -> Result<QueryOutcome, DbError>;
}

/// The external collaborator contract the core depends on: something that
/// hands out connections. A real implementation would wrap `sqlx`,
/// `tokio-postgres`, or `deadpool`; this crate ships only the trait and an
/// in-memory mock for demos and tests.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    async fn acquire(&self, cancel: &CancellationToken) -> Result<Box<dyn Connection>, DbError>;
}

/// Configuration for [`MockPool`].
#[derive(Debug, Clone, Copy)]
pub struct MockPoolConfig {
    pub max_connections: usize,
    pub min_latency: Duration,
    pub max_latency: Duration,
    /// Probability in `[0, 1)` that an `exec` call fails.
    pub error_rate: f64,
}

impl Default for MockPoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 50,
            min_latency: Duration::from_micros(200),
            max_latency: Duration::from_millis(5),
            error_rate: 0.01,
        }
    }
}

/// In-memory stand-in for a real connection pool. Connections are gated by
/// a semaphore (bounding concurrency the way a real pool's max size would);
/// `exec` sleeps a random duration in `[min_latency, max_latency)` and fails
/// with a canned, categorizable message at `error_rate`.
pub struct MockPool {
    semaphore: Arc<Semaphore>,
    config: MockPoolConfig,
}

impl MockPool {
    pub fn new(config: MockPoolConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_connections)),
            config,
        }
    }
}

#[async_trait]
impl ConnectionPool for MockPool {
    async fn acquire(&self, cancel: &CancellationToken) -> Result<Box<dyn Connection>, DbError> {
        tokio::select! {
            res = self.semaphore.clone().acquire_owned() => {
                let permit = res.map_err(|_| DbError::new("failed to acquire connection: pool closed"))?;
                Ok(Box::new(MockConnection { _permit: permit, config: self.config }))
            }
            _ = cancel.cancelled() => Err(DbError::canceled()),
        }
    }
}

struct MockConnection {
    _permit: OwnedSemaphorePermit,
    config: MockPoolConfig,
}

#[async_trait]
impl Connection for MockConnection {
    async fn exec(&self, sql: &str, args: &[QueryParam]) -> Result<QueryOutcome, DbError> {
        let jitter = {
            let span = self
                .config
                .max_latency
                .saturating_sub(self.config.min_latency)
                .as_nanos()
                .max(1) as u64;
            Duration::from_nanos(rand::random::<u64>() % span)
        };
        tokio::time::sleep(self.config.min_latency + jitter).await;

        if rand::random::<f64>() < self.config.error_rate {
            return Err(synthetic_failure(sql));
        }

        Ok(QueryOutcome {
            rows_affected: args.len().max(1) as u64,
        })
    }
}

fn synthetic_failure(sql: &str) -> DbError {
    let lowered = sql.to_lowercase();
    let message = if lowered.starts_with("insert") {
        "duplicate key value violates unique constraint"
    } else if lowered.starts_with("update") {
        "deadlock detected"
    } else {
        "statement timeout"
    };
    DbError::new(message)
}
