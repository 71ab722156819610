//! Trait boundary the simulation core calls through to run queries against a
//! database, plus an in-memory mock implementation for demos and tests. A
//! real deployment plugs in a pool backed by `sqlx`, `tokio-postgres`, or
//! `deadpool`; the core only ever sees [`ConnectionPool`] and [`Connection`].

mod error;
mod pool;

pub use error::{categorize, DbError, DbErrorCategory};
pub use pool::{Connection, ConnectionPool, MockPool, MockPoolConfig, QueryOutcome};
