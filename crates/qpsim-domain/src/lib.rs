//! Shared types used across all `qpsim` crates: the error taxonomy, the
//! configuration validation convention, and the typed simulation profile.

pub mod collector;
pub mod config;
pub mod error;

pub use collector::MetricsSink;
pub use error::{Error, Result};
