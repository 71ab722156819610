//! Glue crate: CLI surface, typed simulation profile, bundled demo query
//! catalog, and the driver that wires every `qpsim-*` component together.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod driver;

pub use cli::{init_tracing, Cli, Command, LogFormat, RunArgs};
pub use config::SimulationProfile;
pub use driver::SimulationDriver;
