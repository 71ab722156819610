use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// qpsim — synthetic database workload simulator.
#[derive(Debug, Parser)]
#[command(name = "qpsim", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the simulation (default when no subcommand is given).
    Run(RunArgs),
    /// Load and validate a profile without starting the simulation.
    Validate {
        /// Path to the YAML simulation profile.
        #[arg(long)]
        profile: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Path to the YAML simulation profile.
    #[arg(long)]
    pub profile: PathBuf,

    /// Wall-clock duration to run for (e.g. "10m", "2h"). The simulated
    /// range covered is `time-scale * duration`.
    #[arg(long, default_value = "10m")]
    pub duration: String,

    /// Simulated-time acceleration factor, clamped to 1..24.
    #[arg(long, default_value_t = 1)]
    pub time_scale: u32,

    /// Absolute start time for the simulated clock (RFC3339). Defaults to
    /// the current wall-clock time.
    #[arg(long)]
    pub start_time: Option<String>,

    /// Base worker count (overrides the profile's implied baseline).
    #[arg(long)]
    pub workers: Option<usize>,

    /// RNG seed for query selection and synthetic argument generation.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Output directory for the timeline CSV and aggregate/raw JSONL files.
    #[arg(long, default_value = "./qpsim-output")]
    pub output_dir: PathBuf,

    /// Timeline CSV output path, relative to `--output-dir` unless absolute.
    #[arg(long, default_value = "timeline.csv")]
    pub timeline_output: PathBuf,

    /// Byte cap for persisted aggregate/raw storage.
    #[arg(long, default_value_t = 10 * 1024 * 1024 * 1024)]
    pub max_storage: u64,

    /// How long raw per-query events are retained in the in-memory ring
    /// buffer before being pruned (and, if `--write-raw`, persisted).
    #[arg(long, default_value = "1h")]
    pub raw_retention: String,

    /// Aggregation interval (also the timeline snapshot cadence). Must be
    /// at least 1 second.
    #[arg(long, default_value = "1m")]
    pub aggregate_interval: String,

    /// Also persist raw per-query events to `raw_<ts>.jsonl` files.
    #[arg(long, default_value_t = false)]
    pub write_raw: bool,

    /// Structured log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl RunArgs {
    pub fn parsed_duration(&self) -> anyhow::Result<Duration> {
        qpsim_domain::config::parse_human_duration(&self.duration).map_err(anyhow::Error::msg)
    }

    pub fn parsed_raw_retention(&self) -> anyhow::Result<Duration> {
        qpsim_domain::config::parse_human_duration(&self.raw_retention).map_err(anyhow::Error::msg)
    }

    pub fn parsed_aggregate_interval(&self) -> anyhow::Result<Duration> {
        let d = qpsim_domain::config::parse_human_duration(&self.aggregate_interval).map_err(anyhow::Error::msg)?;
        if d < Duration::from_secs(1) {
            anyhow::bail!("aggregate-interval must be at least 1 second");
        }
        Ok(d)
    }

    pub fn parsed_start_time(&self) -> anyhow::Result<DateTime<Utc>> {
        match &self.start_time {
            Some(s) => Ok(s.parse::<DateTime<Utc>>()?),
            None => Ok(Utc::now()),
        }
    }

    /// `time-scale` clamped to the documented `1..24` range.
    pub fn clamped_time_scale(&self) -> u32 {
        self.time_scale.clamp(1, 24)
    }
}

pub fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,qpsim=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_scale_clamps_above_range() {
        let args = Cli::parse_from(["qpsim", "--profile", "p.yaml", "--time-scale", "1000"]).run;
        assert_eq!(args.clamped_time_scale(), 24);
    }

    #[test]
    fn time_scale_clamps_below_range() {
        let args = Cli::parse_from(["qpsim", "--profile", "p.yaml", "--time-scale", "0"]).run;
        assert_eq!(args.clamped_time_scale(), 1);
    }

    #[test]
    fn default_duration_parses() {
        let args = Cli::parse_from(["qpsim", "--profile", "p.yaml"]).run;
        assert_eq!(args.parsed_duration().unwrap(), Duration::from_secs(600));
    }
}
