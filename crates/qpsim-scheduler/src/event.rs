use chrono::{DateTime, Utc};
use qpsim_domain::config::ConfigIssue;
use std::time::Duration;

/// A cron-triggered event definition. Unique by `name` within a scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEvent {
    pub name: String,
    pub cron: String,
    pub duration: Duration,
    pub workload_override: Option<String>,
    pub multiplier_override: Option<f64>,
    pub read_write_ratio: Option<(u32, u32)>,
    pub priority: i64,
    pub enabled: bool,
}

impl ScheduledEvent {
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.name.trim().is_empty() {
            issues.push(ConfigIssue::error("name", "must not be empty"));
        }
        if qpsim_cron::CronExpr::parse(&self.cron).is_err() {
            issues.push(ConfigIssue::error(
                "cron",
                format!("\"{}\" is not a valid cron expression", self.cron),
            ));
        }
        if self.duration.is_zero() {
            issues.push(ConfigIssue::error("duration", "must be greater than zero"));
        }
        if let Some(m) = self.multiplier_override {
            if m <= 0.0 {
                issues.push(ConfigIssue::error(
                    "multiplier_override",
                    "must be greater than zero when set",
                ));
            }
        }
        if let Some((r, w)) = self.read_write_ratio {
            if r + w == 0 {
                issues.push(ConfigIssue::error(
                    "read_write_ratio",
                    "read + write must be greater than zero when set",
                ));
            }
        }
        issues
    }
}

/// A live instance of a [`ScheduledEvent`], holding its own copy of the
/// definition rather than a reference back into the scheduler's event list —
/// avoids a self-referential structure and lets an `ActiveEvent` outlive
/// edits or removal of the originating `ScheduledEvent`.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveEvent {
    pub event: ScheduledEvent,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl ActiveEvent {
    /// `[start_time, end_time)` — half-open, so an event ends exactly at
    /// `end_time` rather than lingering one more tick.
    pub fn is_active(&self, at: DateTime<Utc>) -> bool {
        at >= self.start_time && at < self.end_time
    }
}
