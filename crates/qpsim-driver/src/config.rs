//! Typed simulation profile: the YAML shape described in the distilled
//! spec's §6 "Configuration", merged with CLI overrides before any
//! component starts.

use qpsim_domain::config::{
    parse_human_duration, has_errors, ConfigIssue, ConnectionPatternConfig, WorkloadDistribution,
};
use qpsim_pattern::LoadPattern;
use qpsim_scheduler::ScheduledEvent;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// One entry of the profile's `events` list — the wire shape closest to
/// what a human writes in YAML. `duration` is human-readable (`"45m"`,
/// `"2h"`); everything else mirrors [`qpsim_scheduler::ScheduledEvent`]
/// field-for-field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledEventConfig {
    pub name: String,
    pub cron: String,
    pub duration: String,
    #[serde(default)]
    pub workload_override: Option<String>,
    #[serde(default)]
    pub multiplier_override: Option<f64>,
    #[serde(default)]
    pub read_write_ratio: Option<(u32, u32)>,
    #[serde(default)]
    pub priority: i64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ScheduledEventConfig {
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if let Err(e) = parse_human_duration(&self.duration) {
            issues.push(ConfigIssue::error(format!("events.{}.duration", self.name), e));
        }
        issues
    }

    /// Convert to the scheduler's runtime type. Assumes [`Self::validate`]
    /// already passed (the duration string is known to parse).
    pub fn to_scheduled_event(&self) -> Result<ScheduledEvent, String> {
        let duration: Duration = parse_human_duration(&self.duration)?;
        Ok(ScheduledEvent {
            name: self.name.clone(),
            cron: self.cron.clone(),
            duration,
            workload_override: self.workload_override.clone(),
            multiplier_override: self.multiplier_override,
            read_write_ratio: self.read_write_ratio,
            priority: self.priority,
            enabled: self.enabled,
        })
    }
}

/// The required `mode` field of a simulation profile — currently only one
/// value is meaningful, kept as an enum (rather than a bare string check)
/// so an unrecognized mode is a deserialization error, not a silent no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileMode {
    Simulation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationProfile {
    pub name: String,
    pub mode: ProfileMode,
    #[serde(default)]
    pub description: String,
    pub pattern: LoadPattern,
    #[serde(default)]
    pub workload: WorkloadDistribution,
    #[serde(default)]
    pub connection: ConnectionPatternConfig,
    #[serde(default)]
    pub events: Vec<ScheduledEventConfig>,
}

impl SimulationProfile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| format!("reading {}: {e}", path.display()))?;
        serde_yaml::from_str(&text).map_err(|e| format!("parsing {}: {e}", path.display()))
    }

    /// Every violation found, in the workspace's `ConfigIssue` convention —
    /// not just the first.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = self.pattern.validate();
        issues.extend(self.workload.validate("workload"));
        issues.extend(self.connection.validate("connection"));

        let mut seen_names = std::collections::HashSet::new();
        for event in &self.events {
            issues.extend(event.validate());
            if qpsim_cron::CronExpr::parse(&event.cron).is_err() {
                issues.push(ConfigIssue::error(format!("events.{}.cron", event.name), "invalid cron expression"));
            }
            if !seen_names.insert(event.name.clone()) {
                issues.push(ConfigIssue::error(format!("events.{}", event.name), "duplicate event name"));
            }
        }
        issues
    }

    pub fn is_valid(&self) -> bool {
        !has_errors(&self.validate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn minimal_yaml() -> &'static str {
        r#"
name: steady-baseline
mode: simulation
description: a flat baseline load for smoke testing
pattern:
  type: hourly
  baseline: 100
  hourly: {}
  min: 0.1
  max: 10.0
workload:
  read: 80
  write: 20
connection:
  min: 2
  max: 20
  scale_with_load: true
events: []
"#
    }

    #[test]
    fn parses_minimal_profile() {
        let profile: SimulationProfile = serde_yaml::from_str(minimal_yaml()).unwrap();
        assert_eq!(profile.name, "steady-baseline");
        assert_eq!(profile.mode, ProfileMode::Simulation);
        assert!(profile.is_valid());
    }

    #[test]
    fn rejects_unknown_mode() {
        let yaml = minimal_yaml().replace("mode: simulation", "mode: replay");
        assert!(serde_yaml::from_str::<SimulationProfile>(&yaml).is_err());
    }

    #[test]
    fn validate_flags_bad_workload_mix() {
        let mut profile: SimulationProfile = serde_yaml::from_str(minimal_yaml()).unwrap();
        profile.workload = WorkloadDistribution { read: 50, write: 60 };
        assert!(!profile.is_valid());
    }

    #[test]
    fn validate_flags_duplicate_event_names() {
        let mut profile: SimulationProfile = serde_yaml::from_str(minimal_yaml()).unwrap();
        let event = ScheduledEventConfig {
            name: "spike".into(),
            cron: "0 22 * * *".into(),
            duration: "1h".into(),
            workload_override: None,
            multiplier_override: Some(2.0),
            read_write_ratio: None,
            priority: 10,
            enabled: true,
        };
        profile.events = vec![event.clone(), event];
        assert!(!profile.is_valid());
    }

    #[test]
    fn validate_flags_unparseable_event_duration() {
        let mut profile: SimulationProfile = serde_yaml::from_str(minimal_yaml()).unwrap();
        profile.events = vec![ScheduledEventConfig {
            name: "spike".into(),
            cron: "0 22 * * *".into(),
            duration: "not-a-duration".into(),
            workload_override: None,
            multiplier_override: Some(2.0),
            read_write_ratio: None,
            priority: 10,
            enabled: true,
        }];
        assert!(!profile.is_valid());
    }

    #[test]
    fn pattern_hourly_map_round_trips_through_yaml() {
        let mut hourly = HashMap::new();
        hourly.insert(9u8, 2.0);
        let profile = SimulationProfile {
            name: "p".into(),
            mode: ProfileMode::Simulation,
            description: String::new(),
            pattern: LoadPattern::new(100, hourly, 0.1, 10.0),
            workload: WorkloadDistribution::default(),
            connection: ConnectionPatternConfig::default(),
            events: Vec::new(),
        };
        let yaml = serde_yaml::to_string(&profile).unwrap();
        let reparsed: SimulationProfile = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(reparsed.pattern.get_multiplier(9), 2.0);
    }
}
