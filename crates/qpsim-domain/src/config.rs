//! Shared configuration-validation convention and small config value types
//! that don't belong to any single component crate.

use std::fmt;

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue, in the field/message shape used
/// by every `validate()` method in this workspace.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigIssue {
    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

/// True if any issue in the slice is an error (as opposed to a warning).
pub fn has_errors(issues: &[ConfigIssue]) -> bool {
    issues.iter().any(|i| i.severity == ConfigSeverity::Error)
}

/// Workload read/write mix, as a percentage split. `read + write` must equal
/// 100, both in `[0, 100]`.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct WorkloadDistribution {
    pub read: u8,
    pub write: u8,
}

impl Default for WorkloadDistribution {
    fn default() -> Self {
        Self { read: 80, write: 20 }
    }
}

impl WorkloadDistribution {
    pub fn validate(&self, field_prefix: &str) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.read as u16 + self.write as u16 != 100 {
            issues.push(ConfigIssue::error(
                field_prefix.to_string(),
                format!(
                    "read ({}) + write ({}) must equal 100",
                    self.read, self.write
                ),
            ));
        }
        issues
    }
}

/// Connection pool shape the driver asks its (external) connection pool
/// collaborator to honor.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct ConnectionPatternConfig {
    pub min: u32,
    pub max: u32,
    #[serde(default)]
    pub scale_with_load: bool,
}

impl Default for ConnectionPatternConfig {
    fn default() -> Self {
        Self {
            min: 2,
            max: 20,
            scale_with_load: true,
        }
    }
}

impl ConnectionPatternConfig {
    pub fn validate(&self, field_prefix: &str) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.min < 1 {
            issues.push(ConfigIssue::error(
                format!("{field_prefix}.min"),
                "min must be >= 1",
            ));
        }
        if self.max < self.min {
            issues.push(ConfigIssue::error(
                format!("{field_prefix}.max"),
                format!("max ({}) must be >= min ({})", self.max, self.min),
            ));
        }
        issues
    }
}

/// Parse a human-readable duration string (`"45m"`, `"2h"`, `"30m"`) into a
/// [`std::time::Duration`]. Thin wrapper over `humantime` so every crate that
/// needs this (scheduler event durations, driver CLI flags) parses the same
/// way.
pub fn parse_human_duration(s: &str) -> Result<std::time::Duration, String> {
    humantime::parse_duration(s).map_err(|e| format!("invalid duration \"{s}\": {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workload_distribution_must_sum_to_100() {
        let wd = WorkloadDistribution { read: 70, write: 20 };
        let issues = wd.validate("workload");
        assert!(has_errors(&issues));
    }

    #[test]
    fn workload_distribution_valid() {
        let wd = WorkloadDistribution { read: 70, write: 30 };
        assert!(wd.validate("workload").is_empty());
    }

    #[test]
    fn connection_pattern_rejects_max_below_min() {
        let cfg = ConnectionPatternConfig {
            min: 10,
            max: 5,
            scale_with_load: false,
        };
        assert!(has_errors(&cfg.validate("connection")));
    }
}
