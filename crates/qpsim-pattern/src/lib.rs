//! Immutable time→multiplier function describing how query intensity varies
//! over the course of a day, with smooth interpolation across hour
//! boundaries so that downstream consumers (rate limiter, worker pool)
//! don't see step discontinuities.

use chrono::{DateTime, Timelike, Utc};
use qpsim_domain::config::ConfigIssue;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Hourly,
    Custom,
}

/// Immutable after construction. Build with [`LoadPattern::new`] or
/// `serde`, then call [`LoadPattern::validate`] before using it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LoadPattern {
    #[serde(rename = "type", default = "default_pattern_type")]
    pub pattern_type: PatternType,
    pub baseline: u64,
    #[serde(default)]
    pub hourly: HashMap<u8, f64>,
    #[serde(default = "default_min")]
    pub min: f64,
    #[serde(default = "default_max")]
    pub max: f64,
}

fn default_pattern_type() -> PatternType {
    PatternType::Hourly
}
fn default_min() -> f64 {
    0.1
}
fn default_max() -> f64 {
    10.0
}

impl Default for LoadPattern {
    /// `SetDefaults()`: min=0.1, max=10.0, type=hourly, empty map. Baseline
    /// is left at a usable placeholder (100) since the spec does not define
    /// a default baseline; callers overriding only min/max/hourly still get
    /// a valid pattern.
    fn default() -> Self {
        Self {
            pattern_type: default_pattern_type(),
            baseline: 100,
            hourly: HashMap::new(),
            min: default_min(),
            max: default_max(),
        }
    }
}

impl LoadPattern {
    pub fn new(baseline: u64, hourly: HashMap<u8, f64>, min: f64, max: f64) -> Self {
        Self {
            pattern_type: PatternType::Hourly,
            baseline,
            hourly,
            min,
            max,
        }
    }

    /// Validate invariants. Returns every violation found (not just the
    /// first), in the workspace's `ConfigIssue` convention.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.baseline == 0 {
            issues.push(ConfigIssue::error("pattern.baseline", "baseline must be a positive integer"));
        }
        if self.min < 0.0 {
            issues.push(ConfigIssue::error("pattern.min", "min must not be negative"));
        }
        if self.max <= 0.0 {
            issues.push(ConfigIssue::error("pattern.max", "max must be positive"));
        }
        if self.min > self.max {
            issues.push(ConfigIssue::error(
                "pattern.min",
                format!("min ({}) must be <= max ({})", self.min, self.max),
            ));
        }
        for (&hour, &mult) in &self.hourly {
            if hour > 23 {
                issues.push(ConfigIssue::error(
                    "pattern.hourly",
                    format!("hour {hour} is outside 0..23"),
                ));
            }
            if mult < 0.0 {
                issues.push(ConfigIssue::error(
                    "pattern.hourly",
                    format!("multiplier for hour {hour} must not be negative (got {mult})"),
                ));
            }
        }
        issues
    }

    /// Multiplier configured for hour `h` (any integer, normalized modulo
    /// 24 with a Euclidean/always-positive remainder), clamped to
    /// `[min, max]`. Undefined hours default to `1.0` before clamping.
    pub fn get_multiplier(&self, h: i64) -> f64 {
        let hour = h.rem_euclid(24) as u8;
        let raw = self.hourly.get(&hour).copied().unwrap_or(1.0);
        raw.clamp(self.min, self.max)
    }

    /// Linear interpolation between `get_multiplier(hour)` and
    /// `get_multiplier(hour + 1)` using the fraction of the hour elapsed,
    /// clamped after blending. Continuous across the 23→0 wraparound.
    pub fn get_multiplier_smooth(&self, t: DateTime<Utc>) -> f64 {
        let hour = t.hour() as i64;
        let fraction = (t.minute() as f64 * 60.0 + t.second() as f64) / 3600.0;
        let current = self.get_multiplier(hour);
        let next = self.get_multiplier(hour + 1);
        let blended = current + (next - current) * fraction;
        blended.clamp(self.min, self.max)
    }

    /// `max(1, floor(baseline * multiplier(t)))`.
    pub fn target_qps(&self, t: DateTime<Utc>) -> u64 {
        let mult = self.get_multiplier_smooth(t);
        let raw = (self.baseline as f64 * mult).floor();
        raw.max(1.0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn pattern(hourly: &[(u8, f64)], min: f64, max: f64) -> LoadPattern {
        LoadPattern::new(100, hourly.iter().copied().collect(), min, max)
    }

    #[test]
    fn clamping_bounds_every_hour() {
        // S2 — Clamping.
        let p = pattern(&[(0, 0.1), (1, 5.0), (2, 1.0)], 0.5, 2.0);
        assert_eq!(p.get_multiplier(0), 0.5);
        assert_eq!(p.get_multiplier(1), 2.0);
        assert_eq!(p.get_multiplier(2), 1.0);
    }

    #[test]
    fn undefined_hour_defaults_to_one_before_clamping() {
        let p = pattern(&[], 0.1, 10.0);
        assert_eq!(p.get_multiplier(5), 1.0);
    }

    #[test]
    fn negative_hour_normalizes_modulo_24() {
        let p = pattern(&[(23, 3.0)], 0.1, 10.0);
        assert_eq!(p.get_multiplier(-1), 3.0);
    }

    #[test]
    fn mid_hour_interpolation_matches_scenario_s1() {
        let p = pattern(&[(9, 1.0), (10, 2.0)], 0.1, 10.0);
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap();
        assert_eq!(p.get_multiplier_smooth(t), 1.5);
        assert_eq!(p.target_qps(t), 150);
    }

    #[test]
    fn smooth_interpolation_continuous_across_hour_boundary() {
        let p = pattern(&[(23, 2.0), (0, 4.0)], 0.1, 10.0);
        let just_before = Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 59).unwrap();
        let just_after = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let a = p.get_multiplier_smooth(just_before);
        let b = p.get_multiplier_smooth(just_after);
        assert!((b - a).abs() < 0.01);
    }

    #[test]
    fn target_qps_is_at_least_one() {
        let p = pattern(&[(0, 0.0)], 0.0, 10.0);
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(p.target_qps(t), 1);
    }

    #[test]
    fn validate_rejects_min_greater_than_max() {
        let p = LoadPattern::new(100, HashMap::new(), 5.0, 1.0);
        let issues = p.validate();
        assert!(!issues.is_empty());
    }

    #[test]
    fn validate_rejects_zero_baseline() {
        let p = LoadPattern::new(0, HashMap::new(), 0.1, 10.0);
        assert!(!p.validate().is_empty());
    }

    #[test]
    fn default_matches_set_defaults() {
        let p = LoadPattern::default();
        assert_eq!(p.pattern_type, PatternType::Hourly);
        assert_eq!(p.min, 0.1);
        assert_eq!(p.max, 10.0);
        assert!(p.hourly.is_empty());
    }
}
