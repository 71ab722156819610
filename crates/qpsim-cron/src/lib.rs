//! A standalone 5-field cron expression parser and matcher (minute hour
//! day-of-month month day-of-week), including the `L` ("last day of month")
//! day-of-month sentinel. No external cron crate is used — the field
//! grammar and day/day-of-week OR-combination rule are specific enough
//! (and small enough) to own directly.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use std::fmt;
use std::str::FromStr;

const LAST_DAY_SENTINEL: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Minute,
    Hour,
    DayOfMonth,
    Month,
    DayOfWeek,
}

impl Field {
    fn bounds(self) -> (i32, i32) {
        match self {
            Field::Minute => (0, 59),
            Field::Hour => (0, 23),
            Field::DayOfMonth => (1, 31),
            Field::Month => (1, 12),
            Field::DayOfWeek => (0, 6),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Field::Minute => "minute",
            Field::Hour => "hour",
            Field::DayOfMonth => "day-of-month",
            Field::Month => "month",
            Field::DayOfWeek => "day-of-week",
        }
    }
}

/// A parsed 5-field cron expression. Each field is stored as a sorted,
/// deduplicated list of integers within the field's range; day-of-month may
/// additionally contain the `-1` sentinel for `L`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    minute: Vec<i32>,
    hour: Vec<i32>,
    dom: Vec<i32>,
    month: Vec<i32>,
    dow: Vec<i32>,
    source: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CronError {
    #[error("expected 5 fields (minute hour dom month dow), got {0}")]
    WrongFieldCount(usize),
    #[error("{field}: {message}")]
    Field { field: &'static str, message: String },
}

impl CronExpr {
    /// Parse a 5-field cron expression string.
    pub fn parse(s: &str) -> Result<Self, CronError> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(CronError::WrongFieldCount(parts.len()));
        }
        let minute = parse_field(parts[0], Field::Minute)?;
        let hour = parse_field(parts[1], Field::Hour)?;
        let dom = parse_field(parts[2], Field::DayOfMonth)?;
        let month = parse_field(parts[3], Field::Month)?;
        let dow = parse_field(parts[4], Field::DayOfWeek)?;
        Ok(Self {
            minute,
            hour,
            dom,
            month,
            dow,
            source: s.to_string(),
        })
    }

    /// `true` if `t` (evaluated at minute granularity) matches this
    /// expression.
    pub fn matches(&self, t: DateTime<Utc>) -> bool {
        if !self.minute.contains(&(t.minute() as i32)) {
            return false;
        }
        if !self.hour.contains(&(t.hour() as i32)) {
            return false;
        }
        if !self.month.contains(&(t.month() as i32)) {
            return false;
        }
        self.day_matches(t)
    }

    fn dom_restricted(&self) -> bool {
        !is_full_range(&self.dom, Field::DayOfMonth) && !self.dom.contains(&LAST_DAY_SENTINEL)
    }

    fn dow_restricted(&self) -> bool {
        !is_full_range(&self.dow, Field::DayOfWeek)
    }

    fn dom_matches_plain(&self, t: DateTime<Utc>) -> bool {
        self.dom.contains(&(t.day() as i32))
    }

    fn dow_matches(&self, t: DateTime<Utc>) -> bool {
        let sunday0 = t.weekday().num_days_from_sunday() as i32;
        self.dow.contains(&sunday0)
    }

    fn day_matches(&self, t: DateTime<Utc>) -> bool {
        let dom_restricted = self.dom_restricted();
        let dow_restricted = self.dow_restricted();
        match (dom_restricted, dow_restricted) {
            (true, true) => self.dom_matches_plain(t) || self.dow_matches(t),
            (true, false) => self.dom_matches_plain(t),
            (false, true) => self.dow_matches(t),
            (false, false) => {
                if self.dom.contains(&LAST_DAY_SENTINEL) {
                    is_last_day_of_month(t)
                } else {
                    true
                }
            }
        }
    }

    /// The least time strictly greater than `t` (minute-aligned) that
    /// matches. Bounded to ~4 years of scanning; beyond that, returns a
    /// sentinel far-future time rather than looping forever.
    pub fn next(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let mut candidate = floor_to_minute(t) + Duration::minutes(1);
        let limit = t + Duration::days(365 * 4);
        let sentinel = t + Duration::days(365 * 5);
        let max_iterations: u64 = 4 * 366 * 24 * 60 + 10;
        let mut iterations = 0u64;

        while candidate <= limit {
            iterations += 1;
            if iterations > max_iterations {
                return sentinel;
            }
            if !self.month.contains(&(candidate.month() as i32)) {
                candidate = start_of_next_month(candidate);
                continue;
            }
            if !self.day_matches(candidate) {
                candidate = start_of_next_day(candidate);
                continue;
            }
            if !self.hour.contains(&(candidate.hour() as i32)) {
                candidate = start_of_next_hour(candidate);
                continue;
            }
            if !self.minute.contains(&(candidate.minute() as i32)) {
                candidate += Duration::minutes(1);
                continue;
            }
            return candidate;
        }
        sentinel
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl FromStr for CronExpr {
    type Err = CronError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            render_field(&self.minute, Field::Minute),
            render_field(&self.hour, Field::Hour),
            render_field(&self.dom, Field::DayOfMonth),
            render_field(&self.month, Field::Month),
            render_field(&self.dow, Field::DayOfWeek)
        )
    }
}

impl serde::Serialize for CronExpr {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.source)
    }
}

impl<'de> serde::Deserialize<'de> for CronExpr {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        CronExpr::parse(&s).map_err(serde::de::Error::custom)
    }
}

fn render_field(vals: &[i32], field: Field) -> String {
    if is_full_range(vals, field) {
        return "*".to_string();
    }
    vals.iter()
        .map(|&v| {
            if v == LAST_DAY_SENTINEL {
                "L".to_string()
            } else {
                v.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn is_full_range(vals: &[i32], field: Field) -> bool {
    let (lo, hi) = field.bounds();
    vals.len() as i32 == hi - lo + 1 && vals.first() == Some(&lo) && vals.last() == Some(&hi)
}

fn parse_field(s: &str, field: Field) -> Result<Vec<i32>, CronError> {
    let (lo, hi) = field.bounds();
    let mut out = Vec::new();
    for part in s.split(',') {
        if part == "L" {
            if field != Field::DayOfMonth {
                return Err(CronError::Field {
                    field: field.name(),
                    message: "'L' is only valid in the day-of-month field".into(),
                });
            }
            out.push(LAST_DAY_SENTINEL);
            continue;
        }
        if part == "*" {
            out.extend(lo..=hi);
            continue;
        }
        if let Some(step_str) = part.strip_prefix("*/") {
            let step = parse_step(step_str, field)?;
            out.extend((lo..=hi).step_by(step as usize));
            continue;
        }
        if let Some((range_part, step_str)) = split_range_step(part) {
            let (a, b) = parse_range(range_part, lo, hi, field)?;
            let step = parse_step(step_str, field)?;
            out.extend((a..=b).step_by(step as usize));
            continue;
        }
        if part.contains('-') {
            let (a, b) = parse_range(part, lo, hi, field)?;
            out.extend(a..=b);
            continue;
        }
        let n: i32 = part.parse().map_err(|_| CronError::Field {
            field: field.name(),
            message: format!("invalid value '{part}'"),
        })?;
        if n < lo || n > hi {
            return Err(CronError::Field {
                field: field.name(),
                message: format!("value {n} out of range {lo}..={hi}"),
            });
        }
        out.push(n);
    }
    out.sort_unstable();
    out.dedup();
    Ok(out)
}

/// Split `"a-b/n"` into `("a-b", "n")`. Plain `"a-b"` (no step) returns
/// `None` so the caller falls through to the range-only branch.
fn split_range_step(part: &str) -> Option<(&str, &str)> {
    let (range, step) = part.split_once('/')?;
    if range.contains('-') {
        Some((range, step))
    } else {
        None
    }
}

fn parse_step(s: &str, field: Field) -> Result<i32, CronError> {
    let n: i32 = s.parse().map_err(|_| CronError::Field {
        field: field.name(),
        message: format!("invalid step '{s}'"),
    })?;
    if n <= 0 {
        return Err(CronError::Field {
            field: field.name(),
            message: format!("step {n} must be positive"),
        });
    }
    Ok(n)
}

fn parse_range(s: &str, lo: i32, hi: i32, field: Field) -> Result<(i32, i32), CronError> {
    let (a_str, b_str) = s.split_once('-').ok_or_else(|| CronError::Field {
        field: field.name(),
        message: format!("expected a range 'a-b', got '{s}'"),
    })?;
    let a: i32 = a_str.parse().map_err(|_| CronError::Field {
        field: field.name(),
        message: format!("invalid range start '{a_str}'"),
    })?;
    let b: i32 = b_str.parse().map_err(|_| CronError::Field {
        field: field.name(),
        message: format!("invalid range end '{b_str}'"),
    })?;
    if a < lo || a > hi || b < lo || b > hi {
        return Err(CronError::Field {
            field: field.name(),
            message: format!("range {a}-{b} out of bounds {lo}..={hi}"),
        });
    }
    if a > b {
        return Err(CronError::Field {
            field: field.name(),
            message: format!("range start {a} > end {b}"),
        });
    }
    Ok((a, b))
}

fn floor_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    t - Duration::seconds(t.second() as i64) - Duration::nanoseconds(t.nanosecond() as i64)
}

fn start_of_next_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    floor_to_minute(t) - Duration::minutes(t.minute() as i64) + Duration::hours(1)
}

fn start_of_next_day(t: DateTime<Utc>) -> DateTime<Utc> {
    let next_date = t.date_naive().succ_opt().unwrap_or(t.date_naive());
    next_date.and_hms_opt(0, 0, 0).unwrap().and_utc()
}

fn start_of_next_month(t: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
}

fn is_last_day_of_month(t: DateTime<Utc>) -> bool {
    (t.date_naive() + Duration::days(1)).month() != t.date_naive().month()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_wildcard_range_list_and_step() {
        let e = CronExpr::parse("*/15 9-17 1,15 * 1-5").unwrap();
        assert_eq!(e.minute, vec![0, 15, 30, 45]);
        assert_eq!(e.hour, (9..=17).collect::<Vec<_>>());
        assert_eq!(e.dom, vec![1, 15]);
        assert_eq!(e.dow, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn l_sentinel_only_valid_in_day_of_month() {
        assert!(CronExpr::parse("0 22 * * L").is_err());
        assert!(CronExpr::parse("0 22 L * *").is_ok());
    }

    #[test]
    fn rejects_backwards_range() {
        assert!(CronExpr::parse("0 17-9 * * *").is_err());
    }

    #[test]
    fn rejects_non_positive_step() {
        assert!(CronExpr::parse("*/0 * * * *").is_err());
    }

    #[test]
    fn round_trip_preserves_equivalent_field_sets() {
        for src in ["*/15 9-17 1,15 * 1-5", "0 22 L * *", "30 2 * * *", "0,30 * * * *"] {
            let parsed = CronExpr::parse(src).unwrap();
            let rendered = parsed.to_string();
            let reparsed = CronExpr::parse(&rendered).unwrap();
            assert_eq!(parsed.minute, reparsed.minute);
            assert_eq!(parsed.hour, reparsed.hour);
            assert_eq!(parsed.dom, reparsed.dom);
            assert_eq!(parsed.month, reparsed.month);
            assert_eq!(parsed.dow, reparsed.dow);
        }
    }

    #[test]
    fn s4_next_weekday_at_2200() {
        let e = CronExpr::parse("0 22 * * 1-5").unwrap();
        let from = Utc.with_ymd_and_hms(2024, 1, 14, 23, 0, 0).unwrap(); // Sunday
        let next = e.next(from);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 15, 22, 0, 0).unwrap()); // Monday
    }

    #[test]
    fn s5_last_day_of_month_leap_year() {
        let e = CronExpr::parse("0 22 L * *").unwrap();
        assert!(e.matches(Utc.with_ymd_and_hms(2024, 2, 29, 22, 0, 0).unwrap()));
        assert!(!e.matches(Utc.with_ymd_and_hms(2024, 2, 28, 22, 0, 0).unwrap()));
    }

    #[test]
    fn next_satisfies_matches_and_is_minimal() {
        let cases = [
            ("*/5 * * * *", Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()),
            ("0 9 * * *", Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()),
            ("0 0 1 * *", Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()),
        ];
        for (expr, from) in cases {
            let e = CronExpr::parse(expr).unwrap();
            let next = e.next(from);
            assert!(e.matches(next), "{expr} should match its own Next({from})");
            assert!(next > from);
            // No matching minute strictly between `from` and `next`.
            let mut cursor = floor_to_minute(from) + Duration::minutes(1);
            while cursor < next {
                assert!(!e.matches(cursor), "{expr} matched {cursor} before Next()");
                cursor += Duration::minutes(1);
            }
        }
    }

    #[test]
    fn every_five_minutes_from_exact_boundary() {
        let e = CronExpr::parse("*/5 * * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap();
        assert_eq!(e.next(from), Utc.with_ymd_and_hms(2024, 1, 1, 0, 10, 0).unwrap());
    }

    #[test]
    fn both_dom_and_dow_restricted_are_or_combined() {
        // 9th of the month OR any Friday.
        let e = CronExpr::parse("0 12 9 * 5").unwrap();
        assert!(e.matches(Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap())); // 9th (Saturday)
        assert!(e.matches(Utc.with_ymd_and_hms(2024, 3, 8, 12, 0, 0).unwrap())); // a Friday
        assert!(!e.matches(Utc.with_ymd_and_hms(2024, 3, 7, 12, 0, 0).unwrap()));
    }

    #[test]
    fn unrestricted_fields_match_every_day() {
        let e = CronExpr::parse("0 0 * * *").unwrap();
        assert!(e.matches(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()));
        assert!(e.matches(Utc.with_ymd_and_hms(2024, 6, 15, 0, 0, 0).unwrap()));
    }
}
