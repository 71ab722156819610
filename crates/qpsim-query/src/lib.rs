//! Weighted random query template selection plus synthetic argument
//! generation. The template catalog itself (which queries, their SQL text,
//! and their relative weights) is configuration; this crate only owns the
//! shape of a template and the machinery to pick one and fill in its
//! parameters.

mod params;
mod template;

pub use params::{generate_args, EntityCounts, ParamKind, QueryParam};
pub use template::{ParamShape, QueryKind, QueryTemplate};

use parking_lot::Mutex;
use qpsim_domain::config::ConfigIssue;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Picks a [`QueryTemplate`] from a fixed catalog with probability
/// proportional to its `weight`. Deterministic: two selectors built from the
/// same templates and seed draw identical sequences, since `StdRng` is a
/// documented reproducible PRNG.
pub struct QuerySelector {
    templates: Vec<QueryTemplate>,
    cumulative: Vec<f64>,
    total_weight: f64,
    rng: Mutex<StdRng>,
}

impl QuerySelector {
    pub fn new(templates: Vec<QueryTemplate>, seed: u64) -> Result<Self, Vec<ConfigIssue>> {
        let issues = validate_templates(&templates);
        if qpsim_domain::config::has_errors(&issues) {
            return Err(issues);
        }
        let mut cumulative = Vec::with_capacity(templates.len());
        let mut running = 0.0;
        for t in &templates {
            running += t.weight as f64;
            cumulative.push(running);
        }
        Ok(Self {
            templates,
            cumulative,
            total_weight: running,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        })
    }

    /// Re-seed the selector's RNG, restarting its draw sequence.
    pub fn reset(&self, seed: u64) {
        *self.rng.lock() = StdRng::seed_from_u64(seed);
    }

    /// Draw the next template, weighted by `weight`.
    pub fn next(&self) -> &QueryTemplate {
        let v = {
            let mut rng = self.rng.lock();
            rng.gen_range(0.0..self.total_weight)
        };
        let idx = self.cumulative.partition_point(|&c| c <= v);
        &self.templates[idx.min(self.templates.len() - 1)]
    }

    pub fn templates(&self) -> &[QueryTemplate] {
        &self.templates
    }
}

fn validate_templates(templates: &[QueryTemplate]) -> Vec<ConfigIssue> {
    let mut issues = Vec::new();
    if templates.is_empty() {
        issues.push(ConfigIssue::error("templates", "at least one query template is required"));
        return issues;
    }
    let mut seen = std::collections::HashSet::new();
    for t in templates {
        if t.weight == 0 {
            issues.push(ConfigIssue::error(
                format!("templates.{}.weight", t.name),
                "weight must be greater than zero",
            ));
        }
        if t.sql.trim().is_empty() {
            issues.push(ConfigIssue::error(
                format!("templates.{}.sql", t.name),
                "sql must not be empty",
            ));
        }
        if !seen.insert(t.name.clone()) {
            issues.push(ConfigIssue::error(
                format!("templates.{}", t.name),
                "duplicate template name",
            ));
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_templates() -> Vec<QueryTemplate> {
        vec![
            QueryTemplate {
                name: "read_light".into(),
                sql: "SELECT * FROM accounts WHERE id = $1".into(),
                weight: 90,
                kind: QueryKind::Read,
                params: ParamShape::AccountId,
            },
            QueryTemplate {
                name: "write_heavy".into(),
                sql: "INSERT INTO transactions VALUES (...)".into(),
                weight: 10,
                kind: QueryKind::Write,
                params: ParamShape::InsertRow { scalars: 4 },
            },
        ]
    }

    #[test]
    fn rejects_empty_catalog() {
        assert!(QuerySelector::new(Vec::new(), 1).is_err());
    }

    #[test]
    fn rejects_zero_weight_template() {
        let mut templates = sample_templates();
        templates[0].weight = 0;
        assert!(QuerySelector::new(templates, 1).is_err());
    }

    #[test]
    fn same_seed_produces_identical_sequence() {
        let a = QuerySelector::new(sample_templates(), 42).unwrap();
        let b = QuerySelector::new(sample_templates(), 42).unwrap();
        let seq_a: Vec<String> = (0..200).map(|_| a.next().name.clone()).collect();
        let seq_b: Vec<String> = (0..200).map(|_| b.next().name.clone()).collect();
        assert_eq!(seq_a, seq_b);
    }

    #[test]
    fn reset_restarts_the_sequence() {
        let selector = QuerySelector::new(sample_templates(), 7).unwrap();
        let first_run: Vec<String> = (0..50).map(|_| selector.next().name.clone()).collect();
        selector.reset(7);
        let second_run: Vec<String> = (0..50).map(|_| selector.next().name.clone()).collect();
        assert_eq!(first_run, second_run);
    }

    #[test]
    fn draws_roughly_match_weights() {
        let selector = QuerySelector::new(sample_templates(), 1).unwrap();
        let mut reads = 0;
        let n = 20_000;
        for _ in 0..n {
            if selector.next().kind == QueryKind::Read {
                reads += 1;
            }
        }
        let ratio = reads as f64 / n as f64;
        assert!((ratio - 0.9).abs() < 0.02, "ratio was {ratio}");
    }
}
