/// How to combine multiplier overrides from several simultaneously active
/// events. `HighestPriority` is the default and matches the read/write-ratio
/// and workload-override rules; the others exist for testing and extension
/// (e.g. a "Black Friday" event stacking with a smaller periodic spike).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MergeStrategy {
    /// The override carried by the highest-priority active event wins.
    /// Ties go to whichever was activated first (stable sort order).
    HighestPriority,
    /// `base + sum((multiplier - 1.0) for each active override)`.
    SumOfDeltas,
    /// `base * product(multiplier for each active override)`.
    Product,
    /// `max(base, multiplier for each active override)`.
    Max,
}

/// `overrides` is `(priority, multiplier)` pairs, already in priority-descending,
/// activation-order-stable order (i.e. as produced by `EventScheduler`'s active list).
pub(crate) fn merge_multipliers(base: f64, overrides: &[(i64, f64)], strategy: MergeStrategy) -> f64 {
    if overrides.is_empty() {
        return base;
    }
    match strategy {
        MergeStrategy::HighestPriority => overrides[0].1,
        MergeStrategy::SumOfDeltas => base + overrides.iter().map(|(_, m)| m - 1.0).sum::<f64>(),
        MergeStrategy::Product => overrides.iter().fold(base, |acc, (_, m)| acc * m),
        MergeStrategy::Max => overrides.iter().map(|(_, m)| *m).fold(base, f64::max),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highest_priority_picks_first() {
        let overrides = vec![(100, 3.0), (10, 1.5)];
        assert_eq!(merge_multipliers(1.0, &overrides, MergeStrategy::HighestPriority), 3.0);
    }

    #[test]
    fn sum_of_deltas() {
        let overrides = vec![(100, 2.0), (10, 1.5)];
        assert_eq!(merge_multipliers(1.0, &overrides, MergeStrategy::SumOfDeltas), 1.0 + 1.0 + 0.5);
    }

    #[test]
    fn product() {
        let overrides = vec![(100, 2.0), (10, 3.0)];
        assert_eq!(merge_multipliers(1.0, &overrides, MergeStrategy::Product), 6.0);
    }

    #[test]
    fn max_strategy() {
        let overrides = vec![(100, 0.5), (10, 4.0)];
        assert_eq!(merge_multipliers(1.0, &overrides, MergeStrategy::Max), 4.0);
    }

    #[test]
    fn empty_overrides_returns_base() {
        assert_eq!(merge_multipliers(2.0, &[], MergeStrategy::Product), 2.0);
    }
}
