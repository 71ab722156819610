use std::time::Duration;

/// The shape a per-query recorder must expose, shared by the worker pool
/// (producer) and the interval collector (consumer) so neither crate needs
/// to depend on the other's concrete types.
pub trait MetricsSink: Send + Sync {
    /// Record the outcome of one executed query. `error_category` is the
    /// `Display` rendering of a `qpsim-dbiface` `DbErrorCategory`, or `None`
    /// on success — passed as a string so this trait doesn't need a
    /// dependency on the db interface crate.
    fn record(&self, template_name: &str, latency: Duration, is_read: bool, error_category: Option<String>);
}
