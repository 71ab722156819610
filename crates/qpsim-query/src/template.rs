/// Read vs write classification, used by the collector to split latency
/// stats and by the scheduler's read/write-ratio override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Read,
    Write,
}

/// Describes the positional parameters a template's SQL expects, enough for
/// [`crate::generate_args`] to synthesize plausible arguments. Not a general
/// schema language — just the handful of shapes the bundled demo catalog
/// needs.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParamShape {
    /// A single synthetic account id, drawn from the configured entity
    /// count.
    AccountId,
    /// A single float drawn uniformly from `[min, max)`.
    FloatRange { min: f64, max: f64 },
    /// A row of `scalars` synthetic numeric values, for INSERT-shaped
    /// templates.
    InsertRow { scalars: usize },
    /// An explicit, ordered list of parameter kinds for anything the three
    /// shapes above don't cover.
    Custom(Vec<crate::ParamKind>),
}

/// A single entry in the query catalog: its SQL text, relative selection
/// weight, and the shape of its parameters.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QueryTemplate {
    pub name: String,
    pub sql: String,
    pub weight: u32,
    pub kind: QueryKind,
    pub params: ParamShape,
}
