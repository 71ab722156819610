use std::fmt;

/// Coarse failure classes a worker needs to tell apart when recording
/// results; finer detail (if any) lives in the error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbErrorCategory {
    AcquireFailed,
    Timeout,
    Deadlock,
    Serialization,
    UniqueViolation,
    FkViolation,
    ConnectionRefused,
    Canceled,
    Other,
}

impl fmt::Display for DbErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AcquireFailed => "acquire_failed",
            Self::Timeout => "timeout",
            Self::Deadlock => "deadlock",
            Self::Serialization => "serialization",
            Self::UniqueViolation => "unique_violation",
            Self::FkViolation => "fk_violation",
            Self::ConnectionRefused => "connection_refused",
            Self::Canceled => "canceled",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

/// Classify a raw driver error message into a [`DbErrorCategory`] by
/// case-insensitive substring match. Order matters: more specific patterns
/// are checked before generic ones.
pub fn categorize(message: &str) -> DbErrorCategory {
    let m = message.to_lowercase();
    if m.contains("deadlock") {
        DbErrorCategory::Deadlock
    } else if m.contains("serialization") {
        DbErrorCategory::Serialization
    } else if m.contains("unique") {
        DbErrorCategory::UniqueViolation
    } else if m.contains("foreign key") || m.contains("fk violation") {
        DbErrorCategory::FkViolation
    } else if m.contains("connection refused") || m.contains("refused") {
        DbErrorCategory::ConnectionRefused
    } else if m.contains("timeout") || m.contains("timed out") {
        DbErrorCategory::Timeout
    } else if m.contains("cancel") {
        DbErrorCategory::Canceled
    } else if m.contains("acquire") {
        DbErrorCategory::AcquireFailed
    } else {
        DbErrorCategory::Other
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{category}: {message}")]
pub struct DbError {
    pub category: DbErrorCategory,
    pub message: String,
}

impl DbError {
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        let category = categorize(&message);
        Self { category, message }
    }

    pub fn canceled() -> Self {
        Self {
            category: DbErrorCategory::Canceled,
            message: "operation canceled".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categorizes_known_patterns_case_insensitively() {
        assert_eq!(categorize("Deadlock detected"), DbErrorCategory::Deadlock);
        assert_eq!(categorize("could not serialize access"), DbErrorCategory::Serialization);
        assert_eq!(categorize("duplicate key value violates unique constraint"), DbErrorCategory::UniqueViolation);
        assert_eq!(categorize("insert violates foreign key constraint"), DbErrorCategory::FkViolation);
        assert_eq!(categorize("Connection refused"), DbErrorCategory::ConnectionRefused);
        assert_eq!(categorize("statement timeout"), DbErrorCategory::Timeout);
        assert_eq!(categorize("context canceled"), DbErrorCategory::Canceled);
        assert_eq!(categorize("failed to acquire connection"), DbErrorCategory::AcquireFailed);
        assert_eq!(categorize("disk is full"), DbErrorCategory::Other);
    }
}
