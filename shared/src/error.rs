//! Error taxonomy shared by the server and the client session.

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, AtlasError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AtlasError {
    /// Requested administrative level is outside 1..=5.
    #[error("invalid administrative level {0}: expected 1 to 5")]
    InvalidLevel(i64),

    #[error("invalid domain: {0}")]
    InvalidDomain(String),

    /// Unknown election, unit or other entity id.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    /// Malformed polygon data. Recovered per feature by the join.
    #[error("geometry for unit {unit_id} could not be parsed: {reason}")]
    GeometryParse { unit_id: i64, reason: String },

    #[error("spatial point lookup is unavailable on this data source")]
    SpatialIndexUnavailable,

    #[error("prefetch of {key} failed: {reason}")]
    PrefetchFailure { key: String, reason: String },

    #[error("operation timed out after {millis} ms")]
    Timeout { millis: u64 },

    /// The administrative tree violates the fixed 5-level forest shape.
    #[error("invalid administrative tree: {0}")]
    InvalidTree(String),
}

impl AtlasError {
    pub fn not_found(kind: &'static str, id: i64) -> Self {
        Self::NotFound { kind, id }
    }
}
