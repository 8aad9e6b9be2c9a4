//! Error types for the shim.
//!
//! Engine failures are carried verbatim inside the operation-specific
//! variants so callers can see both what was attempted and what the
//! engine said.

use crate::engine::EngineError;

/// Result type alias for shim operations.
pub type ShimResult<T> = std::result::Result<T, ShimError>;

/// Errors surfaced by the translation layer.
#[derive(Debug, thiserror::Error)]
pub enum ShimError {
    // =========================================================================
    // Lookup / translation
    // =========================================================================
    /// The id does not resolve to an extant record.
    #[error("not found: {0}")]
    NotFound(String),

    /// The record's reserved labels are missing or corrupt.
    #[error("malformed metadata on record '{id}': {reason}")]
    MalformedMetadata { id: String, reason: String },

    /// Rejected before any engine call was made.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    // =========================================================================
    // Engine operations
    // =========================================================================
    #[error("failed to create '{name}': {source}")]
    CreateFailed {
        name: String,
        #[source]
        source: EngineError,
    },

    #[error("failed to start '{id}': {source}")]
    StartFailed {
        id: String,
        #[source]
        source: EngineError,
    },

    #[error("failed to stop '{id}': {source}")]
    StopFailed {
        id: String,
        #[source]
        source: EngineError,
    },

    #[error("failed to remove '{id}': {source}")]
    RemoveFailed {
        id: String,
        #[source]
        source: EngineError,
    },

    #[error("failed to inspect '{id}': {source}")]
    InspectFailed {
        id: String,
        #[source]
        source: EngineError,
    },

    #[error("failed to list records: {0}")]
    ListFailed(#[source] EngineError),

    /// The engine could not be reached at all.
    #[error("engine unavailable: {0}")]
    EngineUnavailable(#[source] EngineError),

    // =========================================================================
    // Local storage
    // =========================================================================
    #[error("database error: {0}")]
    Database(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

impl ShimError {
    /// Whether this error means the record does not exist.
    ///
    /// Races between callers routinely produce this, so sweeps treat it as
    /// a benign outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ShimError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_kept_in_message() {
        let err = ShimError::StartFailed {
            id: "abc".into(),
            source: EngineError::Backend("daemon unreachable".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc"));
        assert!(msg.contains("daemon unreachable"));
    }

    #[test]
    fn test_is_not_found() {
        assert!(ShimError::NotFound("x".into()).is_not_found());
        assert!(!ShimError::InvalidConfig("x".into()).is_not_found());
    }
}
