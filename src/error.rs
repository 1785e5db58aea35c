//! Error types surfaced by the crate.
//!
//! All recoverable failures are returned as [`GbtError`] values with a
//! descriptive message. Structural impossibilities (e.g. reading a numerical
//! column as categorical) are programming errors and panic instead.

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, GbtError>;

/// Errors produced while configuring, training, evaluating or persisting a
/// gradient boosted trees model.
#[derive(Debug, thiserror::Error)]
pub enum GbtError {
    /// The requested configuration is inconsistent (task/loss mismatch,
    /// missing ranking group column, wrong label vocabulary size, ...).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The dataset violates a data contract (null total weight, oversized
    /// ranking group, out-of-vocabulary label, ...).
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// An internal invariant was broken (wrong gradient shape, wrong number
    /// of trees handed to a prediction update, ...).
    #[error("internal error: {0}")]
    Internal(String),

    /// A requested capability is not implemented (e.g. an unknown node
    /// storage format in a persisted model).
    #[error("not implemented: {0}")]
    Unimplemented(String),

    /// Filesystem failure while saving or loading a model.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failure while saving or loading a model.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_carry_kind_prefix() {
        let err = GbtError::InvalidConfiguration("bad".to_string());
        assert_eq!(err.to_string(), "invalid configuration: bad");

        let err = GbtError::InvalidData("bad".to_string());
        assert_eq!(err.to_string(), "invalid data: bad");

        let err = GbtError::Internal("bad".to_string());
        assert_eq!(err.to_string(), "internal error: bad");
    }
}
