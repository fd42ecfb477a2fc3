use thiserror::Error;

/// Result type alias for the retrieval pipeline.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Error type for `tx-retrieval`. Only the BM25 stage is mandatory (spec.md
/// §4.5) — every other stage degrades to a no-op on error rather than
/// producing one of these, so in practice most searches never see anything
/// but [`RetrievalError::Database`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetrievalError {
    #[error("database error during retrieval: {0}")]
    Database(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual} for learning {learning_id}")]
    DimensionMismatch {
        learning_id: String,
        expected: usize,
        actual: usize,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("backend call failed: {0}")]
    Backend(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RetrievalError {
    /// HTTP-status-like classifier for the adapters crate, matching the
    /// shape of `tx_core::error::CoreError::status_code`.
    pub fn status_code(&self) -> u16 {
        match self {
            RetrievalError::Database(_) | RetrievalError::Backend(_) | RetrievalError::Internal(_) => 500,
            RetrievalError::DimensionMismatch { .. } | RetrievalError::Configuration(_) => 400,
        }
    }
}

impl From<tx_core::error::CoreError> for RetrievalError {
    fn from(err: tx_core::error::CoreError) -> Self {
        RetrievalError::Database(err.to_string())
    }
}
