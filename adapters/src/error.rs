//! Error handling at the adapter boundary. Library crates (`core`,
//! `database`, `services`, `retrieval`) propagate their own `thiserror`
//! types; `anyhow` and this crate's `AdapterError` are reserved for the
//! CLI/HTTP/MCP surface, mirroring the teacher's split between
//! `task-core::TaskError` (propagated) and `anyhow::Result` (the binary
//! boundary in `mcp-server/src/main.rs`).

use serde::Serialize;
use thiserror::Error;
use tx_core::error::CoreError;
use tx_retrieval::RetrievalError;

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
}

impl AdapterError {
    /// HTTP-status-like classifier used by both the HTTP adapter's response
    /// mapping and the CLI's exit-code mapping (non-zero on any variant).
    pub fn status_code(&self) -> u16 {
        match self {
            AdapterError::Validation(_) => 400,
            AdapterError::NotFound(_) => 404,
            AdapterError::Conflict(_) => 409,
            AdapterError::Core(e) => e.status_code(),
            AdapterError::Retrieval(e) => e.status_code(),
        }
    }
}

/// The `{ "error": "..." }` body every adapter returns on failure (spec.md
/// §7's "JSON body `{ "error": "..." }`").
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl From<&AdapterError> for ErrorBody {
    fn from(e: &AdapterError) -> Self {
        Self { error: e.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_400() {
        assert_eq!(AdapterError::Validation("bad title".into()).status_code(), 400);
    }

    #[test]
    fn not_found_maps_to_404() {
        assert_eq!(AdapterError::NotFound("tx-missing".into()).status_code(), 404);
    }

    #[test]
    fn conflict_maps_to_409() {
        assert_eq!(AdapterError::Conflict("already claimed".into()).status_code(), 409);
    }

    #[test]
    fn core_database_error_maps_to_500() {
        let err = AdapterError::from(CoreError::Database("disk full".to_string()));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn error_body_carries_the_display_message() {
        let err = AdapterError::NotFound("tx-missing".into());
        let body = ErrorBody::from(&err);
        assert_eq!(body.error, "not found: tx-missing");
    }
}
