use crate::models::TaskStatus;
use thiserror::Error;

/// Result type alias for core task-graph operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Error type shared by the task graph, lease manager, and repository
/// layer. Each variant maps to an HTTP-status-like classifier via
/// [`CoreError::status_code`] for use by the adapters crate.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("task not found: {0}")]
    NotFound(String),

    #[error("invalid state transition from {0} to {1}")]
    InvalidStateTransition(TaskStatus, TaskStatus),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("task {0} is already claimed by worker {1}")]
    AlreadyClaimed(String, String),

    #[error("worker {0} does not hold claim on task {1}")]
    NotOwned(String, String),

    #[error("claim {0} not found or already released")]
    ClaimNotFound(i64),

    #[error("cyclic parent relationship detected involving task {0}")]
    CyclicParent(String),

    #[error("lease for task {0} expired at {1}")]
    LeaseExpired(String, String),

    #[error("claim {0} has reached the maximum of {1} renewals")]
    MaxRenewalsExceeded(i64, i32),

    #[error("task {0} has children; pass cascade to remove them")]
    HasChildren(String),

    #[error("stale data: {0}")]
    StaleData(String),
}

impl CoreError {
    pub fn not_found_id(id: &str) -> Self {
        Self::NotFound(format!("task '{id}' not found"))
    }

    pub fn invalid_id_format(id: &str) -> Self {
        Self::Validation(format!("invalid task id format: '{id}'"))
    }

    pub fn empty_field(field: &str) -> Self {
        Self::Validation(format!("field '{field}' cannot be empty"))
    }

    pub fn field_too_long(field: &str, max: usize) -> Self {
        Self::Validation(format!("field '{field}' exceeds maximum length of {max}"))
    }

    pub fn invalid_transition(from: TaskStatus, to: TaskStatus) -> Self {
        Self::InvalidStateTransition(from, to)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, CoreError::Validation(_))
    }

    pub fn is_database(&self) -> bool {
        matches!(self, CoreError::Database(_))
    }

    /// HTTP-status-equivalent classifier, consumed by the adapters crate's
    /// HTTP error mapping.
    pub fn status_code(&self) -> u16 {
        match self {
            CoreError::NotFound(_) => 404,
            CoreError::Validation(_) => 400,
            CoreError::InvalidStateTransition(_, _) => 422,
            CoreError::Database(_) => 500,
            CoreError::Configuration(_) => 500,
            CoreError::Internal(_) => 500,
            CoreError::AlreadyClaimed(_, _) => 409,
            CoreError::NotOwned(_, _) => 403,
            CoreError::ClaimNotFound(_) => 404,
            CoreError::CyclicParent(_) => 422,
            CoreError::LeaseExpired(_, _) => 409,
            CoreError::MaxRenewalsExceeded(_, _) => 409,
            CoreError::HasChildren(_) => 409,
            CoreError::StaleData(_) => 409,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_produce_expected_variants() {
        let err = CoreError::not_found_id("tx-abc123");
        assert!(err.is_not_found());
        assert_eq!(err.status_code(), 404);

        let err = CoreError::invalid_transition(TaskStatus::Done, TaskStatus::Active);
        assert_eq!(
            err,
            CoreError::InvalidStateTransition(TaskStatus::Done, TaskStatus::Active)
        );
        assert_eq!(err.status_code(), 422);
    }

    #[test]
    fn predicates_are_mutually_exclusive() {
        assert!(CoreError::NotFound("x".into()).is_not_found());
        assert!(!CoreError::Validation("x".into()).is_not_found());
        assert!(CoreError::Validation("x".into()).is_validation());
        assert!(CoreError::Database("x".into()).is_database());
        assert!(!CoreError::Database("x".into()).is_validation());
    }

    #[test]
    fn display_formats_match() {
        let err = CoreError::AlreadyClaimed("tx-abc123".into(), "worker-1".into());
        assert_eq!(
            format!("{err}"),
            "task tx-abc123 is already claimed by worker worker-1"
        );
    }
}
