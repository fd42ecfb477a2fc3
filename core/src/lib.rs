//! Task graph core domain library.
//!
//! This crate holds the domain models, error types, repository trait
//! contracts, and validation rules shared by every other crate in the
//! workspace (`database`, `services`, `retrieval`, `adapters`).
//!
//! # Architecture
//!
//! - [`models`] — task/claim/worker/run/learning/candidate/edge domain types
//! - [`error`] — [`CoreError`] and the crate-wide [`Result`] alias
//! - [`repository`] — persistence trait contracts implemented by `database`
//! - [`validation`] — ID format, field, and status-transition validation

pub mod error;
pub mod models;
pub mod repository;
pub mod validation;

pub use error::{CoreError, Result};
pub use models::{
    AssigneeType, Candidate, CandidateStatus, Claim, ClaimStatus, Confidence, Edge,
    HeartbeatState, Learning, NewTask, NodeType, Run, RunStatus, SyncConfig, Task,
    TaskDependency, TaskFilter, TaskStats, TaskStatus, TaskWithDeps, UpdateTask, Worker,
    WorkerStatus,
};
pub use repository::{
    BM25Hit, CandidateRepository, ClaimRepository, EdgeRepository, LearningRepository,
    RunRepository, SyncConfigRepository, TaskDependencyRepository, TaskRepository,
    WorkerRepository,
};

/// Current version of the core crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Current crate name.
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_constants_are_populated() {
        assert!(!VERSION.is_empty());
        assert_eq!(CRATE_NAME, "tx-core");
    }

    #[test]
    fn re_exports_are_reachable() {
        let status = TaskStatus::Backlog;
        assert_eq!(format!("{status}"), "backlog");

        let error = CoreError::not_found_id("tx-abc123");
        assert!(error.is_not_found());
    }
}
