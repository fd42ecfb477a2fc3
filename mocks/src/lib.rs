//! Mock implementations and test utilities for the task orchestrator.
//!
//! Provides:
//! - in-memory fakes of every `tx_core::repository` trait
//! - realistic test data generators and fixtures
//! - custom assertion helpers
//! - contract tests any `TaskRepository` implementation should pass

pub mod assertions;
pub mod builders;
pub mod contracts;
pub mod fixtures;
pub mod generators;
pub mod repository;

pub use assertions::*;
pub use builders::*;
pub use contracts::*;
pub use fixtures::*;
pub use generators::*;
pub use repository::{
    claim_service_fakes, task_service_fakes, MockCandidateRepository, MockClaimRepository,
    MockEdgeRepository, MockLearningRepository, MockRunRepository, MockSyncConfigRepository,
    MockTaskDependencyRepository, MockTaskRepository, MockWorkerRepository,
};
