mod candidate;
mod claim;
mod dependency;
mod edge;
mod learning;
mod run;
mod sync_config;
mod task;
mod worker;

pub use candidate::SqliteCandidateRepository;
pub use claim::SqliteClaimRepository;
pub use dependency::SqliteTaskDependencyRepository;
pub use edge::SqliteEdgeRepository;
pub use learning::SqliteLearningRepository;
pub use run::SqliteRunRepository;
pub use sync_config::SqliteSyncConfigRepository;
pub use task::SqliteTaskRepository;
pub use worker::SqliteWorkerRepository;
