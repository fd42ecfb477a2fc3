//! Shared setup for the end-to-end scenario tests: a real, migrated SQLite
//! database (in-memory) and the concrete repositories over it. Every
//! scenario test builds its own services from these so each gets an
//! isolated database, the way the teacher's own `tests/sqlite_integration.rs`
//! gives every test a freshly named in-memory database.

use std::sync::Arc;

use tx_database::{
    SqliteClaimRepository, SqliteLearningRepository, SqliteTaskDependencyRepository,
    SqliteTaskRepository, Store,
};
use tx_services::{ClaimService, SyncService, TaskService};

pub async fn store() -> Store {
    let store = Store::open(":memory:").await.expect("open in-memory database");
    store.migrate().await.expect("apply migrations");
    store
}

pub fn task_service(store: &Store) -> TaskService {
    let pool = store.pool().clone();
    TaskService::new(
        Arc::new(SqliteTaskRepository::new(pool.clone())),
        Arc::new(SqliteTaskDependencyRepository::new(pool)),
    )
}

pub fn claim_service(store: &Store) -> ClaimService {
    ClaimService::new(
        Arc::new(SqliteClaimRepository::new(store.clone())),
        Arc::new(SqliteTaskRepository::new(store.pool().clone())),
    )
}

pub fn sync_service(store: &Store, path: std::path::PathBuf) -> SyncService {
    SyncService::new(store.clone(), path)
}

pub fn learning_repository(store: &Store) -> Arc<SqliteLearningRepository> {
    Arc::new(SqliteLearningRepository::new(store.pool().clone()))
}
