//! SQLite persistence for the task graph, lease manager, learning corpus,
//! and sync watermark.
//!
//! This crate implements every repository trait declared in `tx-core`
//! against a single SQLite database, using a hand-rolled migration runner
//! (see [`migrations`]) instead of `sqlx::migrate!` and a `BEGIN IMMEDIATE`
//! transaction wrapper (see [`store::Store::begin_immediate`]) for
//! mutations that must take the write lock eagerly.
//!
//! # Usage
//!
//! ```rust
//! use tx_database::Store;
//!
//! # async fn run() -> tx_core::error::Result<()> {
//! let store = Store::open(":memory:").await?;
//! store.migrate().await?;
//! store.health_check().await?;
//! # Ok(())
//! # }
//! ```

pub mod common;
mod migrations;
mod repositories;
mod store;

pub use migrations::{Migration, MigrationRunner, MigrationStatus, MIGRATIONS};
pub use repositories::{
    SqliteCandidateRepository, SqliteClaimRepository, SqliteEdgeRepository,
    SqliteLearningRepository, SqliteRunRepository, SqliteSyncConfigRepository,
    SqliteTaskDependencyRepository, SqliteTaskRepository, SqliteWorkerRepository,
};
pub use store::{ImmediateTransaction, Store};

pub use tx_core::{error, models, repository};
