use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::Result,
    models::{
        Candidate, CandidateStatus, Claim, ClaimStatus, Edge, HeartbeatState, Learning, NewTask,
        NodeType, Run, SyncConfig, Task, TaskDependency, TaskFilter, TaskStats, TaskStatus,
        UpdateTask, Worker,
    },
};

/// Persistence surface for tasks. Implementations must be thread-safe and
/// support concurrent access; writers are expected to take the store's
/// write lock internally rather than require external synchronization.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, task: NewTask) -> Result<Task>;

    async fn update(&self, id: &str, updates: UpdateTask) -> Result<Task>;

    /// Sets status unconditionally, bypassing the transition legality
    /// table. Sets `completed_at` on entry to `done`, clears it on exit.
    async fn force_status(&self, id: &str, status: TaskStatus) -> Result<Task>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Task>>;

    async fn list(&self, filter: TaskFilter) -> Result<Vec<Task>>;

    async fn count(&self, filter: TaskFilter) -> Result<u64>;

    /// Deletes a single row. Callers are responsible for cascade planning
    /// (see `TaskService::remove`) — this is the leaf primitive.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Returns every task whose `parent_id` is `id`, used for auto-complete
    /// ancestor walks and cascade-delete descendant discovery.
    async fn list_children(&self, parent_id: &str) -> Result<Vec<Task>>;

    /// Batch variant of `list_children`, one query regardless of input
    /// size — required for the ancestor auto-complete pass (spec §4.2) and
    /// `getWithDepsBatch`'s children snapshot.
    async fn list_children_of_many(&self, parent_ids: &[String]) -> Result<Vec<Task>>;

    async fn health_check(&self) -> Result<()>;

    async fn stats(&self) -> Result<TaskStats>;
}

/// Persistence surface for blocker → blocked dependency edges.
#[async_trait]
pub trait TaskDependencyRepository: Send + Sync {
    async fn add(&self, blocker_id: &str, blocked_id: &str) -> Result<TaskDependency>;

    async fn remove(&self, blocker_id: &str, blocked_id: &str) -> Result<bool>;

    async fn exists(&self, blocker_id: &str, blocked_id: &str) -> Result<bool>;

    async fn blockers_of(&self, blocked_id: &str) -> Result<Vec<String>>;

    async fn blocked_by(&self, blocker_id: &str) -> Result<Vec<String>>;

    /// One snapshot of the whole `task_dependencies` table relevant to
    /// `ids`, returned as `(blocked_id, blocker_id)` pairs — the shape
    /// `getWithDepsBatch` folds into per-task `blockedBy`/`blocks` lists
    /// without issuing one query per task.
    async fn snapshot_for(&self, ids: &[String]) -> Result<Vec<(String, String)>>;

    /// Deletes every dependency row mentioning any of `ids` on either side.
    /// Used as defense-in-depth during cascade delete even when the FK is
    /// `ON DELETE CASCADE`.
    async fn remove_all_mentioning(&self, ids: &[String]) -> Result<u64>;

    async fn list_all(&self, limit: u32) -> Result<Vec<TaskDependency>>;
}

/// Persistence surface for leases.
#[async_trait]
pub trait ClaimRepository: Send + Sync {
    async fn insert(
        &self,
        task_id: &str,
        worker_id: &str,
        lease_expires_at: DateTime<Utc>,
    ) -> Result<Claim>;

    async fn find_active_by_task_id(&self, task_id: &str) -> Result<Option<Claim>>;

    async fn get(&self, claim_id: i64) -> Result<Option<Claim>>;

    async fn set_status(&self, claim_id: i64, status: ClaimStatus) -> Result<Claim>;

    async fn renew(&self, claim_id: i64, new_expires_at: DateTime<Utc>) -> Result<Claim>;

    /// Marks every `active` claim for `worker_id` as `released`, returning
    /// the count affected — used on worker deregistration.
    async fn release_by_worker(&self, worker_id: &str) -> Result<u64>;

    /// Every `active` claim whose lease has elapsed as of `now`.
    async fn get_expired(&self, now: DateTime<Utc>) -> Result<Vec<Claim>>;
}

/// Persistence surface for registered workers.
#[async_trait]
pub trait WorkerRepository: Send + Sync {
    async fn upsert(&self, worker: Worker) -> Result<Worker>;

    async fn get(&self, id: &str) -> Result<Option<Worker>>;

    async fn list(&self) -> Result<Vec<Worker>>;

    async fn set_heartbeat(&self, id: &str, at: DateTime<Utc>) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;
}

/// Persistence surface for agent runs and their stall-detection
/// bookkeeping.
#[async_trait]
pub trait RunRepository: Send + Sync {
    async fn insert(&self, run: Run) -> Result<Run>;

    async fn get(&self, id: &str) -> Result<Option<Run>>;

    async fn list_active(&self) -> Result<Vec<Run>>;

    async fn finish(&self, id: &str, status: crate::models::RunStatus, ended_at: DateTime<Utc>) -> Result<Run>;

    async fn get_heartbeat(&self, run_id: &str) -> Result<Option<HeartbeatState>>;

    async fn upsert_heartbeat(&self, state: HeartbeatState) -> Result<HeartbeatState>;
}

/// Persistence surface for the learning corpus retrieval is built over.
#[async_trait]
pub trait LearningRepository: Send + Sync {
    async fn insert(&self, learning: Learning) -> Result<Learning>;

    async fn get(&self, id: &str) -> Result<Option<Learning>>;

    /// BM25 full-text search over learning content, returning up to `limit`
    /// hits ordered best-first. This is the one mandatory retrieval stage:
    /// failure here fails the whole search.
    async fn bm25_search(&self, query: &str, limit: u32) -> Result<Vec<BM25Hit>>;

    /// Fetches a batch of learnings by id, e.g. to evaluate embeddings for
    /// a candidate set assembled from several BM25 queries.
    async fn get_many(&self, ids: &[String]) -> Result<Vec<Learning>>;

    async fn record_usage(&self, id: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct BM25Hit {
    pub learning_id: String,
    pub score: f64,
}

/// Persistence surface for proposed-but-unreviewed learnings.
#[async_trait]
pub trait CandidateRepository: Send + Sync {
    async fn insert(&self, candidate: Candidate) -> Result<Candidate>;

    async fn get(&self, id: &str) -> Result<Option<Candidate>>;

    async fn list_by_status(&self, status: CandidateStatus) -> Result<Vec<Candidate>>;

    async fn set_status(&self, id: &str, status: CandidateStatus) -> Result<Candidate>;
}

/// Persistence surface for the typed graph edges linking learnings, files,
/// tasks, runs, and docs.
#[async_trait]
pub trait EdgeRepository: Send + Sync {
    async fn insert(&self, edge: Edge) -> Result<Edge>;

    /// Soft-deletes the edge by setting `invalidated_at`. Returns a
    /// typed not-found error rather than panicking when the edge is
    /// missing, per the design note on the `invalidate` operation.
    async fn invalidate(&self, id: i64, at: DateTime<Utc>) -> Result<()>;

    async fn neighbors(
        &self,
        node_type: NodeType,
        node_id: &str,
        edge_types: &[String],
    ) -> Result<Vec<Edge>>;
}

/// Persistence surface for the small key/value sync watermark table.
#[async_trait]
pub trait SyncConfigRepository: Send + Sync {
    async fn get(&self) -> Result<SyncConfig>;

    async fn set_last_export(&self, at: DateTime<Utc>) -> Result<()>;

    async fn set_last_import(&self, at: DateTime<Utc>) -> Result<()>;

    async fn set_auto_sync(&self, enabled: bool) -> Result<()>;
}
