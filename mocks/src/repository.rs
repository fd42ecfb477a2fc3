//! In-memory fakes of every `tx_core::repository` trait.
//!
//! Each mock is a thread-safe `parking_lot::Mutex`-guarded `HashMap`, with
//! error injection and call-history tracking carried over from the
//! teacher's `MockTaskRepository` pattern so service-level tests can both
//! drive ordinary behavior and simulate repository failures.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tx_core::{
    error::{CoreError, Result},
    models::{
        Candidate, CandidateStatus, Claim, ClaimStatus, Edge, HeartbeatState, Learning, NewTask,
        NodeType, Run, RunStatus, SyncConfig, Task, TaskDependency, TaskFilter, TaskStats,
        TaskStatus, UpdateTask, Worker,
    },
    repository::{
        BM25Hit, CandidateRepository, ClaimRepository, EdgeRepository, LearningRepository,
        RunRepository, SyncConfigRepository, TaskDependencyRepository, TaskRepository,
        WorkerRepository,
    },
};

/// Shared call-tracking/error-injection state, composed into each mock
/// below rather than re-implemented per-struct.
#[derive(Default)]
struct Probe {
    error_injection: Mutex<Option<CoreError>>,
    call_history: Mutex<Vec<String>>,
}

impl Probe {
    fn record(&self, call: impl Into<String>) {
        self.call_history.lock().push(call.into());
    }

    fn check(&self) -> Result<()> {
        if let Some(err) = self.error_injection.lock().take() {
            return Err(err);
        }
        Ok(())
    }

    fn inject(&self, err: CoreError) {
        *self.error_injection.lock() = Some(err);
    }

    fn history(&self) -> Vec<String> {
        self.call_history.lock().clone()
    }

    fn assert_called(&self, method: &str) {
        let history = self.call_history.lock();
        assert!(
            history.iter().any(|c| c.contains(method)),
            "method '{method}' was not called. call history: {:?}",
            *history
        );
    }
}

fn next_id(counter: &Mutex<i64>) -> i64 {
    let mut guard = counter.lock();
    *guard += 1;
    *guard
}

/// In-memory [`TaskRepository`].
pub struct MockTaskRepository {
    tasks: Mutex<HashMap<String, Task>>,
    probe: Probe,
}

impl Default for MockTaskRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTaskRepository {
    pub fn new() -> Self {
        Self { tasks: Mutex::new(HashMap::new()), probe: Probe::default() }
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let map = tasks.into_iter().map(|t| (t.id.clone(), t)).collect();
        Self { tasks: Mutex::new(map), probe: Probe::default() }
    }

    pub fn inject_error(&self, error: CoreError) {
        self.probe.inject(error);
    }

    pub fn call_history(&self) -> Vec<String> {
        self.probe.history()
    }

    pub fn assert_called(&self, method: &str) {
        self.probe.assert_called(method);
    }

    pub fn seed(&self, task: Task) {
        self.tasks.lock().insert(task.id.clone(), task);
    }
}

#[async_trait]
impl TaskRepository for MockTaskRepository {
    async fn create(&self, task: NewTask) -> Result<Task> {
        self.probe.record(format!("create({})", task.title));
        self.probe.check()?;

        let now = Utc::now();
        let id = format!("tsk-{:08x}", rand::random::<u32>());
        let new_task = Task {
            id: id.clone(),
            title: task.title,
            description: task.description,
            status: TaskStatus::Backlog,
            parent_id: task.parent_id,
            score: task.score.unwrap_or(0.0),
            created_at: now,
            updated_at: now,
            completed_at: None,
            metadata: task.metadata.unwrap_or_else(|| serde_json::json!({})),
            assignee_type: task.assignee_type,
            assignee_id: task.assignee_id,
            assigned_at: None,
            assigned_by: None,
        };
        self.tasks.lock().insert(id, new_task.clone());
        Ok(new_task)
    }

    async fn update(&self, id: &str, updates: UpdateTask) -> Result<Task> {
        self.probe.record(format!("update({id})"));
        self.probe.check()?;

        let mut tasks = self.tasks.lock();
        let task = tasks.get_mut(id).ok_or_else(|| CoreError::not_found_id(id))?;

        if let Some(title) = updates.title {
            task.title = title;
        }
        if let Some(description) = updates.description {
            task.description = description;
        }
        if let Some(status) = updates.status {
            if !task.status.can_transition_to(status) {
                return Err(CoreError::InvalidStateTransition(task.status, status));
            }
            task.status = status;
            if status == TaskStatus::Done {
                task.completed_at = Some(Utc::now());
            } else {
                task.completed_at = None;
            }
        }
        if let Some(parent_id) = updates.parent_id {
            task.parent_id = parent_id;
        }
        if let Some(score) = updates.score {
            task.score = score;
        }
        if let Some(metadata) = updates.metadata {
            task.metadata = metadata;
        }
        if let Some(assignee_type) = updates.assignee_type {
            task.assignee_type = assignee_type;
        }
        if let Some(assignee_id) = updates.assignee_id {
            task.assignee_id = assignee_id;
        }
        if let Some(assigned_by) = updates.assigned_by {
            task.assigned_by = assigned_by;
        }
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn force_status(&self, id: &str, status: TaskStatus) -> Result<Task> {
        self.probe.record(format!("force_status({id}, {status})"));
        self.probe.check()?;

        let mut tasks = self.tasks.lock();
        let task = tasks.get_mut(id).ok_or_else(|| CoreError::not_found_id(id))?;
        task.status = status;
        task.completed_at = if status == TaskStatus::Done { Some(Utc::now()) } else { None };
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Task>> {
        self.probe.record(format!("get_by_id({id})"));
        self.probe.check()?;
        Ok(self.tasks.lock().get(id).cloned())
    }

    async fn list(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        self.probe.record("list");
        self.probe.check()?;

        let tasks = self.tasks.lock();
        let mut result: Vec<Task> = tasks
            .values()
            .filter(|t| match &filter.parent_id {
                Some(p) => t.parent_id.as_deref() == Some(p.as_str()),
                None => true,
            })
            .filter(|t| match &filter.status {
                Some(tx_core::models::StatusFilter::One(s)) => t.status == *s,
                Some(tx_core::models::StatusFilter::AnyOf(many)) => many.contains(&t.status),
                None => true,
            })
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            result.truncate(limit as usize);
        }
        Ok(result)
    }

    async fn count(&self, filter: TaskFilter) -> Result<u64> {
        Ok(self.list(filter).await?.len() as u64)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.probe.record(format!("delete({id})"));
        self.probe.check()?;
        self.tasks.lock().remove(id).ok_or_else(|| CoreError::not_found_id(id))?;
        Ok(())
    }

    async fn list_children(&self, parent_id: &str) -> Result<Vec<Task>> {
        self.probe.record(format!("list_children({parent_id})"));
        self.probe.check()?;
        Ok(self
            .tasks
            .lock()
            .values()
            .filter(|t| t.parent_id.as_deref() == Some(parent_id))
            .cloned()
            .collect())
    }

    async fn list_children_of_many(&self, parent_ids: &[String]) -> Result<Vec<Task>> {
        self.probe.record("list_children_of_many");
        self.probe.check()?;
        Ok(self
            .tasks
            .lock()
            .values()
            .filter(|t| t.parent_id.as_ref().is_some_and(|p| parent_ids.contains(p)))
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> Result<()> {
        self.probe.check()
    }

    async fn stats(&self) -> Result<TaskStats> {
        let tasks = self.tasks.lock();
        let mut stats = TaskStats { total: tasks.len() as u64, ..Default::default() };
        for t in tasks.values() {
            *stats.by_status.entry(t.status).or_insert(0) += 1;
        }
        stats.latest_created = tasks.values().map(|t| t.created_at).max();
        stats.latest_completed = tasks.values().filter_map(|t| t.completed_at).max();
        Ok(stats)
    }
}

/// In-memory [`TaskDependencyRepository`].
#[derive(Default)]
pub struct MockTaskDependencyRepository {
    deps: Mutex<Vec<TaskDependency>>,
    probe: Probe,
}

impl MockTaskDependencyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskDependencyRepository for MockTaskDependencyRepository {
    async fn add(&self, blocker_id: &str, blocked_id: &str) -> Result<TaskDependency> {
        self.probe.record(format!("add({blocker_id}, {blocked_id})"));
        self.probe.check()?;
        if blocker_id == blocked_id {
            return Err(CoreError::Validation("a task cannot block itself".to_string()));
        }
        let dep = TaskDependency {
            blocker_id: blocker_id.to_string(),
            blocked_id: blocked_id.to_string(),
            created_at: Utc::now(),
        };
        self.deps.lock().push(dep.clone());
        Ok(dep)
    }

    async fn remove(&self, blocker_id: &str, blocked_id: &str) -> Result<bool> {
        self.probe.record(format!("remove({blocker_id}, {blocked_id})"));
        self.probe.check()?;
        let mut deps = self.deps.lock();
        let before = deps.len();
        deps.retain(|d| !(d.blocker_id == blocker_id && d.blocked_id == blocked_id));
        Ok(deps.len() != before)
    }

    async fn exists(&self, blocker_id: &str, blocked_id: &str) -> Result<bool> {
        Ok(self
            .deps
            .lock()
            .iter()
            .any(|d| d.blocker_id == blocker_id && d.blocked_id == blocked_id))
    }

    async fn blockers_of(&self, blocked_id: &str) -> Result<Vec<String>> {
        Ok(self
            .deps
            .lock()
            .iter()
            .filter(|d| d.blocked_id == blocked_id)
            .map(|d| d.blocker_id.clone())
            .collect())
    }

    async fn blocked_by(&self, blocker_id: &str) -> Result<Vec<String>> {
        Ok(self
            .deps
            .lock()
            .iter()
            .filter(|d| d.blocker_id == blocker_id)
            .map(|d| d.blocked_id.clone())
            .collect())
    }

    async fn snapshot_for(&self, ids: &[String]) -> Result<Vec<(String, String)>> {
        self.probe.record("snapshot_for");
        Ok(self
            .deps
            .lock()
            .iter()
            .filter(|d| ids.contains(&d.blocker_id) || ids.contains(&d.blocked_id))
            .map(|d| (d.blocked_id.clone(), d.blocker_id.clone()))
            .collect())
    }

    async fn remove_all_mentioning(&self, ids: &[String]) -> Result<u64> {
        self.probe.record("remove_all_mentioning");
        let mut deps = self.deps.lock();
        let before = deps.len();
        deps.retain(|d| !ids.contains(&d.blocker_id) && !ids.contains(&d.blocked_id));
        Ok((before - deps.len()) as u64)
    }

    async fn list_all(&self, limit: u32) -> Result<Vec<TaskDependency>> {
        let deps = self.deps.lock();
        Ok(deps.iter().take(limit as usize).cloned().collect())
    }
}

/// In-memory [`ClaimRepository`].
pub struct MockClaimRepository {
    claims: Mutex<HashMap<i64, Claim>>,
    next_id: Mutex<i64>,
    probe: Probe,
}

impl Default for MockClaimRepository {
    fn default() -> Self {
        Self { claims: Mutex::new(HashMap::new()), next_id: Mutex::new(0), probe: Probe::default() }
    }
}

impl MockClaimRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClaimRepository for MockClaimRepository {
    async fn insert(&self, task_id: &str, worker_id: &str, lease_expires_at: DateTime<Utc>) -> Result<Claim> {
        self.probe.record(format!("insert({task_id}, {worker_id})"));
        self.probe.check()?;

        let already_active = self
            .claims
            .lock()
            .values()
            .any(|c| c.task_id == task_id && c.status == ClaimStatus::Active);
        if already_active {
            return Err(CoreError::AlreadyClaimed(task_id.to_string(), worker_id.to_string()));
        }

        let id = next_id(&self.next_id);
        let claim = Claim {
            id,
            task_id: task_id.to_string(),
            worker_id: worker_id.to_string(),
            claimed_at: Utc::now(),
            lease_expires_at,
            renewed_count: 0,
            status: ClaimStatus::Active,
        };
        self.claims.lock().insert(id, claim.clone());
        Ok(claim)
    }

    async fn find_active_by_task_id(&self, task_id: &str) -> Result<Option<Claim>> {
        Ok(self
            .claims
            .lock()
            .values()
            .find(|c| c.task_id == task_id && c.status == ClaimStatus::Active)
            .cloned())
    }

    async fn get(&self, claim_id: i64) -> Result<Option<Claim>> {
        Ok(self.claims.lock().get(&claim_id).cloned())
    }

    async fn set_status(&self, claim_id: i64, status: ClaimStatus) -> Result<Claim> {
        self.probe.record(format!("set_status({claim_id}, {status:?})"));
        self.probe.check()?;
        let mut claims = self.claims.lock();
        let claim = claims.get_mut(&claim_id).ok_or(CoreError::ClaimNotFound(claim_id))?;
        claim.status = status;
        Ok(claim.clone())
    }

    async fn renew(&self, claim_id: i64, new_expires_at: DateTime<Utc>) -> Result<Claim> {
        self.probe.record(format!("renew({claim_id})"));
        self.probe.check()?;
        let mut claims = self.claims.lock();
        let claim = claims.get_mut(&claim_id).ok_or(CoreError::ClaimNotFound(claim_id))?;
        claim.lease_expires_at = new_expires_at;
        claim.renewed_count += 1;
        Ok(claim.clone())
    }

    async fn release_by_worker(&self, worker_id: &str) -> Result<u64> {
        let mut claims = self.claims.lock();
        let mut count = 0;
        for claim in claims.values_mut() {
            if claim.worker_id == worker_id && claim.status == ClaimStatus::Active {
                claim.status = ClaimStatus::Released;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn get_expired(&self, now: DateTime<Utc>) -> Result<Vec<Claim>> {
        Ok(self
            .claims
            .lock()
            .values()
            .filter(|c| c.status == ClaimStatus::Active && c.lease_expires_at <= now)
            .cloned()
            .collect())
    }
}

/// In-memory [`WorkerRepository`].
#[derive(Default)]
pub struct MockWorkerRepository {
    workers: Mutex<HashMap<String, Worker>>,
}

impl MockWorkerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkerRepository for MockWorkerRepository {
    async fn upsert(&self, worker: Worker) -> Result<Worker> {
        self.workers.lock().insert(worker.id.clone(), worker.clone());
        Ok(worker)
    }

    async fn get(&self, id: &str) -> Result<Option<Worker>> {
        Ok(self.workers.lock().get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Worker>> {
        Ok(self.workers.lock().values().cloned().collect())
    }

    async fn set_heartbeat(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut workers = self.workers.lock();
        let worker = workers.get_mut(id).ok_or_else(|| CoreError::not_found_id(id))?;
        worker.last_heartbeat_at = Some(at);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.workers.lock().remove(id).ok_or_else(|| CoreError::not_found_id(id))?;
        Ok(())
    }
}

/// In-memory [`RunRepository`].
#[derive(Default)]
pub struct MockRunRepository {
    runs: Mutex<HashMap<String, Run>>,
    heartbeats: Mutex<HashMap<String, HeartbeatState>>,
}

impl MockRunRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunRepository for MockRunRepository {
    async fn insert(&self, run: Run) -> Result<Run> {
        self.runs.lock().insert(run.id.clone(), run.clone());
        Ok(run)
    }

    async fn get(&self, id: &str) -> Result<Option<Run>> {
        Ok(self.runs.lock().get(id).cloned())
    }

    async fn list_active(&self) -> Result<Vec<Run>> {
        Ok(self
            .runs
            .lock()
            .values()
            .filter(|r| r.status == RunStatus::Running)
            .cloned()
            .collect())
    }

    async fn finish(&self, id: &str, status: RunStatus, ended_at: DateTime<Utc>) -> Result<Run> {
        let mut runs = self.runs.lock();
        let run = runs.get_mut(id).ok_or_else(|| CoreError::not_found_id(id))?;
        run.status = status;
        run.ended_at = Some(ended_at);
        Ok(run.clone())
    }

    async fn get_heartbeat(&self, run_id: &str) -> Result<Option<HeartbeatState>> {
        Ok(self.heartbeats.lock().get(run_id).cloned())
    }

    async fn upsert_heartbeat(&self, state: HeartbeatState) -> Result<HeartbeatState> {
        self.heartbeats.lock().insert(state.run_id.clone(), state.clone());
        Ok(state)
    }
}

/// In-memory [`LearningRepository`]. `bm25_search` does a plain substring
/// match rather than real BM25 ranking — good enough to exercise the
/// retrieval pipeline's control flow without a database.
#[derive(Default)]
pub struct MockLearningRepository {
    learnings: Mutex<HashMap<String, Learning>>,
}

impl MockLearningRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LearningRepository for MockLearningRepository {
    async fn insert(&self, learning: Learning) -> Result<Learning> {
        self.learnings.lock().insert(learning.id.clone(), learning.clone());
        Ok(learning)
    }

    async fn get(&self, id: &str) -> Result<Option<Learning>> {
        Ok(self.learnings.lock().get(id).cloned())
    }

    async fn bm25_search(&self, query: &str, limit: u32) -> Result<Vec<BM25Hit>> {
        let needle = query.to_lowercase();
        let mut hits: Vec<BM25Hit> = self
            .learnings
            .lock()
            .values()
            .filter(|l| l.content.to_lowercase().contains(&needle))
            .map(|l| BM25Hit { learning_id: l.id.clone(), score: 1.0 })
            .collect();
        hits.truncate(limit as usize);
        Ok(hits)
    }

    async fn get_many(&self, ids: &[String]) -> Result<Vec<Learning>> {
        let learnings = self.learnings.lock();
        Ok(ids.iter().filter_map(|id| learnings.get(id).cloned()).collect())
    }

    async fn record_usage(&self, id: &str) -> Result<()> {
        let mut learnings = self.learnings.lock();
        let learning = learnings.get_mut(id).ok_or_else(|| CoreError::not_found_id(id))?;
        learning.usage_count += 1;
        Ok(())
    }
}

/// In-memory [`CandidateRepository`].
#[derive(Default)]
pub struct MockCandidateRepository {
    candidates: Mutex<HashMap<String, Candidate>>,
}

impl MockCandidateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CandidateRepository for MockCandidateRepository {
    async fn insert(&self, candidate: Candidate) -> Result<Candidate> {
        self.candidates.lock().insert(candidate.id.clone(), candidate.clone());
        Ok(candidate)
    }

    async fn get(&self, id: &str) -> Result<Option<Candidate>> {
        Ok(self.candidates.lock().get(id).cloned())
    }

    async fn list_by_status(&self, status: CandidateStatus) -> Result<Vec<Candidate>> {
        Ok(self
            .candidates
            .lock()
            .values()
            .filter(|c| c.status == status)
            .cloned()
            .collect())
    }

    async fn set_status(&self, id: &str, status: CandidateStatus) -> Result<Candidate> {
        let mut candidates = self.candidates.lock();
        let candidate = candidates.get_mut(id).ok_or_else(|| CoreError::not_found_id(id))?;
        candidate.status = status;
        Ok(candidate.clone())
    }
}

/// In-memory [`EdgeRepository`].
#[derive(Default)]
pub struct MockEdgeRepository {
    edges: Mutex<HashMap<i64, Edge>>,
    next_id: Mutex<i64>,
}

impl MockEdgeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EdgeRepository for MockEdgeRepository {
    async fn insert(&self, mut edge: Edge) -> Result<Edge> {
        let id = next_id(&self.next_id);
        edge.id = id;
        self.edges.lock().insert(id, edge.clone());
        Ok(edge)
    }

    async fn invalidate(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let mut edges = self.edges.lock();
        let edge = edges.get_mut(&id).ok_or(CoreError::NotFound(id.to_string()))?;
        edge.invalidated_at = Some(at);
        Ok(())
    }

    async fn neighbors(&self, node_type: NodeType, node_id: &str, edge_types: &[String]) -> Result<Vec<Edge>> {
        Ok(self
            .edges
            .lock()
            .values()
            .filter(|e| e.invalidated_at.is_none())
            .filter(|e| {
                (e.from_type == node_type && e.from_id == node_id)
                    || (e.to_type == node_type && e.to_id == node_id)
            })
            .filter(|e| edge_types.is_empty() || edge_types.contains(&e.edge_type))
            .cloned()
            .collect())
    }
}

/// In-memory [`SyncConfigRepository`].
pub struct MockSyncConfigRepository {
    config: Mutex<SyncConfig>,
}

impl Default for MockSyncConfigRepository {
    fn default() -> Self {
        Self { config: Mutex::new(SyncConfig::default()) }
    }
}

impl MockSyncConfigRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SyncConfigRepository for MockSyncConfigRepository {
    async fn get(&self) -> Result<SyncConfig> {
        Ok(self.config.lock().clone())
    }

    async fn set_last_export(&self, at: DateTime<Utc>) -> Result<()> {
        self.config.lock().last_export_at = Some(at);
        Ok(())
    }

    async fn set_last_import(&self, at: DateTime<Utc>) -> Result<()> {
        self.config.lock().last_import_at = Some(at);
        Ok(())
    }

    async fn set_auto_sync(&self, enabled: bool) -> Result<()> {
        self.config.lock().auto_sync = enabled;
        Ok(())
    }
}

/// Convenience bundle for tests that need the whole task/dependency pair
/// wired together, mirroring how `TaskService::new` takes both.
pub fn task_service_fakes() -> (Arc<MockTaskRepository>, Arc<MockTaskDependencyRepository>) {
    (Arc::new(MockTaskRepository::new()), Arc::new(MockTaskDependencyRepository::new()))
}

/// Convenience bundle for `ClaimService::new`.
pub fn claim_service_fakes() -> (Arc<MockClaimRepository>, Arc<MockTaskRepository>) {
    (Arc::new(MockClaimRepository::new()), Arc::new(MockTaskRepository::new()))
}
