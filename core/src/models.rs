use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// A unit of work in the task graph.
///
/// Identity is an opaque, content-addressed string matching the ID format
/// enforced by the storage layer's CHECK constraint (see [`crate::validation`]).
/// `parent_id` forms a tree (not a DAG): a task may have at most one parent,
/// and the parent chain must stay acyclic (enforced in the task service, not
/// here — this struct carries no invariants of its own beyond its shape).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub parent_id: Option<String>,
    pub score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub metadata: JsonValue,
    pub assignee_type: Option<AssigneeType>,
    pub assignee_id: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub assigned_by: Option<String>,
}

/// Task lifecycle states.
///
/// `Backlog`, `Ready`, and `Planning` are the "workable" set: a task in one
/// of these statuses is eligible to become `ready` once its blockers clear.
/// `Done` and `Cancelled` are terminal under the ordinary transition table;
/// only a privileged `forceStatus`-style write may leave them.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Backlog,
    Ready,
    Planning,
    Active,
    Blocked,
    Review,
    Done,
    Cancelled,
    Failed,
}

impl TaskStatus {
    /// The set of statuses spec.md calls "workable": a task can be `ready`
    /// only while sitting in one of these.
    pub fn is_workable(self) -> bool {
        matches!(self, TaskStatus::Backlog | TaskStatus::Ready | TaskStatus::Planning)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Backlog => "backlog",
            TaskStatus::Ready => "ready",
            TaskStatus::Planning => "planning",
            TaskStatus::Active => "active",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Review => "review",
            TaskStatus::Done => "done",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "backlog" => TaskStatus::Backlog,
            "ready" => TaskStatus::Ready,
            "planning" => TaskStatus::Planning,
            "active" => TaskStatus::Active,
            "blocked" => TaskStatus::Blocked,
            "review" => TaskStatus::Review,
            "done" => TaskStatus::Done,
            "cancelled" => TaskStatus::Cancelled,
            "failed" => TaskStatus::Failed,
            _ => return None,
        })
    }

    /// Static legality table for ordinary transitions. `forceStatus`-style
    /// privileged writes bypass this entirely (see the task/claim services).
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        if self == next {
            return false;
        }
        matches!(
            (self, next),
            (Backlog, Ready | Planning | Active | Cancelled)
                | (Ready, Planning | Active | Backlog | Cancelled)
                | (Planning, Active | Ready | Backlog | Cancelled)
                | (Active, Review | Blocked | Done | Backlog | Cancelled | Failed)
                | (Blocked, Active | Cancelled)
                | (Review, Active | Done | Cancelled)
                | (Failed, Backlog | Cancelled)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who (or what) a task is assigned to.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssigneeType {
    Agent,
    Human,
}

impl AssigneeType {
    pub fn as_str(self) -> &'static str {
        match self {
            AssigneeType::Agent => "agent",
            AssigneeType::Human => "human",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "agent" => AssigneeType::Agent,
            "human" => AssigneeType::Human,
            _ => return None,
        })
    }
}

/// Input to the task service's `create` operation.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub parent_id: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub metadata: Option<JsonValue>,
    pub assignee_type: Option<AssigneeType>,
    pub assignee_id: Option<String>,
}

/// Patch applied by `update`. Only `Some` fields are written; `description`
/// and `parent_id` use double-`Option` so callers can distinguish "leave
/// unchanged" from "set to null".
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateTask {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub parent_id: Option<Option<String>>,
    pub score: Option<f64>,
    pub metadata: Option<JsonValue>,
    pub assignee_type: Option<Option<AssigneeType>>,
    pub assignee_id: Option<Option<String>>,
    pub assigned_by: Option<Option<String>>,
}

/// Filter criteria accepted by `list` / `count`.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<StatusFilter>,
    pub parent_id: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone)]
pub enum StatusFilter {
    One(TaskStatus),
    AnyOf(Vec<TaskStatus>),
}

/// A task enriched with its graph neighborhood, as returned by
/// `getWithDeps`. This is the DTO every adapter (CLI, HTTP, MCP) must
/// serialize identically (spec.md §8, invariant 14).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskWithDeps {
    #[serde(flatten)]
    pub task: Task,
    pub blocked_by: Vec<String>,
    pub blocks: Vec<String>,
    pub children: Vec<String>,
    pub is_ready: bool,
}

/// A blocker -> blocked edge. `blocker` must complete before `blocked` is
/// workable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskDependency {
    pub blocker_id: String,
    pub blocked_id: String,
    pub created_at: DateTime<Utc>,
}

/// A worker's time-bounded exclusive hold on a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claim {
    pub id: i64,
    pub task_id: String,
    pub worker_id: String,
    pub claimed_at: DateTime<Utc>,
    pub lease_expires_at: DateTime<Utc>,
    pub renewed_count: i32,
    pub status: ClaimStatus,
}

#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Active,
    Released,
    Expired,
    Completed,
}

impl ClaimStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ClaimStatus::Active => "active",
            ClaimStatus::Released => "released",
            ClaimStatus::Expired => "expired",
            ClaimStatus::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "active" => ClaimStatus::Active,
            "released" => ClaimStatus::Released,
            "expired" => ClaimStatus::Expired,
            "completed" => ClaimStatus::Completed,
            _ => return None,
        })
    }
}

/// A worker process registered with the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Worker {
    pub id: String,
    pub name: String,
    pub hostname: String,
    pub pid: i64,
    pub status: WorkerStatus,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub current_task_id: Option<String>,
    pub capabilities: Vec<String>,
    pub metadata: JsonValue,
}

#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Starting,
    Idle,
    Busy,
    Stopping,
    Dead,
}

impl WorkerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerStatus::Starting => "starting",
            WorkerStatus::Idle => "idle",
            WorkerStatus::Busy => "busy",
            WorkerStatus::Stopping => "stopping",
            WorkerStatus::Dead => "dead",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "starting" => WorkerStatus::Starting,
            "idle" => WorkerStatus::Idle,
            "busy" => WorkerStatus::Busy,
            "stopping" => WorkerStatus::Stopping,
            "dead" => WorkerStatus::Dead,
            _ => return None,
        })
    }
}

/// An agent execution. Heartbeat bookkeeping (below) tracks whether it's
/// still making progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Run {
    pub id: String,
    pub task_id: Option<String>,
    pub worker_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
}

#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Cancelled,
    Terminated,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Terminated => "terminated",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "running" => RunStatus::Running,
            "completed" => RunStatus::Completed,
            "cancelled" => RunStatus::Cancelled,
            "terminated" => RunStatus::Terminated,
            _ => return None,
        })
    }
}

/// Stall-detection bookkeeping for a single run. A reaper compares
/// `last_activity_at` against a staleness threshold to decide whether to
/// terminate the run and reset its owning task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct HeartbeatState {
    pub run_id: String,
    pub stdout_bytes: i64,
    pub stderr_bytes: i64,
    pub transcript_bytes: i64,
    pub last_check_at: Option<DateTime<Utc>>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub last_delta_bytes: i64,
}

/// A durable, retrievable note fed into the hybrid retrieval pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Learning {
    pub id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub embedding: Option<Vec<f32>>,
    pub outcome_score: Option<f64>,
    pub usage_count: i64,
    pub category: Option<String>,
}

/// A proposed learning awaiting review before promotion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub content: String,
    pub confidence: Confidence,
    pub source_run_id: Option<String>,
    pub source_task_id: Option<String>,
    pub source_file: Option<String>,
    pub status: CandidateStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Pending,
    Promoted,
    Rejected,
}

/// A typed directed link between two graph nodes. Soft-deleted rows
/// (`invalidated_at.is_some()`) are excluded by every repository read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub id: i64,
    pub from_type: NodeType,
    pub from_id: String,
    pub to_type: NodeType,
    pub to_id: String,
    pub edge_type: String,
    pub weight: f64,
    pub metadata: JsonValue,
    pub invalidated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Learning,
    File,
    Task,
    Run,
    Doc,
}

impl NodeType {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Learning => "learning",
            NodeType::File => "file",
            NodeType::Task => "task",
            NodeType::Run => "run",
            NodeType::Doc => "doc",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "learning" => NodeType::Learning,
            "file" => NodeType::File,
            "task" => NodeType::Task,
            "run" => NodeType::Run,
            "doc" => NodeType::Doc,
            _ => return None,
        })
    }
}

/// Common edge type names. Not exhaustive — `Edge::edge_type` is a plain
/// string so the store doesn't need a migration to learn a new one.
pub mod edge_types {
    pub const ANCHORED_TO: &str = "ANCHORED_TO";
    pub const DERIVED_FROM: &str = "DERIVED_FROM";
    pub const IMPORTS: &str = "IMPORTS";
    pub const SIMILAR_TO: &str = "SIMILAR_TO";
}

/// Sync engine persisted configuration, also the `services::sync` knobs
/// loaded through `config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub auto_sync: bool,
    pub sync_dir: String,
    pub last_export_at: Option<DateTime<Utc>>,
    pub last_import_at: Option<DateTime<Utc>>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            auto_sync: false,
            sync_dir: ".tx/sync".to_string(),
            last_export_at: None,
            last_import_at: None,
        }
    }
}

/// Aggregate task statistics, mirrored after the teacher's repository
/// stats shape but keyed on the richer task/status domain.
#[derive(Debug, Clone, Default)]
pub struct TaskStats {
    pub total: u64,
    pub by_status: HashMap<TaskStatus, u64>,
    pub latest_created: Option<DateTime<Utc>>,
    pub latest_completed: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workable_set_matches_spec() {
        assert!(TaskStatus::Backlog.is_workable());
        assert!(TaskStatus::Ready.is_workable());
        assert!(TaskStatus::Planning.is_workable());
        assert!(!TaskStatus::Active.is_workable());
        assert!(!TaskStatus::Done.is_workable());
    }

    #[test]
    fn status_round_trips_through_strings() {
        for s in [
            TaskStatus::Backlog,
            TaskStatus::Ready,
            TaskStatus::Planning,
            TaskStatus::Active,
            TaskStatus::Blocked,
            TaskStatus::Review,
            TaskStatus::Done,
            TaskStatus::Cancelled,
            TaskStatus::Failed,
        ] {
            assert_eq!(TaskStatus::from_str(s.as_str()), Some(s));
        }
        assert_eq!(TaskStatus::from_str("bogus"), None);
    }

    #[test]
    fn transition_table_forbids_same_state() {
        assert!(!TaskStatus::Active.can_transition_to(TaskStatus::Active));
    }

    #[test]
    fn transition_table_matches_expected_shape() {
        assert!(TaskStatus::Backlog.can_transition_to(TaskStatus::Ready));
        assert!(TaskStatus::Active.can_transition_to(TaskStatus::Done));
        assert!(!TaskStatus::Done.can_transition_to(TaskStatus::Active));
        assert!(!TaskStatus::Cancelled.can_transition_to(TaskStatus::Active));
        assert!(TaskStatus::Failed.can_transition_to(TaskStatus::Backlog));
    }
}
