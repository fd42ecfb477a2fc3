//! The shared serialization type every adapter (CLI, HTTP, MCP) returns for
//! a task, so the interface-parity invariant (spec.md §8.14) is mechanical
//! rather than re-implemented per adapter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tx_core::models::{AssigneeType, TaskStatus, TaskWithDeps};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskView {
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
    pub blocked_by: Vec<String>,
    pub blocks: Vec<String>,
    pub children: Vec<String>,
    pub is_ready: bool,
}

impl From<TaskWithDeps> for TaskView {
    fn from(t: TaskWithDeps) -> Self {
        Self {
            id: t.task.id,
            title: t.task.title,
            description: t.task.description,
            status: t.task.status,
            parent_id: t.task.parent_id,
            score: t.task.score,
            created_at: t.task.created_at,
            updated_at: t.task.updated_at,
            completed_at: t.task.completed_at,
            metadata: t.task.metadata,
            assignee_type: t.task.assignee_type,
            assignee_id: t.task.assignee_id,
            assigned_at: t.task.assigned_at,
            assigned_by: t.task.assigned_by,
            blocked_by: t.blocked_by,
            blocks: t.blocks,
            children: t.children,
            is_ready: t.is_ready,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tx_core::models::Task;

    fn sample_task_with_deps() -> TaskWithDeps {
        let now = Utc::now();
        TaskWithDeps {
            task: Task {
                id: "tx-abc123".to_string(),
                title: "write docs".to_string(),
                description: None,
                status: TaskStatus::Backlog,
                parent_id: None,
                score: 1.5,
                created_at: now,
                updated_at: now,
                completed_at: None,
                metadata: serde_json::json!({}),
                assignee_type: None,
                assignee_id: None,
                assigned_at: None,
                assigned_by: None,
            },
            blocked_by: vec!["tx-dep456".to_string()],
            blocks: Vec::new(),
            children: Vec::new(),
            is_ready: false,
        }
    }

    #[test]
    fn from_task_with_deps_preserves_every_field() {
        let view: TaskView = sample_task_with_deps().into();
        assert_eq!(view.id, "tx-abc123");
        assert_eq!(view.blocked_by, vec!["tx-dep456".to_string()]);
        assert!(!view.is_ready);
    }

    #[test]
    fn serializes_with_flat_task_fields_alongside_dependency_fields() {
        let view: TaskView = sample_task_with_deps().into();
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["id"], "tx-abc123");
        assert_eq!(json["blockedBy"].is_null(), true, "fields are snake_case, not camelCase, matching the rest of the crate's DTOs");
        assert!(json["blocked_by"].is_array());
    }
}
