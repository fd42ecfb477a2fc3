//! Standard test fixtures: pre-built tasks, claims, and workers covering
//! the common states exercised by service-level tests.

use chrono::{Duration, Utc};
use tx_core::models::{Claim, ClaimStatus, NewTask, Task, TaskStatus, UpdateTask, Worker, WorkerStatus};

use crate::builders::TaskBuilder;

pub fn create_test_task() -> Task {
    TaskBuilder::new().with_id("tsk-00000001").with_title("Test task").build()
}

pub fn create_test_task_with_status(status: TaskStatus) -> Task {
    TaskBuilder::new().with_id("tsk-00000001").with_status(status).build()
}

pub fn create_test_task_with_parent(parent_id: &str) -> Task {
    TaskBuilder::new().with_id("tsk-00000002").with_parent(parent_id).build()
}

/// One task per `TaskStatus` variant, each with a distinct id.
pub fn create_tasks_in_all_statuses() -> Vec<Task> {
    [
        TaskStatus::Backlog,
        TaskStatus::Ready,
        TaskStatus::Planning,
        TaskStatus::Active,
        TaskStatus::Blocked,
        TaskStatus::Review,
        TaskStatus::Done,
        TaskStatus::Cancelled,
        TaskStatus::Failed,
    ]
    .into_iter()
    .enumerate()
    .map(|(i, status)| {
        TaskBuilder::new()
            .with_id(format!("tsk-{i:08x}"))
            .with_title(format!("{status} task"))
            .with_status(status)
            .build()
    })
    .collect()
}

/// A small parent/child tree: one root with two direct children, one of
/// which has its own child — enough to exercise cascade delete and
/// ancestor auto-completion without a combinatorial fixture.
pub fn create_task_tree() -> Vec<Task> {
    vec![
        TaskBuilder::new().with_id("tsk-root").with_title("root").build(),
        TaskBuilder::new().with_id("tsk-child-a").with_title("child a").with_parent("tsk-root").build(),
        TaskBuilder::new().with_id("tsk-child-b").with_title("child b").with_parent("tsk-root").build(),
        TaskBuilder::new().with_id("tsk-grandchild").with_title("grandchild").with_parent("tsk-child-a").build(),
    ]
}

pub fn create_new_task() -> NewTask {
    NewTask { title: "New test task".to_string(), description: Some("a new task".to_string()), ..Default::default() }
}

pub fn create_update_task() -> UpdateTask {
    UpdateTask { title: Some("Updated title".to_string()), ..Default::default() }
}

pub fn create_test_claim(task_id: &str, worker_id: &str) -> Claim {
    let now = Utc::now();
    Claim {
        id: 1,
        task_id: task_id.to_string(),
        worker_id: worker_id.to_string(),
        claimed_at: now,
        lease_expires_at: now + Duration::minutes(30),
        renewed_count: 0,
        status: ClaimStatus::Active,
    }
}

pub fn create_expired_claim(task_id: &str, worker_id: &str) -> Claim {
    let mut claim = create_test_claim(task_id, worker_id);
    claim.lease_expires_at = Utc::now() - Duration::minutes(1);
    claim
}

pub fn create_test_worker(id: &str) -> Worker {
    Worker {
        id: id.to_string(),
        name: format!("worker-{id}"),
        hostname: "localhost".to_string(),
        pid: 1234,
        status: WorkerStatus::Idle,
        registered_at: Utc::now(),
        last_heartbeat_at: None,
        current_task_id: None,
        capabilities: Vec::new(),
        metadata: serde_json::json!({}),
    }
}
