//! Fluent builders for constructing test fixtures without spelling out
//! every field of `Task`/`NewTask`/`UpdateTask`/`TaskFilter`.

use chrono::{DateTime, Utc};
use tx_core::models::{
    AssigneeType, NewTask, StatusFilter, Task, TaskFilter, TaskStatus, UpdateTask,
};

/// Builder for constructing [`Task`] instances in tests.
pub struct TaskBuilder {
    task: Task,
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskBuilder {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            task: Task {
                id: "tsk-00000001".to_string(),
                title: "Test task".to_string(),
                description: None,
                status: TaskStatus::Backlog,
                parent_id: None,
                score: 0.0,
                created_at: now,
                updated_at: now,
                completed_at: None,
                metadata: serde_json::json!({}),
                assignee_type: None,
                assignee_id: None,
                assigned_at: None,
                assigned_by: None,
            },
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.task.id = id.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.task.title = title.into();
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        if status == TaskStatus::Done && self.task.completed_at.is_none() {
            self.task.completed_at = Some(Utc::now());
        }
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.task.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.task.score = score;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.task.created_at = created_at;
        self
    }

    pub fn with_assignee(mut self, assignee_type: AssigneeType, assignee_id: impl Into<String>) -> Self {
        self.task.assignee_type = Some(assignee_type);
        self.task.assignee_id = Some(assignee_id.into());
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

/// Builder for constructing [`NewTask`] instances in tests.
pub struct NewTaskBuilder {
    new_task: NewTask,
}

impl Default for NewTaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NewTaskBuilder {
    pub fn new() -> Self {
        Self {
            new_task: NewTask {
                title: "New test task".to_string(),
                ..Default::default()
            },
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.new_task.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.new_task.description = Some(description.into());
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.new_task.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.new_task.score = Some(score);
        self
    }

    pub fn build(self) -> NewTask {
        self.new_task
    }
}

/// Builder for constructing [`UpdateTask`] patches in tests.
pub struct UpdateTaskBuilder {
    update: UpdateTask,
}

impl Default for UpdateTaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateTaskBuilder {
    pub fn new() -> Self {
        Self { update: UpdateTask::default() }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.update.title = Some(title.into());
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.update.status = Some(status);
        self
    }

    pub fn with_parent(mut self, parent_id: Option<String>) -> Self {
        self.update.parent_id = Some(parent_id);
        self
    }

    pub fn build(self) -> UpdateTask {
        self.update
    }
}

/// Builder for constructing [`TaskFilter`] instances in tests.
pub struct TaskFilterBuilder {
    filter: TaskFilter,
}

impl Default for TaskFilterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskFilterBuilder {
    pub fn new() -> Self {
        Self { filter: TaskFilter::default() }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.filter.status = Some(StatusFilter::One(status));
        self
    }

    pub fn with_any_status(mut self, statuses: Vec<TaskStatus>) -> Self {
        self.filter.status = Some(StatusFilter::AnyOf(statuses));
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.filter.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.filter.limit = Some(limit);
        self
    }

    pub fn build(self) -> TaskFilter {
        self.filter
    }
}
