//! Custom assertion helpers: task/claim equality and transition validity.

use tx_core::models::{Task, TaskStatus};

/// Assert tasks are equal ignoring timestamps.
pub fn assert_task_equals(actual: &Task, expected: &Task) {
    assert_eq!(actual.id, expected.id, "task ids don't match");
    assert_eq!(actual.title, expected.title, "task titles don't match");
    assert_eq!(actual.description, expected.description, "task descriptions don't match");
    assert_eq!(actual.status, expected.status, "task statuses don't match");
    assert_eq!(actual.parent_id, expected.parent_id, "task parent ids don't match");
}

pub fn assert_task_matches(task: &Task, matcher: &TaskMatcher) {
    if let Some(ref expected_id) = matcher.id {
        assert_eq!(task.id, *expected_id, "task id doesn't match expected");
    }
    if let Some(ref expected_title) = matcher.title {
        assert_eq!(task.title, *expected_title, "task title doesn't match expected");
    }
    if let Some(expected_status) = matcher.status {
        assert_eq!(task.status, expected_status, "task status doesn't match expected");
    }
}

/// Assert a transition is legal under `TaskStatus::can_transition_to`.
pub fn assert_transition_valid(from: TaskStatus, to: TaskStatus) {
    assert!(
        from.can_transition_to(to),
        "expected transition from {from} to {to} to be valid, but it's not"
    );
}

pub fn assert_transition_invalid(from: TaskStatus, to: TaskStatus) {
    assert!(
        !from.can_transition_to(to),
        "expected transition from {from} to {to} to be invalid, but it's valid"
    );
}

pub fn assert_contains_task_with_title(tasks: &[Task], title: &str) {
    assert!(
        tasks.iter().any(|t| t.title == title),
        "expected a task titled '{title}', found: {:?}",
        tasks.iter().map(|t| &t.title).collect::<Vec<_>>()
    );
}

pub fn assert_tasks_sorted_by_created_at_desc(tasks: &[Task]) {
    for window in tasks.windows(2) {
        assert!(
            window[0].created_at >= window[1].created_at,
            "tasks are not sorted by created_at descending: '{}' ({}) comes before '{}' ({})",
            window[0].title,
            window[0].created_at,
            window[1].title,
            window[1].created_at
        );
    }
}

/// Flexible task matcher for partial assertions.
#[derive(Debug, Default)]
pub struct TaskMatcher {
    pub id: Option<String>,
    pub title: Option<String>,
    pub status: Option<TaskStatus>,
}

impl TaskMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }
}
