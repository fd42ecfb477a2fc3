//! Random test data generators using the `fake` crate.

use chrono::Utc;
use fake::faker::lorem::en::{Paragraph, Sentence};
use fake::Fake;
use rand::Rng;
use tx_core::models::{NewTask, Task, TaskStatus};

/// Generate a realistic task title.
pub fn generate_task_title() -> String {
    Sentence(3..8).fake()
}

/// Generate a realistic task description.
pub fn generate_task_description() -> String {
    Paragraph(2..5).fake()
}

/// Generate a random, terminal-state-free task status — useful as a
/// default so generated fixtures don't accidentally collide with
/// transition-legality checks.
pub fn generate_random_task_status() -> TaskStatus {
    let statuses = [
        TaskStatus::Backlog,
        TaskStatus::Ready,
        TaskStatus::Planning,
        TaskStatus::Active,
        TaskStatus::Blocked,
        TaskStatus::Review,
        TaskStatus::Done,
    ];
    statuses[rand::thread_rng().gen_range(0..statuses.len())]
}

/// Generate a random `Task` with realistic title/description text.
pub fn generate_random_task() -> Task {
    let id: u32 = (1..999_999).fake();
    let status = generate_random_task_status();
    let now = Utc::now();
    Task {
        id: format!("tsk-{id:08x}"),
        title: generate_task_title(),
        description: Some(generate_task_description()),
        status,
        parent_id: None,
        score: (0.0..1.0).fake(),
        created_at: now,
        updated_at: now,
        completed_at: if status == TaskStatus::Done { Some(now) } else { None },
        metadata: serde_json::json!({}),
        assignee_type: None,
        assignee_id: None,
        assigned_at: None,
        assigned_by: None,
    }
}

/// Configurable task generator, e.g. for seeding a batch under a shared
/// title prefix.
pub struct TaskGenerator {
    pub title_prefix: String,
}

impl Default for TaskGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskGenerator {
    pub fn new() -> Self {
        Self { title_prefix: "Generated task".to_string() }
    }

    pub fn generate_new_task(&self) -> NewTask {
        let number: u32 = (1..9999).fake();
        NewTask {
            title: format!("{} #{number}", self.title_prefix),
            description: Some(generate_task_description()),
            parent_id: None,
            score: Some((0.0..1.0).fake()),
            metadata: None,
            assignee_type: None,
            assignee_id: None,
        }
    }
}
