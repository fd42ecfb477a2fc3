//! Integration tests for the mocks crate itself: verifies the in-memory
//! fakes behave like a real repository before other crates build tests on
//! top of them.

use tx_core::{
    error::CoreError,
    models::TaskStatus,
    repository::{TaskDependencyRepository, TaskRepository},
};
use tx_mocks::*;

#[tokio::test]
async fn mock_repository_basic_operations() {
    let repo = MockTaskRepository::new();

    let new_task = create_new_task();
    let task = repo.create(new_task).await.unwrap();
    assert_eq!(task.status, TaskStatus::Backlog);
    repo.assert_called("create");

    let retrieved = repo.get_by_id(&task.id).await.unwrap().unwrap();
    assert_eq!(retrieved.id, task.id);
    repo.assert_called("get_by_id");
}

#[tokio::test]
async fn mock_repository_error_injection() {
    let repo = MockTaskRepository::new();

    repo.inject_error(CoreError::not_found_id("injected"));
    let result = repo.get_by_id("tsk-x").await;
    assert!(matches!(result, Err(CoreError::NotFound(_))));

    // Injection is consumed on use; the next call succeeds.
    let result = repo.get_by_id("tsk-x").await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn mock_repository_status_transitions() {
    let repo = MockTaskRepository::new();
    let task = repo.create(create_new_task()).await.unwrap();

    let updated = repo
        .update(&task.id, UpdateTaskBuilder::new().with_status(TaskStatus::Active).build())
        .await
        .unwrap();
    assert_eq!(updated.status, TaskStatus::Active);

    let result = repo
        .update(&task.id, UpdateTaskBuilder::new().with_status(TaskStatus::Cancelled).build())
        .await;
    assert!(result.is_ok(), "active -> cancelled is a legal transition");

    let result = repo
        .update(&task.id, UpdateTaskBuilder::new().with_status(TaskStatus::Active).build())
        .await;
    assert!(matches!(result, Err(CoreError::InvalidStateTransition(_, _))));
}

#[tokio::test]
async fn fixtures_cover_every_status() {
    let tasks = create_tasks_in_all_statuses();
    assert_eq!(tasks.len(), 9);

    let statuses: Vec<_> = tasks.iter().map(|t| t.status).collect();
    for expected in [
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
        assert!(statuses.contains(&expected));
    }

    let done = tasks.iter().find(|t| t.status == TaskStatus::Done).unwrap();
    assert!(done.completed_at.is_some());
}

#[tokio::test]
async fn builder_sets_every_field() {
    let task = TaskBuilder::new()
        .with_id("tsk-00000042")
        .with_title("Built task")
        .with_status(TaskStatus::Active)
        .with_score(0.5)
        .build();

    assert_eq!(task.id, "tsk-00000042");
    assert_eq!(task.title, "Built task");
    assert_eq!(task.status, TaskStatus::Active);
    assert_eq!(task.score, 0.5);
}

#[tokio::test]
async fn assertions_catch_mismatches() {
    let task1 = create_test_task();
    let mut task2 = task1.clone();
    assert_task_equals(&task1, &task2);

    task2.title = "Different title".to_string();
    let result = std::panic::catch_unwind(|| assert_task_equals(&task1, &task2));
    assert!(result.is_err());
}

#[tokio::test]
async fn assertions_transition_table() {
    assert_transition_valid(TaskStatus::Backlog, TaskStatus::Active);
    assert_transition_valid(TaskStatus::Active, TaskStatus::Done);
    assert_transition_invalid(TaskStatus::Done, TaskStatus::Active);
    assert_transition_invalid(TaskStatus::Cancelled, TaskStatus::Active);
}

#[tokio::test]
async fn generator_produces_realistic_data() {
    let task = generate_random_task();
    assert!(task.id.starts_with("tsk-"));
    assert!(!task.title.is_empty());
    assert!(task.description.is_some());
}

#[tokio::test]
async fn mock_repository_concurrent_creates_get_unique_ids() {
    use std::sync::Arc;
    use tokio::task::JoinSet;

    let repo = Arc::new(MockTaskRepository::new());
    let mut set = JoinSet::new();

    for i in 0..10 {
        let repo = repo.clone();
        set.spawn(async move {
            let new_task = NewTaskBuilder::new().with_title(format!("concurrent {i}")).build();
            repo.create(new_task).await.unwrap()
        });
    }

    let mut tasks = Vec::new();
    while let Some(result) = set.join_next().await {
        tasks.push(result.unwrap());
    }
    assert_eq!(tasks.len(), 10);

    let mut ids: Vec<_> = tasks.iter().map(|t| t.id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 10);
}

#[tokio::test]
async fn mock_repository_stats_reflect_seeded_tasks() {
    let repo = MockTaskRepository::with_tasks(create_tasks_in_all_statuses());
    let stats = repo.stats().await.unwrap();

    assert_eq!(stats.total, 9);
    assert!(stats.by_status.contains_key(&TaskStatus::Backlog));
    assert!(stats.by_status.contains_key(&TaskStatus::Done));
    assert!(stats.latest_created.is_some());
}

#[tokio::test]
async fn dependency_repository_rejects_self_dependency() {
    let repo = MockTaskDependencyRepository::new();
    let result = repo.add("tsk-1", "tsk-1").await;
    assert!(result.is_err());
}

#[tokio::test]
async fn contract_suite_passes_against_mock() {
    let repo = MockTaskRepository::new();
    test_repository_contract(&repo).await;

    let history = repo.call_history();
    assert!(history.iter().any(|c| c.contains("create")));
    assert!(history.iter().any(|c| c.contains("get_by_id")));
}
