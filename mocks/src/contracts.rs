//! Contract tests any [`TaskRepository`] implementation should pass,
//! so the same suite can be run against both [`crate::MockTaskRepository`]
//! and `tx-database`'s SQLite implementation.

use tx_core::{
    error::CoreError,
    models::{TaskFilter, TaskStatus},
    repository::TaskRepository,
};

use crate::builders::{NewTaskBuilder, TaskFilterBuilder, UpdateTaskBuilder};

pub async fn test_repository_contract<R: TaskRepository>(repo: &R) {
    test_create_contract(repo).await;
    test_update_contract(repo).await;
    test_status_contract(repo).await;
    test_get_contract(repo).await;
    test_list_contract(repo).await;
    test_health_check_contract(repo).await;
    test_stats_contract(repo).await;
}

pub async fn test_create_contract<R: TaskRepository>(repo: &R) {
    let new_task = NewTaskBuilder::new().with_title("contract create").build();
    let task = repo.create(new_task.clone()).await.expect("create should succeed");

    assert!(!task.id.is_empty(), "created task should have a non-empty id");
    assert_eq!(task.title, new_task.title);
    assert_eq!(task.status, TaskStatus::Backlog, "new task should start in backlog");
    assert!(task.completed_at.is_none());
}

pub async fn test_update_contract<R: TaskRepository>(repo: &R) {
    let task = repo.create(NewTaskBuilder::new().with_title("update me").build()).await.unwrap();

    let update = UpdateTaskBuilder::new().with_title("updated title").build();
    let updated = repo.update(&task.id, update).await.expect("update should succeed");
    assert_eq!(updated.title, "updated title");
    assert_eq!(updated.id, task.id);

    let missing = repo.update("tsk-does-not-exist", UpdateTaskBuilder::new().build()).await;
    assert!(matches!(missing, Err(CoreError::NotFound(_))));
}

pub async fn test_status_contract<R: TaskRepository>(repo: &R) {
    let task = repo.create(NewTaskBuilder::new().with_title("status test").build()).await.unwrap();

    let active = repo
        .update(&task.id, UpdateTaskBuilder::new().with_status(TaskStatus::Active).build())
        .await
        .expect("backlog -> active should be legal");
    assert_eq!(active.status, TaskStatus::Active);

    let done = repo
        .update(&task.id, UpdateTaskBuilder::new().with_status(TaskStatus::Done).build())
        .await
        .expect("active -> done should be legal");
    assert_eq!(done.status, TaskStatus::Done);
    assert!(done.completed_at.is_some());

    let invalid = repo.update(&task.id, UpdateTaskBuilder::new().with_status(TaskStatus::Active).build()).await;
    assert!(matches!(invalid, Err(CoreError::InvalidStateTransition(_, _))));
}

pub async fn test_get_contract<R: TaskRepository>(repo: &R) {
    let task = repo.create(NewTaskBuilder::new().with_title("get test").build()).await.unwrap();

    let found = repo.get_by_id(&task.id).await.expect("get should not error").expect("task should exist");
    assert_eq!(found.id, task.id);

    let missing = repo.get_by_id("tsk-does-not-exist").await.expect("get should not error for missing id");
    assert!(missing.is_none());
}

pub async fn test_list_contract<R: TaskRepository>(repo: &R) {
    for i in 0..3 {
        repo.create(NewTaskBuilder::new().with_title(format!("list test {i}")).build()).await.unwrap();
    }

    let all = repo.list(TaskFilter::default()).await.expect("list should succeed");
    assert!(all.len() >= 3);

    let limited = repo.list(TaskFilterBuilder::new().with_limit(1).build()).await.expect("limited list should succeed");
    assert_eq!(limited.len(), 1);
}

pub async fn test_health_check_contract<R: TaskRepository>(repo: &R) {
    repo.health_check().await.expect("health check should succeed");
}

pub async fn test_stats_contract<R: TaskRepository>(repo: &R) {
    repo.create(NewTaskBuilder::new().with_title("stats test").build()).await.unwrap();

    let stats = repo.stats().await.expect("stats should succeed");
    assert!(stats.total > 0);
    assert!(!stats.by_status.is_empty());
}
