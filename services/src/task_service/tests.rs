use std::sync::Arc;

use tx_core::{
    error::CoreError,
    models::{TaskFilter, TaskStatus, UpdateTask},
};
use tx_mocks::{task_service_fakes, NewTaskBuilder};

use super::TaskService;

fn service() -> TaskService {
    let (tasks, deps) = task_service_fakes();
    TaskService::new(tasks, deps)
}

#[tokio::test]
async fn create_rejects_missing_parent() {
    let svc = service();
    let result = svc
        .create(NewTaskBuilder::new().with_title("orphan").with_parent("tsk-ghost").build())
        .await;
    assert!(matches!(result, Err(CoreError::NotFound(_))));
}

#[tokio::test]
async fn create_then_get_round_trips() {
    let svc = service();
    let task = svc.create(NewTaskBuilder::new().with_title("hello").build()).await.unwrap();

    let fetched = svc.get(&task.id).await.unwrap().unwrap();
    assert_eq!(fetched.id, task.id);
    assert_eq!(fetched.status, TaskStatus::Backlog);
}

#[tokio::test]
async fn update_rejects_self_parent() {
    let svc = service();
    let task = svc.create(NewTaskBuilder::new().with_title("root").build()).await.unwrap();

    let result = svc
        .update(&task.id, UpdateTask { parent_id: Some(Some(task.id.clone())), ..Default::default() })
        .await;
    assert!(matches!(result, Err(CoreError::CyclicParent(_))));
}

#[tokio::test]
async fn crossing_to_done_auto_completes_parent_when_all_children_done() {
    let svc = service();
    let parent = svc.create(NewTaskBuilder::new().with_title("parent").build()).await.unwrap();
    let child_a = svc
        .create(NewTaskBuilder::new().with_title("child a").with_parent(parent.id.clone()).build())
        .await
        .unwrap();
    let child_b = svc
        .create(NewTaskBuilder::new().with_title("child b").with_parent(parent.id.clone()).build())
        .await
        .unwrap();

    svc.update(&child_a.id, UpdateTask { status: Some(TaskStatus::Active), ..Default::default() })
        .await
        .unwrap();
    svc.update(&child_a.id, UpdateTask { status: Some(TaskStatus::Done), ..Default::default() })
        .await
        .unwrap();

    let parent_after_one = svc.get(&parent.id).await.unwrap().unwrap();
    assert_ne!(parent_after_one.status, TaskStatus::Done, "one of two children done should not complete parent");

    svc.update(&child_b.id, UpdateTask { status: Some(TaskStatus::Active), ..Default::default() })
        .await
        .unwrap();
    svc.update(&child_b.id, UpdateTask { status: Some(TaskStatus::Done), ..Default::default() })
        .await
        .unwrap();

    let parent_after_both = svc.get(&parent.id).await.unwrap().unwrap();
    assert_eq!(parent_after_both.status, TaskStatus::Done, "all children done should auto-complete parent");
}

#[tokio::test]
async fn remove_without_cascade_fails_when_children_exist() {
    let svc = service();
    let parent = svc.create(NewTaskBuilder::new().with_title("parent").build()).await.unwrap();
    svc.create(NewTaskBuilder::new().with_title("child").with_parent(parent.id.clone()).build())
        .await
        .unwrap();

    let result = svc.remove(&parent.id, false).await;
    assert!(matches!(result, Err(CoreError::HasChildren(_))));
}

#[tokio::test]
async fn remove_with_cascade_deletes_descendants() {
    let svc = service();
    let parent = svc.create(NewTaskBuilder::new().with_title("parent").build()).await.unwrap();
    let child = svc
        .create(NewTaskBuilder::new().with_title("child").with_parent(parent.id.clone()).build())
        .await
        .unwrap();
    let grandchild = svc
        .create(NewTaskBuilder::new().with_title("grandchild").with_parent(child.id.clone()).build())
        .await
        .unwrap();

    svc.remove(&parent.id, true).await.unwrap();

    assert!(svc.get(&parent.id).await.unwrap().is_none());
    assert!(svc.get(&child.id).await.unwrap().is_none());
    assert!(svc.get(&grandchild.id).await.unwrap().is_none());
}

#[tokio::test]
async fn get_with_deps_reflects_blockers_and_readiness() {
    let svc = service();
    let blocker = svc.create(NewTaskBuilder::new().with_title("blocker").build()).await.unwrap();
    let blocked = svc.create(NewTaskBuilder::new().with_title("blocked").build()).await.unwrap();

    svc.add_dependency(&blocker.id, &blocked.id).await.unwrap();

    let enriched = svc.get_with_deps(&blocked.id).await.unwrap().unwrap();
    assert_eq!(enriched.blocked_by, vec![blocker.id.clone()]);
    assert!(!enriched.is_ready, "task should not be ready while its blocker is unresolved");

    svc.update(&blocker.id, UpdateTask { status: Some(TaskStatus::Active), ..Default::default() }).await.unwrap();
    svc.update(&blocker.id, UpdateTask { status: Some(TaskStatus::Done), ..Default::default() }).await.unwrap();

    let enriched = svc.get_with_deps(&blocked.id).await.unwrap().unwrap();
    assert!(enriched.is_ready, "task should become ready once its blocker is done");
}

#[tokio::test]
async fn get_with_deps_batch_issues_bounded_queries_regardless_of_size() {
    let svc = service();
    let mut ids = Vec::new();
    for i in 0..20 {
        let t = svc.create(NewTaskBuilder::new().with_title(format!("bulk {i}")).build()).await.unwrap();
        ids.push(t.id);
    }

    let batch = svc.get_with_deps_batch(&ids).await.unwrap();
    assert_eq!(batch.len(), ids.len());
}

#[tokio::test]
async fn list_with_deps_respects_filter() {
    let svc = service();
    svc.create(NewTaskBuilder::new().with_title("a").build()).await.unwrap();
    svc.create(NewTaskBuilder::new().with_title("b").build()).await.unwrap();

    let filter = TaskFilter { limit: Some(1), ..Default::default() };
    let results = svc.list_with_deps(filter).await.unwrap();
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn add_dependency_requires_both_tasks_to_exist() {
    let svc = service();
    let task = svc.create(NewTaskBuilder::new().with_title("solo").build()).await.unwrap();

    let result = svc.add_dependency(&task.id, "tsk-ghost").await;
    assert!(matches!(result, Err(CoreError::NotFound(_))));
}
