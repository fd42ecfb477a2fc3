//! spec.md §8 scenario B: marking every child of a parent `done` auto-
//! completes the parent, with `completedAt` equal to the update that
//! crossed the threshold — exercised against real SQLite so the crossing
//! is observed through `task_service::update`'s actual transaction, not a
//! mock repository's in-memory bookkeeping.

mod common;

use tx_core::models::{NewTask, TaskStatus, UpdateTask};

#[tokio::test]
async fn completing_every_child_auto_completes_the_parent() {
    let store = common::store().await;
    let tasks = common::task_service(&store);

    let root = tasks.create(NewTask { title: "root".to_string(), ..Default::default() }).await.unwrap();
    let a = tasks
        .create(NewTask { title: "a".to_string(), parent_id: Some(root.id.clone()), ..Default::default() })
        .await
        .unwrap();
    let b = tasks
        .create(NewTask { title: "b".to_string(), parent_id: Some(root.id.clone()), ..Default::default() })
        .await
        .unwrap();

    tasks.update(&a.id, UpdateTask { status: Some(TaskStatus::Active), ..Default::default() }).await.unwrap();
    tasks.update(&a.id, UpdateTask { status: Some(TaskStatus::Done), ..Default::default() }).await.unwrap();

    let mid_root = tasks.get(&root.id).await.unwrap().unwrap();
    assert_eq!(mid_root.status, TaskStatus::Backlog, "root must not complete while b is still open");

    tasks.update(&b.id, UpdateTask { status: Some(TaskStatus::Active), ..Default::default() }).await.unwrap();
    let completed_b = tasks.update(&b.id, UpdateTask { status: Some(TaskStatus::Done), ..Default::default() }).await.unwrap();

    let final_root = tasks.get(&root.id).await.unwrap().unwrap();
    assert_eq!(final_root.status, TaskStatus::Done);
    let root_completed_at = final_root.completed_at.expect("auto-completed root must carry a completedAt");
    assert!(root_completed_at >= completed_b.completed_at.unwrap(), "root's completedAt must not predate the child update that triggered it");
}
