//! Function-level equivalents of the MCP tool surface's read path (spec.md
//! §6: "MCP" collaborator). No transport wiring, no tool registration — just
//! the same three operations the CLI and HTTP adapters expose, returning
//! the same [`TaskView`] DTO, so interface parity (§8 invariant 14) holds
//! by construction rather than by three independent implementations.

use tx_core::models::TaskFilter;
use tx_services::TaskService;

use crate::dto::TaskView;
use crate::error::AdapterError;

pub async fn get_task(service: &TaskService, id: &str) -> Result<Option<TaskView>, AdapterError> {
    Ok(service.get_with_deps(id).await?.map(TaskView::from))
}

pub async fn list_tasks(service: &TaskService, filter: TaskFilter) -> Result<Vec<TaskView>, AdapterError> {
    let tasks = service.list_with_deps(filter).await?;
    Ok(tasks.into_iter().map(TaskView::from).collect())
}

pub async fn list_ready_tasks(service: &TaskService) -> Result<Vec<TaskView>, AdapterError> {
    let filter = TaskFilter::default();
    let tasks = service.list_with_deps(filter).await?;
    Ok(tasks.into_iter().filter(|t| t.is_ready).map(TaskView::from).collect())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tx_core::models::{NewTask, TaskStatus, UpdateTask};
    use tx_mocks::{MockTaskDependencyRepository, MockTaskRepository};

    use super::*;

    fn service() -> TaskService {
        TaskService::new(Arc::new(MockTaskRepository::new()), Arc::new(MockTaskDependencyRepository::new()))
    }

    #[tokio::test]
    async fn get_task_returns_none_for_unknown_id() {
        let svc = service();
        assert!(get_task(&svc, "tx-doesnotexist").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_task_returns_a_task_view_for_a_known_id() {
        let svc = service();
        let task = svc.create(NewTask { title: "write docs".to_string(), ..Default::default() }).await.unwrap();
        let view = get_task(&svc, &task.id).await.unwrap().unwrap();
        assert_eq!(view.id, task.id);
        assert_eq!(view.title, "write docs");
    }

    #[tokio::test]
    async fn list_ready_tasks_excludes_blocked_tasks() {
        let svc = service();
        let blocker = svc.create(NewTask { title: "blocker".to_string(), ..Default::default() }).await.unwrap();
        let blocked = svc.create(NewTask { title: "blocked".to_string(), ..Default::default() }).await.unwrap();
        svc.add_dependency(&blocker.id, &blocked.id).await.unwrap();

        let ready = list_ready_tasks(&svc).await.unwrap();
        let ready_ids: Vec<&str> = ready.iter().map(|t| t.id.as_str()).collect();
        assert!(ready_ids.contains(&blocker.id.as_str()));
        assert!(!ready_ids.contains(&blocked.id.as_str()));

        svc.update(&blocker.id, UpdateTask { status: Some(TaskStatus::Active), ..Default::default() }).await.unwrap();
        svc.update(&blocker.id, UpdateTask { status: Some(TaskStatus::Done), ..Default::default() }).await.unwrap();
        let ready = list_ready_tasks(&svc).await.unwrap();
        let ready_ids: Vec<&str> = ready.iter().map(|t| t.id.as_str()).collect();
        assert!(ready_ids.contains(&blocked.id.as_str()), "blocked task should become ready once its blocker is done");
    }
}
