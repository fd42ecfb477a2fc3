//! The dashboard HTTP adapter: exactly the three routes spec.md names,
//! returning the same [`TaskView`] DTO as the CLI and MCP paths.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tx_core::models::TaskFilter;
use tx_services::TaskService;

use crate::dto::TaskView;
use crate::error::{AdapterError, ErrorBody};

pub fn router(tasks: Arc<TaskService>) -> Router {
    Router::new()
        .route("/api/tasks", get(list_tasks))
        .route("/api/tasks/ready", get(list_ready_tasks))
        .route("/api/tasks/:id", get(get_task))
        .with_state(tasks)
}

impl IntoResponse for AdapterError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorBody::from(&self))).into_response()
    }
}

async fn list_tasks(State(tasks): State<Arc<TaskService>>) -> Result<Json<Vec<TaskView>>, AdapterError> {
    let views = tasks.list_with_deps(TaskFilter::default()).await?.into_iter().map(TaskView::from).collect();
    Ok(Json(views))
}

async fn list_ready_tasks(State(tasks): State<Arc<TaskService>>) -> Result<Json<Vec<TaskView>>, AdapterError> {
    let views: Vec<TaskView> = tasks
        .list_with_deps(TaskFilter::default())
        .await?
        .into_iter()
        .filter(|t| t.is_ready)
        .map(TaskView::from)
        .collect();
    Ok(Json(views))
}

async fn get_task(State(tasks): State<Arc<TaskService>>, Path(id): Path<String>) -> Result<Json<TaskView>, AdapterError> {
    let view = tasks.get_with_deps(&id).await?.map(TaskView::from).ok_or_else(|| AdapterError::NotFound(id))?;
    Ok(Json(view))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::net::TcpListener;
    use tx_core::models::NewTask;
    use tx_mocks::{MockTaskDependencyRepository, MockTaskRepository};

    use super::*;

    fn service() -> Arc<TaskService> {
        Arc::new(TaskService::new(Arc::new(MockTaskRepository::new()), Arc::new(MockTaskDependencyRepository::new())))
    }

    /// Binds the router to an ephemeral port and returns its base URL,
    /// mirroring the teacher's own out-of-process HTTP test harness but
    /// in-process (no binary to spawn since this adapter is a library).
    async fn spawn(tasks: Arc<TaskService>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(tasks);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn get_task_returns_404_for_unknown_id() {
        let base = spawn(service()).await;
        let response = reqwest::get(format!("{base}/api/tasks/tx-missing")).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn get_task_returns_200_and_a_task_view_for_a_known_id() {
        let tasks = service();
        let task = tasks.create(NewTask { title: "ship it".to_string(), ..Default::default() }).await.unwrap();
        let base = spawn(tasks).await;

        let response = reqwest::get(format!("{base}/api/tasks/{}", task.id)).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let view: TaskView = response.json().await.unwrap();
        assert_eq!(view.id, task.id);
    }

    #[tokio::test]
    async fn list_ready_tasks_excludes_unready_tasks() {
        let tasks = service();
        tasks.create(NewTask { title: "blocked eventually".to_string(), ..Default::default() }).await.unwrap();
        let base = spawn(tasks).await;

        let response = reqwest::get(format!("{base}/api/tasks/ready")).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let views: Vec<TaskView> = response.json().await.unwrap();
        assert_eq!(views.len(), 1, "a freshly created backlog task with no blockers is ready");
    }
}
