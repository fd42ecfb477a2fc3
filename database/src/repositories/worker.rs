use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tx_core::{
    error::Result,
    models::Worker,
    repository::WorkerRepository,
};

use crate::common::{sqlx_error_to_core_error, string_to_worker_status, worker_status_to_string};

#[derive(Debug, Clone)]
pub struct SqliteWorkerRepository {
    pool: SqlitePool,
}

impl SqliteWorkerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const WORKER_COLUMNS: &str =
    "id, name, hostname, pid, status, registered_at, last_heartbeat_at, current_task_id, capabilities, metadata";

fn row_to_worker(row: &SqliteRow) -> Result<Worker> {
    let status_str: String = row.get("status");
    let capabilities: String = row.get("capabilities");
    let metadata: String = row.get("metadata");
    Ok(Worker {
        id: row.get("id"),
        name: row.get("name"),
        hostname: row.get("hostname"),
        pid: row.get("pid"),
        status: string_to_worker_status(&status_str)?,
        registered_at: row.get("registered_at"),
        last_heartbeat_at: row.try_get("last_heartbeat_at").ok().flatten(),
        current_task_id: row.try_get("current_task_id").ok().flatten(),
        capabilities: serde_json::from_str(&capabilities).unwrap_or_default(),
        metadata: serde_json::from_str::<JsonValue>(&metadata)
            .unwrap_or_else(|_| JsonValue::Object(Default::default())),
    })
}

#[async_trait]
impl WorkerRepository for SqliteWorkerRepository {
    async fn upsert(&self, worker: Worker) -> Result<Worker> {
        let capabilities = serde_json::to_string(&worker.capabilities).unwrap_or_else(|_| "[]".to_string());
        let metadata = serde_json::to_string(&worker.metadata).unwrap_or_else(|_| "{}".to_string());

        let row = sqlx::query(&format!(
            "INSERT INTO workers (id, name, hostname, pid, status, registered_at, last_heartbeat_at, current_task_id, capabilities, metadata)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                hostname = excluded.hostname,
                pid = excluded.pid,
                status = excluded.status,
                last_heartbeat_at = excluded.last_heartbeat_at,
                current_task_id = excluded.current_task_id,
                capabilities = excluded.capabilities,
                metadata = excluded.metadata
             RETURNING {WORKER_COLUMNS}"
        ))
        .bind(&worker.id)
        .bind(&worker.name)
        .bind(&worker.hostname)
        .bind(worker.pid)
        .bind(worker_status_to_string(worker.status))
        .bind(worker.registered_at)
        .bind(worker.last_heartbeat_at)
        .bind(&worker.current_task_id)
        .bind(capabilities)
        .bind(metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(sqlx_error_to_core_error)?;

        row_to_worker(&row)
    }

    async fn get(&self, id: &str) -> Result<Option<Worker>> {
        let row = sqlx::query(&format!("SELECT {WORKER_COLUMNS} FROM workers WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?;
        row.as_ref().map(row_to_worker).transpose()
    }

    async fn list(&self) -> Result<Vec<Worker>> {
        let rows = sqlx::query(&format!("SELECT {WORKER_COLUMNS} FROM workers ORDER BY registered_at"))
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?;
        rows.iter().map(row_to_worker).collect()
    }

    async fn set_heartbeat(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE workers SET last_heartbeat_at = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM workers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::MigrationRunner;
    use tx_core::models::WorkerStatus;

    async fn setup() -> SqliteWorkerRepository {
        let opts = sqlx::sqlite::SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(opts).await.unwrap();
        MigrationRunner::apply_all(&pool).await.unwrap();
        SqliteWorkerRepository::new(pool)
    }

    fn sample_worker() -> Worker {
        Worker {
            id: "wk-aaaaaa".to_string(),
            name: "worker-1".to_string(),
            hostname: "host".to_string(),
            pid: 123,
            status: WorkerStatus::Idle,
            registered_at: Utc::now(),
            last_heartbeat_at: None,
            current_task_id: None,
            capabilities: vec!["rust".to_string()],
            metadata: JsonValue::Object(Default::default()),
        }
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let repo = setup().await;
        repo.upsert(sample_worker()).await.unwrap();
        let fetched = repo.get("wk-aaaaaa").await.unwrap().unwrap();
        assert_eq!(fetched.capabilities, vec!["rust".to_string()]);
    }

    #[tokio::test]
    async fn upsert_is_idempotent_update() {
        let repo = setup().await;
        repo.upsert(sample_worker()).await.unwrap();
        let mut updated = sample_worker();
        updated.status = WorkerStatus::Busy;
        repo.upsert(updated).await.unwrap();

        let fetched = repo.get("wk-aaaaaa").await.unwrap().unwrap();
        assert_eq!(fetched.status, WorkerStatus::Busy);
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_worker() {
        let repo = setup().await;
        repo.upsert(sample_worker()).await.unwrap();
        repo.delete("wk-aaaaaa").await.unwrap();
        assert!(repo.get("wk-aaaaaa").await.unwrap().is_none());
    }
}
