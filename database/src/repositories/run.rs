use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tx_core::{
    error::{CoreError, Result},
    models::{HeartbeatState, Run, RunStatus},
    repository::RunRepository,
};

use crate::common::{run_status_to_string, sqlx_error_to_core_error, string_to_run_status};

#[derive(Debug, Clone)]
pub struct SqliteRunRepository {
    pool: SqlitePool,
}

impl SqliteRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const RUN_COLUMNS: &str = "id, task_id, worker_id, started_at, ended_at, status";
const HEARTBEAT_COLUMNS: &str =
    "run_id, stdout_bytes, stderr_bytes, transcript_bytes, last_check_at, last_activity_at, last_delta_bytes";

fn row_to_run(row: &SqliteRow) -> Result<Run> {
    let status_str: String = row.get("status");
    Ok(Run {
        id: row.get("id"),
        task_id: row.try_get("task_id").ok().flatten(),
        worker_id: row.try_get("worker_id").ok().flatten(),
        started_at: row.get("started_at"),
        ended_at: row.try_get("ended_at").ok().flatten(),
        status: string_to_run_status(&status_str)?,
    })
}

fn row_to_heartbeat(row: &SqliteRow) -> HeartbeatState {
    HeartbeatState {
        run_id: row.get("run_id"),
        stdout_bytes: row.get("stdout_bytes"),
        stderr_bytes: row.get("stderr_bytes"),
        transcript_bytes: row.get("transcript_bytes"),
        last_check_at: row.try_get("last_check_at").ok().flatten(),
        last_activity_at: row.try_get("last_activity_at").ok().flatten(),
        last_delta_bytes: row.get("last_delta_bytes"),
    }
}

#[async_trait]
impl RunRepository for SqliteRunRepository {
    async fn insert(&self, run: Run) -> Result<Run> {
        let row = sqlx::query(&format!(
            "INSERT INTO runs (id, task_id, worker_id, started_at, ended_at, status)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING {RUN_COLUMNS}"
        ))
        .bind(&run.id)
        .bind(&run.task_id)
        .bind(&run.worker_id)
        .bind(run.started_at)
        .bind(run.ended_at)
        .bind(run_status_to_string(run.status))
        .fetch_one(&self.pool)
        .await
        .map_err(sqlx_error_to_core_error)?;

        row_to_run(&row)
    }

    async fn get(&self, id: &str) -> Result<Option<Run>> {
        let row = sqlx::query(&format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?;
        row.as_ref().map(row_to_run).transpose()
    }

    async fn list_active(&self) -> Result<Vec<Run>> {
        let rows = sqlx::query(&format!(
            "SELECT {RUN_COLUMNS} FROM runs WHERE status = 'running' ORDER BY started_at"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_error_to_core_error)?;
        rows.iter().map(row_to_run).collect()
    }

    async fn finish(&self, id: &str, status: RunStatus, ended_at: DateTime<Utc>) -> Result<Run> {
        let row = sqlx::query(&format!(
            "UPDATE runs SET status = ?, ended_at = ? WHERE id = ? RETURNING {RUN_COLUMNS}"
        ))
        .bind(run_status_to_string(status))
        .bind(ended_at)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(sqlx_error_to_core_error)?;

        match row {
            Some(row) => row_to_run(&row),
            None => Err(CoreError::not_found_id(id)),
        }
    }

    async fn get_heartbeat(&self, run_id: &str) -> Result<Option<HeartbeatState>> {
        let row = sqlx::query(&format!(
            "SELECT {HEARTBEAT_COLUMNS} FROM heartbeat_state WHERE run_id = ?"
        ))
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(sqlx_error_to_core_error)?;
        Ok(row.as_ref().map(row_to_heartbeat))
    }

    async fn upsert_heartbeat(&self, state: HeartbeatState) -> Result<HeartbeatState> {
        let row = sqlx::query(&format!(
            "INSERT INTO heartbeat_state (run_id, stdout_bytes, stderr_bytes, transcript_bytes, last_check_at, last_activity_at, last_delta_bytes)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(run_id) DO UPDATE SET
                stdout_bytes = excluded.stdout_bytes,
                stderr_bytes = excluded.stderr_bytes,
                transcript_bytes = excluded.transcript_bytes,
                last_check_at = excluded.last_check_at,
                last_activity_at = excluded.last_activity_at,
                last_delta_bytes = excluded.last_delta_bytes
             RETURNING {HEARTBEAT_COLUMNS}"
        ))
        .bind(&state.run_id)
        .bind(state.stdout_bytes)
        .bind(state.stderr_bytes)
        .bind(state.transcript_bytes)
        .bind(state.last_check_at)
        .bind(state.last_activity_at)
        .bind(state.last_delta_bytes)
        .fetch_one(&self.pool)
        .await
        .map_err(sqlx_error_to_core_error)?;

        Ok(row_to_heartbeat(&row))
    }
}
