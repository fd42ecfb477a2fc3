use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tx_core::{
    error::{CoreError, Result},
    models::{Candidate, CandidateStatus, Confidence},
    repository::CandidateRepository,
};

use crate::common::{
    candidate_status_to_string, confidence_to_string, string_to_candidate_status,
    string_to_confidence, sqlx_error_to_core_error,
};

#[derive(Debug, Clone)]
pub struct SqliteCandidateRepository {
    pool: SqlitePool,
}

impl SqliteCandidateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const CANDIDATE_COLUMNS: &str =
    "id, content, confidence, source_run_id, source_task_id, source_file, status, created_at";

fn row_to_candidate(row: &SqliteRow) -> Result<Candidate> {
    let confidence_str: String = row.get("confidence");
    let status_str: String = row.get("status");
    Ok(Candidate {
        id: row.get("id"),
        content: row.get("content"),
        confidence: string_to_confidence(&confidence_str)?,
        source_run_id: row.try_get("source_run_id").ok().flatten(),
        source_task_id: row.try_get("source_task_id").ok().flatten(),
        source_file: row.try_get("source_file").ok().flatten(),
        status: string_to_candidate_status(&status_str)?,
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl CandidateRepository for SqliteCandidateRepository {
    async fn insert(&self, candidate: Candidate) -> Result<Candidate> {
        let row = sqlx::query(&format!(
            "INSERT INTO candidates (id, content, confidence, source_run_id, source_task_id, source_file, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {CANDIDATE_COLUMNS}"
        ))
        .bind(&candidate.id)
        .bind(&candidate.content)
        .bind(confidence_to_string(candidate.confidence))
        .bind(&candidate.source_run_id)
        .bind(&candidate.source_task_id)
        .bind(&candidate.source_file)
        .bind(candidate_status_to_string(candidate.status))
        .bind(candidate.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(sqlx_error_to_core_error)?;

        row_to_candidate(&row)
    }

    async fn get(&self, id: &str) -> Result<Option<Candidate>> {
        let row = sqlx::query(&format!("SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?;
        row.as_ref().map(row_to_candidate).transpose()
    }

    async fn list_by_status(&self, status: CandidateStatus) -> Result<Vec<Candidate>> {
        let rows = sqlx::query(&format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE status = ? ORDER BY created_at"
        ))
        .bind(candidate_status_to_string(status))
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_error_to_core_error)?;
        rows.iter().map(row_to_candidate).collect()
    }

    async fn set_status(&self, id: &str, status: CandidateStatus) -> Result<Candidate> {
        let row = sqlx::query(&format!(
            "UPDATE candidates SET status = ? WHERE id = ? RETURNING {CANDIDATE_COLUMNS}"
        ))
        .bind(candidate_status_to_string(status))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(sqlx_error_to_core_error)?;

        match row {
            Some(row) => row_to_candidate(&row),
            None => Err(CoreError::not_found_id(id)),
        }
    }
}
