use async_trait::async_trait;
use chrono::Utc;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tx_core::{
    error::{CoreError, Result},
    models::TaskDependency,
    repository::TaskDependencyRepository,
};

use crate::common::sqlx_error_to_core_error;

#[derive(Debug, Clone)]
pub struct SqliteTaskDependencyRepository {
    pool: SqlitePool,
}

impl SqliteTaskDependencyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskDependencyRepository for SqliteTaskDependencyRepository {
    async fn add(&self, blocker_id: &str, blocked_id: &str) -> Result<TaskDependency> {
        if blocker_id == blocked_id {
            return Err(CoreError::Validation(
                "a task cannot block itself".to_string(),
            ));
        }
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO task_dependencies (blocker_id, blocked_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(blocker_id)
        .bind(blocked_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(sqlx_error_to_core_error)?;

        Ok(TaskDependency {
            blocker_id: blocker_id.to_string(),
            blocked_id: blocked_id.to_string(),
            created_at: now,
        })
    }

    async fn remove(&self, blocker_id: &str, blocked_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM task_dependencies WHERE blocker_id = ? AND blocked_id = ?",
        )
        .bind(blocker_id)
        .bind(blocked_id)
        .execute(&self.pool)
        .await
        .map_err(sqlx_error_to_core_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn exists(&self, blocker_id: &str, blocked_id: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 AS present FROM task_dependencies WHERE blocker_id = ? AND blocked_id = ?",
        )
        .bind(blocker_id)
        .bind(blocked_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(sqlx_error_to_core_error)?;
        Ok(row.is_some())
    }

    async fn blockers_of(&self, blocked_id: &str) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT blocker_id FROM task_dependencies WHERE blocked_id = ?")
            .bind(blocked_id)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?;
        Ok(rows.into_iter().map(|r| r.get("blocker_id")).collect())
    }

    async fn blocked_by(&self, blocker_id: &str) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT blocked_id FROM task_dependencies WHERE blocker_id = ?")
            .bind(blocker_id)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?;
        Ok(rows.into_iter().map(|r| r.get("blocked_id")).collect())
    }

    async fn snapshot_for(&self, ids: &[String]) -> Result<Vec<(String, String)>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT blocked_id, blocker_id FROM task_dependencies WHERE blocked_id IN (",
        );
        {
            let mut separated = qb.separated(", ");
            for id in ids {
                separated.push_bind(id);
            }
        }
        qb.push(") OR blocker_id IN (");
        {
            let mut separated = qb.separated(", ");
            for id in ids {
                separated.push_bind(id);
            }
        }
        qb.push(")");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get("blocked_id"), r.get("blocker_id")))
            .collect())
    }

    async fn remove_all_mentioning(&self, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("DELETE FROM task_dependencies WHERE blocker_id IN (");
        {
            let mut separated = qb.separated(", ");
            for id in ids {
                separated.push_bind(id);
            }
        }
        qb.push(") OR blocked_id IN (");
        {
            let mut separated = qb.separated(", ");
            for id in ids {
                separated.push_bind(id);
            }
        }
        qb.push(")");

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?;
        Ok(result.rows_affected())
    }

    async fn list_all(&self, limit: u32) -> Result<Vec<TaskDependency>> {
        let rows = sqlx::query(
            "SELECT blocker_id, blocked_id, created_at FROM task_dependencies ORDER BY created_at LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_error_to_core_error)?;
        Ok(rows
            .into_iter()
            .map(|r| TaskDependency {
                blocker_id: r.get("blocker_id"),
                blocked_id: r.get("blocked_id"),
                created_at: r.get("created_at"),
            })
            .collect())
    }
}
