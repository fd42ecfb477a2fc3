use async_trait::async_trait;
use chrono::Utc;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashMap;
use tx_core::{
    error::{CoreError, Result},
    models::{NewTask, StatusFilter, Task, TaskFilter, TaskStats, TaskStatus, UpdateTask},
    repository::TaskRepository,
    validation,
};

use crate::common::{row_to_task, sqlx_error_to_core_error, status_to_string};

/// SQLite implementation of [`TaskRepository`].
#[derive(Debug, Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const TASK_COLUMNS: &str = "id, title, description, status, parent_id, score, created_at, \
    updated_at, completed_at, metadata, assignee_type, assignee_id, assigned_at, assigned_by";

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn create(&self, task: NewTask) -> Result<Task> {
        validation::validate_new_task(&task)?;

        let now = Utc::now();
        let metadata = task
            .metadata
            .unwrap_or_else(|| serde_json::json!({}))
            .to_string();

        // On UNIQUE-constraint collision (astronomically unlikely given the
        // id's entropy, but the contract demands it) retry with a fresh id.
        let mut last_err = None;
        for _ in 0..3 {
            let id = validation::generate_task_id();
            let result = sqlx::query(&format!(
                "INSERT INTO tasks (id, title, description, status, parent_id, score, \
                 created_at, updated_at, metadata, assignee_type, assignee_id) \
                 VALUES (?, ?, ?, 'backlog', ?, ?, ?, ?, ?, ?, ?) RETURNING {TASK_COLUMNS}"
            ))
            .bind(&id)
            .bind(&task.title)
            .bind(&task.description)
            .bind(&task.parent_id)
            .bind(task.score.unwrap_or(0.0))
            .bind(now)
            .bind(now)
            .bind(&metadata)
            .bind(task.assignee_type.map(|t| t.as_str()))
            .bind(&task.assignee_id)
            .fetch_one(&self.pool)
            .await;

            match result {
                Ok(row) => return row_to_task(&row),
                Err(e) => {
                    let core_err = sqlx_error_to_core_error(e);
                    last_err = Some(core_err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| CoreError::Database("task id generation exhausted retries".into())))
    }

    async fn update(&self, id: &str, updates: UpdateTask) -> Result<Task> {
        let existing = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found_id(id))?;

        if let Some(ref title) = updates.title {
            validation::validate_title(title)?;
        }
        if let Some(ref description) = updates.description {
            validation::validate_description(description.as_deref())?;
        }
        if let Some(score) = updates.score {
            validation::validate_score(score)?;
        }
        if let Some(status) = updates.status {
            validation::validate_state_transition(&existing, status)?;
        }
        if let Some(Some(ref parent_id)) = updates.parent_id {
            if parent_id == id {
                return Err(CoreError::CyclicParent(id.to_string()));
            }
            self.reject_if_ancestor_cycle(id, parent_id).await?;
        }

        let now = Utc::now();
        let completed_at = match updates.status {
            Some(TaskStatus::Done) => Some(now),
            Some(_) => None,
            None => existing.completed_at,
        };

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE tasks SET updated_at = ");
        qb.push_bind(now);

        if let Some(ref title) = updates.title {
            qb.push(", title = ").push_bind(title.clone());
        }
        if let Some(description) = updates.description {
            qb.push(", description = ").push_bind(description);
        }
        if let Some(status) = updates.status {
            qb.push(", status = ").push_bind(status_to_string(status));
            qb.push(", completed_at = ").push_bind(completed_at);
        }
        if let Some(parent_id) = updates.parent_id {
            qb.push(", parent_id = ").push_bind(parent_id);
        }
        if let Some(score) = updates.score {
            qb.push(", score = ").push_bind(score);
        }
        if let Some(metadata) = updates.metadata {
            qb.push(", metadata = ").push_bind(metadata.to_string());
        }
        if let Some(assignee_type) = updates.assignee_type {
            qb.push(", assignee_type = ").push_bind(assignee_type.map(|t| t.as_str()));
        }
        if let Some(assignee_id) = updates.assignee_id {
            qb.push(", assignee_id = ").push_bind(assignee_id);
        }
        if let Some(assigned_by) = updates.assigned_by {
            qb.push(", assigned_by = ").push_bind(assigned_by);
        }

        qb.push(" WHERE id = ").push_bind(id.to_string());
        qb.push(format!(" RETURNING {TASK_COLUMNS}"));

        let row = qb
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?;
        row_to_task(&row)
    }

    async fn force_status(&self, id: &str, status: TaskStatus) -> Result<Task> {
        let now = Utc::now();
        let completed_at = if status == TaskStatus::Done { Some(now) } else { None };

        let row = sqlx::query(&format!(
            "UPDATE tasks SET status = ?, completed_at = ?, updated_at = ? WHERE id = ? RETURNING {TASK_COLUMNS}"
        ))
        .bind(status_to_string(status))
        .bind(completed_at)
        .bind(now)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(sqlx_error_to_core_error)?;

        match row {
            Some(row) => row_to_task(&row),
            None => Err(CoreError::not_found_id(id)),
        }
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Task>> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn list(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {TASK_COLUMNS} FROM tasks"));
        push_filter(&mut qb, &filter);
        qb.push(" ORDER BY score DESC, id ASC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?;
        rows.iter().map(row_to_task).collect()
    }

    async fn count(&self, filter: TaskFilter) -> Result<u64> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) AS c FROM tasks");
        push_filter(&mut qb, &filter);
        let row = qb
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?;
        Ok(row.get::<i64, _>("c") as u64)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?;
        Ok(())
    }

    async fn list_children(&self, parent_id: &str) -> Result<Vec<Task>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE parent_id = ?"
        ))
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_error_to_core_error)?;
        rows.iter().map(row_to_task).collect()
    }

    async fn list_children_of_many(&self, parent_ids: &[String]) -> Result<Vec<Task>> {
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {TASK_COLUMNS} FROM tasks WHERE parent_id IN ("));
        {
            let mut separated = qb.separated(", ");
            for id in parent_ids {
                separated.push_bind(id);
            }
        }
        qb.push(")");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?;
        rows.iter().map(row_to_task).collect()
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?;
        Ok(())
    }

    async fn stats(&self) -> Result<TaskStats> {
        let total_row = sqlx::query("SELECT COUNT(*) AS c FROM tasks")
            .fetch_one(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?;
        let total = total_row.get::<i64, _>("c") as u64;

        let by_status_rows = sqlx::query("SELECT status, COUNT(*) AS c FROM tasks GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?;
        let mut by_status = HashMap::new();
        for row in by_status_rows {
            let status_str: String = row.get("status");
            if let Some(status) = TaskStatus::from_str(&status_str) {
                by_status.insert(status, row.get::<i64, _>("c") as u64);
            }
        }

        let latest_created = sqlx::query("SELECT MAX(created_at) AS m FROM tasks")
            .fetch_one(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?
            .get("m");
        let latest_completed = sqlx::query("SELECT MAX(completed_at) AS m FROM tasks")
            .fetch_one(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?
            .get("m");

        Ok(TaskStats {
            total,
            by_status,
            latest_created,
            latest_completed,
        })
    }
}

impl SqliteTaskRepository {
    /// Walks the ancestor chain of `proposed_parent_id`; rejects if `id`
    /// appears anywhere in it, which would create a cycle.
    async fn reject_if_ancestor_cycle(&self, id: &str, proposed_parent_id: &str) -> Result<()> {
        let mut current = proposed_parent_id.to_string();
        let mut depth = 0;
        loop {
            if current == id {
                return Err(CoreError::CyclicParent(id.to_string()));
            }
            depth += 1;
            if depth > 1000 {
                return Err(CoreError::Internal("ancestor chain exceeds maximum depth".into()));
            }
            let row = sqlx::query("SELECT parent_id FROM tasks WHERE id = ?")
                .bind(&current)
                .fetch_optional(&self.pool)
                .await
                .map_err(sqlx_error_to_core_error)?;
            match row.and_then(|r| r.get::<Option<String>, _>("parent_id")) {
                Some(next) => current = next,
                None => return Ok(()),
            }
        }
    }
}

fn push_filter(qb: &mut QueryBuilder<Sqlite>, filter: &TaskFilter) {
    let mut has_conditions = false;
    if let Some(ref status) = filter.status {
        qb.push(" WHERE ");
        has_conditions = true;
        match status {
            StatusFilter::One(s) => {
                qb.push("status = ").push_bind(status_to_string(*s));
            }
            StatusFilter::AnyOf(statuses) => {
                qb.push("status IN (");
                {
                    let mut separated = qb.separated(", ");
                    for s in statuses {
                        separated.push_bind(status_to_string(*s));
                    }
                }
                qb.push(")");
            }
        }
    }
    if let Some(ref parent_id) = filter.parent_id {
        qb.push(if has_conditions { " AND " } else { " WHERE " });
        qb.push("parent_id = ").push_bind(parent_id.clone());
    }
}
