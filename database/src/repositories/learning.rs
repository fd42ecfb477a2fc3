use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tx_core::{
    error::Result,
    repository::{BM25Hit, LearningRepository},
    models::Learning,
};

use crate::common::sqlx_error_to_core_error;

#[derive(Debug, Clone)]
pub struct SqliteLearningRepository {
    pool: SqlitePool,
}

impl SqliteLearningRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const LEARNING_COLUMNS: &str = "id, content, created_at, embedding, outcome_score, usage_count, category";

fn row_to_learning(row: &SqliteRow) -> Learning {
    let embedding: Option<String> = row.try_get("embedding").ok().flatten();
    let embedding = embedding.and_then(|s| serde_json::from_str::<Vec<f32>>(&s).ok());
    Learning {
        id: row.get("id"),
        content: row.get("content"),
        created_at: row.get("created_at"),
        embedding,
        outcome_score: row.try_get("outcome_score").ok().flatten(),
        usage_count: row.get("usage_count"),
        category: row.try_get("category").ok().flatten(),
    }
}

#[async_trait]
impl LearningRepository for SqliteLearningRepository {
    async fn insert(&self, learning: Learning) -> Result<Learning> {
        let embedding = learning
            .embedding
            .as_ref()
            .map(|e| serde_json::to_string(e).unwrap_or_default());

        let row = sqlx::query(&format!(
            "INSERT INTO learnings (id, content, created_at, embedding, outcome_score, usage_count, category)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING {LEARNING_COLUMNS}"
        ))
        .bind(&learning.id)
        .bind(&learning.content)
        .bind(learning.created_at)
        .bind(embedding)
        .bind(learning.outcome_score)
        .bind(learning.usage_count)
        .bind(&learning.category)
        .fetch_one(&self.pool)
        .await
        .map_err(sqlx_error_to_core_error)?;

        Ok(row_to_learning(&row))
    }

    async fn get(&self, id: &str) -> Result<Option<Learning>> {
        let row = sqlx::query(&format!("SELECT {LEARNING_COLUMNS} FROM learnings WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?;
        Ok(row.as_ref().map(row_to_learning))
    }

    /// Queries the `learnings_fts` virtual table and ranks hits with
    /// SQLite's native `bm25()` function, negated because `bm25()` returns
    /// lower-is-better scores and the rest of the retrieval pipeline
    /// expects higher-is-better.
    async fn bm25_search(&self, query: &str, limit: u32) -> Result<Vec<BM25Hit>> {
        let rows = sqlx::query(
            "SELECT learnings.id AS id, bm25(learnings_fts) AS rank
             FROM learnings_fts
             JOIN learnings ON learnings.rowid = learnings_fts.rowid
             WHERE learnings_fts MATCH ?
             ORDER BY rank
             LIMIT ?",
        )
        .bind(query)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_error_to_core_error)?;

        Ok(rows
            .into_iter()
            .map(|r| {
                let rank: f64 = r.get("rank");
                BM25Hit {
                    learning_id: r.get("id"),
                    score: -rank,
                }
            })
            .collect())
    }

    async fn get_many(&self, ids: &[String]) -> Result<Vec<Learning>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new(format!("SELECT {LEARNING_COLUMNS} FROM learnings WHERE id IN ("));
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
        Ok(rows.iter().map(row_to_learning).collect())
    }

    async fn record_usage(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE learnings SET usage_count = usage_count + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?;
        Ok(())
    }
}
