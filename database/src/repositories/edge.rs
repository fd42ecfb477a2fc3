use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};
use tx_core::{
    error::{CoreError, Result},
    models::{Edge, NodeType},
    repository::EdgeRepository,
};

use crate::common::{node_type_to_string, string_to_node_type, sqlx_error_to_core_error};

#[derive(Debug, Clone)]
pub struct SqliteEdgeRepository {
    pool: SqlitePool,
}

impl SqliteEdgeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const EDGE_COLUMNS: &str =
    "id, from_type, from_id, to_type, to_id, edge_type, weight, metadata, invalidated_at";

fn row_to_edge(row: &SqliteRow) -> Result<Edge> {
    let from_type_str: String = row.get("from_type");
    let to_type_str: String = row.get("to_type");
    let metadata: String = row.get("metadata");
    Ok(Edge {
        id: row.get("id"),
        from_type: string_to_node_type(&from_type_str)?,
        from_id: row.get("from_id"),
        to_type: string_to_node_type(&to_type_str)?,
        to_id: row.get("to_id"),
        edge_type: row.get("edge_type"),
        weight: row.get("weight"),
        metadata: serde_json::from_str::<JsonValue>(&metadata)
            .unwrap_or_else(|_| JsonValue::Object(Default::default())),
        invalidated_at: row.try_get("invalidated_at").ok().flatten(),
    })
}

#[async_trait]
impl EdgeRepository for SqliteEdgeRepository {
    async fn insert(&self, edge: Edge) -> Result<Edge> {
        let metadata = serde_json::to_string(&edge.metadata).unwrap_or_else(|_| "{}".to_string());

        let row = sqlx::query(&format!(
            "INSERT INTO edges (from_type, from_id, to_type, to_id, edge_type, weight, metadata, invalidated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {EDGE_COLUMNS}"
        ))
        .bind(node_type_to_string(edge.from_type))
        .bind(&edge.from_id)
        .bind(node_type_to_string(edge.to_type))
        .bind(&edge.to_id)
        .bind(&edge.edge_type)
        .bind(edge.weight)
        .bind(metadata)
        .bind(edge.invalidated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(sqlx_error_to_core_error)?;

        row_to_edge(&row)
    }

    async fn invalidate(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query("UPDATE edges SET invalidated_at = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("edge '{id}' not found")));
        }
        Ok(())
    }

    async fn neighbors(
        &self,
        node_type: NodeType,
        node_id: &str,
        edge_types: &[String],
    ) -> Result<Vec<Edge>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {EDGE_COLUMNS} FROM edges WHERE invalidated_at IS NULL AND (
                (from_type = "
        ));
        qb.push_bind(node_type_to_string(node_type));
        qb.push(" AND from_id = ");
        qb.push_bind(node_id);
        qb.push(") OR (to_type = ");
        qb.push_bind(node_type_to_string(node_type));
        qb.push(" AND to_id = ");
        qb.push_bind(node_id);
        qb.push("))");

        if !edge_types.is_empty() {
            qb.push(" AND edge_type IN (");
            {
                let mut separated = qb.separated(", ");
                for et in edge_types {
                    separated.push_bind(et);
                }
            }
            qb.push(")");
        }

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?;
        rows.iter().map(row_to_edge).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::MigrationRunner;
    use tx_core::models::edge_types;

    async fn setup() -> SqliteEdgeRepository {
        let opts = sqlx::sqlite::SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(opts).await.unwrap();
        MigrationRunner::apply_all(&pool).await.unwrap();
        SqliteEdgeRepository::new(pool)
    }

    fn sample() -> Edge {
        Edge {
            id: 0,
            from_type: NodeType::Learning,
            from_id: "lr-aaaaaa".to_string(),
            to_type: NodeType::File,
            to_id: "src/main.rs".to_string(),
            edge_type: edge_types::ANCHORED_TO.to_string(),
            weight: 1.0,
            metadata: JsonValue::Object(Default::default()),
            invalidated_at: None,
        }
    }

    #[tokio::test]
    async fn neighbors_finds_edges_from_either_side() {
        let repo = setup().await;
        repo.insert(sample()).await.unwrap();

        let from_side = repo
            .neighbors(NodeType::Learning, "lr-aaaaaa", &[])
            .await
            .unwrap();
        assert_eq!(from_side.len(), 1);

        let to_side = repo
            .neighbors(NodeType::File, "src/main.rs", &[])
            .await
            .unwrap();
        assert_eq!(to_side.len(), 1);
    }

    #[tokio::test]
    async fn invalidate_excludes_from_neighbors() {
        let repo = setup().await;
        let edge = repo.insert(sample()).await.unwrap();
        repo.invalidate(edge.id, Utc::now()).await.unwrap();

        let neighbors = repo
            .neighbors(NodeType::Learning, "lr-aaaaaa", &[])
            .await
            .unwrap();
        assert!(neighbors.is_empty());
    }

    #[tokio::test]
    async fn invalidate_missing_edge_is_not_found() {
        let repo = setup().await;
        let err = repo.invalidate(999, Utc::now()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn neighbors_filters_by_edge_type() {
        let repo = setup().await;
        repo.insert(sample()).await.unwrap();
        let mut other = sample();
        other.edge_type = edge_types::SIMILAR_TO.to_string();
        repo.insert(other).await.unwrap();

        let filtered = repo
            .neighbors(
                NodeType::Learning,
                "lr-aaaaaa",
                &[edge_types::SIMILAR_TO.to_string()],
            )
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].edge_type, edge_types::SIMILAR_TO);
    }
}
