use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tx_core::{
    error::Result,
    models::SyncConfig,
    repository::SyncConfigRepository,
};

use crate::common::sqlx_error_to_core_error;

#[derive(Debug, Clone)]
pub struct SqliteSyncConfigRepository {
    pool: SqlitePool,
}

impl SqliteSyncConfigRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncConfigRepository for SqliteSyncConfigRepository {
    /// `sync_dir` is a filesystem configuration value owned by the service
    /// layer's config, not the store, so the row only contributes the
    /// watermark fields; callers overlay `sync_dir` from their own config.
    async fn get(&self) -> Result<SyncConfig> {
        let row = sqlx::query("SELECT last_export, last_import, auto_sync FROM sync_config WHERE id = 1")
            .fetch_one(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?;

        let auto_sync: i64 = row.get("auto_sync");
        Ok(SyncConfig {
            auto_sync: auto_sync != 0,
            last_export_at: row.try_get("last_export").ok().flatten(),
            last_import_at: row.try_get("last_import").ok().flatten(),
            ..SyncConfig::default()
        })
    }

    async fn set_last_export(&self, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE sync_config SET last_export = ? WHERE id = 1")
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?;
        Ok(())
    }

    async fn set_last_import(&self, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE sync_config SET last_import = ? WHERE id = 1")
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?;
        Ok(())
    }

    async fn set_auto_sync(&self, enabled: bool) -> Result<()> {
        sqlx::query("UPDATE sync_config SET auto_sync = ? WHERE id = 1")
            .bind(enabled as i64)
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

    async fn setup() -> SqliteSyncConfigRepository {
        let opts = sqlx::sqlite::SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(opts).await.unwrap();
        MigrationRunner::apply_all(&pool).await.unwrap();
        SqliteSyncConfigRepository::new(pool)
    }

    #[tokio::test]
    async fn seed_row_starts_with_auto_sync_disabled() {
        let repo = setup().await;
        let config = repo.get().await.unwrap();
        assert!(!config.auto_sync);
        assert!(config.last_export_at.is_none());
    }

    #[tokio::test]
    async fn watermarks_and_auto_sync_persist() {
        let repo = setup().await;
        let now = Utc::now();
        repo.set_last_export(now).await.unwrap();
        repo.set_auto_sync(true).await.unwrap();

        let config = repo.get().await.unwrap();
        assert!(config.auto_sync);
        assert!(config.last_export_at.is_some());
        assert!(config.last_import_at.is_none());
    }
}
