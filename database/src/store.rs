use sqlx::{pool::PoolConnection, sqlite::SqliteConnectOptions, Sqlite, SqlitePool};
use tx_core::error::Result;

use crate::{
    common::sqlx_error_to_core_error,
    migrations::{MigrationRunner, MigrationStatus},
};

/// Owns the SQLite connection pool and migration lifecycle. Every
/// repository in this crate is constructed from a `&Store` (or clones its
/// pool), the way the teacher's `SqliteTaskRepository` owns its own pool —
/// here that pool is factored out so multiple per-entity repositories can
/// share one handle instead of one repository doing everything.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (and creates, if missing) a SQLite database at `database_url`,
    /// which may be `:memory:` or a `sqlite://` path. File-backed databases
    /// use WAL journaling; in-memory databases use the in-memory journal.
    /// Both enable foreign keys and a busy timeout, matching the teacher's
    /// `SqliteTaskRepository::new`.
    pub async fn open(database_url: &str) -> Result<Self> {
        let is_memory = database_url.contains(":memory:");

        let db_url = if database_url.starts_with(":memory:") || database_url.starts_with("sqlite://")
        {
            database_url.to_string()
        } else {
            format!("sqlite://{database_url}")
        };

        if !is_memory && !Sqlite::database_exists(&db_url).await.unwrap_or(false) {
            Sqlite::create_database(&db_url)
                .await
                .map_err(sqlx_error_to_core_error)?;
        }

        let connect_options = if is_memory {
            SqliteConnectOptions::new()
                .filename(&db_url)
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Memory)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
        } else {
            SqliteConnectOptions::new()
                .filename(db_url.replace("sqlite://", ""))
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
        };

        let pool = SqlitePool::connect_with(connect_options)
            .await
            .map_err(sqlx_error_to_core_error)?;

        Ok(Self { pool })
    }

    /// Applies every pending migration. See [`MigrationRunner`].
    pub async fn migrate(&self) -> Result<()> {
        MigrationRunner::apply_all(&self.pool).await
    }

    pub async fn migration_status(&self) -> Result<MigrationStatus> {
        MigrationRunner::status(&self.pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?;
        Ok(())
    }

    /// Acquires a connection and takes the write lock eagerly via `BEGIN
    /// IMMEDIATE`, avoiding the classic SQLite upgrade deadlock where two
    /// readers both later try to promote to a writer. Every multi-statement
    /// mutation (task update, claim mutation, sync import) goes through
    /// this rather than `pool.begin()`'s plain deferred `BEGIN`.
    pub async fn begin_immediate(&self) -> Result<ImmediateTransaction> {
        let mut conn = self.pool.acquire().await.map_err(sqlx_error_to_core_error)?;
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(sqlx_error_to_core_error)?;
        Ok(ImmediateTransaction {
            conn: Some(conn),
            finished: false,
        })
    }
}

/// A `BEGIN IMMEDIATE` transaction acquired from the pool. Must be
/// finished with [`ImmediateTransaction::commit`] or
/// [`ImmediateTransaction::rollback`]; dropping without either rolls back
/// best-effort so a panicking call site never leaves the write lock held.
pub struct ImmediateTransaction {
    conn: Option<PoolConnection<Sqlite>>,
    finished: bool,
}

impl ImmediateTransaction {
    pub fn conn(&mut self) -> &mut PoolConnection<Sqlite> {
        self.conn.as_mut().expect("transaction already finished")
    }

    pub async fn commit(mut self) -> Result<()> {
        sqlx::query("COMMIT")
            .execute(&mut *self.conn())
            .await
            .map_err(sqlx_error_to_core_error)?;
        self.finished = true;
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<()> {
        sqlx::query("ROLLBACK")
            .execute(&mut *self.conn())
            .await
            .map_err(sqlx_error_to_core_error)?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for ImmediateTransaction {
    fn drop(&mut self) {
        if !self.finished {
            if let Some(mut conn) = self.conn.take() {
                tokio::spawn(async move {
                    let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_memory_and_migrate() {
        let store = Store::open(":memory:").await.unwrap();
        store.migrate().await.unwrap();
        store.health_check().await.unwrap();

        let status = store.migration_status().await.unwrap();
        assert_eq!(status.pending_count, 0);
    }

    #[tokio::test]
    async fn begin_immediate_commit_and_rollback() {
        let store = Store::open(":memory:").await.unwrap();
        store.migrate().await.unwrap();

        let mut tx = store.begin_immediate().await.unwrap();
        sqlx::query("INSERT INTO sync_config (id, auto_sync) VALUES (1, 1) ON CONFLICT(id) DO UPDATE SET auto_sync = 1")
            .execute(&mut *tx.conn())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin_immediate().await.unwrap();
        sqlx::query("UPDATE sync_config SET auto_sync = 0")
            .execute(&mut *tx.conn())
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        let row: (i64,) = sqlx::query_as("SELECT auto_sync FROM sync_config WHERE id = 1")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(row.0, 1);
    }
}
