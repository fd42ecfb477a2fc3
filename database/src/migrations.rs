use sqlx::{Row, SqlitePool};
use tx_core::error::{CoreError, Result};

/// A single ordered, described unit of schema DDL. Versions start at 1 and
/// strictly increase; the runner below never reorders or skips based on
/// anything but the version number already recorded in `schema_migrations`.
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
}

/// The full migration sequence, in this crate rather than a `migrations/`
/// directory of loose `.sql` files: this repository hand-rolls migration
/// application (see [`MigrationRunner`]) instead of delegating to
/// `sqlx::migrate!`, so there is no compile-time directory scan to feed.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create tasks and task_dependencies",
        sql: r#"
            CREATE TABLE tasks (
                id TEXT PRIMARY KEY CHECK (id GLOB 'tx-[a-z0-9]*' AND length(id) >= 9),
                title TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL DEFAULT 'backlog' CHECK (status IN
                    ('backlog','ready','planning','active','blocked','review','done','cancelled','failed')),
                parent_id TEXT REFERENCES tasks(id) ON DELETE SET NULL,
                score REAL NOT NULL DEFAULT 0.0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                completed_at TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                assignee_type TEXT CHECK (assignee_type IN ('agent','human') OR assignee_type IS NULL),
                assignee_id TEXT,
                assigned_at TEXT,
                assigned_by TEXT,
                CHECK (parent_id IS NULL OR parent_id <> id)
            );

            CREATE INDEX idx_tasks_status ON tasks(status);
            CREATE INDEX idx_tasks_parent_id ON tasks(parent_id);
            CREATE INDEX idx_tasks_score ON tasks(score);
            CREATE INDEX idx_tasks_updated_at ON tasks(updated_at);
            CREATE INDEX idx_tasks_score_id ON tasks(score DESC, id ASC);
            CREATE INDEX idx_tasks_status_score_id ON tasks(status, score DESC, id ASC);

            CREATE TABLE task_dependencies (
                blocker_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                blocked_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                PRIMARY KEY (blocker_id, blocked_id),
                CHECK (blocker_id <> blocked_id)
            );

            CREATE INDEX idx_task_dependencies_blocked ON task_dependencies(blocked_id);
        "#,
    },
    Migration {
        version: 2,
        description: "create workers and claims",
        sql: r#"
            CREATE TABLE workers (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                hostname TEXT NOT NULL,
                pid INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'starting' CHECK (status IN
                    ('starting','idle','busy','stopping','dead')),
                registered_at TEXT NOT NULL,
                last_heartbeat_at TEXT,
                current_task_id TEXT REFERENCES tasks(id) ON DELETE SET NULL,
                capabilities TEXT NOT NULL DEFAULT '[]',
                metadata TEXT NOT NULL DEFAULT '{}'
            );

            CREATE TABLE claims (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                worker_id TEXT NOT NULL REFERENCES workers(id) ON DELETE CASCADE,
                claimed_at TEXT NOT NULL,
                lease_expires_at TEXT NOT NULL,
                renewed_count INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'active' CHECK (status IN
                    ('active','released','expired','completed'))
            );

            CREATE INDEX idx_claims_task_id ON claims(task_id);
            CREATE INDEX idx_claims_worker_id ON claims(worker_id);
            CREATE UNIQUE INDEX idx_claims_one_active_per_task
                ON claims(task_id) WHERE status = 'active';
        "#,
    },
    Migration {
        version: 3,
        description: "create runs and heartbeat_state",
        sql: r#"
            CREATE TABLE runs (
                id TEXT PRIMARY KEY,
                task_id TEXT REFERENCES tasks(id) ON DELETE SET NULL,
                worker_id TEXT REFERENCES workers(id) ON DELETE SET NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                status TEXT NOT NULL DEFAULT 'running' CHECK (status IN
                    ('running','completed','cancelled','terminated'))
            );

            CREATE INDEX idx_runs_status ON runs(status);

            CREATE TABLE heartbeat_state (
                run_id TEXT PRIMARY KEY REFERENCES runs(id) ON DELETE CASCADE,
                stdout_bytes INTEGER NOT NULL DEFAULT 0,
                stderr_bytes INTEGER NOT NULL DEFAULT 0,
                transcript_bytes INTEGER NOT NULL DEFAULT 0,
                last_check_at TEXT,
                last_activity_at TEXT,
                last_delta_bytes INTEGER NOT NULL DEFAULT 0
            );
        "#,
    },
    Migration {
        version: 4,
        description: "create learnings, candidates, edges",
        sql: r#"
            CREATE TABLE learnings (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                embedding TEXT,
                outcome_score REAL,
                usage_count INTEGER NOT NULL DEFAULT 0,
                category TEXT
            );

            CREATE VIRTUAL TABLE learnings_fts USING fts5(
                content, content='learnings', content_rowid='rowid'
            );

            CREATE TRIGGER learnings_ai AFTER INSERT ON learnings BEGIN
                INSERT INTO learnings_fts(rowid, content) VALUES (new.rowid, new.content);
            END;
            CREATE TRIGGER learnings_ad AFTER DELETE ON learnings BEGIN
                INSERT INTO learnings_fts(learnings_fts, rowid, content) VALUES ('delete', old.rowid, old.content);
            END;
            CREATE TRIGGER learnings_au AFTER UPDATE ON learnings BEGIN
                INSERT INTO learnings_fts(learnings_fts, rowid, content) VALUES ('delete', old.rowid, old.content);
                INSERT INTO learnings_fts(rowid, content) VALUES (new.rowid, new.content);
            END;

            CREATE TABLE candidates (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                confidence TEXT NOT NULL CHECK (confidence IN ('low','medium','high')),
                source_run_id TEXT REFERENCES runs(id) ON DELETE SET NULL,
                source_task_id TEXT REFERENCES tasks(id) ON DELETE SET NULL,
                source_file TEXT,
                status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending','promoted','rejected')),
                created_at TEXT NOT NULL
            );

            CREATE INDEX idx_candidates_status ON candidates(status);

            CREATE TABLE edges (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                from_type TEXT NOT NULL CHECK (from_type IN ('learning','file','task','run','doc')),
                from_id TEXT NOT NULL,
                to_type TEXT NOT NULL CHECK (to_type IN ('learning','file','task','run','doc')),
                to_id TEXT NOT NULL,
                edge_type TEXT NOT NULL,
                weight REAL NOT NULL DEFAULT 1.0 CHECK (weight >= 0 AND weight <= 1),
                metadata TEXT NOT NULL DEFAULT '{}',
                invalidated_at TEXT
            );

            CREATE INDEX idx_edges_from ON edges(from_type, from_id);
            CREATE INDEX idx_edges_to ON edges(to_type, to_id);
        "#,
    },
    Migration {
        version: 5,
        description: "create sync_config",
        sql: r#"
            CREATE TABLE sync_config (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                last_export TEXT,
                last_import TEXT,
                auto_sync INTEGER NOT NULL DEFAULT 0
            );

            INSERT INTO sync_config (id, last_export, last_import, auto_sync) VALUES (1, NULL, NULL, 0);
        "#,
    },
];

/// Status snapshot returned by [`MigrationRunner::status`].
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    pub current_version: i64,
    pub latest_version: i64,
    pub pending_count: i64,
    pub applied_migrations: Vec<String>,
    pub pending_migrations: Vec<String>,
}

/// Applies [`MIGRATIONS`] against a pool, one migration per `BEGIN
/// IMMEDIATE` transaction, tracking progress in a `schema_migrations`
/// table. This stands in for `sqlx::migrate!`: the compile-time macro has
/// no hook for "rerun is a no-op" / "surface the first failing
/// description" semantics, so the sequence and bookkeeping live here
/// instead of a `migrations/` directory.
pub struct MigrationRunner;

impl MigrationRunner {
    /// Returns 0 for a database that has never been migrated.
    pub async fn current_version(pool: &SqlitePool) -> Result<i64> {
        Self::ensure_version_table(pool).await?;
        let row = sqlx::query("SELECT COALESCE(MAX(version), 0) AS v FROM schema_migrations")
            .fetch_one(pool)
            .await
            .map_err(crate::common::sqlx_error_to_core_error)?;
        Ok(row.get::<i64, _>("v"))
    }

    async fn ensure_version_table(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at TEXT NOT NULL
            )"#,
        )
        .execute(pool)
        .await
        .map_err(crate::common::sqlx_error_to_core_error)?;
        Ok(())
    }

    /// Applies every migration whose version exceeds the current schema
    /// version, in order. Idempotent: a second call with nothing pending
    /// is a no-op. On failure, returns an error naming the first offending
    /// migration's description; the partial DDL of that migration is
    /// rolled back and the version is not advanced.
    pub async fn apply_all(pool: &SqlitePool) -> Result<()> {
        let current = Self::current_version(pool).await?;

        for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
            let mut conn = pool.acquire().await.map_err(crate::common::sqlx_error_to_core_error)?;

            sqlx::query("BEGIN IMMEDIATE")
                .execute(&mut *conn)
                .await
                .map_err(crate::common::sqlx_error_to_core_error)?;

            if let Err(e) = Self::apply_one(&mut conn, migration).await {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e);
            }

            sqlx::query("COMMIT")
                .execute(&mut *conn)
                .await
                .map_err(crate::common::sqlx_error_to_core_error)?;

            tracing::info!(version = migration.version, description = migration.description, "applied migration");
        }

        Ok(())
    }

    async fn apply_one(conn: &mut sqlx::pool::PoolConnection<sqlx::Sqlite>, migration: &Migration) -> Result<()> {
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&mut *conn)
            .await
            .map_err(crate::common::sqlx_error_to_core_error)?;

        sqlx::raw_sql(migration.sql)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                CoreError::Database(format!(
                    "migration {} ('{}') failed: {e}",
                    migration.version, migration.description
                ))
            })?;

        sqlx::query(
            "INSERT INTO schema_migrations (version, description, applied_at) VALUES (?, ?, ?)",
        )
        .bind(migration.version)
        .bind(migration.description)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&mut *conn)
        .await
        .map_err(crate::common::sqlx_error_to_core_error)?;

        Ok(())
    }

    pub async fn status(pool: &SqlitePool) -> Result<MigrationStatus> {
        let current = Self::current_version(pool).await?;
        let latest = MIGRATIONS.last().map(|m| m.version).unwrap_or(0);

        let applied_migrations = MIGRATIONS
            .iter()
            .filter(|m| m.version <= current)
            .map(|m| m.description.to_string())
            .collect::<Vec<_>>();
        let pending_migrations = MIGRATIONS
            .iter()
            .filter(|m| m.version > current)
            .map(|m| m.description.to_string())
            .collect::<Vec<_>>();

        Ok(MigrationStatus {
            current_version: current,
            latest_version: latest,
            pending_count: pending_migrations.len() as i64,
            applied_migrations,
            pending_migrations,
        })
    }
}
