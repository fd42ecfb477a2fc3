//! JSONL mirror: export, import, compact, and dirty-status detection over
//! `tasks.jsonl`, per spec.md §4.4 and §6.
//!
//! Every export/import runs its database work under one transaction. Import
//! additionally re-reads the file under the write lock to detect a
//! concurrent export (TOCTOU protection, spec.md GLOSSARY).

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use sqlx::Row;
use tracing::{info, instrument, warn};
use tx_core::{
    error::{CoreError, Result},
    models::TaskStatus,
    validation,
};
use tx_database::{common, Store};

const JSONL_VERSION: u32 = 1;
const EXPORT_BOUND: i64 = 100_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpsertData {
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub score: f64,
    #[serde(rename = "parentId")]
    pub parent_id: Option<String>,
    pub metadata: JsonValue,
}

/// One line of `tasks.jsonl`. `v` is carried on every variant per spec.md
/// §6 even though it is currently always 1 — a future format bump reads it
/// to pick a decoder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SyncOp {
    Upsert {
        v: u32,
        ts: DateTime<Utc>,
        id: String,
        data: UpsertData,
    },
    Delete {
        v: u32,
        ts: DateTime<Utc>,
        id: String,
    },
    DepAdd {
        v: u32,
        ts: DateTime<Utc>,
        #[serde(rename = "blockerId")]
        blocker_id: String,
        #[serde(rename = "blockedId")]
        blocked_id: String,
    },
    DepRemove {
        v: u32,
        ts: DateTime<Utc>,
        #[serde(rename = "blockerId")]
        blocker_id: String,
        #[serde(rename = "blockedId")]
        blocked_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum EntityKey {
    Task(String),
    Dependency(String, String),
}

impl SyncOp {
    fn ts(&self) -> DateTime<Utc> {
        match self {
            SyncOp::Upsert { ts, .. }
            | SyncOp::Delete { ts, .. }
            | SyncOp::DepAdd { ts, .. }
            | SyncOp::DepRemove { ts, .. } => *ts,
        }
    }

    fn entity_key(&self) -> EntityKey {
        match self {
            SyncOp::Upsert { id, .. } | SyncOp::Delete { id, .. } => EntityKey::Task(id.clone()),
            SyncOp::DepAdd { blocker_id, blocked_id, .. } | SyncOp::DepRemove { blocker_id, blocked_id, .. } => {
                EntityKey::Dependency(blocker_id.clone(), blocked_id.clone())
            }
        }
    }

    fn is_add(&self) -> bool {
        matches!(self, SyncOp::Upsert { .. } | SyncOp::DepAdd { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    pub imported: u64,
    pub skipped: u64,
    pub conflicts: u64,
    pub deleted: u64,
    pub dependency_adds: u64,
    pub dependency_removes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncStatus {
    pub db_task_count: i64,
    pub db_dependency_count: i64,
    pub jsonl_task_count: i64,
    pub jsonl_dependency_count: i64,
    pub last_export: Option<DateTime<Utc>>,
    pub last_import: Option<DateTime<Utc>>,
    pub dirty: bool,
}

pub struct SyncService {
    store: Store,
    path: PathBuf,
}

impl SyncService {
    pub fn new(store: Store, path: impl Into<PathBuf>) -> Self {
        Self { store, path: path.into() }
    }

    /// Reads every task and dependency (bounded at [`EXPORT_BOUND`]),
    /// converts each to an upsert/add, sorts by timestamp, and writes the
    /// result to a `.tmp.<pid>` sibling before atomically renaming it over
    /// the target path.
    #[instrument(skip(self))]
    pub async fn export(&self) -> Result<u64> {
        let mut tx = self.store.begin_immediate().await?;

        let task_rows = sqlx::query(
            "SELECT id, title, description, status, parent_id, score, updated_at, metadata \
             FROM tasks ORDER BY updated_at LIMIT ?",
        )
        .bind(EXPORT_BOUND)
        .fetch_all(&mut *tx.conn())
        .await
        .map_err(common::sqlx_error_to_core_error)?;

        let dep_rows = sqlx::query(
            "SELECT blocker_id, blocked_id, created_at FROM task_dependencies ORDER BY created_at LIMIT ?",
        )
        .bind(EXPORT_BOUND)
        .fetch_all(&mut *tx.conn())
        .await
        .map_err(common::sqlx_error_to_core_error)?;

        let mut ops = Vec::with_capacity(task_rows.len() + dep_rows.len());
        for row in &task_rows {
            let status_str: String = row.get("status");
            let metadata: String = row.get("metadata");
            ops.push(SyncOp::Upsert {
                v: JSONL_VERSION,
                ts: row.get("updated_at"),
                id: row.get("id"),
                data: UpsertData {
                    title: row.get("title"),
                    description: row.try_get("description").ok().flatten(),
                    status: common::string_to_status(&status_str)?,
                    score: row.get("score"),
                    parent_id: row.try_get("parent_id").ok().flatten(),
                    metadata: serde_json::from_str(&metadata).unwrap_or_else(|_| JsonValue::Object(Default::default())),
                },
            });
        }
        for row in &dep_rows {
            ops.push(SyncOp::DepAdd {
                v: JSONL_VERSION,
                ts: row.get("created_at"),
                blocker_id: row.get("blocker_id"),
                blocked_id: row.get("blocked_id"),
            });
        }
        ops.sort_by_key(|op| op.ts());

        write_ops_atomically(&self.path, &ops).await?;

        sqlx::query("UPDATE sync_config SET last_export = ? WHERE id = 1")
            .bind(Utc::now())
            .execute(&mut *tx.conn())
            .await
            .map_err(common::sqlx_error_to_core_error)?;

        tx.commit().await?;
        info!(path = %self.path.display(), count = ops.len(), "exported jsonl");
        Ok(ops.len() as u64)
    }

    #[instrument(skip(self))]
    pub async fn import(&self) -> Result<ImportReport> {
        let (initial_bytes, initial_hash) = read_and_hash(&self.path).await?;
        let ops = parse_lines(&initial_bytes)?;
        let deduped = dedup_by_entity(ops);
        let (task_ops, dep_ops): (Vec<_>, Vec<_>) = deduped.into_iter().partition(|op| {
            matches!(op, SyncOp::Upsert { .. } | SyncOp::Delete { .. })
        });
        let ordered_task_ops = topo_sort_upserts(task_ops);

        let mut tx = self.store.begin_immediate().await?;
        let mut report = ImportReport::default();
        let mut dependency_failures = Vec::new();

        for op in &ordered_task_ops {
            match op {
                SyncOp::Upsert { ts, id, data } => {
                    apply_task_upsert(&mut tx, *ts, id, data, &mut report).await?;
                }
                SyncOp::Delete { ts, id } => {
                    apply_task_delete(&mut tx, *ts, id, &mut report).await?;
                }
                _ => unreachable!("task_ops only contains Upsert/Delete"),
            }
        }

        for op in &dep_ops {
            match op {
                SyncOp::DepAdd { blocker_id, blocked_id, .. } => {
                    apply_dep_add(&mut tx, blocker_id, blocked_id, &mut report, &mut dependency_failures).await?;
                }
                SyncOp::DepRemove { blocker_id, blocked_id, .. } => {
                    apply_dep_remove(&mut tx, blocker_id, blocked_id, &mut report).await?;
                }
                _ => unreachable!("dep_ops only contains DepAdd/DepRemove"),
            }
        }

        if !dependency_failures.is_empty() {
            tx.rollback().await?;
            return Err(CoreError::Validation(format!(
                "import aborted: {} dependency operation(s) failed: {}",
                dependency_failures.len(),
                dependency_failures.join("; ")
            )));
        }

        let (_, recheck_hash) = read_and_hash(&self.path).await?;
        if recheck_hash != initial_hash {
            tx.rollback().await?;
            warn!(path = %self.path.display(), "concurrent export detected during import");
            return Err(CoreError::StaleData(
                "concurrent export detected: jsonl file changed during import".to_string(),
            ));
        }

        sqlx::query("UPDATE sync_config SET last_import = ? WHERE id = 1")
            .bind(Utc::now())
            .execute(&mut *tx.conn())
            .await
            .map_err(common::sqlx_error_to_core_error)?;

        tx.commit().await?;
        info!(?report, "imported jsonl");
        Ok(report)
    }

    /// Deduplicates by entity keeping the latest state, drops delete and
    /// dep-remove tombstones (whose entities are simply absent from the
    /// compacted file), sorts by timestamp, and writes atomically.
    #[instrument(skip(self))]
    pub async fn compact(&self) -> Result<u64> {
        let (bytes, _) = read_and_hash(&self.path).await?;
        let ops = parse_lines(&bytes)?;
        let mut deduped: Vec<SyncOp> = dedup_by_entity(ops)
            .into_iter()
            .filter(|op| op.is_add())
            .collect();
        deduped.sort_by_key(|op| op.ts());

        write_ops_atomically(&self.path, &deduped).await?;
        Ok(deduped.len() as u64)
    }

    #[instrument(skip(self))]
    pub async fn status(&self) -> Result<SyncStatus> {
        let db_task_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks")
            .fetch_one(self.store.pool())
            .await
            .map_err(common::sqlx_error_to_core_error)?;
        let db_dependency_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM task_dependencies")
            .fetch_one(self.store.pool())
            .await
            .map_err(common::sqlx_error_to_core_error)?;

        let config_row = sqlx::query("SELECT last_export, last_import FROM sync_config WHERE id = 1")
            .fetch_one(self.store.pool())
            .await
            .map_err(common::sqlx_error_to_core_error)?;
        let mut last_export: Option<DateTime<Utc>> = config_row.try_get("last_export").ok().flatten();
        let last_import: Option<DateTime<Utc>> = config_row.try_get("last_import").ok().flatten();

        let (jsonl_task_count, jsonl_dependency_count, file_exists) = match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let ops = parse_lines(&bytes).unwrap_or_default();
                let latest: Vec<SyncOp> = dedup_by_entity(ops).into_iter().filter(|op| op.is_add()).collect();
                let tasks = latest.iter().filter(|op| matches!(op, SyncOp::Upsert { .. })).count() as i64;
                let deps = latest.iter().filter(|op| matches!(op, SyncOp::DepAdd { .. })).count() as i64;
                (tasks, deps, true)
            }
            Err(_) => (0, 0, false),
        };

        if last_export.is_none() {
            if let Ok(metadata) = tokio::fs::metadata(&self.path).await {
                if let Ok(modified) = metadata.modified() {
                    last_export = Some(DateTime::<Utc>::from(modified));
                }
            }
        }

        let any_newer_task = match last_export {
            Some(at) => {
                let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE updated_at > ?")
                    .bind(at)
                    .fetch_one(self.store.pool())
                    .await
                    .map_err(common::sqlx_error_to_core_error)?;
                row.0 > 0
            }
            None => false,
        };
        let any_newer_dep = match last_export {
            Some(at) => {
                let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM task_dependencies WHERE created_at > ?")
                    .bind(at)
                    .fetch_one(self.store.pool())
                    .await
                    .map_err(common::sqlx_error_to_core_error)?;
                row.0 > 0
            }
            None => false,
        };

        let dirty = (db_task_count.0 > 0 && !file_exists)
            || last_export.is_none()
            || any_newer_task
            || any_newer_dep
            || db_task_count.0 != jsonl_task_count
            || db_dependency_count.0 != jsonl_dependency_count;

        Ok(SyncStatus {
            db_task_count: db_task_count.0,
            db_dependency_count: db_dependency_count.0,
            jsonl_task_count,
            jsonl_dependency_count,
            last_export,
            last_import,
            dirty,
        })
    }
}

async fn apply_task_upsert(
    tx: &mut tx_database::ImmediateTransaction,
    ts: DateTime<Utc>,
    id: &str,
    data: &UpsertData,
    report: &mut ImportReport,
) -> Result<()> {
    validation::validate_id_format(id)?;

    let existing = sqlx::query("SELECT updated_at FROM tasks WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx.conn())
        .await
        .map_err(common::sqlx_error_to_core_error)?;

    // If the declared parent isn't present locally (an orphaned reference
    // even after topological ordering), force it null to avoid an FK
    // violation, per spec.md §4.4 step 5.
    let parent_id = match &data.parent_id {
        Some(pid) => {
            let parent_exists = sqlx::query("SELECT 1 AS present FROM tasks WHERE id = ?")
                .bind(pid)
                .fetch_optional(&mut *tx.conn())
                .await
                .map_err(common::sqlx_error_to_core_error)?
                .is_some();
            if parent_exists { Some(pid.clone()) } else { None }
        }
        None => None,
    };

    match existing {
        None => {
            sqlx::query(
                "INSERT INTO tasks (id, title, description, status, parent_id, score, created_at, updated_at, metadata) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(id)
            .bind(&data.title)
            .bind(&data.description)
            .bind(common::status_to_string(data.status))
            .bind(&parent_id)
            .bind(data.score)
            .bind(ts)
            .bind(ts)
            .bind(data.metadata.to_string())
            .execute(&mut *tx.conn())
            .await
            .map_err(common::sqlx_error_to_core_error)?;
            report.imported += 1;
        }
        Some(row) => {
            let local_updated_at: DateTime<Utc> = row.get("updated_at");
            match ts.cmp(&local_updated_at) {
                Ordering::Greater => {
                    sqlx::query(
                        "UPDATE tasks SET title = ?, description = ?, status = ?, parent_id = ?, score = ?, \
                         updated_at = ?, metadata = ? WHERE id = ?",
                    )
                    .bind(&data.title)
                    .bind(&data.description)
                    .bind(common::status_to_string(data.status))
                    .bind(&parent_id)
                    .bind(data.score)
                    .bind(ts)
                    .bind(data.metadata.to_string())
                    .bind(id)
                    .execute(&mut *tx.conn())
                    .await
                    .map_err(common::sqlx_error_to_core_error)?;
                    report.imported += 1;
                }
                Ordering::Equal => report.skipped += 1,
                Ordering::Less => report.conflicts += 1,
            }
        }
    }
    Ok(())
}

async fn apply_task_delete(
    tx: &mut tx_database::ImmediateTransaction,
    ts: DateTime<Utc>,
    id: &str,
    report: &mut ImportReport,
) -> Result<()> {
    let existing = sqlx::query("SELECT updated_at FROM tasks WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx.conn())
        .await
        .map_err(common::sqlx_error_to_core_error)?;

    if let Some(row) = existing {
        let local_updated_at: DateTime<Utc> = row.get("updated_at");
        if ts > local_updated_at {
            sqlx::query("DELETE FROM tasks WHERE id = ?")
                .bind(id)
                .execute(&mut *tx.conn())
                .await
                .map_err(common::sqlx_error_to_core_error)?;
            report.deleted += 1;
        } else {
            report.skipped += 1;
        }
    }
    Ok(())
}

async fn apply_dep_add(
    tx: &mut tx_database::ImmediateTransaction,
    blocker_id: &str,
    blocked_id: &str,
    report: &mut ImportReport,
    failures: &mut Vec<String>,
) -> Result<()> {
    let exists = sqlx::query("SELECT 1 AS present FROM task_dependencies WHERE blocker_id = ? AND blocked_id = ?")
        .bind(blocker_id)
        .bind(blocked_id)
        .fetch_optional(&mut *tx.conn())
        .await
        .map_err(common::sqlx_error_to_core_error)?
        .is_some();
    if exists {
        return Ok(());
    }

    if blocker_id == blocked_id {
        failures.push(format!("{blocker_id} cannot block itself"));
        return Ok(());
    }

    let result = sqlx::query("INSERT INTO task_dependencies (blocker_id, blocked_id, created_at) VALUES (?, ?, ?)")
        .bind(blocker_id)
        .bind(blocked_id)
        .bind(Utc::now())
        .execute(&mut *tx.conn())
        .await;

    match result {
        Ok(_) => report.dependency_adds += 1,
        Err(e) => failures.push(format!("{blocker_id}->{blocked_id}: {e}")),
    }
    Ok(())
}

async fn apply_dep_remove(
    tx: &mut tx_database::ImmediateTransaction,
    blocker_id: &str,
    blocked_id: &str,
    report: &mut ImportReport,
) -> Result<()> {
    let result = sqlx::query("DELETE FROM task_dependencies WHERE blocker_id = ? AND blocked_id = ?")
        .bind(blocker_id)
        .bind(blocked_id)
        .execute(&mut *tx.conn())
        .await
        .map_err(common::sqlx_error_to_core_error)?;
    if result.rows_affected() > 0 {
        report.dependency_removes += 1;
    }
    Ok(())
}

fn parse_lines(bytes: &[u8]) -> Result<Vec<SyncOp>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| CoreError::Validation(format!("jsonl file is not valid UTF-8: {e}")))?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str::<SyncOp>(line)
                .map_err(|e| CoreError::Validation(format!("invalid jsonl line: {e}")))
        })
        .collect()
}

/// Deduplicates by entity key, keeping the op with the greatest `ts`; ties
/// are resolved by keeping the first one encountered (spec.md §4.4 step 3
/// calls ties "skipped", i.e. no second write wins over the first).
fn dedup_by_entity(ops: Vec<SyncOp>) -> Vec<SyncOp> {
    let mut latest: HashMap<EntityKey, SyncOp> = HashMap::new();
    for op in ops {
        let key = op.entity_key();
        match latest.get(&key) {
            Some(existing) if op.ts() <= existing.ts() => {}
            _ => {
                latest.insert(key, op);
            }
        }
    }
    latest.into_values().collect()
}

/// Orders task upserts so parents precede children. Deletes pass through
/// untouched (caller separates them from upserts before calling this).
/// Falls back to the original order if a cycle is detected, which per
/// spec.md §4.4 step 4 "is not possible in valid data".
fn topo_sort_upserts(ops: Vec<SyncOp>) -> Vec<SyncOp> {
    let mut by_id: HashMap<String, SyncOp> = HashMap::new();
    let mut deletes = Vec::new();
    let mut order_hint = Vec::new();
    for op in ops {
        match &op {
            SyncOp::Upsert { id, .. } => {
                order_hint.push(id.clone());
                by_id.insert(id.clone(), op);
            }
            SyncOp::Delete { .. } => deletes.push(op),
            _ => {}
        }
    }

    let mut in_degree: HashMap<String, usize> = order_hint.iter().map(|id| (id.clone(), 0)).collect();
    for id in &order_hint {
        if let Some(SyncOp::Upsert { data, .. }) = by_id.get(id) {
            if let Some(parent_id) = &data.parent_id {
                if in_degree.contains_key(parent_id) {
                    *in_degree.get_mut(id).unwrap() += 1;
                }
            }
        }
    }

    let mut ready: Vec<String> = order_hint.iter().filter(|id| in_degree[*id] == 0).cloned().collect();
    let mut sorted_ids = Vec::with_capacity(order_hint.len());
    let mut children_of: HashMap<String, Vec<String>> = HashMap::new();
    for id in &order_hint {
        if let Some(SyncOp::Upsert { data, .. }) = by_id.get(id) {
            if let Some(parent_id) = &data.parent_id {
                children_of.entry(parent_id.clone()).or_default().push(id.clone());
            }
        }
    }

    while let Some(id) = ready.pop() {
        sorted_ids.push(id.clone());
        if let Some(children) = children_of.get(&id) {
            for child in children {
                let entry = in_degree.get_mut(child).unwrap();
                *entry -= 1;
                if *entry == 0 {
                    ready.push(child.clone());
                }
            }
        }
    }

    if sorted_ids.len() != order_hint.len() {
        // Cycle detected; fall back to original order.
        let mut result: Vec<SyncOp> = order_hint.into_iter().map(|id| by_id.remove(&id).unwrap()).collect();
        result.extend(deletes);
        return result;
    }

    let mut result: Vec<SyncOp> = sorted_ids.into_iter().map(|id| by_id.remove(&id).unwrap()).collect();
    result.extend(deletes);
    result
}

async fn read_and_hash(path: &Path) -> Result<(Vec<u8>, String)> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        CoreError::Validation(format!("failed to read jsonl file {}: {e}", path.display()))
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok((bytes.clone(), hex::encode(hasher.finalize())))
}

async fn write_ops_atomically(path: &Path, ops: &[SyncOp]) -> Result<()> {
    let mut body = String::new();
    for op in ops {
        let line = serde_json::to_string(op)
            .map_err(|e| CoreError::Internal(format!("failed to serialize sync op: {e}")))?;
        body.push_str(&line);
        body.push('\n');
    }

    let pid = std::process::id();
    let tmp_path = path.with_extension(format!("tmp.{pid}"));
    tokio::fs::write(&tmp_path, body.as_bytes())
        .await
        .map_err(|e| CoreError::Validation(format!("failed to write temp jsonl file: {e}")))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| CoreError::Validation(format!("failed to rename temp jsonl file into place: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests;
