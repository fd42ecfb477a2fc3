use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tx_core::{
    error::{CoreError, Result},
    models::{Claim, ClaimStatus},
    repository::ClaimRepository,
};

use crate::{
    common::{claim_status_to_string, sqlx_error_to_core_error, string_to_claim_status},
    store::Store,
};

#[derive(Debug, Clone)]
pub struct SqliteClaimRepository {
    store: Store,
}

impl SqliteClaimRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    fn pool(&self) -> &SqlitePool {
        self.store.pool()
    }
}

const CLAIM_COLUMNS: &str = "id, task_id, worker_id, claimed_at, lease_expires_at, renewed_count, status";

fn row_to_claim(row: &sqlx::sqlite::SqliteRow) -> Result<Claim> {
    let status_str: String = row.get("status");
    Ok(Claim {
        id: row.get("id"),
        task_id: row.get("task_id"),
        worker_id: row.get("worker_id"),
        claimed_at: row.get("claimed_at"),
        lease_expires_at: row.get("lease_expires_at"),
        renewed_count: row.get("renewed_count"),
        status: string_to_claim_status(&status_str)?,
    })
}

#[async_trait]
impl ClaimRepository for SqliteClaimRepository {
    /// Re-checks for an existing active claim inside the same `BEGIN
    /// IMMEDIATE` transaction before inserting, so the "at most one active
    /// claim per task" guarantee doesn't rely solely on the partial unique
    /// index racing a concurrent writer — it's checked and enforced under
    /// the same write lock.
    async fn insert(
        &self,
        task_id: &str,
        worker_id: &str,
        lease_expires_at: DateTime<Utc>,
    ) -> Result<Claim> {
        let mut tx = self.store.begin_immediate().await?;

        let existing = sqlx::query(
            "SELECT 1 AS present FROM claims WHERE task_id = ? AND status = 'active'",
        )
        .bind(task_id)
        .fetch_optional(&mut *tx.conn())
        .await
        .map_err(sqlx_error_to_core_error)?;

        if existing.is_some() {
            tx.rollback().await?;
            return Err(CoreError::AlreadyClaimed(
                task_id.to_string(),
                worker_id.to_string(),
            ));
        }

        let now = Utc::now();
        let row = sqlx::query(
            &format!(
                "INSERT INTO claims (task_id, worker_id, claimed_at, lease_expires_at, renewed_count, status)
                 VALUES (?, ?, ?, ?, 0, 'active')
                 RETURNING {CLAIM_COLUMNS}"
            ),
        )
        .bind(task_id)
        .bind(worker_id)
        .bind(now)
        .bind(lease_expires_at)
        .fetch_one(&mut *tx.conn())
        .await
        .map_err(sqlx_error_to_core_error)?;

        let claim = row_to_claim(&row)?;
        tx.commit().await?;
        Ok(claim)
    }

    async fn find_active_by_task_id(&self, task_id: &str) -> Result<Option<Claim>> {
        let row = sqlx::query(&format!(
            "SELECT {CLAIM_COLUMNS} FROM claims WHERE task_id = ? AND status = 'active'"
        ))
        .bind(task_id)
        .fetch_optional(self.pool())
        .await
        .map_err(sqlx_error_to_core_error)?;
        row.as_ref().map(row_to_claim).transpose()
    }

    async fn get(&self, claim_id: i64) -> Result<Option<Claim>> {
        let row = sqlx::query(&format!("SELECT {CLAIM_COLUMNS} FROM claims WHERE id = ?"))
            .bind(claim_id)
            .fetch_optional(self.pool())
            .await
            .map_err(sqlx_error_to_core_error)?;
        row.as_ref().map(row_to_claim).transpose()
    }

    async fn set_status(&self, claim_id: i64, status: ClaimStatus) -> Result<Claim> {
        let row = sqlx::query(&format!(
            "UPDATE claims SET status = ? WHERE id = ? RETURNING {CLAIM_COLUMNS}"
        ))
        .bind(claim_status_to_string(status))
        .bind(claim_id)
        .fetch_optional(self.pool())
        .await
        .map_err(sqlx_error_to_core_error)?;

        match row {
            Some(row) => row_to_claim(&row),
            None => Err(CoreError::ClaimNotFound(claim_id)),
        }
    }

    async fn renew(&self, claim_id: i64, new_expires_at: DateTime<Utc>) -> Result<Claim> {
        let row = sqlx::query(&format!(
            "UPDATE claims SET lease_expires_at = ?, renewed_count = renewed_count + 1
             WHERE id = ? AND status = 'active' RETURNING {CLAIM_COLUMNS}"
        ))
        .bind(new_expires_at)
        .bind(claim_id)
        .fetch_optional(self.pool())
        .await
        .map_err(sqlx_error_to_core_error)?;

        match row {
            Some(row) => row_to_claim(&row),
            None => Err(CoreError::ClaimNotFound(claim_id)),
        }
    }

    async fn release_by_worker(&self, worker_id: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE claims SET status = 'released' WHERE worker_id = ? AND status = 'active'",
        )
        .bind(worker_id)
        .execute(self.pool())
        .await
        .map_err(sqlx_error_to_core_error)?;
        Ok(result.rows_affected())
    }

    async fn get_expired(&self, now: DateTime<Utc>) -> Result<Vec<Claim>> {
        let rows = sqlx::query(&format!(
            "SELECT {CLAIM_COLUMNS} FROM claims WHERE status = 'active' AND lease_expires_at < ?"
        ))
        .bind(now)
        .fetch_all(self.pool())
        .await
        .map_err(sqlx_error_to_core_error)?;
        rows.iter().map(row_to_claim).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn setup() -> (Store, SqliteClaimRepository) {
        let store = Store::open(":memory:").await.unwrap();
        store.migrate().await.unwrap();
        let repo = SqliteClaimRepository::new(store.clone());

        sqlx::query("INSERT INTO tasks (id, title, status, created_at, updated_at) VALUES ('tx-aaaaaa', 'x', 'ready', datetime('now'), datetime('now'))")
            .execute(store.pool())
            .await
            .unwrap();
        sqlx::query("INSERT INTO workers (id, name, hostname, pid, registered_at) VALUES ('wk-aaaaaa', 'w', 'h', 1, datetime('now'))")
            .execute(store.pool())
            .await
            .unwrap();
        sqlx::query("INSERT INTO workers (id, name, hostname, pid, registered_at) VALUES ('wk-bbbbbb', 'w2', 'h', 2, datetime('now'))")
            .execute(store.pool())
            .await
            .unwrap();

        (store, repo)
    }

    #[tokio::test]
    async fn second_claim_on_same_task_is_rejected() {
        let (_store, repo) = setup().await;
        let lease = Utc::now() + Duration::minutes(5);
        repo.insert("tx-aaaaaa", "wk-aaaaaa", lease).await.unwrap();

        let err = repo
            .insert("tx-aaaaaa", "wk-bbbbbb", lease)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::AlreadyClaimed(_, _)));
    }

    #[tokio::test]
    async fn renew_bumps_lease_and_count() {
        let (_store, repo) = setup().await;
        let lease = Utc::now() + Duration::minutes(5);
        let claim = repo.insert("tx-aaaaaa", "wk-aaaaaa", lease).await.unwrap();

        let new_lease = lease + Duration::minutes(5);
        let renewed = repo.renew(claim.id, new_lease).await.unwrap();
        assert_eq!(renewed.renewed_count, 1);
        assert_eq!(renewed.lease_expires_at, new_lease);
    }

    #[tokio::test]
    async fn release_by_worker_only_touches_active_claims() {
        let (_store, repo) = setup().await;
        let lease = Utc::now() + Duration::minutes(5);
        repo.insert("tx-aaaaaa", "wk-aaaaaa", lease).await.unwrap();

        let count = repo.release_by_worker("wk-aaaaaa").await.unwrap();
        assert_eq!(count, 1);
        assert!(repo
            .find_active_by_task_id("tx-aaaaaa")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn get_expired_only_returns_lapsed_active_claims() {
        let (_store, repo) = setup().await;
        let past = Utc::now() - Duration::minutes(1);
        repo.insert("tx-aaaaaa", "wk-aaaaaa", past).await.unwrap();

        let expired = repo.get_expired(Utc::now()).await.unwrap();
        assert_eq!(expired.len(), 1);
    }
}
