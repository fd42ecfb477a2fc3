use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument, warn};
use tx_core::{
    error::{CoreError, Result},
    models::{Claim, ClaimStatus},
    repository::{ClaimRepository, TaskRepository},
};

/// Hard ceiling on renewals per claim (spec.md §9 open question: treated
/// as a hard ceiling regardless of lease duration — callers that need the
/// whole budget should checkpoint and re-claim).
pub const MAX_RENEWALS: i32 = 10;

pub const DEFAULT_LEASE_MINUTES: i64 = 30;

/// Lease manager over the `claims` table. A claim transitions
/// `active → released | expired | completed`, never back.
#[derive(Clone)]
pub struct ClaimService {
    claims: Arc<dyn ClaimRepository>,
    tasks: Arc<dyn TaskRepository>,
    default_lease_minutes: i64,
}

impl ClaimService {
    pub fn new(claims: Arc<dyn ClaimRepository>, tasks: Arc<dyn TaskRepository>) -> Self {
        Self {
            claims,
            tasks,
            default_lease_minutes: DEFAULT_LEASE_MINUTES,
        }
    }

    pub fn with_default_lease_minutes(mut self, minutes: i64) -> Self {
        self.default_lease_minutes = minutes;
        self
    }

    #[instrument(skip(self))]
    pub async fn claim(&self, task_id: &str, worker_id: &str, lease_minutes: Option<i64>) -> Result<Claim> {
        self.tasks
            .get_by_id(task_id)
            .await?
            .ok_or_else(|| CoreError::not_found_id(task_id))?;

        let minutes = lease_minutes.unwrap_or(self.default_lease_minutes);
        let lease_expires_at = Utc::now() + Duration::minutes(minutes);

        let claim = self.claims.insert(task_id, worker_id, lease_expires_at).await?;
        info!(task_id, worker_id, %lease_expires_at, "claimed task");
        Ok(claim)
    }

    #[instrument(skip(self))]
    pub async fn release(&self, task_id: &str, worker_id: &str) -> Result<()> {
        let claim = self
            .claims
            .find_active_by_task_id(task_id)
            .await?
            .ok_or_else(|| CoreError::ClaimNotFound(0))?;

        if claim.worker_id != worker_id {
            return Err(CoreError::NotOwned(worker_id.to_string(), task_id.to_string()));
        }

        self.claims.set_status(claim.id, ClaimStatus::Released).await?;
        info!(task_id, worker_id, "released claim");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn renew(&self, task_id: &str, worker_id: &str) -> Result<Claim> {
        let claim = self
            .claims
            .find_active_by_task_id(task_id)
            .await?
            .ok_or_else(|| CoreError::ClaimNotFound(0))?;

        if claim.worker_id != worker_id {
            return Err(CoreError::NotOwned(worker_id.to_string(), task_id.to_string()));
        }

        let now = Utc::now();
        if now >= claim.lease_expires_at {
            return Err(CoreError::LeaseExpired(task_id.to_string(), claim.lease_expires_at.to_rfc3339()));
        }
        if claim.renewed_count >= MAX_RENEWALS {
            return Err(CoreError::MaxRenewalsExceeded(claim.id, MAX_RENEWALS));
        }

        let extension = claim.lease_expires_at - claim.claimed_at;
        let new_expires_at = claim.lease_expires_at + extension.max(Duration::minutes(self.default_lease_minutes));
        self.claims.renew(claim.id, new_expires_at).await
    }

    pub async fn expire(&self, claim_id: i64) -> Result<Claim> {
        self.claims.set_status(claim_id, ClaimStatus::Expired).await
    }

    pub async fn complete(&self, claim_id: i64) -> Result<Claim> {
        self.claims.set_status(claim_id, ClaimStatus::Completed).await
    }

    #[instrument(skip(self))]
    pub async fn release_by_worker(&self, worker_id: &str) -> Result<u64> {
        let count = self.claims.release_by_worker(worker_id).await?;
        info!(worker_id, count, "released claims for deregistered worker");
        Ok(count)
    }

    pub async fn get_expired(&self, now: DateTime<Utc>) -> Result<Vec<Claim>> {
        self.claims.get_expired(now).await
    }

    /// Reaper entry point: marks every lapsed `active` claim `expired`.
    /// Intended to run inside a single transaction in the caller, per
    /// spec.md §5's reconciliation-loop description.
    #[instrument(skip(self))]
    pub async fn reap_expired(&self) -> Result<u64> {
        let expired = self.get_expired(Utc::now()).await?;
        let mut reaped = 0u64;
        for claim in expired {
            if let Err(err) = self.expire(claim.id).await {
                warn!(claim_id = claim.id, error = %err, "failed to reap expired claim");
                continue;
            }
            reaped += 1;
        }
        Ok(reaped)
    }

    pub async fn find_active_by_task_id(&self, task_id: &str) -> Result<Option<Claim>> {
        self.claims.find_active_by_task_id(task_id).await
    }
}
