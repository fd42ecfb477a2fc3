//! spec.md §8 scenario A: claim, contested re-claim, renewal ceiling,
//! release, and the subsequent absence of an active claim — against a real
//! SQLite database rather than the in-memory fakes `tx-services`'s own unit
//! tests use.

mod common;

use tx_core::error::CoreError;
use tx_core::models::NewTask;

#[tokio::test]
async fn claim_then_contested_claim_then_renewal_ceiling_then_release() {
    let store = common::store().await;
    let tasks = common::task_service(&store);
    let claims = common::claim_service(&store);

    let task = tasks
        .create(NewTask { title: "lease me".to_string(), ..Default::default() })
        .await
        .unwrap();

    let claim = claims.claim(&task.id, "w-1", Some(30)).await.unwrap();
    assert_eq!(claim.renewed_count, 0);
    let expected_expiry = claim.claimed_at + chrono::Duration::minutes(30);
    assert_eq!(claim.lease_expires_at, expected_expiry);

    let second = claims.claim(&task.id, "w-2", None).await;
    assert!(matches!(second, Err(CoreError::AlreadyClaimed(_, _))), "a task already claimed by w-1 must reject a claim by w-2");

    let mut renewed = claim;
    for expected_count in 1..=10 {
        renewed = claims.renew(&task.id, "w-1").await.unwrap();
        assert_eq!(renewed.renewed_count, expected_count);
    }
    let eleventh = claims.renew(&task.id, "w-1").await;
    assert!(matches!(eleventh, Err(CoreError::MaxRenewalsExceeded(_, 10))));

    let released = claims.release_by_worker("w-1").await.unwrap();
    assert_eq!(released, 1);
    assert!(claims.find_active_by_task_id(&task.id).await.unwrap().is_none());
}
