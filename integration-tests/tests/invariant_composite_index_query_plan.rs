//! spec.md §8 invariant 12: the dashboard's two list queries must use the
//! composite indexes created in migration 1 (`idx_tasks_score_id`,
//! `idx_tasks_status_score_id`) rather than sorting with a temp B-tree.

mod common;

#[tokio::test]
async fn ordering_by_score_then_id_uses_the_composite_index() {
    let store = common::store().await;
    let plan = explain(&store, "SELECT * FROM tasks ORDER BY score DESC, id ASC LIMIT ?", 10).await;
    assert!(plan.iter().any(|line| line.contains("idx_tasks_score_id")), "expected idx_tasks_score_id in plan, got: {plan:?}");
    assert!(!plan.iter().any(|line| line.contains("USE TEMP B-TREE")), "must not fall back to a temp B-tree sort: {plan:?}");
}

#[tokio::test]
async fn ordering_by_score_then_id_with_status_filter_uses_the_composite_index() {
    let store = common::store().await;
    let plan = explain(
        &store,
        "SELECT * FROM tasks WHERE status IN ('backlog', 'ready') ORDER BY score DESC, id ASC LIMIT ?",
        10,
    )
    .await;
    assert!(plan.iter().any(|line| line.contains("idx_tasks_status_score_id")), "expected idx_tasks_status_score_id in plan, got: {plan:?}");
    assert!(!plan.iter().any(|line| line.contains("USE TEMP B-TREE")), "must not fall back to a temp B-tree sort: {plan:?}");
}

async fn explain(store: &tx_database::Store, query: &str, limit: i64) -> Vec<String> {
    let sql = format!("EXPLAIN QUERY PLAN {query}");
    let rows = sqlx::query(&sql)
        .bind(limit)
        .fetch_all(store.pool())
        .await
        .unwrap();
    rows.into_iter().map(|row| sqlx::Row::get::<String, _>(&row, "detail")).collect()
}
