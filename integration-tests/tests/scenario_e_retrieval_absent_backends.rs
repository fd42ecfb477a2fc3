//! spec.md §8 scenario E: with every optional backend absent (no
//! embedder, reranker, graph expander, or diversifier — `SearchService`'s
//! Noop defaults, per `tx-retrieval`'s `new`), a search still returns
//! ranked, bounded results driven entirely by the mandatory BM25 stage.

mod common;

use tx_core::models::Learning;
use tx_core::repository::LearningRepository;
use tx_retrieval::{RetrievalConfig, SearchService};

fn sample(id: &str, content: &str) -> Learning {
    Learning {
        id: id.to_string(),
        content: content.to_string(),
        created_at: chrono::Utc::now(),
        embedding: None,
        outcome_score: Some(0.5),
        usage_count: 0,
        category: None,
    }
}

#[tokio::test]
async fn search_with_every_optional_backend_absent_returns_ranked_bm25_results() {
    let store = common::store().await;
    let learnings = common::learning_repository(&store);

    learnings.insert(sample("lr-matching", "remember to fix the authentication bug before deploying")).await.unwrap();
    learnings.insert(sample("lr-offtopic", "the coffee machine on the third floor is broken")).await.unwrap();

    let search = SearchService::new(learnings, RetrievalConfig { limit: 5, ..RetrievalConfig::default() });
    let results = search.search("fix authentication bug").await.unwrap();

    assert!(!results.is_empty());
    assert!(results.len() <= 5);
    for result in &results {
        assert!(result.relevance_score >= 0.1, "min_score cutoff must hold even with every optional backend absent");
    }
    assert!(results.windows(2).all(|w| w[0].relevance_score >= w[1].relevance_score), "results must be sorted descending by relevance");
    assert!(results.iter().any(|r| r.learning_id == "lr-matching"));
    assert!(!results.iter().any(|r| r.learning_id == "lr-offtopic"));
}
