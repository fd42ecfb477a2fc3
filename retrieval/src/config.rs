use serde::{Deserialize, Serialize};

/// What to do when a candidate learning's embedding dimension doesn't match
/// the query embedding's dimension (spec.md §4.5 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionMismatchPolicy {
    /// Drop the offending learning from the vector stage and continue.
    Skip,
    /// Fail the whole search with [`crate::error::RetrievalError::DimensionMismatch`].
    Fail,
}

impl Default for DimensionMismatchPolicy {
    fn default() -> Self {
        DimensionMismatchPolicy::Skip
    }
}

/// Tunables for the hybrid retrieval pipeline. Defaults match spec.md §4.5
/// and §6's persisted-configuration table; `recency_weight` is the one knob
/// actually read from the `config` table at runtime (see
/// `SearchService::with_recency_weight`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub limit: u32,
    pub max_expansions: usize,
    pub max_expansion_chars: usize,
    pub rrf_k: f64,
    pub recency_weight: f64,
    pub graph_seed_count: usize,
    pub graph_depth: u32,
    pub graph_decay_factor: f64,
    pub graph_max_nodes: usize,
    pub rerank_weight: f64,
    pub mmr_lambda: f64,
    pub min_score: f64,
    pub dimension_mismatch_policy: DimensionMismatchPolicy,
    pub enable_query_expansion: bool,
    pub enable_vector_ranking: bool,
    pub enable_graph_expansion: bool,
    pub enable_rerank: bool,
    pub enable_diversification: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            limit: 10,
            max_expansions: 5,
            max_expansion_chars: 200,
            rrf_k: 60.0,
            recency_weight: 0.1,
            graph_seed_count: 10,
            graph_depth: 1,
            graph_decay_factor: 0.5,
            graph_max_nodes: 50,
            rerank_weight: 0.3,
            mmr_lambda: 0.7,
            min_score: 0.1,
            dimension_mismatch_policy: DimensionMismatchPolicy::Skip,
            enable_query_expansion: true,
            enable_vector_ranking: true,
            enable_graph_expansion: false,
            enable_rerank: false,
            enable_diversification: false,
        }
    }
}
