use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Output of the query-expansion stage (spec.md §4.5 step 1). Degrades to
/// `{original: q, expanded: [q], was_expanded: false}` when the expander is
/// unavailable or failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryExpansion {
    pub original: String,
    pub expanded: Vec<String>,
    pub was_expanded: bool,
}

impl QueryExpansion {
    pub fn identity(query: &str) -> Self {
        Self { original: query.to_string(), expanded: vec![query.to_string()], was_expanded: false }
    }
}

/// Parameters handed to the graph expander for stage 6.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphExpansionParams {
    pub depth: u32,
    pub decay_factor: f64,
    pub max_nodes: usize,
    pub edge_types: Vec<String>,
}

/// A node surfaced by graph expansion, one hop (or more) away from a seed.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphExpansionHit {
    pub learning_id: String,
    pub hops: u32,
    pub path: Vec<String>,
    pub source_edge: String,
    pub decayed_score: f64,
}

/// A learning scored by the reranker, keyed by id so the pipeline can
/// rejoin it with the candidate it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct RerankedScore {
    pub learning_id: String,
    pub score: f64,
}

/// Working record for one candidate learning as it flows through the
/// pipeline. Ranks are 1-indexed and `None` when the candidate wasn't
/// surfaced by that stage, matching spec.md step 4's "rank 0 (absent)
/// contributes zero" rule (modeled here as `Option` rather than a literal
/// zero sentinel).
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub learning_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub outcome_score: Option<f64>,
    pub usage_count: i64,
    pub feedback_score: Option<f64>,
    pub embedding: Option<Vec<f32>>,

    pub bm25_rank: Option<usize>,
    pub vector_rank: Option<usize>,
    pub reranker_rank: Option<usize>,

    pub rrf_score: f64,
    pub relevance_score: f64,

    pub hops: u32,
    pub path: Vec<String>,
    pub source_edge: Option<String>,
}

impl Candidate {
    pub fn seed(
        learning_id: String,
        content: String,
        created_at: DateTime<Utc>,
        outcome_score: Option<f64>,
        usage_count: i64,
        embedding: Option<Vec<f32>>,
    ) -> Self {
        Self {
            learning_id,
            content,
            created_at,
            outcome_score,
            usage_count,
            feedback_score: None,
            embedding,
            bm25_rank: None,
            vector_rank: None,
            reranker_rank: None,
            rrf_score: 0.0,
            relevance_score: 0.0,
            hops: 0,
            path: Vec::new(),
            source_edge: None,
        }
    }

    pub fn is_top_rank(&self, rank: usize) -> bool {
        [self.bm25_rank, self.vector_rank, self.reranker_rank].into_iter().flatten().any(|r| r == rank)
    }

    pub fn is_top_n_rank(&self, n: usize) -> bool {
        [self.bm25_rank, self.vector_rank, self.reranker_rank].into_iter().flatten().any(|r| r <= n)
    }
}

/// One result row returned by [`crate::pipeline::SearchService::search`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub learning_id: String,
    pub content: String,
    pub relevance_score: f64,
    pub hops: u32,
    pub path: Vec<String>,
    pub source_edge: Option<String>,
}

impl From<Candidate> for SearchResult {
    fn from(c: Candidate) -> Self {
        Self {
            learning_id: c.learning_id,
            content: c.content,
            relevance_score: c.relevance_score,
            hops: c.hops,
            path: c.path,
            source_edge: c.source_edge,
        }
    }
}
