//! Pluggable backends for every optional retrieval stage (spec.md §9
//! "Polymorphism over backends"): each capability is a two-operation trait
//! (`is_available`, the primary verb). `Noop*` is the degraded-path default
//! used throughout scenario E; `Live*` calls out to a configured HTTP
//! endpoint; `Auto*` composes a `Live*` backend and falls back to `Noop*`
//! whenever the live one reports itself unavailable or fails — composition
//! over an interface, not a three-armed match sprinkled through the
//! pipeline.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{RetrievalError, Result};
use crate::types::{Candidate, GraphExpansionHit, GraphExpansionParams, RerankedScore};

#[async_trait]
pub trait QueryExpander: Send + Sync {
    async fn is_available(&self) -> bool;
    async fn expand(&self, query: &str) -> Result<Vec<String>>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn is_available(&self) -> bool;
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[async_trait]
pub trait Reranker: Send + Sync {
    async fn is_available(&self) -> bool;
    async fn rerank(&self, query: &str, candidates: &[(String, String)]) -> Result<Vec<RerankedScore>>;
}

#[async_trait]
pub trait GraphExpander: Send + Sync {
    async fn is_available(&self) -> bool;
    async fn expand(&self, seeds: &[String], params: &GraphExpansionParams) -> Result<Vec<GraphExpansionHit>>;
}

#[async_trait]
pub trait Diversifier: Send + Sync {
    async fn is_available(&self) -> bool;
    async fn diversify(&self, candidates: Vec<Candidate>, lambda: f64, limit: usize) -> Result<Vec<Candidate>>;
}

#[async_trait]
pub trait FeedbackTracker: Send + Sync {
    async fn is_available(&self) -> bool;
    async fn score(&self, learning_id: &str) -> Result<Option<f64>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopQueryExpander;
#[async_trait]
impl QueryExpander for NoopQueryExpander {
    async fn is_available(&self) -> bool {
        false
    }
    async fn expand(&self, _query: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEmbedder;
#[async_trait]
impl Embedder for NoopEmbedder {
    async fn is_available(&self) -> bool {
        false
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RetrievalError::Backend("embedding backend disabled".to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReranker;
#[async_trait]
impl Reranker for NoopReranker {
    async fn is_available(&self) -> bool {
        false
    }
    async fn rerank(&self, _query: &str, _candidates: &[(String, String)]) -> Result<Vec<RerankedScore>> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopGraphExpander;
#[async_trait]
impl GraphExpander for NoopGraphExpander {
    async fn is_available(&self) -> bool {
        false
    }
    async fn expand(&self, _seeds: &[String], _params: &GraphExpansionParams) -> Result<Vec<GraphExpansionHit>> {
        Ok(Vec::new())
    }
}

/// Walks the edge graph from a seed set via [`tx_core::repository::EdgeRepository`],
/// decaying each hop's score by `decay_factor` and stopping at `max_nodes` or
/// `depth`, whichever comes first. Unlike the other `Live*` backends this
/// one is local (the graph already lives in this process's database), so
/// `is_available` is always `true`.
pub struct EdgeGraphExpander {
    edges: std::sync::Arc<dyn tx_core::repository::EdgeRepository>,
}

impl EdgeGraphExpander {
    pub fn new(edges: std::sync::Arc<dyn tx_core::repository::EdgeRepository>) -> Self {
        Self { edges }
    }
}

#[async_trait]
impl GraphExpander for EdgeGraphExpander {
    async fn is_available(&self) -> bool {
        true
    }

    async fn expand(&self, seeds: &[String], params: &GraphExpansionParams) -> Result<Vec<GraphExpansionHit>> {
        use std::collections::HashSet;
        use tx_core::models::NodeType;

        let mut visited: HashSet<String> = seeds.iter().cloned().collect();
        let mut frontier: Vec<(String, u32, Vec<String>, f64)> =
            seeds.iter().map(|s| (s.clone(), 0, vec![s.clone()], 1.0)).collect();
        let mut hits = Vec::new();

        for _ in 0..params.depth {
            if hits.len() >= params.max_nodes || frontier.is_empty() {
                break;
            }
            let mut next_frontier = Vec::new();
            'frontier: for (node_id, hop, path, score) in &frontier {
                let neighbors = self
                    .edges
                    .neighbors(NodeType::Learning, node_id, &params.edge_types)
                    .await
                    .map_err(RetrievalError::from)?;
                for edge in neighbors {
                    let (neighbor_id, neighbor_type) = if edge.from_id == *node_id {
                        (edge.to_id.clone(), edge.to_type)
                    } else {
                        (edge.from_id.clone(), edge.from_type)
                    };
                    if neighbor_type != NodeType::Learning || visited.contains(&neighbor_id) {
                        continue;
                    }
                    visited.insert(neighbor_id.clone());
                    let decayed = score * params.decay_factor;
                    let mut path = path.clone();
                    path.push(neighbor_id.clone());
                    hits.push(GraphExpansionHit {
                        learning_id: neighbor_id.clone(),
                        hops: hop + 1,
                        path: path.clone(),
                        source_edge: edge.edge_type,
                        decayed_score: decayed,
                    });
                    next_frontier.push((neighbor_id, hop + 1, path, decayed));
                    if hits.len() >= params.max_nodes {
                        break 'frontier;
                    }
                }
            }
            frontier = next_frontier;
        }

        Ok(hits)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDiversifier;
#[async_trait]
impl Diversifier for NoopDiversifier {
    async fn is_available(&self) -> bool {
        false
    }
    async fn diversify(&self, candidates: Vec<Candidate>, _lambda: f64, _limit: usize) -> Result<Vec<Candidate>> {
        Ok(candidates)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFeedbackTracker;
#[async_trait]
impl FeedbackTracker for NoopFeedbackTracker {
    async fn is_available(&self) -> bool {
        false
    }
    async fn score(&self, _learning_id: &str) -> Result<Option<f64>> {
        Ok(None)
    }
}

/// Shared HTTP client configuration for every `Live*` backend. `base_url`
/// is the capability's service root; each backend appends its own path.
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl HttpBackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), timeout: Duration::from_secs(5) }
    }

    fn client(&self) -> reqwest::Client {
        reqwest::Client::builder().timeout(self.timeout).build().expect("reqwest client config is always valid")
    }
}

#[derive(Debug, Clone)]
pub struct LiveQueryExpander {
    config: HttpBackendConfig,
}

impl LiveQueryExpander {
    pub fn new(config: HttpBackendConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl QueryExpander for LiveQueryExpander {
    async fn is_available(&self) -> bool {
        self.config.client().get(format!("{}/health", self.config.base_url)).send().await.is_ok()
    }

    async fn expand(&self, query: &str) -> Result<Vec<String>> {
        #[derive(serde::Serialize)]
        struct Req<'a> {
            query: &'a str,
        }
        #[derive(serde::Deserialize)]
        struct Resp {
            expansions: Vec<String>,
        }

        let resp: Resp = self
            .config
            .client()
            .post(format!("{}/expand", self.config.base_url))
            .json(&Req { query })
            .send()
            .await
            .map_err(|e| RetrievalError::Backend(format!("query expansion request failed: {e}")))?
            .json()
            .await
            .map_err(|e| RetrievalError::Backend(format!("query expansion response invalid: {e}")))?;
        Ok(resp.expansions)
    }
}

#[derive(Debug, Clone)]
pub struct LiveEmbedder {
    config: HttpBackendConfig,
}

impl LiveEmbedder {
    pub fn new(config: HttpBackendConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Embedder for LiveEmbedder {
    async fn is_available(&self) -> bool {
        self.config.client().get(format!("{}/health", self.config.base_url)).send().await.is_ok()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        #[derive(serde::Serialize)]
        struct Req<'a> {
            text: &'a str,
        }
        #[derive(serde::Deserialize)]
        struct Resp {
            embedding: Vec<f32>,
        }

        let resp: Resp = self
            .config
            .client()
            .post(format!("{}/embed", self.config.base_url))
            .json(&Req { text })
            .send()
            .await
            .map_err(|e| RetrievalError::Backend(format!("embedding request failed: {e}")))?
            .json()
            .await
            .map_err(|e| RetrievalError::Backend(format!("embedding response invalid: {e}")))?;
        Ok(resp.embedding)
    }
}

#[derive(Debug, Clone)]
pub struct LiveReranker {
    config: HttpBackendConfig,
}

impl LiveReranker {
    pub fn new(config: HttpBackendConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Reranker for LiveReranker {
    async fn is_available(&self) -> bool {
        self.config.client().get(format!("{}/health", self.config.base_url)).send().await.is_ok()
    }

    async fn rerank(&self, query: &str, candidates: &[(String, String)]) -> Result<Vec<RerankedScore>> {
        #[derive(serde::Serialize)]
        struct Item<'a> {
            id: &'a str,
            content: &'a str,
        }
        #[derive(serde::Serialize)]
        struct Req<'a> {
            query: &'a str,
            candidates: Vec<Item<'a>>,
        }
        #[derive(serde::Deserialize)]
        struct RespItem {
            id: String,
            score: f64,
        }
        #[derive(serde::Deserialize)]
        struct Resp {
            scores: Vec<RespItem>,
        }

        let req = Req {
            query,
            candidates: candidates.iter().map(|(id, content)| Item { id, content }).collect(),
        };
        let resp: Resp = self
            .config
            .client()
            .post(format!("{}/rerank", self.config.base_url))
            .json(&req)
            .send()
            .await
            .map_err(|e| RetrievalError::Backend(format!("rerank request failed: {e}")))?
            .json()
            .await
            .map_err(|e| RetrievalError::Backend(format!("rerank response invalid: {e}")))?;
        Ok(resp.scores.into_iter().map(|s| RerankedScore { learning_id: s.id, score: s.score }).collect())
    }
}

#[derive(Debug, Clone)]
pub struct LiveFeedbackTracker {
    config: HttpBackendConfig,
}

impl LiveFeedbackTracker {
    pub fn new(config: HttpBackendConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl FeedbackTracker for LiveFeedbackTracker {
    async fn is_available(&self) -> bool {
        self.config.client().get(format!("{}/health", self.config.base_url)).send().await.is_ok()
    }

    async fn score(&self, learning_id: &str) -> Result<Option<f64>> {
        #[derive(serde::Deserialize)]
        struct Resp {
            score: Option<f64>,
        }
        let resp: Resp = self
            .config
            .client()
            .get(format!("{}/feedback/{learning_id}", self.config.base_url))
            .send()
            .await
            .map_err(|e| RetrievalError::Backend(format!("feedback request failed: {e}")))?
            .json()
            .await
            .map_err(|e| RetrievalError::Backend(format!("feedback response invalid: {e}")))?;
        Ok(resp.score)
    }
}

/// Composes a `Live*` backend with a `Noop*` fallback: probes
/// `is_available` before every call and silently degrades to the no-op
/// behavior on unavailability or failure, per spec.md §9's "Auto probes
/// availability and delegates".
pub struct AutoQueryExpander<L: QueryExpander> {
    live: L,
    noop: NoopQueryExpander,
}

impl<L: QueryExpander> AutoQueryExpander<L> {
    pub fn new(live: L) -> Self {
        Self { live, noop: NoopQueryExpander }
    }
}

#[async_trait]
impl<L: QueryExpander> QueryExpander for AutoQueryExpander<L> {
    async fn is_available(&self) -> bool {
        self.live.is_available().await
    }

    async fn expand(&self, query: &str) -> Result<Vec<String>> {
        if !self.live.is_available().await {
            return self.noop.expand(query).await;
        }
        match self.live.expand(query).await {
            Ok(expansions) => Ok(expansions),
            Err(_) => self.noop.expand(query).await,
        }
    }
}

pub struct AutoEmbedder<L: Embedder> {
    live: L,
    noop: NoopEmbedder,
}

impl<L: Embedder> AutoEmbedder<L> {
    pub fn new(live: L) -> Self {
        Self { live, noop: NoopEmbedder }
    }
}

#[async_trait]
impl<L: Embedder> Embedder for AutoEmbedder<L> {
    async fn is_available(&self) -> bool {
        self.live.is_available().await
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if !self.live.is_available().await {
            return self.noop.embed(text).await;
        }
        match self.live.embed(text).await {
            Ok(v) => Ok(v),
            Err(_) => self.noop.embed(text).await,
        }
    }
}

pub struct AutoReranker<L: Reranker> {
    live: L,
    noop: NoopReranker,
}

impl<L: Reranker> AutoReranker<L> {
    pub fn new(live: L) -> Self {
        Self { live, noop: NoopReranker }
    }
}

#[async_trait]
impl<L: Reranker> Reranker for AutoReranker<L> {
    async fn is_available(&self) -> bool {
        self.live.is_available().await
    }

    async fn rerank(&self, query: &str, candidates: &[(String, String)]) -> Result<Vec<RerankedScore>> {
        if !self.live.is_available().await {
            return self.noop.rerank(query, candidates).await;
        }
        match self.live.rerank(query, candidates).await {
            Ok(v) => Ok(v),
            Err(_) => self.noop.rerank(query, candidates).await,
        }
    }
}

pub struct AutoGraphExpander<L: GraphExpander> {
    live: L,
    noop: NoopGraphExpander,
}

impl<L: GraphExpander> AutoGraphExpander<L> {
    pub fn new(live: L) -> Self {
        Self { live, noop: NoopGraphExpander }
    }
}

#[async_trait]
impl<L: GraphExpander> GraphExpander for AutoGraphExpander<L> {
    async fn is_available(&self) -> bool {
        self.live.is_available().await
    }

    async fn expand(&self, seeds: &[String], params: &GraphExpansionParams) -> Result<Vec<GraphExpansionHit>> {
        if !self.live.is_available().await {
            return self.noop.expand(seeds, params).await;
        }
        match self.live.expand(seeds, params).await {
            Ok(v) => Ok(v),
            Err(_) => self.noop.expand(seeds, params).await,
        }
    }
}

pub struct AutoFeedbackTracker<L: FeedbackTracker> {
    live: L,
    noop: NoopFeedbackTracker,
}

impl<L: FeedbackTracker> AutoFeedbackTracker<L> {
    pub fn new(live: L) -> Self {
        Self { live, noop: NoopFeedbackTracker }
    }
}

#[async_trait]
impl<L: FeedbackTracker> FeedbackTracker for AutoFeedbackTracker<L> {
    async fn is_available(&self) -> bool {
        self.live.is_available().await
    }

    async fn score(&self, learning_id: &str) -> Result<Option<f64>> {
        if !self.live.is_available().await {
            return self.noop.score(learning_id).await;
        }
        match self.live.score(learning_id).await {
            Ok(v) => Ok(v),
            Err(_) => self.noop.score(learning_id).await,
        }
    }
}

/// The pure, always-available MMR implementation — not a network boundary,
/// but kept behind the same [`Diversifier`] trait as every other optional
/// stage so the pipeline composes it identically.
#[derive(Debug, Clone, Copy, Default)]
pub struct MmrDiversifier;

#[async_trait]
impl Diversifier for MmrDiversifier {
    async fn is_available(&self) -> bool {
        true
    }

    async fn diversify(&self, candidates: Vec<Candidate>, lambda: f64, limit: usize) -> Result<Vec<Candidate>> {
        Ok(crate::pipeline::mmr_select(candidates, lambda, limit))
    }
}
