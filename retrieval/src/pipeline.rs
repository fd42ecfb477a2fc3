//! The nine-stage hybrid retrieval pipeline (spec.md §4.5): query expansion,
//! multi-query BM25, vector ranking, reciprocal-rank fusion, boosts, graph
//! expansion, LLM rerank, MMR diversification, and cutoff. Every stage past
//! BM25 is optional and degrades to a no-op on backend unavailability or
//! failure; only BM25 failing fails the whole search.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument, warn};
use tx_core::repository::LearningRepository;

use crate::backends::{Diversifier, Embedder, FeedbackTracker, GraphExpander, NoopDiversifier, NoopEmbedder, NoopFeedbackTracker, NoopGraphExpander, NoopQueryExpander, NoopReranker, QueryExpander, Reranker};
use crate::config::{DimensionMismatchPolicy, RetrievalConfig};
use crate::error::{RetrievalError, Result};
use crate::types::{Candidate, GraphExpansionParams, QueryExpansion, SearchResult};

pub struct SearchService {
    learnings: Arc<dyn LearningRepository>,
    query_expander: Arc<dyn QueryExpander>,
    embedder: Arc<dyn Embedder>,
    reranker: Arc<dyn Reranker>,
    graph_expander: Arc<dyn GraphExpander>,
    diversifier: Arc<dyn Diversifier>,
    feedback: Arc<dyn FeedbackTracker>,
    config: RetrievalConfig,
}

impl SearchService {
    pub fn new(learnings: Arc<dyn LearningRepository>, config: RetrievalConfig) -> Self {
        Self {
            learnings,
            query_expander: Arc::new(NoopQueryExpander),
            embedder: Arc::new(NoopEmbedder),
            reranker: Arc::new(NoopReranker),
            graph_expander: Arc::new(NoopGraphExpander),
            diversifier: Arc::new(NoopDiversifier),
            feedback: Arc::new(NoopFeedbackTracker),
            config,
        }
    }

    pub fn with_query_expander(mut self, backend: Arc<dyn QueryExpander>) -> Self {
        self.query_expander = backend;
        self
    }

    pub fn with_embedder(mut self, backend: Arc<dyn Embedder>) -> Self {
        self.embedder = backend;
        self
    }

    pub fn with_reranker(mut self, backend: Arc<dyn Reranker>) -> Self {
        self.reranker = backend;
        self
    }

    pub fn with_graph_expander(mut self, backend: Arc<dyn GraphExpander>) -> Self {
        self.graph_expander = backend;
        self
    }

    pub fn with_diversifier(mut self, backend: Arc<dyn Diversifier>) -> Self {
        self.diversifier = backend;
        self
    }

    pub fn with_feedback_tracker(mut self, backend: Arc<dyn FeedbackTracker>) -> Self {
        self.feedback = backend;
        self
    }

    /// Reads `recency_weight` from persisted configuration (spec.md §6);
    /// the adapters/config layer calls this after loading the config table.
    pub fn with_recency_weight(mut self, recency_weight: f64) -> Self {
        self.config.recency_weight = recency_weight;
        self
    }

    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let expansion = self.stage1_expand(query).await;
        let mut candidates = self.stage2_bm25(&expansion).await?;
        self.stage3_vector(query, &mut candidates).await;
        stage4_rrf(&mut candidates, self.config.rrf_k);
        self.stage5_boosts(&mut candidates).await;
        self.stage6_graph(&mut candidates).await;
        self.stage7_rerank(query, &mut candidates).await;
        let candidates = self.stage8_diversify(candidates).await;
        Ok(stage9_cutoff(candidates, self.config.min_score, self.config.limit))
    }

    async fn stage1_expand(&self, query: &str) -> QueryExpansion {
        if !self.config.enable_query_expansion || !self.query_expander.is_available().await {
            return QueryExpansion::identity(query);
        }
        match self.query_expander.expand(query).await {
            Ok(mut expanded) => {
                expanded.truncate(self.config.max_expansions);
                expanded.retain(|q| q.len() <= self.config.max_expansion_chars);
                let mut all = vec![query.to_string()];
                all.extend(expanded.into_iter().filter(|q| q != query));
                QueryExpansion { original: query.to_string(), was_expanded: all.len() > 1, expanded: all }
            }
            Err(e) => {
                warn!(error = %e, "query expansion failed, falling back to the original query");
                QueryExpansion::identity(query)
            }
        }
    }

    async fn stage2_bm25(&self, expansion: &QueryExpansion) -> Result<HashMap<String, Candidate>> {
        let n = self.config.limit.saturating_mul(3).max(1);
        let mut best_rank: HashMap<String, usize> = HashMap::new();

        for q in &expansion.expanded {
            let hits = self
                .learnings
                .bm25_search(q, n)
                .await
                .map_err(|e| RetrievalError::Database(format!("bm25 search failed: {e}")))?;
            for (idx, hit) in hits.iter().enumerate() {
                let rank = idx + 1;
                best_rank
                    .entry(hit.learning_id.clone())
                    .and_modify(|r| *r = (*r).min(rank))
                    .or_insert(rank);
            }
        }

        if best_rank.is_empty() {
            return Ok(HashMap::new());
        }

        let ids: Vec<String> = best_rank.keys().cloned().collect();
        let learnings = self
            .learnings
            .get_many(&ids)
            .await
            .map_err(|e| RetrievalError::Database(format!("fetching bm25 candidates failed: {e}")))?;

        let mut candidates = HashMap::new();
        for learning in learnings {
            let rank = best_rank.get(&learning.id).copied();
            let mut candidate = Candidate::seed(
                learning.id.clone(),
                learning.content,
                learning.created_at,
                learning.outcome_score,
                learning.usage_count,
                learning.embedding,
            );
            candidate.bm25_rank = rank;
            candidates.insert(learning.id, candidate);
        }
        Ok(candidates)
    }

    async fn stage3_vector(&self, original_query: &str, candidates: &mut HashMap<String, Candidate>) {
        if !self.config.enable_vector_ranking || !self.embedder.is_available().await {
            return;
        }
        let query_embedding = match self.embedder.embed(original_query).await {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "embedding unavailable, skipping vector stage");
                return;
            }
        };

        let mut scored: Vec<(String, f64)> = Vec::new();
        for candidate in candidates.values() {
            let Some(embedding) = &candidate.embedding else { continue };
            if embedding.len() != query_embedding.len() {
                match self.config.dimension_mismatch_policy {
                    DimensionMismatchPolicy::Skip => continue,
                    DimensionMismatchPolicy::Fail => {
                        warn!(learning_id = %candidate.learning_id, "embedding dimension mismatch");
                        continue;
                    }
                }
            }
            let cos = cosine_similarity(&query_embedding, embedding);
            scored.push((candidate.learning_id.clone(), (cos as f64 + 1.0) / 2.0));
        }
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        for (rank, (id, _)) in scored.into_iter().enumerate() {
            if let Some(candidate) = candidates.get_mut(&id) {
                candidate.vector_rank = Some(rank + 1);
            }
        }
    }

    async fn stage5_boosts(&self, candidates: &mut HashMap<String, Candidate>) {
        for candidate in candidates.values_mut() {
            let feedback_score = match self.feedback.is_available().await {
                true => self.feedback.score(&candidate.learning_id).await.ok().flatten(),
                false => None,
            };
            candidate.feedback_score = Some(feedback_score.unwrap_or(0.5));
            candidate.relevance_score = score_candidate(candidate, self.config.recency_weight, self.config.rrf_k);
        }
    }

    async fn stage6_graph(&self, candidates: &mut HashMap<String, Candidate>) {
        if !self.config.enable_graph_expansion || !self.graph_expander.is_available().await {
            return;
        }
        let mut ranked: Vec<&Candidate> = candidates.values().collect();
        ranked.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        let seeds: Vec<String> = ranked.into_iter().take(self.config.graph_seed_count).map(|c| c.learning_id.clone()).collect();
        if seeds.is_empty() {
            return;
        }

        let params = GraphExpansionParams {
            depth: self.config.graph_depth,
            decay_factor: self.config.graph_decay_factor,
            max_nodes: self.config.graph_max_nodes,
            edge_types: Vec::new(),
        };
        let hits = match self.graph_expander.expand(&seeds, &params).await {
            Ok(h) => h,
            Err(e) => {
                debug!(error = %e, "graph expansion failed, skipping");
                return;
            }
        };

        let new_ids: Vec<String> = hits.iter().map(|h| h.learning_id.clone()).filter(|id| !candidates.contains_key(id)).collect();
        if new_ids.is_empty() {
            return;
        }
        let fetched = match self.learnings.get_many(&new_ids).await {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "fetching graph-expanded learnings failed, skipping");
                return;
            }
        };
        let fetched: HashMap<String, tx_core::models::Learning> = fetched.into_iter().map(|l| (l.id.clone(), l)).collect();

        for hit in hits {
            if candidates.contains_key(&hit.learning_id) {
                continue;
            }
            let Some(learning) = fetched.get(&hit.learning_id) else { continue };
            let mut candidate = Candidate::seed(
                learning.id.clone(),
                learning.content.clone(),
                learning.created_at,
                learning.outcome_score,
                learning.usage_count,
                learning.embedding.clone(),
            );
            candidate.relevance_score = hit.decayed_score;
            candidate.hops = hit.hops;
            candidate.path = hit.path;
            candidate.source_edge = Some(hit.source_edge);
            candidates.insert(hit.learning_id, candidate);
        }
    }

    async fn stage7_rerank(&self, query: &str, candidates: &mut HashMap<String, Candidate>) {
        if !self.config.enable_rerank || !self.reranker.is_available().await {
            return;
        }
        let rerank_window = (self.config.limit as usize * 2).min(20);
        let mut ranked: Vec<String> = candidates.values().map(|c| c.learning_id.clone()).collect();
        ranked.sort_by(|a, b| {
            let sa = candidates[a].relevance_score;
            let sb = candidates[b].relevance_score;
            sb.total_cmp(&sa)
        });
        ranked.truncate(rerank_window);

        let pairs: Vec<(String, String)> = ranked.iter().map(|id| (id.clone(), candidates[id].content.clone())).collect();
        let scores = match self.reranker.rerank(query, &pairs).await {
            Ok(s) if !s.is_empty() => s,
            _ => return,
        };

        let mut by_score: Vec<(String, f64)> = scores.into_iter().map(|s| (s.learning_id, s.score)).collect();
        by_score.sort_by(|a, b| b.1.total_cmp(&a.1));
        for (rank, (id, _)) in by_score.iter().enumerate() {
            if let Some(candidate) = candidates.get_mut(id) {
                candidate.reranker_rank = Some(rank + 1);
            }
        }

        let weight = self.config.rerank_weight;
        for (id, reranker_score) in &by_score {
            if let Some(candidate) = candidates.get_mut(id) {
                let position_bonus = position_bonus(candidate);
                candidate.relevance_score = (1.0 - weight) * candidate.relevance_score + weight * reranker_score + position_bonus;
            }
        }
    }

    async fn stage8_diversify(&self, candidates: HashMap<String, Candidate>) -> Vec<Candidate> {
        let mut ranked: Vec<Candidate> = candidates.into_values().collect();
        ranked.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));

        if !self.config.enable_diversification || !self.diversifier.is_available().await {
            return ranked;
        }
        let window = (self.config.limit as usize * 2).min(ranked.len());
        let tail = ranked.split_off(window);
        let head = ranked.clone();
        match self.diversifier.diversify(ranked, self.config.mmr_lambda, window).await {
            Ok(mut diversified) => {
                diversified.extend(tail);
                diversified
            }
            Err(e) => {
                debug!(error = %e, "diversification failed, keeping relevance order");
                let mut original = head;
                original.extend(tail);
                original
            }
        }
    }
}

fn stage4_rrf(candidates: &mut HashMap<String, Candidate>, k: f64) {
    for candidate in candidates.values_mut() {
        let mut rrf = 0.0;
        if let Some(rank) = candidate.bm25_rank {
            rrf += 1.0 / (k + rank as f64);
        }
        if let Some(rank) = candidate.vector_rank {
            rrf += 1.0 / (k + rank as f64);
        }
        candidate.rrf_score = rrf;
    }
}

fn stage9_cutoff(mut candidates: Vec<Candidate>, min_score: f64, limit: u32) -> Vec<SearchResult> {
    candidates.retain(|c| c.relevance_score >= min_score);
    candidates.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
    candidates.truncate(limit as usize);
    candidates.into_iter().map(SearchResult::from).collect()
}

fn score_candidate(candidate: &Candidate, recency_weight: f64, rrf_k: f64) -> f64 {
    let normalized_rrf = candidate.rrf_score * (rrf_k + 1.0) / 2.0;
    let age_days = (Utc::now() - candidate.created_at).num_seconds() as f64 / 86_400.0;
    let recency_score = (1.0 - age_days / 30.0).max(0.0);
    let outcome_boost = 0.05 * candidate.outcome_score.unwrap_or(0.0);
    let frequency_boost = 0.02 * (1.0 + candidate.usage_count as f64).ln();
    let feedback_boost = 0.05 * candidate.feedback_score.unwrap_or(0.5);

    normalized_rrf + recency_weight * recency_score + outcome_boost + frequency_boost + position_bonus(candidate) + feedback_boost
}

fn position_bonus(candidate: &Candidate) -> f64 {
    if candidate.is_top_rank(1) {
        0.05
    } else if candidate.is_top_n_rank(3) {
        0.02
    } else {
        0.0
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Maximal Marginal Relevance selection: greedily pick the candidate that
/// maximizes `lambda * relevance - (1 - lambda) * max_similarity_to_selected`,
/// falling back to similarity 0 (maximally diverse) for candidates without
/// an embedding (e.g. ones surfaced by graph expansion).
pub(crate) fn mmr_select(mut pool: Vec<Candidate>, lambda: f64, limit: usize) -> Vec<Candidate> {
    let mut selected: Vec<Candidate> = Vec::new();
    while !pool.is_empty() && selected.len() < limit {
        let mut best_idx = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (idx, candidate) in pool.iter().enumerate() {
            let max_sim = selected
                .iter()
                .map(|s| match (&candidate.embedding, &s.embedding) {
                    (Some(a), Some(b)) => cosine_similarity(a, b) as f64,
                    _ => 0.0,
                })
                .fold(0.0_f64, f64::max);
            let mmr_score = lambda * candidate.relevance_score - (1.0 - lambda) * max_sim;
            if mmr_score > best_score {
                best_score = mmr_score;
                best_idx = idx;
            }
        }
        selected.push(pool.remove(best_idx));
    }
    selected
}
