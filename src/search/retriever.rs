//! Retrieval strategies and reranking.
//!
//! Turns a query plus filters into a ranked candidate list. The chunk
//! store supplies the filtered candidate universe; the strategies score
//! it with vector similarity, graph proximity, recency, and structural
//! priors, then rerank and cut to the configured depth. A graph failure
//! inside hybrid falls back to the surviving signals instead of failing
//! the search.

use crate::embedding::Embedder;
use crate::entity::{EntityExtractor, EntityIndex};
use crate::error::Result;
use crate::index::VectorIndex;
use crate::link::LinkingEngine;
use crate::model::NoteChunk;
use crate::search::bm25::{bm25_scores, snippet};
use crate::search::planner::{Preferences, QueryClass, Strategy, classify, select_strategy};
use crate::store::{ChunkStore, DateField, FilterSpec};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Retriever tunables.
#[derive(Debug, Clone, Copy)]
pub struct RetrieverConfig {
    /// Vector fan-out size (K).
    pub max_candidates: usize,
    /// Final result depth after reranking.
    pub rerank_top_k: usize,
    /// Minimum cosine similarity for vector matches.
    pub min_similarity: f32,
    /// Graph traversal hop bound.
    pub max_hops: u32,
    /// Graph traversal node bound.
    pub max_nodes: usize,
    /// Starting chunks resolved from query entities.
    pub max_start_nodes: usize,
    /// Hard cap on the candidate fetch.
    pub candidate_cap: usize,
    /// Per-hop decay applied to graph scores.
    pub depth_decay: f64,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            max_candidates: 20,
            rerank_top_k: 10,
            min_similarity: 0.3,
            max_hops: 3,
            max_nodes: 50,
            max_start_nodes: 5,
            candidate_cap: 2000,
            depth_decay: 0.85,
        }
    }
}

/// A search invocation.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Natural-language query.
    pub query: String,
    /// Store-side filters.
    pub filters: FilterSpec,
    /// Date column the window applies to.
    pub date_field: DateField,
    /// Strategy preference flags.
    pub preferences: Preferences,
}

impl SearchRequest {
    /// A request with no filters beyond the query.
    #[must_use]
    pub fn query(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            filters: FilterSpec::unfiltered(),
            date_field: DateField::Auto,
            preferences: Preferences::default(),
        }
    }
}

/// One ranked result.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    /// Chunk id.
    pub chunk_id: String,
    /// Owning document path.
    pub path: String,
    /// Section heading, if any.
    pub heading: Option<String>,
    /// 1-based start line.
    pub start_line: u32,
    /// Final strategy score.
    pub score: f64,
    /// Sub-scores the result was ranked with.
    pub signals: BTreeMap<String, f64>,
    /// Display snippet.
    pub snippet: String,
    /// Effective date (created coalesced with modified).
    pub date: DateTime<Utc>,
}

/// Outcome of a planned search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    /// The query as received.
    pub query: String,
    /// Classified query class.
    pub class: QueryClass,
    /// Strategy that produced the ranking.
    pub strategy: Strategy,
    /// Size of the filtered candidate set.
    pub total_candidates: usize,
    /// True when a failed or empty signal forced a fallback ranking.
    pub fell_back: bool,
    /// Ranked results, at most `rerank_top_k`.
    pub results: Vec<RetrievedChunk>,
}

/// Query planner plus retrieval strategies.
pub struct Retriever {
    chunks: ChunkStore,
    vectors: VectorIndex,
    entities: EntityIndex,
    linking: Arc<LinkingEngine>,
    extractor: Arc<EntityExtractor>,
    embedder: Arc<dyn Embedder>,
    config: RetrieverConfig,
}

impl Retriever {
    /// Creates a retriever over the shared stores.
    #[must_use]
    pub fn new(
        chunks: ChunkStore,
        vectors: VectorIndex,
        entities: EntityIndex,
        linking: Arc<LinkingEngine>,
        extractor: Arc<EntityExtractor>,
        embedder: Arc<dyn Embedder>,
        config: RetrieverConfig,
    ) -> Self {
        Self {
            chunks,
            vectors,
            entities,
            linking,
            extractor,
            embedder,
            config,
        }
    }

    /// Runs a planned search: classify, select a strategy, retrieve,
    /// rerank, and cut to `rerank_top_k`.
    ///
    /// # Errors
    ///
    /// Returns an error when the candidate fetch or the primary signal
    /// fails outright; a failed graph walk inside hybrid degrades to the
    /// remaining signals instead.
    pub fn search(&self, request: &SearchRequest) -> Result<SearchOutcome> {
        let class = classify(&request.query);
        let strategy = select_strategy(class, request.preferences);

        let candidates =
            self.chunks
                .fetch_candidates(&request.filters, request.date_field, self.config.candidate_cap)?;
        let total_candidates = candidates.len();
        tracing::debug!(
            query = %request.query,
            class = class.as_str(),
            strategy = strategy.as_str(),
            candidates = total_candidates,
            "search planned"
        );

        let mut fell_back = false;
        let mut results = match strategy {
            Strategy::VectorOnly => self.vector_rank(&request.query, &candidates)?,
            Strategy::GraphOnly => self.graph_rank(&request.query, &candidates)?,
            Strategy::Hybrid => self.hybrid_rank(&request.query, &candidates, &mut fell_back)?,
            Strategy::Temporal => Self::temporal_rank(&candidates),
            Strategy::Hierarchical => self.hierarchical_rank(&request.query, &candidates),
        };

        // An empty ranking over a non-empty candidate set falls back to
        // BM25, so the surface always has something to show.
        if results.is_empty() && !candidates.is_empty() {
            fell_back = true;
            results = Self::bm25_rank(&request.query, &candidates);
        }

        self.attach_bm25_signal(&request.query, &candidates, &mut results);
        results.truncate(self.config.rerank_top_k);

        Ok(SearchOutcome {
            query: request.query.clone(),
            class,
            strategy,
            total_candidates,
            fell_back,
            results,
        })
    }

    // ==================== Strategy implementations ====================

    /// Vector-only: embed the query, cosine top-K, candidate-filtered.
    fn vector_rank(&self, query: &str, candidates: &[NoteChunk]) -> Result<Vec<RetrievedChunk>> {
        let scores = self.vector_scores(query, candidates)?;
        let by_id = index_by_id(candidates);
        let mut results: Vec<RetrievedChunk> = scores
            .into_iter()
            .filter_map(|(id, score)| {
                by_id.get(id.as_str()).map(|chunk| {
                    build_result(chunk, score, [("vector".to_string(), score)].into())
                })
            })
            .collect();
        sort_desc(&mut results);
        Ok(results)
    }

    /// Graph-only: entity-anchored BFS, scored by path confidence times
    /// depth decay.
    fn graph_rank(&self, query: &str, candidates: &[NoteChunk]) -> Result<Vec<RetrievedChunk>> {
        let scores = self.graph_scores(query, candidates)?;
        let by_id = index_by_id(candidates);
        let mut results: Vec<RetrievedChunk> = scores
            .into_iter()
            .filter_map(|(id, score)| {
                by_id.get(id.as_str()).map(|chunk| {
                    build_result(chunk, score, [("graph".to_string(), score)].into())
                })
            })
            .collect();
        sort_desc(&mut results);
        Ok(results)
    }

    /// Hybrid: vector and graph fan-out, merged by max per source, then
    /// reranked `0.4·vector + 0.3·graph + 0.2·recency + 0.1·hub`.
    fn hybrid_rank(
        &self,
        query: &str,
        candidates: &[NoteChunk],
        fell_back: &mut bool,
    ) -> Result<Vec<RetrievedChunk>> {
        let vector_scores = self.vector_scores(query, candidates)?;
        let graph_scores = match self.graph_scores(query, candidates) {
            Ok(scores) => scores,
            Err(e) => {
                tracing::warn!(error = %e, "graph walk failed, falling back to vector only");
                *fell_back = true;
                Vec::new()
            }
        };

        let mut merged: HashMap<String, (f64, f64)> = HashMap::new();
        for (id, score) in vector_scores {
            let entry = merged.entry(id).or_insert((0.0, 0.0));
            entry.0 = entry.0.max(score);
        }
        for (id, score) in graph_scores {
            let entry = merged.entry(id).or_insert((0.0, 0.0));
            entry.1 = entry.1.max(score);
        }

        let by_id = index_by_id(candidates);
        let max_hub = merged
            .keys()
            .filter_map(|id| by_id.get(id.as_str()))
            .map(|c| c.hub_count)
            .max()
            .unwrap_or(0);

        let now = Utc::now();
        let mut results: Vec<RetrievedChunk> = merged
            .into_iter()
            .filter_map(|(id, (vector, graph))| {
                let chunk = by_id.get(id.as_str())?;
                let recency = recency_score(chunk.modified_at, now);
                let hub = if max_hub == 0 {
                    0.0
                } else {
                    f64::from(chunk.hub_count) / f64::from(max_hub)
                };
                let score = 0.4f64.mul_add(vector, 0.3f64.mul_add(graph, 0.2f64.mul_add(recency, 0.1 * hub)));
                let signals = BTreeMap::from([
                    ("vector".to_string(), vector),
                    ("graph".to_string(), graph),
                    ("recency".to_string(), recency),
                    ("hub_score".to_string(), hub),
                ]);
                Some(build_result(chunk, score, signals))
            })
            .collect();
        sort_desc(&mut results);
        Ok(results)
    }

    /// Temporal: chronological ascending over the window, scored by
    /// recency alone.
    fn temporal_rank(candidates: &[NoteChunk]) -> Vec<RetrievedChunk> {
        let now = Utc::now();
        let mut results: Vec<RetrievedChunk> = candidates
            .iter()
            .map(|chunk| {
                let recency = recency_score(chunk.effective_date(), now);
                build_result(chunk, recency, [("recency".to_string(), recency)].into())
            })
            .collect();
        results.sort_by_key(|r| r.date);
        results
    }

    /// Hierarchical: heading-level prior blended with heading relevance.
    fn hierarchical_rank(&self, query: &str, candidates: &[NoteChunk]) -> Vec<RetrievedChunk> {
        let headings: Vec<&str> = candidates
            .iter()
            .map(|c| c.heading.as_deref().unwrap_or(""))
            .collect();
        let heading_bm25 = bm25_scores(query, &headings);
        let max_heading = heading_bm25.iter().copied().fold(0.0f64, f64::max);

        let mut results: Vec<RetrievedChunk> = candidates
            .iter()
            .zip(heading_bm25)
            .map(|(chunk, raw_relevance)| {
                let level = f64::from(chunk.heading_level.clamp(1, 5));
                let hierarchy = (5.0 - level) / 5.0;
                let relevance = if max_heading > 0.0 {
                    raw_relevance / max_heading
                } else {
                    0.0
                };
                let score = 0.7f64.mul_add(hierarchy, 0.3 * relevance);
                let signals = BTreeMap::from([
                    ("hierarchy".to_string(), hierarchy),
                    ("heading_relevance".to_string(), relevance),
                ]);
                build_result(chunk, score, signals)
            })
            .collect();
        sort_desc(&mut results);
        results
    }

    /// BM25 over the candidate set, used as the fallback ranking.
    fn bm25_rank(query: &str, candidates: &[NoteChunk]) -> Vec<RetrievedChunk> {
        let texts: Vec<&str> = candidates.iter().map(|c| c.text.as_str()).collect();
        let scores = bm25_scores(query, &texts);
        let mut results: Vec<RetrievedChunk> = candidates
            .iter()
            .zip(scores)
            .filter(|(_, score)| *score > 0.0)
            .map(|(chunk, score)| {
                build_result(chunk, score, [("bm25".to_string(), score)].into())
            })
            .collect();
        sort_desc(&mut results);
        results
    }

    // ==================== Signals ====================

    /// Cosine scores for candidates passing the similarity floor.
    fn vector_scores(&self, query: &str, candidates: &[NoteChunk]) -> Result<Vec<(String, f64)>> {
        let query_embedding = self.embedder.embed(query)?;
        let hits = self.vectors.top_k(
            &query_embedding,
            self.config.max_candidates,
            None,
            None,
            self.config.min_similarity,
        )?;

        // User filters apply post-hoc through candidate membership.
        let allowed: HashSet<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
        Ok(hits
            .into_iter()
            .filter(|hit| allowed.contains(hit.chunk_id.as_str()))
            .map(|hit| (hit.chunk_id, f64::from(hit.score)))
            .collect())
    }

    /// Graph proximity scores: resolve query entities to start chunks,
    /// BFS outward, score `confidence_product × depth_decay^depth`,
    /// dedup keeping the max.
    fn graph_scores(&self, query: &str, candidates: &[NoteChunk]) -> Result<Vec<(String, f64)>> {
        let extraction = self.extractor.extract(query);
        if extraction.mentions.is_empty() {
            return Ok(Vec::new());
        }

        let mut start_ids: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for (entity, _, _) in &extraction.mentions {
            for (chunk_id, _confidence) in self.entities.chunks_mentioning(&entity.text)? {
                if seen.insert(chunk_id.clone()) {
                    start_ids.push(chunk_id);
                }
            }
        }
        start_ids.truncate(self.config.max_start_nodes);
        if start_ids.is_empty() {
            return Ok(Vec::new());
        }

        let visits =
            self.linking
                .traverse(&start_ids, self.config.max_hops, self.config.max_nodes)?;

        let allowed: HashSet<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
        let mut best: HashMap<String, f64> = HashMap::new();
        for visit in visits {
            if !allowed.contains(visit.chunk_id.as_str()) {
                continue;
            }
            let score = visit.strength * self.config.depth_decay.powi(visit.depth as i32);
            let entry = best.entry(visit.chunk_id).or_insert(0.0);
            *entry = entry.max(score);
        }
        Ok(best.into_iter().collect())
    }

    /// Adds the candidate-set BM25 score of each returned chunk to its
    /// signal tuple (explainability; the strategy score is untouched).
    fn attach_bm25_signal(
        &self,
        query: &str,
        candidates: &[NoteChunk],
        results: &mut [RetrievedChunk],
    ) {
        let texts: Vec<&str> = candidates.iter().map(|c| c.text.as_str()).collect();
        let scores = bm25_scores(query, &texts);
        let by_id: HashMap<&str, f64> = candidates
            .iter()
            .zip(scores)
            .map(|(c, s)| (c.id.as_str(), s))
            .collect();
        for result in results {
            if let Some(score) = by_id.get(result.chunk_id.as_str()) {
                result.signals.entry("bm25".to_string()).or_insert(*score);
            }
        }
    }
}

fn index_by_id(candidates: &[NoteChunk]) -> HashMap<&str, &NoteChunk> {
    candidates.iter().map(|c| (c.id.as_str(), c)).collect()
}

fn build_result(chunk: &NoteChunk, score: f64, signals: BTreeMap<String, f64>) -> RetrievedChunk {
    RetrievedChunk {
        chunk_id: chunk.id.clone(),
        path: chunk.path.clone(),
        heading: chunk.heading.clone(),
        start_line: chunk.start_line,
        score,
        signals,
        snippet: snippet(&chunk.text),
        date: chunk.effective_date(),
    }
}

fn sort_desc(results: &mut [RetrievedChunk]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
}

/// Recency score: `max(0, 1 − days_since/365)`.
#[must_use]
pub fn recency_score(then: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let days = (now - then).num_seconds() as f64 / 86_400.0;
    (1.0 - days / 365.0).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{DEFAULT_DIMENSIONS, HashEmbedder};
    use crate::index::EmbeddingMetadata;
    use crate::link::LinkConfig;
    use crate::model::{LinkProvenance, LinkType, SemanticLink};
    use crate::store::{Db, LinkStore};
    use chrono::Duration;

    struct Fixture {
        chunks: ChunkStore,
        links: LinkStore,
        vectors: VectorIndex,
        entities: EntityIndex,
        retriever: Retriever,
        embedder: Arc<HashEmbedder>,
    }

    fn fixture() -> Fixture {
        let db = Db::in_memory_index().expect("db");
        let chunks = ChunkStore::new(db.clone());
        let links = LinkStore::new(db.clone());
        let vectors = VectorIndex::new(db.clone());
        let entities = EntityIndex::new(db);
        let extractor = Arc::new(EntityExtractor::new().expect("extractor"));
        let embedder = Arc::new(HashEmbedder::new(DEFAULT_DIMENSIONS));
        let linking = Arc::new(LinkingEngine::new(
            chunks.clone(),
            links.clone(),
            vectors.clone(),
            entities.clone(),
            LinkConfig::default(),
        ));
        let retriever = Retriever::new(
            chunks.clone(),
            vectors.clone(),
            entities.clone(),
            linking,
            extractor,
            embedder.clone(),
            RetrieverConfig::default(),
        );
        Fixture {
            chunks,
            links,
            vectors,
            entities,
            retriever,
            embedder,
        }
    }

    fn put_chunk(
        fx: &Fixture,
        path: &str,
        heading: Option<&str>,
        level: u8,
        line: u32,
        text: &str,
        modified: DateTime<Utc>,
    ) -> String {
        let chunk = NoteChunk::new(
            path,
            heading.map(str::to_string),
            level,
            line,
            text.to_string(),
            None,
            modified,
            "h".to_string(),
        );
        fx.chunks.upsert_chunk(&chunk).expect("upsert");
        let vector = fx.embedder.embed(text).expect("embed");
        fx.vectors
            .upsert(&chunk.id, &vector, None, &EmbeddingMetadata::default())
            .expect("vector");
        chunk.id
    }

    #[test]
    fn test_recency_score_bounds() {
        let now = Utc::now();
        assert!((recency_score(now, now) - 1.0).abs() < 1e-6);
        let half_year = now - Duration::days(183);
        let score = recency_score(half_year, now);
        assert!(score > 0.4 && score < 0.6);
        let ancient = now - Duration::days(4000);
        assert!((recency_score(ancient, now)).abs() < f64::EPSILON);
    }

    #[test]
    fn test_search_returns_matching_chunk_only() {
        let fx = fixture();
        let now = Utc::now();
        put_chunk(&fx, "n.md", Some("Intro"), 1, 2, "A test.", now);
        put_chunk(&fx, "n.md", Some("Deep"), 2, 5, "More text.", now);

        let outcome = fx
            .retriever
            .search(&SearchRequest::query("test"))
            .expect("search");
        assert_eq!(outcome.total_candidates, 2);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].heading.as_deref(), Some("Intro"));
        assert_eq!(outcome.results[0].start_line, 2);
        assert!(outcome.results[0].signals.contains_key("bm25"));
    }

    #[test]
    fn test_vector_only_strategy_for_definitions() {
        let fx = fixture();
        let now = Utc::now();
        put_chunk(&fx, "a.md", None, 0, 1, "entropy is hard to define. entropy measures disorder", now);
        put_chunk(&fx, "b.md", None, 0, 1, "gardening tips for spring", now);

        let outcome = fx
            .retriever
            .search(&SearchRequest::query("define entropy"))
            .expect("search");
        assert_eq!(outcome.strategy, Strategy::VectorOnly);
        assert!(!outcome.results.is_empty());
        assert_eq!(outcome.results[0].path, "a.md");
        assert!(outcome.results[0].signals.contains_key("vector"));
    }

    #[test]
    fn test_graph_strategy_walks_entity_links() {
        let fx = fixture();
        let now = Utc::now();
        let a = put_chunk(&fx, "a.md", None, 0, 1, "Alice Johnson leads the effort", now);
        let b = put_chunk(&fx, "b.md", None, 0, 1, "completely different topic", now);

        // a mentions the entity; a links to b.
        let extractor = EntityExtractor::new().expect("extractor");
        let extraction = extractor.extract("Alice Johnson leads the effort");
        fx.entities.replace_mentions(&a, &extraction.mentions).expect("mentions");
        fx.links
            .upsert_edge(&SemanticLink {
                source_id: a.clone(),
                target_id: b.clone(),
                link_type: LinkType::Related,
                strength: 0.8,
                rationale: "test".to_string(),
                provenance: LinkProvenance::Auto,
                created_at: now,
                updated_at: now,
            })
            .expect("edge");

        let outcome = fx
            .retriever
            .search(&SearchRequest::query("explore what is connected to Alice Johnson"))
            .expect("search");
        assert_eq!(outcome.strategy, Strategy::GraphOnly);

        let ids: Vec<&str> = outcome.results.iter().map(|r| r.chunk_id.as_str()).collect();
        assert!(ids.contains(&a.as_str()), "start chunk reachable");
        assert!(ids.contains(&b.as_str()), "1-hop neighbor reachable");

        // Start node at depth 0 scores 1.0; the neighbor decays.
        let by_id: HashMap<&str, f64> = outcome
            .results
            .iter()
            .map(|r| (r.chunk_id.as_str(), r.score))
            .collect();
        assert!(by_id[a.as_str()] > by_id[b.as_str()]);
        let expected = 0.8 * 0.85;
        assert!((by_id[b.as_str()] - expected).abs() < 1e-9);
    }

    #[test]
    fn test_hybrid_rerank_weights() {
        let fx = fixture();
        let now = Utc::now();
        put_chunk(&fx, "a.md", None, 0, 1, "searchable shared content", now);
        put_chunk(&fx, "b.md", None, 0, 1, "searchable shared content twin", now);

        let outcome = fx
            .retriever
            .search(&SearchRequest::query("find searchable shared content"))
            .expect("search");
        assert_eq!(outcome.strategy, Strategy::Hybrid);
        assert!(!outcome.results.is_empty());
        for result in &outcome.results {
            for key in ["vector", "graph", "recency", "hub_score"] {
                assert!(result.signals.contains_key(key), "missing signal {key}");
            }
            let s = &result.signals;
            let expected = 0.4 * s["vector"] + 0.3 * s["graph"] + 0.2 * s["recency"] + 0.1 * s["hub_score"];
            assert!((result.score - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_temporal_strategy_orders_ascending() {
        let fx = fixture();
        let now = Utc::now();
        put_chunk(&fx, "old.md", None, 0, 1, "events of last year", now - Duration::days(300));
        put_chunk(&fx, "new.md", None, 0, 1, "events of this week", now - Duration::days(2));

        let outcome = fx
            .retriever
            .search(&SearchRequest::query("timeline of events"))
            .expect("search");
        assert_eq!(outcome.strategy, Strategy::Temporal);
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results[0].path, "old.md");
        assert_eq!(outcome.results[1].path, "new.md");
        assert!(outcome.results[1].signals["recency"] > outcome.results[0].signals["recency"]);
    }

    #[test]
    fn test_hierarchical_strategy_prefers_higher_sections() {
        let fx = fixture();
        let now = Utc::now();
        put_chunk(&fx, "g.md", Some("Guide"), 1, 2, "setup guide overview", now);
        put_chunk(&fx, "g.md", Some("Appendix details"), 4, 40, "minor details", now);

        let outcome = fx
            .retriever
            .search(&SearchRequest::query("how to follow the setup guide"))
            .expect("search");
        assert_eq!(outcome.strategy, Strategy::Hierarchical);
        assert_eq!(outcome.results[0].heading.as_deref(), Some("Guide"));
        let s = &outcome.results[0].signals;
        let expected = 0.7 * s["hierarchy"] + 0.3 * s["heading_relevance"];
        assert!((outcome.results[0].score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_results_capped_at_rerank_top_k() {
        let fx = fixture();
        let now = Utc::now();
        for i in 0..15u32 {
            put_chunk(
                &fx,
                &format!("f{i}.md"),
                None,
                0,
                1,
                &format!("common topic variation {i}"),
                now,
            );
        }
        let outcome = fx
            .retriever
            .search(&SearchRequest::query("find common topic"))
            .expect("search");
        assert!(outcome.results.len() <= RetrieverConfig::default().rerank_top_k);
    }

    #[test]
    fn test_empty_candidates_empty_results() {
        let fx = fixture();
        let outcome = fx
            .retriever
            .search(&SearchRequest::query("anything at all"))
            .expect("search");
        assert_eq!(outcome.total_candidates, 0);
        assert!(outcome.results.is_empty());
        assert!(!outcome.fell_back);
    }
}
