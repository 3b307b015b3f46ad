//! Linking engine: discovers, scores, and persists semantic links.
//!
//! Evidence for a link comes from two sources: cosine similarity between
//! chunk embeddings and entities shared between chunks. The combined
//! score is `0.6 * vector + 0.4 * entity`; candidates at or above the
//! auto-link threshold become symmetric AUTO edge pairs, candidates in
//! the suggestion band become pending links awaiting approval. Every edge
//! upsert refreshes the cached hub/authority degrees of both endpoints.

use crate::entity::EntityIndex;
use crate::error::Result;
use crate::index::VectorIndex;
use crate::model::{LinkProvenance, LinkType, PendingLink, PendingStatus, SemanticLink};
use crate::store::{ChunkStore, EdgeUpsert, LinkStore};
use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

/// Linking engine tunables.
#[derive(Debug, Clone, Copy)]
pub struct LinkConfig {
    /// Maximum auto links persisted per source chunk per pass.
    pub max_links: usize,
    /// Combined score at or above which an edge is created automatically.
    pub threshold: f64,
    /// Combined score at or above which a sub-threshold candidate becomes
    /// a pending link.
    pub suggestion_floor: f64,
    /// Weight of the vector-similarity evidence.
    pub vector_weight: f64,
    /// Weight of the shared-entity evidence.
    pub entity_weight: f64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            max_links: 10,
            threshold: 0.7,
            suggestion_floor: 0.5,
            vector_weight: 0.6,
            entity_weight: 0.4,
        }
    }
}

/// A scored link candidate before persistence.
#[derive(Debug, Clone)]
pub struct LinkCandidate {
    /// Candidate target chunk.
    pub target_id: String,
    /// Best cosine similarity observed for the target (0 when absent).
    pub vector_score: f64,
    /// Mean shared-entity mention confidence (0 when absent).
    pub entity_score: f64,
    /// Weighted combination of the two signals.
    pub combined: f64,
    /// Evidence summary, one clause per signal.
    pub rationale: String,
}

/// Result of a linking pass over one chunk.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkReport {
    /// Source chunk id.
    pub chunk_id: String,
    /// Candidates considered.
    pub candidates: usize,
    /// New edge pairs created.
    pub created: usize,
    /// Existing edges upgraded to a higher strength.
    pub updated: usize,
    /// Pending links proposed.
    pub pending: usize,
    /// Candidates that failed to persist (logged and skipped).
    pub failed: usize,
}

/// One node emitted by the bounded graph traversal.
#[derive(Debug, Clone)]
pub struct GraphVisit {
    /// Visited chunk.
    pub chunk_id: String,
    /// Hop distance from the closest start node.
    pub depth: u32,
    /// Product of edge strengths along the discovery path.
    pub strength: f64,
    /// Relationship of the edge used to reach the node (None for starts).
    pub via: Option<LinkType>,
}

/// Discovers and persists semantic relationships between chunks.
pub struct LinkingEngine {
    chunks: ChunkStore,
    links: LinkStore,
    vectors: VectorIndex,
    entities: EntityIndex,
    config: LinkConfig,
}

impl LinkingEngine {
    /// Creates an engine over the shared stores.
    #[must_use]
    pub fn new(
        chunks: ChunkStore,
        links: LinkStore,
        vectors: VectorIndex,
        entities: EntityIndex,
        config: LinkConfig,
    ) -> Self {
        Self {
            chunks,
            links,
            vectors,
            entities,
            config,
        }
    }

    /// Access to the underlying link store.
    #[must_use]
    pub const fn links(&self) -> &LinkStore {
        &self.links
    }

    /// Scores link candidates for a chunk from vector similarity and
    /// shared entities, strongest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the similarity query or mention lookup fails.
    pub fn score_candidates(&self, chunk_id: &str) -> Result<Vec<LinkCandidate>> {
        let Some(vector) = self.vectors.vector(chunk_id)? else {
            tracing::warn!(chunk = %chunk_id, "no embedding, skipping linking");
            return Ok(Vec::new());
        };

        // Fetch down to the suggestion floor: entity evidence can lift a
        // sub-threshold vector candidate over the auto-link bar.
        #[allow(clippy::cast_possible_truncation)]
        let min_score = self.config.suggestion_floor as f32;
        let similar = self.vectors.top_k(
            &vector,
            self.config.max_links * 2,
            None,
            Some(chunk_id),
            min_score,
        )?;

        struct Partial {
            vector_score: f64,
            entity_sum: f64,
            entity_count: usize,
            clauses: Vec<String>,
        }
        let mut partials: HashMap<String, Partial> = HashMap::new();

        for hit in similar {
            let score = f64::from(hit.score);
            let entry = partials.entry(hit.chunk_id).or_insert_with(|| Partial {
                vector_score: 0.0,
                entity_sum: 0.0,
                entity_count: 0,
                clauses: Vec::new(),
            });
            if score > entry.vector_score {
                entry.vector_score = score;
            }
            entry.clauses.push(format!("Vector similarity: {score:.3}"));
        }

        for mention in self.entities.mentions_for_chunk(chunk_id)? {
            for (target_id, confidence) in self.entities.chunks_mentioning(&mention.text)? {
                if target_id == chunk_id {
                    continue;
                }
                let entry = partials.entry(target_id).or_insert_with(|| Partial {
                    vector_score: 0.0,
                    entity_sum: 0.0,
                    entity_count: 0,
                    clauses: Vec::new(),
                });
                entry.entity_sum += confidence;
                entry.entity_count += 1;
                entry
                    .clauses
                    .push(format!("Shared entity '{}': {confidence:.3}", mention.text));
            }
        }

        let mut candidates: Vec<LinkCandidate> = partials
            .into_iter()
            .map(|(target_id, partial)| {
                let entity_score = if partial.entity_count == 0 {
                    0.0
                } else {
                    partial.entity_sum / partial.entity_count as f64
                };
                let combined = self.config.vector_weight * partial.vector_score
                    + self.config.entity_weight * entity_score;
                LinkCandidate {
                    target_id,
                    vector_score: partial.vector_score,
                    entity_score,
                    combined,
                    rationale: partial.clauses.join("; "),
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.combined
                .partial_cmp(&a.combined)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(candidates)
    }

    /// Runs a full linking pass for a chunk: scores candidates, persists
    /// edges at or above the threshold, proposes pending links in the
    /// suggestion band, and refreshes degree caches.
    ///
    /// Single-candidate failures never abort the pass.
    ///
    /// # Errors
    ///
    /// Returns an error if candidate scoring fails outright.
    pub fn link_chunk(&self, chunk_id: &str) -> Result<LinkReport> {
        let candidates = self.score_candidates(chunk_id)?;
        let mut report = LinkReport {
            chunk_id: chunk_id.to_string(),
            candidates: candidates.len(),
            ..LinkReport::default()
        };

        let mut persisted = 0usize;
        let mut touched: HashSet<String> = HashSet::new();

        for candidate in &candidates {
            if candidate.combined >= self.config.threshold {
                if persisted >= self.config.max_links {
                    continue;
                }
                match self.persist_edge_pair(chunk_id, candidate) {
                    Ok(EdgeUpsert::Created) => {
                        report.created += 1;
                        persisted += 1;
                        touched.insert(candidate.target_id.clone());
                    }
                    Ok(EdgeUpsert::Upgraded) => {
                        report.updated += 1;
                        persisted += 1;
                        touched.insert(candidate.target_id.clone());
                    }
                    Ok(EdgeUpsert::Unchanged) => {
                        persisted += 1;
                    }
                    Err(e) => {
                        tracing::error!(
                            source = %chunk_id,
                            target = %candidate.target_id,
                            error = %e,
                            "edge persist failed"
                        );
                        report.failed += 1;
                    }
                }
            } else if candidate.combined >= self.config.suggestion_floor {
                match self.propose_pending(chunk_id, candidate) {
                    Ok(true) => report.pending += 1,
                    Ok(false) => {}
                    Err(e) => {
                        tracing::error!(
                            source = %chunk_id,
                            target = %candidate.target_id,
                            error = %e,
                            "pending link failed"
                        );
                        report.failed += 1;
                    }
                }
            }
        }

        if !touched.is_empty() {
            self.refresh_degrees(chunk_id)?;
            for target in &touched {
                self.refresh_degrees(target)?;
            }
        }

        tracing::info!(
            chunk = %chunk_id,
            created = report.created,
            updated = report.updated,
            pending = report.pending,
            "linking pass done"
        );
        Ok(report)
    }

    fn persist_edge_pair(&self, source_id: &str, candidate: &LinkCandidate) -> Result<EdgeUpsert> {
        let link_type = LinkType::from_strength(candidate.combined);
        let now = Utc::now();
        let forward = SemanticLink {
            source_id: source_id.to_string(),
            target_id: candidate.target_id.clone(),
            link_type,
            strength: candidate.combined,
            rationale: candidate.rationale.clone(),
            provenance: LinkProvenance::Auto,
            created_at: now,
            updated_at: now,
        };
        let outcome = self.links.upsert_edge(&forward)?;

        let reverse = SemanticLink {
            source_id: candidate.target_id.clone(),
            target_id: source_id.to_string(),
            rationale: format!("Reverse of: {}", candidate.rationale),
            ..forward
        };
        self.links.upsert_edge(&reverse)?;
        Ok(outcome)
    }

    fn propose_pending(&self, source_id: &str, candidate: &LinkCandidate) -> Result<bool> {
        if self.links.has_pending(source_id, &candidate.target_id)? {
            return Ok(false);
        }
        self.links.create_pending(
            source_id,
            &candidate.target_id,
            LinkType::from_strength(candidate.combined),
            candidate.combined,
            &candidate.rationale,
        )?;
        Ok(true)
    }

    /// Recomputes and caches the hub/authority degrees of a chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if the degree queries or cache write fail.
    pub fn refresh_degrees(&self, chunk_id: &str) -> Result<()> {
        let hub = self.links.outgoing_count(chunk_id)?;
        let authority = self.links.incoming_count(chunk_id)?;
        self.chunks.set_degrees(chunk_id, hub, authority)
    }

    /// Approves a pending link: materializes a MANUAL edge pair with the
    /// stored rationale and refreshes degrees.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `Conflict` from the decision, or a store
    /// error from edge persistence.
    pub fn approve_pending(&self, pending_id: i64) -> Result<SemanticLink> {
        let decided = self
            .links
            .decide_pending(pending_id, PendingStatus::Approved)?;
        let now = Utc::now();
        let edge = SemanticLink {
            source_id: decided.source_id.clone(),
            target_id: decided.target_id.clone(),
            link_type: decided.link_type,
            strength: decided.strength,
            rationale: decided.rationale.clone(),
            provenance: LinkProvenance::Manual,
            created_at: now,
            updated_at: now,
        };
        self.links.upsert_edge(&edge)?;
        let reverse = SemanticLink {
            source_id: decided.target_id.clone(),
            target_id: decided.source_id.clone(),
            rationale: format!("Reverse of: {}", decided.rationale),
            ..edge.clone()
        };
        self.links.upsert_edge(&reverse)?;
        self.refresh_degrees(&decided.source_id)?;
        self.refresh_degrees(&decided.target_id)?;
        Ok(edge)
    }

    /// Rejects a pending link, retaining the decision.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `Conflict` from the decision.
    pub fn reject_pending(&self, pending_id: i64) -> Result<PendingLink> {
        self.links.decide_pending(pending_id, PendingStatus::Rejected)
    }

    /// Bounded breadth-first traversal from a set of start chunks.
    ///
    /// Emits each reachable chunk once, at its shallowest depth, with the
    /// product of edge strengths along the discovery path. Start nodes
    /// are emitted at depth 0 with strength 1.
    ///
    /// # Errors
    ///
    /// Returns an error if an edge query fails.
    pub fn traverse(
        &self,
        start_ids: &[String],
        max_hops: u32,
        max_nodes: usize,
    ) -> Result<Vec<GraphVisit>> {
        let mut visits = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<GraphVisit> = start_ids
            .iter()
            .map(|id| GraphVisit {
                chunk_id: id.clone(),
                depth: 0,
                strength: 1.0,
                via: None,
            })
            .collect();

        while let Some(visit) = queue.pop_front() {
            if visits.len() >= max_nodes {
                break;
            }
            if !visited.insert(visit.chunk_id.clone()) {
                continue;
            }

            if visit.depth < max_hops {
                for link in self.links.links_from(&visit.chunk_id, 0.0, None)? {
                    if !visited.contains(&link.target_id) {
                        queue.push_back(GraphVisit {
                            chunk_id: link.target_id,
                            depth: visit.depth + 1,
                            strength: visit.strength * link.strength,
                            via: Some(link.link_type),
                        });
                    }
                }
            }
            visits.push(visit);
        }

        Ok(visits)
    }
}

impl std::fmt::Debug for LinkingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkingEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
