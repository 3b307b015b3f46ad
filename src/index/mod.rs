//! Vector index over per-chunk embeddings.
//!
//! Stores one dense vector per chunk as a little-endian f32 blob plus a
//! JSON metadata sidecar (path, title, heading, section level, tags,
//! front-matter echo). Queries are brute-force cosine top-k with an
//! optional metadata filter, scored in parallel.

use crate::embedding::cosine_similarity;
use crate::error::{Error, Result};
use crate::model::Frontmatter;
use crate::store::chunk_store::encode_ts;
use crate::store::db::Db;
use chrono::Utc;
use rayon::prelude::*;
use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};

/// Metadata stored alongside each embedding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingMetadata {
    /// Owning document path.
    pub path: String,
    /// Document title.
    pub title: String,
    /// Section heading, if any.
    pub heading: Option<String>,
    /// Markdown heading level (0 for pre-heading chunks).
    pub heading_level: u8,
    /// Normalized tag set of the chunk.
    pub tags: Vec<String>,
    /// Front-matter echo of the owning document.
    pub frontmatter: Frontmatter,
}

/// A scored match from the index.
#[derive(Debug, Clone)]
pub struct VectorHit {
    /// Matched chunk id.
    pub chunk_id: String,
    /// Cosine similarity against the query vector.
    pub score: f32,
    /// Metadata sidecar of the match.
    pub metadata: EmbeddingMetadata,
}

/// Optional metadata predicate for queries.
#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    /// Restrict to chunks whose path starts with this prefix.
    pub path_prefix: Option<String>,
    /// Restrict to chunks carrying at least one of these tags.
    pub tags: Vec<String>,
}

impl VectorFilter {
    fn matches(&self, metadata: &EmbeddingMetadata) -> bool {
        if let Some(prefix) = &self.path_prefix
            && !metadata.path.starts_with(prefix.as_str())
        {
            return false;
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| metadata.tags.contains(t)) {
            return false;
        }
        true
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(Error::Dependency(
            "corrupt embedding blob length".to_string(),
        ));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// `SQLite`-backed vector index.
#[derive(Clone, Debug)]
pub struct VectorIndex {
    db: Db,
}

impl VectorIndex {
    /// Creates an index over a shared database handle.
    #[must_use]
    pub const fn new(db: Db) -> Self {
        Self { db }
    }

    /// Inserts or replaces the embedding of a chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn upsert(
        &self,
        chunk_id: &str,
        vector: &[f32],
        model: Option<&str>,
        metadata: &EmbeddingMetadata,
    ) -> Result<()> {
        let blob = encode_vector(vector);
        let metadata_json = serde_json::to_string(metadata)?;
        self.db.with(|conn| {
            conn.execute(
                r"
                INSERT INTO embeddings (chunk_id, vector, dimensions, model, metadata, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(chunk_id) DO UPDATE SET
                    vector = excluded.vector,
                    dimensions = excluded.dimensions,
                    model = excluded.model,
                    metadata = excluded.metadata,
                    created_at = excluded.created_at
                ",
                params![
                    chunk_id,
                    blob,
                    i64::try_from(vector.len()).unwrap_or(i64::MAX),
                    model,
                    metadata_json,
                    encode_ts(Utc::now()),
                ],
            )?;
            Ok(())
        })
    }

    /// Fetches the stored vector of a chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn vector(&self, chunk_id: &str) -> Result<Option<Vec<f32>>> {
        let blob: Option<Vec<u8>> = self.db.with(|conn| {
            Ok(conn
                .query_row(
                    "SELECT vector FROM embeddings WHERE chunk_id = ?1",
                    params![chunk_id],
                    |row| row.get(0),
                )
                .optional()?)
        })?;
        blob.map(|b| decode_vector(&b)).transpose()
    }

    /// Returns the cosine top-k matches for a query vector.
    ///
    /// `exclude` drops one chunk (typically the query's own chunk);
    /// `min_score` drops weak matches before ranking.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan fails.
    pub fn top_k(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&VectorFilter>,
        exclude: Option<&str>,
        min_score: f32,
    ) -> Result<Vec<VectorHit>> {
        let rows: Vec<(String, Vec<u8>, String)> = self.db.with(|conn| {
            let mut stmt = conn.prepare("SELECT chunk_id, vector, metadata FROM embeddings")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        let mut hits: Vec<VectorHit> = rows
            .par_iter()
            .filter_map(|(chunk_id, blob, metadata_json)| {
                if exclude == Some(chunk_id.as_str()) {
                    return None;
                }
                let metadata: EmbeddingMetadata = serde_json::from_str(metadata_json).ok()?;
                if let Some(f) = filter
                    && !f.matches(&metadata)
                {
                    return None;
                }
                let vector = decode_vector(blob).ok()?;
                let score = cosine_similarity(query, &vector);
                (score >= min_score).then(|| VectorHit {
                    chunk_id: chunk_id.clone(),
                    score,
                    metadata,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    /// Deletes embeddings whose chunk no longer exists.
    ///
    /// Returns the number of rows removed. Run after re-ingestion passes
    /// to honor the embedding-lifetime invariant.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn remove_orphans(&self) -> Result<usize> {
        self.db.with(|conn| {
            let removed = conn.execute(
                "DELETE FROM embeddings WHERE chunk_id NOT IN (SELECT id FROM chunks)",
                [],
            )?;
            Ok(removed)
        })
    }

    /// Number of stored embeddings.
    ///
    /// # Errors
    ///
    /// Returns an error if the count fails.
    #[allow(clippy::cast_sign_loss)]
    pub fn count(&self) -> Result<u64> {
        self.db.with(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{DEFAULT_DIMENSIONS, Embedder, HashEmbedder};
    use crate::model::NoteChunk;
    use crate::store::ChunkStore;

    fn meta(path: &str, tags: &[&str]) -> EmbeddingMetadata {
        EmbeddingMetadata {
            path: path.to_string(),
            title: "T".to_string(),
            heading: None,
            heading_level: 0,
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
            frontmatter: Frontmatter::new(),
        }
    }

    fn setup() -> (Db, VectorIndex, ChunkStore, HashEmbedder) {
        let db = Db::in_memory_index().expect("db");
        (
            db.clone(),
            VectorIndex::new(db.clone()),
            ChunkStore::new(db),
            HashEmbedder::new(DEFAULT_DIMENSIONS),
        )
    }

    fn put_chunk(store: &ChunkStore, path: &str, line: u32, text: &str) -> String {
        let chunk = NoteChunk::new(
            path,
            None,
            0,
            line,
            text.to_string(),
            None,
            Utc::now(),
            "h".to_string(),
        );
        store.upsert_chunk(&chunk).expect("upsert");
        chunk.id
    }

    #[test]
    fn test_vector_round_trip() {
        let (_db, index, store, embedder) = setup();
        let id = put_chunk(&store, "a.md", 1, "some text");
        let vector = embedder.embed("some text").expect("embed");
        index
            .upsert(&id, &vector, Some("hash"), &meta("a.md", &[]))
            .expect("upsert");

        let loaded = index.vector(&id).expect("fetch").expect("present");
        assert_eq!(loaded, vector);
    }

    #[test]
    fn test_top_k_ranks_by_similarity() {
        let (_db, index, store, embedder) = setup();
        let texts = [
            "rust systems programming",
            "rust memory safety programming",
            "gardening in spring",
        ];
        let mut ids = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            let id = put_chunk(&store, "a.md", (i as u32) * 4 + 1, text);
            let v = embedder.embed(text).expect("embed");
            index.upsert(&id, &v, None, &meta("a.md", &[])).expect("upsert");
            ids.push(id);
        }

        let query = embedder.embed("rust programming").expect("embed");
        let hits = index.top_k(&query, 2, None, None, f32::MIN).expect("query");
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score >= hits[1].score);
        // The gardening chunk should not be the best match.
        assert_ne!(hits[0].chunk_id, ids[2]);
    }

    #[test]
    fn test_top_k_respects_filter_and_exclude() {
        let (_db, index, store, embedder) = setup();
        let a = put_chunk(&store, "notes/a.md", 1, "shared words here");
        let b = put_chunk(&store, "other/b.md", 1, "shared words here too");
        let v = embedder.embed("shared words here").expect("embed");
        index
            .upsert(&a, &v, None, &meta("notes/a.md", &["ai"]))
            .expect("upsert");
        index
            .upsert(&b, &v, None, &meta("other/b.md", &["ml"]))
            .expect("upsert");

        let filter = VectorFilter {
            path_prefix: Some("notes/".to_string()),
            tags: Vec::new(),
        };
        let hits = index
            .top_k(&v, 10, Some(&filter), None, f32::MIN)
            .expect("query");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, a);

        let filter = VectorFilter {
            path_prefix: None,
            tags: vec!["ml".to_string()],
        };
        let hits = index
            .top_k(&v, 10, Some(&filter), None, f32::MIN)
            .expect("query");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, b);

        let hits = index.top_k(&v, 10, None, Some(&a), f32::MIN).expect("query");
        assert!(hits.iter().all(|h| h.chunk_id != a));
    }

    #[test]
    fn test_remove_orphans() {
        let (_db, index, store, embedder) = setup();
        let keep = put_chunk(&store, "a.md", 1, "kept chunk");
        let drop = put_chunk(&store, "a.md", 5, "dropped chunk");
        let v = embedder.embed("x").expect("embed");
        index.upsert(&keep, &v, None, &meta("a.md", &[])).expect("upsert");
        index.upsert(&drop, &v, None, &meta("a.md", &[])).expect("upsert");

        store
            .delete_chunks_for_path("a.md", std::slice::from_ref(&keep))
            .expect("delete");
        // Cascade already removed the embedding row; orphan sweep reports
        // nothing further.
        let removed = index.remove_orphans().expect("sweep");
        assert_eq!(removed, 0);
        assert_eq!(index.count().expect("count"), 1);
    }
}
