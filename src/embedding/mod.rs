//! Embedding seam between the engine and whatever model a deployment
//! wires in.
//!
//! The pipeline, vector index, linking engine, and retriever never talk
//! to a model directly; they hold an [`Embedder`] and persist whatever
//! dimension it reports. The bundled [`HashEmbedder`] is a lexical
//! feature-hashing embedder: fully deterministic and offline, which
//! keeps ingestion, linking, and every retrieval test reproducible.
//! A real semantic model replaces it by implementing the same trait.

mod hash;

pub use hash::HashEmbedder;

use crate::Result;

/// Vector width of the bundled hash embedder.
///
/// Nothing in the engine assumes this number: a deployment wiring a
/// real model uses that model's width, and the index records the
/// dimension next to every stored vector.
pub const DEFAULT_DIMENSIONS: usize = 256;

/// Produces one dense vector per chunk of text.
///
/// The contract the rest of the engine relies on: the same text always
/// maps to the same vector, every vector has exactly
/// [`Embedder::dimensions`] entries, and implementations are
/// `Send + Sync` so ingestion can embed chunks in parallel.
///
/// # Examples
///
/// ```
/// use notegraph::embedding::{DEFAULT_DIMENSIONS, Embedder, HashEmbedder};
///
/// let embedder = HashEmbedder::new(DEFAULT_DIMENSIONS);
/// let section = embedder.embed("## Retrieval\nBM25 over candidates.").unwrap();
/// assert_eq!(section.len(), embedder.dimensions());
/// ```
pub trait Embedder: Send + Sync {
    /// Width of every vector this embedder produces.
    fn dimensions(&self) -> usize;

    /// Embeds one text.
    ///
    /// # Errors
    ///
    /// Returns an error when the backing model fails; the ingestion
    /// pipeline logs and skips the affected chunk.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embeds several texts, by default one at a time.
    ///
    /// Backends with real batching (or data parallelism) override this.
    ///
    /// # Errors
    ///
    /// Returns the first per-text failure.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Cosine similarity between two vectors.
///
/// Computed in a single pass as `dot / (‖a‖·‖b‖)`. Mismatched lengths
/// and zero-magnitude inputs score 0.0 rather than erroring, so callers
/// can feed stored vectors straight through without pre-checks.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = (norm_a * norm_b).sqrt();
    if denominator > 0.0 {
        dot / denominator
    } else {
        0.0
    }
}
