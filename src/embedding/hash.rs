//! Lexical feature-hashing embedder.
//!
//! Every word and every adjacent word pair of the input becomes a
//! feature. A feature's FNV-1a hash is folded into four 16-bit lanes;
//! each lane addresses one slot of the vector (high bits) and bumps it
//! up or down (parity bit). Bigrams carry half the weight of words, so
//! word order shifts a vector without drowning out shared vocabulary.
//! The result is L2-normalized.
//!
//! Overlapping vocabulary therefore lands close under cosine
//! similarity, and identical text embeds identically on every platform.
//! None of this is semantic; a real model plugs in through the
//! [`Embedder`] seam.

use crate::Result;
use crate::embedding::Embedder;

/// FNV-1a 64-bit offset basis.
const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;

/// FNV-1a 64-bit prime.
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 16-bit lanes folded out of each feature hash.
const LANES: u32 = 4;

/// Relative weight of word-pair features.
const BIGRAM_WEIGHT: f32 = 0.5;

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Deterministic lexical embedder over hashed word features.
///
/// # Examples
///
/// ```
/// use notegraph::embedding::{Embedder, HashEmbedder};
///
/// let embedder = HashEmbedder::new(128);
/// let v1 = embedder.embed("chunk store facets").unwrap();
/// let v2 = embedder.embed("chunk store facets").unwrap();
/// assert_eq!(v1, v2);
/// ```
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    /// Creates an embedder producing vectors of the given width.
    #[must_use]
    pub const fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// Folds one feature into the vector, one slot per hash lane.
    #[allow(clippy::cast_possible_truncation)]
    fn fold_in(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = fnv1a(feature.as_bytes());
        for lane in 0..LANES {
            let bits = (hash >> (16 * lane)) as u16;
            let slot = usize::from(bits >> 1) % self.dimensions;
            if bits & 1 == 0 {
                vector[slot] += weight;
            } else {
                vector[slot] -= weight;
            }
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        for word in &words {
            self.fold_in(&mut vector, word, 1.0);
        }
        for pair in words.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.fold_in(&mut vector, &bigram, BIGRAM_WEIGHT);
        }

        // Unit length, so cosine against other embeddings is a dot product.
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Embedder for HashEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        // Hashing is pure CPU work; fan the batch out across cores.
        use rayon::prelude::*;

        texts.par_iter().map(|text| self.embed(text)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    const DIMS: usize = 128;

    #[test]
    fn test_same_input_same_vector() {
        let embedder = HashEmbedder::new(DIMS);
        assert_eq!(
            embedder.embed("the link graph").expect("embed"),
            embedder.embed("the link graph").expect("embed"),
        );
    }

    #[test]
    fn test_reported_width_matches_output() {
        let embedder = HashEmbedder::new(DIMS);
        assert_eq!(embedder.dimensions(), DIMS);
        assert_eq!(embedder.embed("facets").expect("embed").len(), DIMS);
    }

    #[test]
    fn test_vectors_are_unit_length() {
        let embedder = HashEmbedder::new(DIMS);
        let vector = embedder.embed("pending links await approval").expect("embed");
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_input_is_zero_vector() {
        let embedder = HashEmbedder::new(DIMS);
        let vector = embedder.embed("").expect("embed");
        assert!(vector.iter().all(|v| *v == 0.0));
        // Punctuation-only input carries no features either.
        let vector = embedder.embed("--- !!!").expect("embed");
        assert!(vector.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_shared_vocabulary_scores_higher() {
        let embedder = HashEmbedder::new(DIMS);
        let base = embedder.embed("semantic links between chunks").expect("embed");
        let overlapping = embedder.embed("semantic links between notes").expect("embed");
        let disjoint = embedder.embed("quarterly revenue forecast").expect("embed");

        let close = cosine_similarity(&base, &overlapping);
        let far = cosine_similarity(&base, &disjoint);
        assert!(
            close > far,
            "overlap should outscore disjoint text: {close} vs {far}"
        );
        // Disjoint text only overlaps through slot collisions.
        assert!(far.abs() < 0.3, "disjoint text should be near zero: {far}");
    }

    #[test]
    fn test_word_order_shifts_the_vector() {
        // Same words, different bigrams: similar but not identical.
        let embedder = HashEmbedder::new(DIMS);
        let forward = embedder.embed("alpha beta gamma").expect("embed");
        let reversed = embedder.embed("gamma beta alpha").expect("embed");
        let sim = cosine_similarity(&forward, &reversed);
        assert!(sim < 1.0 - 1e-4);
        assert!(sim > 0.5);
    }

    #[test]
    fn test_case_folding() {
        let embedder = HashEmbedder::new(DIMS);
        assert_eq!(
            embedder.embed("Hybrid Rerank").expect("embed"),
            embedder.embed("hybrid rerank").expect("embed"),
        );
    }

    #[test]
    fn test_batch_matches_single_embeds() {
        let embedder = HashEmbedder::new(DIMS);
        let texts = vec!["one chunk", "another chunk", "a third"];
        let batch = embedder.embed_batch(&texts).expect("batch");
        for (text, vector) in texts.iter().zip(&batch) {
            assert_eq!(vector, &embedder.embed(text).expect("embed"));
        }
    }
}
