//! BM25 scoring over the candidate set.
//!
//! Scores are computed against the already-filtered candidates, not the
//! whole corpus: `N`, document frequencies, and the average document
//! length all come from the candidate list. Standard parameters
//! `k1 = 1.2`, `b = 0.75`; tokens are `\w+` runs, lowercased.

use unicode_segmentation::UnicodeSegmentation;

/// Term-frequency saturation parameter.
pub const K1: f64 = 1.2;

/// Length-normalization parameter.
pub const B: f64 = 0.75;

/// Snippet budget in grapheme clusters.
pub const SNIPPET_CHARS: usize = 260;

/// Tokenizes text into lowercased `\w+` runs.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Scores every candidate document against the query.
///
/// Returns one finite, non-negative score per document, in input order.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn bm25_scores(query: &str, docs: &[&str]) -> Vec<f64> {
    let q_terms = tokenize(query);
    let n = docs.len().max(1) as f64;
    let doc_tokens: Vec<Vec<String>> = docs.iter().map(|d| tokenize(d)).collect();

    let total_len: usize = doc_tokens.iter().map(Vec::len).sum();
    let avgdl = (total_len as f64 / n).max(f64::EPSILON);

    // Document frequency per distinct query term, over candidates only.
    let mut dfs = std::collections::HashMap::new();
    for term in &q_terms {
        if !dfs.contains_key(term) {
            let df = doc_tokens
                .iter()
                .filter(|tokens| tokens.iter().any(|t| t == term))
                .count();
            dfs.insert(term.clone(), df);
        }
    }

    doc_tokens
        .iter()
        .map(|tokens| {
            let dl = tokens.len().max(1) as f64;
            let mut score = 0.0;
            for term in &q_terms {
                let df = (*dfs.get(term).unwrap_or(&0)).max(1) as f64;
                let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                let tf = tokens.iter().filter(|t| *t == term).count() as f64;
                let denom = K1.mul_add(B.mul_add(dl / avgdl, 1.0 - B), tf);
                let denom = if denom == 0.0 { 1.0 } else { denom };
                score += idf * (tf * (K1 + 1.0)) / denom;
            }
            score
        })
        .collect()
}

/// Builds a display snippet: the first [`SNIPPET_CHARS`] grapheme
/// clusters with an ellipsis suffix when truncated.
#[must_use]
pub fn snippet(text: &str) -> String {
    let mut out = String::new();
    let mut truncated = false;
    for (i, grapheme) in text.graphemes(true).enumerate() {
        if i >= SNIPPET_CHARS {
            truncated = true;
            break;
        }
        out.push_str(grapheme);
    }
    if truncated {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_lowercases_and_splits() {
        assert_eq!(tokenize("Hello, World-wide_web!"), vec!["hello", "world", "wide_web"]);
        assert!(tokenize("!!! ...").is_empty());
    }

    #[test]
    fn test_matching_doc_outscores_non_matching() {
        let docs = ["the fox jumps", "unrelated content here", "fox fox fox"];
        let scores = bm25_scores("fox", &docs);
        assert_eq!(scores.len(), 3);
        assert!(scores[0] > scores[1]);
        assert!(scores[2] > scores[0]); // more occurrences, higher score
        assert!((scores[1]).abs() < 1e-12);
    }

    #[test]
    fn test_scores_finite_and_non_negative() {
        let docs = ["a b c", "", "a a a a a a a a"];
        for score in bm25_scores("a b missing", &docs) {
            assert!(score.is_finite());
            assert!(score >= 0.0);
        }
    }

    #[test]
    fn test_doubling_lengths_preserves_order() {
        // Doubling every document (term frequencies scale with lengths
        // relative to avgdl) must not change the ranking order.
        let docs = ["fox jumps high", "fox", "nothing relevant at all"];
        let doubled: Vec<String> = docs.iter().map(|d| format!("{d} {d}")).collect();
        let doubled_refs: Vec<&str> = doubled.iter().map(String::as_str).collect();

        let base = bm25_scores("fox", &docs);
        let scaled = bm25_scores("fox", &doubled_refs);

        let order = |scores: &[f64]| {
            let mut idx: Vec<usize> = (0..scores.len()).collect();
            idx.sort_by(|&a, &b| {
                scores[b]
                    .partial_cmp(&scores[a])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            idx
        };
        assert_eq!(order(&base), order(&scaled));
    }

    #[test]
    fn test_empty_candidate_set() {
        assert!(bm25_scores("anything", &[]).is_empty());
    }

    #[test]
    fn test_repeated_query_terms_accumulate() {
        let docs = ["fox den"];
        let once = bm25_scores("fox", &docs);
        let twice = bm25_scores("fox fox", &docs);
        assert!(twice[0] > once[0]);
    }

    #[test]
    fn test_snippet_truncation() {
        let short = "brief text";
        assert_eq!(snippet(short), short);

        let long = "x".repeat(300);
        let s = snippet(&long);
        assert!(s.ends_with('…'));
        assert_eq!(s.chars().count(), SNIPPET_CHARS + 1);
    }

    #[test]
    fn test_snippet_grapheme_safe() {
        // Multi-codepoint grapheme clusters survive truncation intact.
        let text = "é".repeat(300);
        let s = snippet(&text);
        assert!(s.ends_with('…'));
    }
}
