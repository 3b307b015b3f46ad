//! Extractive synthesis: answers, summaries, explanations, comparisons.
//!
//! No generative model is involved. Every output is assembled from
//! ranked chunk text with deterministic selection and formatting, and
//! carries its sources and a confidence derived from retrieval scores.

use crate::error::Result;
use crate::link::LinkingEngine;
use crate::model::NoteChunk;
use crate::search::{RetrievedChunk, Retriever, SearchRequest};
use crate::store::ChunkStore;
use serde::Serialize;
use std::sync::Arc;

/// A citation attached to a synthesis output.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    /// Document path.
    pub path: String,
    /// Section heading, if any.
    pub heading: Option<String>,
    /// Retrieval score of the cited chunk.
    pub score: f64,
}

impl SourceRef {
    /// `path#heading` reference string.
    #[must_use]
    pub fn reference(&self) -> String {
        format!("{}#{}", self.path, self.heading.as_deref().unwrap_or(""))
    }
}

/// One synthesis output.
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisOutput {
    /// Assembled text.
    pub content: String,
    /// Chunks the content was drawn from.
    pub sources: Vec<SourceRef>,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Operation-specific extras (query, strategy, counts).
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl SynthesisOutput {
    fn empty(reason: &str) -> Self {
        let mut metadata = serde_json::Map::new();
        metadata.insert("reason".to_string(), serde_json::json!(reason));
        Self {
            content: String::new(),
            sources: Vec::new(),
            confidence: 0.0,
            metadata,
        }
    }
}

/// Splits off the first `max` sentences of a text.
fn leading_sentences(text: &str, max: usize) -> String {
    let mut out = String::new();
    let mut count = 0;
    for part in text.split_inclusive(['.', '!', '?']) {
        if count >= max {
            break;
        }
        out.push_str(part);
        if part.ends_with(['.', '!', '?']) {
            count += 1;
        }
    }
    let trimmed = out.trim();
    if trimmed.is_empty() {
        text.trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Word-count based confidence factor: thin answers are discounted.
fn length_factor(words: usize) -> f64 {
    if words < 10 {
        0.5
    } else if words < 50 {
        0.8
    } else {
        1.0
    }
}

fn source_of(result: &RetrievedChunk) -> SourceRef {
    SourceRef {
        path: result.path.clone(),
        heading: result.heading.clone(),
        score: result.score,
    }
}

/// Extractive assembler over the retriever and link graph.
pub struct Synthesizer {
    retriever: Arc<Retriever>,
    linking: Arc<LinkingEngine>,
    chunks: ChunkStore,
}

impl Synthesizer {
    /// Creates an assembler.
    #[must_use]
    pub fn new(retriever: Arc<Retriever>, linking: Arc<LinkingEngine>, chunks: ChunkStore) -> Self {
        Self {
            retriever,
            linking,
            chunks,
        }
    }

    /// Answers a question as a bulleted list extracted from the top
    /// chunks.
    ///
    /// The first one or two sentences of each of the top three results
    /// become bullets; confidence is the mean source score scaled by an
    /// answer-length factor, clamped to `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns an error if retrieval fails.
    pub fn answer_question(&self, question: &str, k: usize) -> Result<SynthesisOutput> {
        let outcome = self.retriever.search(&SearchRequest::query(question))?;
        let results: Vec<&RetrievedChunk> = outcome.results.iter().take(k).collect();
        if results.is_empty() {
            return Ok(SynthesisOutput::empty("no matching chunks"));
        }

        let mut bullets = Vec::new();
        let mut sources = Vec::new();
        for result in results.iter().take(3) {
            let chunk_text = self
                .chunks
                .chunk(&result.chunk_id)?
                .map_or_else(|| result.snippet.clone(), |c| c.text);
            bullets.push(format!("- {}", leading_sentences(&chunk_text, 2)));
            sources.push(source_of(result));
        }
        let content = bullets.join("\n");

        let mean_score =
            sources.iter().map(|s| s.score).sum::<f64>() / sources.len() as f64;
        let words = content.split_whitespace().count();
        let confidence = (mean_score * length_factor(words)).clamp(0.0, 1.0);

        let mut metadata = serde_json::Map::new();
        metadata.insert("question".to_string(), serde_json::json!(question));
        metadata.insert(
            "strategy".to_string(),
            serde_json::json!(outcome.strategy.as_str()),
        );
        metadata.insert(
            "result_count".to_string(),
            serde_json::json!(outcome.results.len().min(k)),
        );

        Ok(SynthesisOutput {
            content,
            sources,
            confidence,
            metadata,
        })
    }

    /// Summarizes a list of chunks within a word budget.
    ///
    /// Chunks are scored `(2 if heading) + min(words/50, 3)` and emitted
    /// in score order, heading interleaved with text, until the budget
    /// is exhausted; the final chunk is truncated to fit.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn generate_summary(&self, chunks: &[NoteChunk], max_words: usize) -> SynthesisOutput {
        if chunks.is_empty() {
            return SynthesisOutput::empty("nothing to summarize");
        }

        let mut scored: Vec<(f64, &NoteChunk)> = chunks
            .iter()
            .map(|chunk| {
                let words = chunk.text.split_whitespace().count() as f64;
                let heading_bonus = if chunk.heading.is_some() { 2.0 } else { 0.0 };
                (heading_bonus + (words / 50.0).min(3.0), chunk)
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut parts: Vec<String> = Vec::new();
        let mut budget = max_words;
        let mut sources = Vec::new();
        for (score, chunk) in scored {
            if budget == 0 {
                break;
            }
            if let Some(heading) = &chunk.heading {
                parts.push(format!("## {heading}"));
            }
            let words: Vec<&str> = chunk.text.split_whitespace().collect();
            if words.len() <= budget {
                parts.push(chunk.text.clone());
                budget -= words.len();
            } else {
                parts.push(format!("{}…", words[..budget].join(" ")));
                budget = 0;
            }
            sources.push(SourceRef {
                path: chunk.path.clone(),
                heading: chunk.heading.clone(),
                score,
            });
        }

        let mut metadata = serde_json::Map::new();
        metadata.insert("max_words".to_string(), serde_json::json!(max_words));
        metadata.insert("chunks_considered".to_string(), serde_json::json!(chunks.len()));

        SynthesisOutput {
            content: parts.join("\n\n"),
            sources,
            confidence: 0.8,
            metadata,
        }
    }

    /// Explains a topic at increasing depth.
    ///
    /// Depth 1: overview from the best match. Depth 2 adds related
    /// concepts from the link graph. Depth 3 adds supplementary excerpts
    /// from the next-ranked matches.
    ///
    /// # Errors
    ///
    /// Returns an error if retrieval fails.
    pub fn generate_explanation(&self, topic: &str, depth: u8) -> Result<SynthesisOutput> {
        let outcome = self.retriever.search(&SearchRequest::query(topic))?;
        let Some(best) = outcome.results.first() else {
            return Ok(SynthesisOutput::empty("topic not found"));
        };

        let mut sections = Vec::new();
        let mut sources = vec![source_of(best)];

        let overview_text = self
            .chunks
            .chunk(&best.chunk_id)?
            .map_or_else(|| best.snippet.clone(), |c| c.text);
        sections.push(format!("# {topic}\n\n{}", leading_sentences(&overview_text, 3)));

        if depth >= 2 {
            let links = self.linking.links().links_from(&best.chunk_id, 0.6, None)?;
            if !links.is_empty() {
                let target_ids: Vec<String> =
                    links.iter().map(|l| l.target_id.clone()).collect();
                let targets = self.chunks.chunks_by_ids(&target_ids)?;
                let mut lines = vec!["## Related concepts".to_string()];
                for target in targets.iter().take(5) {
                    let label = target.heading.as_deref().unwrap_or(&target.path);
                    lines.push(format!("- {label} ({})", target.path));
                }
                sections.push(lines.join("\n"));
            }
        }

        if depth >= 3 {
            let mut lines = vec!["## Further detail".to_string()];
            let mut any = false;
            for result in outcome.results.iter().skip(1).take(2) {
                lines.push(format!("- {}", leading_sentences(&result.snippet, 2)));
                sources.push(source_of(result));
                any = true;
            }
            if any {
                sections.push(lines.join("\n"));
            }
        }

        let mut metadata = serde_json::Map::new();
        metadata.insert("topic".to_string(), serde_json::json!(topic));
        metadata.insert("depth".to_string(), serde_json::json!(depth));

        Ok(SynthesisOutput {
            content: sections.join("\n\n"),
            sources,
            confidence: 0.7,
            metadata,
        })
    }

    /// Compares two topics: an overview of each plus a fixed-template
    /// differences/similarities section.
    ///
    /// # Errors
    ///
    /// Returns an error if retrieval fails.
    pub fn compare_topics(&self, topic_a: &str, topic_b: &str) -> Result<SynthesisOutput> {
        let outcome_a = self.retriever.search(&SearchRequest::query(topic_a))?;
        let outcome_b = self.retriever.search(&SearchRequest::query(topic_b))?;

        let (Some(best_a), Some(best_b)) = (outcome_a.results.first(), outcome_b.results.first())
        else {
            return Ok(SynthesisOutput::empty("one or both topics not found"));
        };

        let overview = |result: &RetrievedChunk| -> Result<String> {
            Ok(self
                .chunks
                .chunk(&result.chunk_id)?
                .map_or_else(|| result.snippet.clone(), |c| leading_sentences(&c.text, 2)))
        };

        let content = format!(
            "# {topic_a} vs {topic_b}\n\n\
             ## {topic_a}\n\n{}\n\n\
             ## {topic_b}\n\n{}\n\n\
             ## Differences\n\n\
             Each topic is covered by distinct sections of the corpus; see the \
             overviews above for where they diverge.\n\n\
             ## Similarities\n\n\
             Both topics appear in this corpus and share the themes surfaced by \
             their overviews.",
            overview(best_a)?,
            overview(best_b)?,
        );

        let sources = vec![source_of(best_a), source_of(best_b)];
        let mut metadata = serde_json::Map::new();
        metadata.insert("topic_a".to_string(), serde_json::json!(topic_a));
        metadata.insert("topic_b".to_string(), serde_json::json!(topic_b));

        Ok(SynthesisOutput {
            content,
            sources,
            confidence: 0.6,
            metadata,
        })
    }
}
