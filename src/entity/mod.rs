//! Rule-based entity and keyphrase extraction.
//!
//! A fixed table of label → regex patterns covers people, organizations,
//! places, technology terms, dates, money, percentages, emails, and URLs,
//! with a flat default confidence for matches. Keyphrases are frequent
//! bigrams/trigrams filtered against a small stop list. No models.

use crate::error::{Error, Result};
use crate::model::{Entity, EntityLabel, EntityMention};
use crate::store::db::Db;
use regex::Regex;
use rusqlite::params;
use std::collections::{HashMap, HashSet};

/// Confidence assigned to every regex match.
pub const DEFAULT_CONFIDENCE: f64 = 0.8;

/// Maximum keyphrases returned per chunk.
const MAX_KEYPHRASES: usize = 20;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "is", "are", "was", "were", "be", "been", "this", "that", "these", "those", "it",
    "its", "as", "if", "then", "than", "so", "not", "no", "can", "will", "has", "have", "had",
];

fn pattern_table() -> Vec<(EntityLabel, Vec<&'static str>)> {
    vec![
        (
            EntityLabel::Person,
            vec![
                r"\b[A-Z][a-z]+ [A-Z][a-z]+\b",
                r"\b[A-Z][a-z]+ [A-Z]\. [A-Z][a-z]+\b",
            ],
        ),
        (
            EntityLabel::Organization,
            vec![
                r"\b[A-Z][a-z]+ (?:Inc|Corp|LLC|Ltd|Company|Corporation)\b",
                r"\b[A-Z][a-z]+ (?:University|College|Institute|School)\b",
                r"\b[A-Z][a-z]+ (?:Hospital|Medical|Center|Clinic)\b",
            ],
        ),
        (
            EntityLabel::Place,
            vec![
                r"\b[A-Z][a-z]+ (?:City|State|Country|Nation)\b",
                r"\b(?:United States|USA|UK|Canada|Germany|France|Japan|China)\b",
            ],
        ),
        (
            EntityLabel::Technology,
            vec![
                r"\b(?:Python|Java|JavaScript|React|Vue|Angular|Node\.js|Django|Flask|Rust)\b",
                r"\b(?:Machine Learning|AI|Artificial Intelligence|Deep Learning)\b",
                r"\b(?:Cloud Computing|AWS|Azure|Google Cloud|Docker|Kubernetes)\b",
            ],
        ),
        (
            EntityLabel::Date,
            vec![
                r"\b(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2},?\s+\d{4}\b",
                r"\b\d{1,2}/\d{1,2}/\d{4}\b",
                r"\b\d{4}-\d{2}-\d{2}\b",
            ],
        ),
        (
            EntityLabel::Money,
            vec![
                r"\$\d+(?:,\d{3})*(?:\.\d{2})?\b",
                r"\b\d+(?:,\d{3})*(?:\.\d{2})?\s*(?:dollars?|USD|euros?|EUR)\b",
            ],
        ),
        (EntityLabel::Percent, vec![r"\b\d+(?:\.\d+)?%"]),
        (
            EntityLabel::Email,
            vec![r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b"],
        ),
        (
            EntityLabel::Url,
            vec![r"https?://[^\s]+", r"www\.[^\s]+"],
        ),
    ]
}

/// Extraction output for a chunk.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Detected mentions, unique by `(text, start, end)`.
    pub mentions: Vec<(Entity, usize, usize)>,
    /// Frequent bigrams/trigrams, best first.
    pub keyphrases: Vec<String>,
}

/// Rule-based extractor over a fixed pattern table.
pub struct EntityExtractor {
    patterns: Vec<(EntityLabel, Vec<Regex>)>,
    stop_words: HashSet<&'static str>,
    word_re: Regex,
}

impl EntityExtractor {
    /// Compiles the pattern table.
    ///
    /// # Errors
    ///
    /// Returns an error if any pattern fails to compile.
    pub fn new() -> Result<Self> {
        let mut patterns = Vec::new();
        for (label, sources) in pattern_table() {
            let compiled = sources
                .into_iter()
                .map(|p| {
                    Regex::new(p)
                        .map_err(|e| Error::invalid_input(format!("entity pattern: {e}")))
                })
                .collect::<Result<Vec<_>>>()?;
            patterns.push((label, compiled));
        }
        Ok(Self {
            patterns,
            stop_words: STOP_WORDS.iter().copied().collect(),
            word_re: Regex::new(r"\b[a-zA-Z]+\b")
                .map_err(|e| Error::invalid_input(format!("word pattern: {e}")))?,
        })
    }

    /// Extracts entities and keyphrases from chunk text.
    #[must_use]
    pub fn extract(&self, text: &str) -> Extraction {
        let mut seen: HashSet<(String, usize, usize)> = HashSet::new();
        let mut mentions = Vec::new();

        for (label, regexes) in &self.patterns {
            for regex in regexes {
                for m in regex.find_iter(text) {
                    let key = (m.as_str().to_string(), m.start(), m.end());
                    if !seen.insert(key) {
                        continue;
                    }
                    mentions.push((
                        Entity {
                            text: m.as_str().to_string(),
                            label: label.clone(),
                            confidence: DEFAULT_CONFIDENCE,
                            description: None,
                        },
                        m.start(),
                        m.end(),
                    ));
                }
            }
        }

        Extraction {
            keyphrases: self.keyphrases(text),
            mentions,
        }
    }

    /// Extracts bigram/trigram keyphrases by raw frequency.
    ///
    /// Phrases containing a stop word are dropped; only phrases seen more
    /// than once qualify, top 20 by count.
    #[must_use]
    pub fn keyphrases(&self, text: &str) -> Vec<String> {
        let words: Vec<String> = self
            .word_re
            .find_iter(&text.to_lowercase())
            .map(|m| m.as_str().to_string())
            .collect();

        let mut counts: HashMap<String, usize> = HashMap::new();
        for n in 2..=3usize {
            if words.len() < n {
                continue;
            }
            for window in words.windows(n) {
                if window.iter().any(|w| self.stop_words.contains(w.as_str())) {
                    continue;
                }
                *counts.entry(window.join(" ")).or_insert(0) += 1;
            }
        }

        let mut phrases: Vec<(String, usize)> =
            counts.into_iter().filter(|(_, c)| *c > 1).collect();
        phrases.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        phrases.truncate(MAX_KEYPHRASES);
        phrases.into_iter().map(|(p, _)| p).collect()
    }
}

/// Entity persistence over the primary index.
#[derive(Clone)]
pub struct EntityIndex {
    db: Db,
}

impl EntityIndex {
    /// Creates an index over a shared database handle.
    #[must_use]
    pub const fn new(db: Db) -> Self {
        Self { db }
    }

    /// Persists the mentions extracted from a chunk, replacing any prior
    /// mentions of that chunk.
    ///
    /// Returns the number of mentions stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the writes fail.
    pub fn replace_mentions(
        &self,
        chunk_id: &str,
        mentions: &[(Entity, usize, usize)],
    ) -> Result<usize> {
        self.db.with_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM entity_mentions WHERE chunk_id = ?1",
                params![chunk_id],
            )?;
            let mut stored = 0;
            for (entity, start, end) in mentions {
                tx.execute(
                    r"
                    INSERT INTO entities (text, label, confidence, description)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(text, label) DO UPDATE SET
                        confidence = MAX(confidence, excluded.confidence)
                    ",
                    params![
                        entity.text,
                        entity.label.as_str(),
                        entity.confidence,
                        entity.description,
                    ],
                )?;
                let entity_id: i64 = tx.query_row(
                    "SELECT id FROM entities WHERE text = ?1 AND label = ?2",
                    params![entity.text, entity.label.as_str()],
                    |row| row.get(0),
                )?;
                tx.execute(
                    r"
                    INSERT OR IGNORE INTO entity_mentions
                        (chunk_id, entity_id, start_pos, end_pos, confidence)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    ",
                    params![
                        chunk_id,
                        entity_id,
                        i64::try_from(*start).unwrap_or(i64::MAX),
                        i64::try_from(*end).unwrap_or(i64::MAX),
                        entity.confidence,
                    ],
                )?;
                stored += 1;
            }
            tx.commit()?;
            Ok(stored)
        })
    }

    /// Finds chunks mentioning an entity by surface text, with the
    /// strongest per-chunk mention confidence.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn chunks_mentioning(&self, entity_text: &str) -> Result<Vec<(String, f64)>> {
        self.db.with(|conn| {
            let mut stmt = conn.prepare(
                r"
                SELECT em.chunk_id, MAX(em.confidence)
                FROM entity_mentions em
                JOIN entities e ON e.id = em.entity_id
                WHERE e.text = ?1 COLLATE NOCASE
                GROUP BY em.chunk_id
                ",
            )?;
            let rows = stmt
                .query_map(params![entity_text], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Fetches the mentions recorded for a chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    #[allow(clippy::cast_sign_loss)]
    pub fn mentions_for_chunk(&self, chunk_id: &str) -> Result<Vec<EntityMention>> {
        self.db.with(|conn| {
            let mut stmt = conn.prepare(
                r"
                SELECT em.chunk_id, e.text, e.label, em.start_pos, em.end_pos, em.confidence
                FROM entity_mentions em
                JOIN entities e ON e.id = em.entity_id
                WHERE em.chunk_id = ?1
                ORDER BY em.start_pos
                ",
            )?;
            let rows = stmt
                .query_map(params![chunk_id], |row| {
                    let label: String = row.get(2)?;
                    Ok(EntityMention {
                        chunk_id: row.get(0)?,
                        text: row.get(1)?,
                        label: EntityLabel::parse(&label),
                        start_pos: row.get::<_, i64>(3)? as usize,
                        end_pos: row.get::<_, i64>(4)? as usize,
                        confidence: row.get(5)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NoteChunk;
    use crate::store::ChunkStore;
    use chrono::Utc;

    #[test]
    fn test_extract_labels() {
        let extractor = EntityExtractor::new().expect("compile");
        let text = "Alice Johnson joined Acme Corp on 2024-03-01. \
                    Budget: $1,200.50 (up 12.5%). Contact alice@acme.io or \
                    https://acme.io. She uses Rust and Docker.";
        let extraction = extractor.extract(text);

        let labels: HashSet<String> = extraction
            .mentions
            .iter()
            .map(|(e, _, _)| e.label.as_str().to_string())
            .collect();
        for expected in [
            "person",
            "organization",
            "date",
            "money",
            "percent",
            "email",
            "url",
            "technology",
        ] {
            assert!(labels.contains(expected), "missing label {expected}");
        }
        for (entity, _, _) in &extraction.mentions {
            assert!((entity.confidence - DEFAULT_CONFIDENCE).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn test_extract_unique_by_span() {
        let extractor = EntityExtractor::new().expect("compile");
        // "Machine Learning" also matches the person-like First Last shape;
        // the span dedup keeps one mention per (text, start, end).
        let extraction = extractor.extract("Machine Learning");
        let mut seen = HashSet::new();
        for (entity, start, end) in &extraction.mentions {
            assert!(seen.insert((entity.text.clone(), *start, *end)));
        }
    }

    #[test]
    fn test_keyphrases_frequency_filter() {
        let extractor = EntityExtractor::new().expect("compile");
        let text = "graph database performance matters. graph database tuning \
                    improves graph database performance.";
        let phrases = extractor.keyphrases(text);
        assert!(phrases.iter().any(|p| p == "graph database"));
        // A phrase seen once does not qualify.
        assert!(!phrases.iter().any(|p| p == "database tuning"));
    }

    #[test]
    fn test_keyphrases_stop_word_filter() {
        let extractor = EntityExtractor::new().expect("compile");
        let phrases = extractor.keyphrases("the cat sat. the cat sat.");
        assert!(phrases.iter().all(|p| !p.contains("the")));
    }

    #[test]
    fn test_mention_persistence_round_trip() {
        let db = Db::in_memory_index().expect("db");
        let chunks = ChunkStore::new(db.clone());
        let index = EntityIndex::new(db);
        let extractor = EntityExtractor::new().expect("compile");

        let chunk = NoteChunk::new(
            "a.md",
            None,
            0,
            1,
            "Alice Johnson works at Acme Corp.".to_string(),
            None,
            Utc::now(),
            "h".to_string(),
        );
        chunks.upsert_chunk(&chunk).expect("upsert");

        let extraction = extractor.extract(&chunk.text);
        let stored = index
            .replace_mentions(&chunk.id, &extraction.mentions)
            .expect("persist");
        assert!(stored >= 2);

        let mentions = index.mentions_for_chunk(&chunk.id).expect("fetch");
        assert_eq!(mentions.len(), stored);

        let hits = index.chunks_mentioning("Alice Johnson").expect("query");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, chunk.id);
        // Case-insensitive resolution.
        let hits = index.chunks_mentioning("alice johnson").expect("query");
        assert_eq!(hits.len(), 1);
    }
}
