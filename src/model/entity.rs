//! Entities and their mentions in chunks.

use serde::{Deserialize, Serialize};

/// Label classes the rule-based extractor recognizes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityLabel {
    /// A person name.
    Person,
    /// A company, institution, or other organization.
    Organization,
    /// A geopolitical or geographic entity.
    Place,
    /// A technology, product, or framework name.
    Technology,
    /// A calendar date.
    Date,
    /// A monetary amount.
    Money,
    /// A percentage.
    Percent,
    /// An email address.
    Email,
    /// A URL.
    Url,
    /// An extension label not in the fixed set.
    Other(String),
}

impl EntityLabel {
    /// Stable string form used in storage.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Person => "person",
            Self::Organization => "organization",
            Self::Place => "place",
            Self::Technology => "technology",
            Self::Date => "date",
            Self::Money => "money",
            Self::Percent => "percent",
            Self::Email => "email",
            Self::Url => "url",
            Self::Other(s) => s,
        }
    }

    /// Parses the stable string form; unknown labels become [`Self::Other`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "person" => Self::Person,
            "organization" => Self::Organization,
            "place" => Self::Place,
            "technology" => Self::Technology,
            "date" => Self::Date,
            "money" => Self::Money,
            "percent" => Self::Percent,
            "email" => Self::Email,
            "url" => Self::Url,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for EntityLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An extracted entity. Identity is `(text, label)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Surface text as it appears in the corpus.
    pub text: String,
    /// Label class.
    pub label: EntityLabel,
    /// Extraction confidence in `[0, 1]`.
    pub confidence: f64,
    /// Optional free-form description.
    pub description: Option<String>,
}

/// A single occurrence of an entity inside a chunk.
///
/// Mentions are unique by `(chunk, entity, start, end)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMention {
    /// Chunk containing the mention.
    pub chunk_id: String,
    /// Mentioned entity surface text.
    pub text: String,
    /// Mentioned entity label.
    pub label: EntityLabel,
    /// Character offset where the mention starts.
    pub start_pos: usize,
    /// Character offset one past the mention end.
    pub end_pos: usize,
    /// Per-mention confidence in `[0, 1]`.
    pub confidence: f64,
}
