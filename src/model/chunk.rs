//! Chunk representation and content-addressed identity.
//!
//! A chunk is a positionally-identified, non-empty span of a file's body
//! associated with at most one heading. Chunk identity is derived from the
//! owning path, the 1-based start line, and a prefix of the text, so
//! re-ingesting unchanged content rewrites the same rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Number of leading characters of the chunk body that participate in the
/// identity hash.
const ID_TEXT_PREFIX_CHARS: usize = 64;

/// Computes the content-addressed chunk identifier.
///
/// The identity is `sha1("{path}:{start_line}:{first 64 chars of text}")`,
/// hex-encoded. It depends only on its three inputs.
///
/// # Examples
///
/// ```
/// use notegraph::model::chunk_id;
///
/// let a = chunk_id("notes/intro.md", 2, "A test.");
/// let b = chunk_id("notes/intro.md", 2, "A test.");
/// assert_eq!(a, b);
/// assert_ne!(a, chunk_id("notes/intro.md", 3, "A test."));
/// ```
#[must_use]
pub fn chunk_id(path: &str, start_line: u32, text: &str) -> String {
    let prefix: String = text.chars().take(ID_TEXT_PREFIX_CHARS).collect();
    let mut hasher = Sha1::new();
    hasher.update(path.as_bytes());
    hasher.update(b":");
    hasher.update(start_line.to_string().as_bytes());
    hasher.update(b":");
    hasher.update(prefix.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// A chunk of a markdown document body.
///
/// Chunks of the same file, sorted by `start_line`, cover disjoint
/// contiguous regions of the body; a chunk's text is always non-empty
/// after trimming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteChunk {
    /// Content-addressed identifier (see [`chunk_id`]).
    pub id: String,

    /// Canonical path of the owning file.
    pub path: String,

    /// Heading of the section this chunk belongs to, if any. The first
    /// chunk of a file whose body starts before any heading has none.
    pub heading: Option<String>,

    /// Markdown heading level (1-6), 0 when the chunk precedes any heading.
    pub heading_level: u8,

    /// 1-based line number of the first body line of this chunk.
    pub start_line: u32,

    /// Chunk body text (trimmed, non-empty).
    pub text: String,

    /// Creation instant inherited from the file (front-matter derived).
    pub created_at: Option<DateTime<Utc>>,

    /// Modification instant inherited from the file (source authoritative).
    pub modified_at: DateTime<Utc>,

    /// File-level content hash at the time this chunk was produced.
    pub hash: String,

    /// Cached outgoing-edge count in the semantic link graph.
    #[serde(default)]
    pub hub_count: u32,

    /// Cached incoming-edge count in the semantic link graph.
    #[serde(default)]
    pub authority_count: u32,
}

impl NoteChunk {
    /// Creates a chunk, deriving its content-addressed id.
    #[must_use]
    pub fn new(
        path: &str,
        heading: Option<String>,
        heading_level: u8,
        start_line: u32,
        text: String,
        created_at: Option<DateTime<Utc>>,
        modified_at: DateTime<Utc>,
        hash: String,
    ) -> Self {
        let id = chunk_id(path, start_line, &text);
        Self {
            id,
            path: path.to_string(),
            heading,
            heading_level,
            start_line,
            text,
            created_at,
            modified_at,
            hash,
            hub_count: 0,
            authority_count: 0,
        }
    }

    /// The instant used for date filtering: creation when known, else
    /// modification.
    #[must_use]
    pub fn effective_date(&self) -> DateTime<Utc> {
        self.created_at.unwrap_or(self.modified_at)
    }

    /// Returns the chunk body length in characters.
    #[must_use]
    pub fn len_chars(&self) -> usize {
        self.text.chars().count()
    }
}
