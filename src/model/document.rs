//! File records and parsed front-matter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parsed YAML front-matter of a markdown document.
///
/// Keys are preserved verbatim; values are arbitrary YAML mapped into
/// JSON values so they can be echoed into embedding metadata and stored
/// in a single column.
pub type Frontmatter = BTreeMap<String, serde_json::Value>;

/// A stored file row. At most one row exists per canonical path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Canonical path (identity).
    pub path: String,

    /// Document title from front-matter, falling back to the file stem.
    pub title: String,

    /// Raw front-matter map.
    pub frontmatter: Frontmatter,

    /// SHA-1 hash of the document content. Hash equality with the stored
    /// row means the file is unchanged and ingestion may short-circuit.
    pub hash: String,

    /// Source etag, when the object store provides one.
    pub etag: Option<String>,

    /// Size of the raw document in bytes.
    pub size: u64,

    /// Creation instant derived from front-matter, when present.
    pub created_at: Option<DateTime<Utc>>,

    /// Modification instant, authoritative from the source.
    pub modified_at: DateTime<Utc>,
}

impl FileRecord {
    /// True when `other_hash` matches the stored content hash.
    #[must_use]
    pub fn is_unchanged(&self, other_hash: &str) -> bool {
        self.hash == other_hash
    }
}
