//! Database schema definitions.
//!
//! DDL for the primary index and the workflow store. Versioning rides
//! on SQLite's `user_version` pragma: a fresh database reads 0, schema
//! creation stamps [`CURRENT_SCHEMA_VERSION`], and [`upgrades_after`]
//! yields the ordered DDL batches that bring an older database up to
//! date. Time columns hold UTC RFC 3339 strings; identifiers are opaque
//! strings (UUIDs or content-addressed hashes).

/// `user_version` stamped by the current DDL.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// SQL schema for the primary index (files, chunks, tags, embeddings,
/// entities, mentions, semantic links, pending links).
pub const SCHEMA_SQL: &str = r"
-- Source files, one row per canonical path
CREATE TABLE IF NOT EXISTS files (
    path TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    frontmatter TEXT NOT NULL,  -- JSON map
    hash TEXT NOT NULL,
    etag TEXT,
    size INTEGER NOT NULL,
    created_at TEXT,
    modified_at TEXT NOT NULL
);

-- Heading-delimited chunks of file bodies
CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    path TEXT NOT NULL,
    heading TEXT,
    heading_level INTEGER NOT NULL DEFAULT 0,
    start_line INTEGER NOT NULL,
    text TEXT NOT NULL,
    created_at TEXT,
    modified_at TEXT NOT NULL,
    hash TEXT NOT NULL,
    hub_count INTEGER NOT NULL DEFAULT 0,
    authority_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_chunks_path ON chunks(path);
CREATE INDEX IF NOT EXISTS idx_chunks_created ON chunks(created_at);
CREATE INDEX IF NOT EXISTS idx_chunks_modified ON chunks(modified_at);

-- Chunk/tag many-to-many
CREATE TABLE IF NOT EXISTS chunk_tags (
    chunk_id TEXT NOT NULL REFERENCES chunks(id) ON DELETE CASCADE,
    tag TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunk_tags_tag ON chunk_tags(tag);
CREATE INDEX IF NOT EXISTS idx_chunk_tags_chunk ON chunk_tags(chunk_id);

-- Per-chunk embeddings with metadata sidecar
CREATE TABLE IF NOT EXISTS embeddings (
    chunk_id TEXT PRIMARY KEY REFERENCES chunks(id) ON DELETE CASCADE,
    vector BLOB NOT NULL,       -- f32 array, little-endian
    dimensions INTEGER NOT NULL,
    model TEXT,
    metadata TEXT NOT NULL,     -- JSON: path, title, heading, level, tags, frontmatter
    created_at TEXT NOT NULL
);

-- Extracted entities, unique by surface text + label
CREATE TABLE IF NOT EXISTS entities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    text TEXT NOT NULL,
    label TEXT NOT NULL,
    confidence REAL NOT NULL,
    description TEXT,
    UNIQUE(text, label)
);

CREATE INDEX IF NOT EXISTS idx_entities_text ON entities(text);

-- Entity occurrences inside chunks, with character offsets
CREATE TABLE IF NOT EXISTS entity_mentions (
    chunk_id TEXT NOT NULL REFERENCES chunks(id) ON DELETE CASCADE,
    entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    start_pos INTEGER NOT NULL,
    end_pos INTEGER NOT NULL,
    confidence REAL NOT NULL,
    UNIQUE(chunk_id, entity_id, start_pos, end_pos)
);

CREATE INDEX IF NOT EXISTS idx_mentions_chunk ON entity_mentions(chunk_id);
CREATE INDEX IF NOT EXISTS idx_mentions_entity ON entity_mentions(entity_id);

-- Typed directed edges; bi-directional links are stored as two rows
CREATE TABLE IF NOT EXISTS semantic_links (
    source_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    link_type TEXT NOT NULL,
    strength REAL NOT NULL,
    rationale TEXT NOT NULL,
    provenance TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (source_id, target_id, link_type)
);

CREATE INDEX IF NOT EXISTS idx_links_source ON semantic_links(source_id);
CREATE INDEX IF NOT EXISTS idx_links_target ON semantic_links(target_id);
CREATE INDEX IF NOT EXISTS idx_links_strength ON semantic_links(strength);

-- Edge proposals awaiting approval; rejected rows are retained
CREATE TABLE IF NOT EXISTS pending_links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    link_type TEXT NOT NULL,
    strength REAL NOT NULL,
    rationale TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL,
    decided_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_pending_status ON pending_links(status);
";

/// SQL schema for the workflow store (second namespace).
pub const WORKFLOW_SCHEMA_SQL: &str = r"
-- Workflow definitions and lifecycle state
CREATE TABLE IF NOT EXISTS workflows (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    created_by TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT,
    current_step TEXT,
    context TEXT NOT NULL       -- JSON map
);

-- Steps owned exclusively by their workflow
CREATE TABLE IF NOT EXISTS workflow_steps (
    id TEXT PRIMARY KEY,
    workflow_id TEXT NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    action TEXT NOT NULL,
    parameters TEXT NOT NULL,   -- JSON map
    dependencies TEXT NOT NULL, -- JSON array of step ids
    timeout_secs INTEGER NOT NULL DEFAULT 300,
    retry_count INTEGER NOT NULL DEFAULT 3,
    retry_delay_secs INTEGER NOT NULL DEFAULT 5,
    status TEXT NOT NULL,
    result TEXT,                -- JSON map
    error TEXT,
    started_at TEXT,
    completed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_steps_workflow ON workflow_steps(workflow_id);
";

/// Incremental upgrade batches, ordered by the version they produce.
///
/// Entry `(n, sql)` brings a database stamped `n - 1` to `n`. Both the
/// primary and workflow schemas are at version 1, so the list is empty;
/// the first DDL change adds `(2, "...")` here and bumps
/// [`CURRENT_SCHEMA_VERSION`].
pub const UPGRADES: &[(u32, &str)] = &[];

/// Upgrade batches a database stamped `version` still needs, in order.
pub fn upgrades_after(version: u32) -> impl Iterator<Item = &'static (u32, &'static str)> {
    UPGRADES
        .iter()
        .filter(move |(target, _)| *target > version && *target <= CURRENT_SCHEMA_VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_schema_covers_all_tables() {
        for table in [
            "files",
            "chunks",
            "chunk_tags",
            "embeddings",
            "entities",
            "entity_mentions",
            "semantic_links",
            "pending_links",
        ] {
            assert!(
                SCHEMA_SQL.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")),
                "missing table {table}"
            );
        }
    }

    #[test]
    fn test_workflow_schema_covers_both_tables() {
        assert!(WORKFLOW_SCHEMA_SQL.contains("CREATE TABLE IF NOT EXISTS workflows"));
        assert!(WORKFLOW_SCHEMA_SQL.contains("CREATE TABLE IF NOT EXISTS workflow_steps"));
    }

    #[test]
    fn test_upgrade_chain_is_contiguous() {
        // Every upgrade target must follow its predecessor and stay
        // within the current version.
        let mut expected = 2;
        for (target, sql) in UPGRADES {
            assert_eq!(*target, expected, "upgrade chain has a gap");
            assert!(!sql.trim().is_empty());
            assert!(*target <= CURRENT_SCHEMA_VERSION);
            expected += 1;
        }
    }

    #[test]
    fn test_upgrades_after_selects_pending_only() {
        // With an empty chain nothing is ever pending; the filter is
        // exercised against the version bounds regardless.
        assert_eq!(upgrades_after(0).count(), UPGRADES.len());
        assert_eq!(upgrades_after(CURRENT_SCHEMA_VERSION).count(), 0);
    }
}
