//! Chunk store: files, chunks, tags, and the filtered candidate fetch.
//!
//! The candidate fetch is the store-side half of retrieval: it applies
//! tag filters (AND via `HAVING COUNT(DISTINCT tag)`, OR via `DISTINCT`),
//! a half-open time window over a selectable date column, and an optional
//! path prefix, capped at a hard row limit. Ordering is undefined here;
//! reranking is the retriever's job.

use crate::error::{Error, Result};
use crate::model::{FileRecord, Frontmatter, NoteChunk};
use crate::store::db::Db;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, params, params_from_iter};

/// Encodes a UTC instant as the canonical column text.
pub(crate) fn encode_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Decodes a column timestamp, tolerating any RFC 3339 offset.
pub(crate) fn decode_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Which date column a time window applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateField {
    /// `COALESCE(created_at, modified_at)`.
    #[default]
    Auto,
    /// Front-matter creation date only.
    Created,
    /// Source modification date only.
    Modified,
}

impl DateField {
    /// SQL expression for this field.
    #[must_use]
    pub const fn sql_expr(self) -> &'static str {
        match self {
            Self::Auto => "COALESCE(c.created_at, c.modified_at)",
            Self::Created => "c.created_at",
            Self::Modified => "c.modified_at",
        }
    }

    /// Parses the query-parameter form (`auto`, `created`, `modified`).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(Self::Auto),
            "created" => Some(Self::Created),
            "modified" => Some(Self::Modified),
            _ => None,
        }
    }
}

/// Filters applied to the candidate fetch.
#[derive(Debug, Clone)]
pub struct FilterSpec {
    /// Tags the chunk must carry.
    pub tags: Vec<String>,
    /// AND semantics across `tags` when true, OR semantics when false.
    pub require_all: bool,
    /// Window start (inclusive).
    pub since: DateTime<Utc>,
    /// Window end (inclusive).
    pub until: DateTime<Utc>,
    /// Restrict to paths starting with this prefix.
    pub path_prefix: Option<String>,
}

impl FilterSpec {
    /// An unconstrained filter covering all time.
    #[must_use]
    pub fn unfiltered() -> Self {
        Self {
            tags: Vec::new(),
            require_all: true,
            since: DateTime::<Utc>::UNIX_EPOCH,
            until: Utc::now(),
            path_prefix: None,
        }
    }
}

/// A tag with its chunk count, for facet output.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TagCount {
    /// Normalized tag.
    pub tag: String,
    /// Number of chunks carrying the tag within the window.
    pub count: i64,
}

/// A monthly histogram bucket, for facet output.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HistogramBucket {
    /// `YYYY-MM` bucket label.
    pub bucket: String,
    /// Number of chunks falling in the bucket.
    pub count: i64,
}

/// Facet aggregation: top tags and a monthly histogram.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FacetReport {
    /// Top 50 tags by chunk count, descending.
    pub top_tags: Vec<TagCount>,
    /// Up to 24 monthly buckets, most recent first.
    pub time_histogram: Vec<HistogramBucket>,
}

/// Row counts for the status surface.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct StoreCounts {
    /// Stored file rows.
    pub files: u64,
    /// Stored chunk rows.
    pub chunks: u64,
    /// Distinct tags.
    pub tags: u64,
}

struct RawChunk {
    id: String,
    path: String,
    heading: Option<String>,
    heading_level: i64,
    start_line: i64,
    text: String,
    created_at: Option<String>,
    modified_at: String,
    hash: String,
    hub_count: i64,
    authority_count: i64,
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn from_raw(raw: RawChunk) -> Result<NoteChunk> {
    let modified_at = decode_ts(&raw.modified_at).ok_or_else(|| {
        Error::invalid_input(format!("bad timestamp on chunk {}", raw.id))
    })?;
    Ok(NoteChunk {
        id: raw.id,
        path: raw.path,
        heading: raw.heading,
        heading_level: raw.heading_level as u8,
        start_line: raw.start_line as u32,
        text: raw.text,
        created_at: raw.created_at.as_deref().and_then(decode_ts),
        modified_at,
        hash: raw.hash,
        hub_count: raw.hub_count as u32,
        authority_count: raw.authority_count as u32,
    })
}

const CHUNK_COLUMNS: &str = "c.id, c.path, c.heading, c.heading_level, c.start_line, c.text, \
                             c.created_at, c.modified_at, c.hash, c.hub_count, c.authority_count";

fn raw_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawChunk> {
    Ok(RawChunk {
        id: row.get(0)?,
        path: row.get(1)?,
        heading: row.get(2)?,
        heading_level: row.get(3)?,
        start_line: row.get(4)?,
        text: row.get(5)?,
        created_at: row.get(6)?,
        modified_at: row.get(7)?,
        hash: row.get(8)?,
        hub_count: row.get(9)?,
        authority_count: row.get(10)?,
    })
}

/// `SQLite`-backed store for files, chunks, and tags.
#[derive(Clone, Debug)]
pub struct ChunkStore {
    db: Db,
}

impl ChunkStore {
    /// Creates a store over a shared database handle.
    #[must_use]
    pub const fn new(db: Db) -> Self {
        Self { db }
    }

    /// Returns the underlying database handle.
    #[must_use]
    pub const fn db(&self) -> &Db {
        &self.db
    }

    // ==================== File operations ====================

    /// Inserts or replaces the file row for `record.path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn upsert_file(&self, record: &FileRecord) -> Result<()> {
        let frontmatter = serde_json::to_string(&record.frontmatter)?;
        self.db.with(|conn| {
            conn.execute(
                r"
                INSERT INTO files (path, title, frontmatter, hash, etag, size, created_at, modified_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(path) DO UPDATE SET
                    title = excluded.title,
                    frontmatter = excluded.frontmatter,
                    hash = excluded.hash,
                    etag = excluded.etag,
                    size = excluded.size,
                    created_at = excluded.created_at,
                    modified_at = excluded.modified_at
                ",
                params![
                    record.path,
                    record.title,
                    frontmatter,
                    record.hash,
                    record.etag,
                    i64::try_from(record.size).unwrap_or(i64::MAX),
                    record.created_at.map(encode_ts),
                    encode_ts(record.modified_at),
                ],
            )?;
            Ok(())
        })
    }

    /// Fetches the file row for a path.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    #[allow(clippy::cast_sign_loss)]
    pub fn file(&self, path: &str) -> Result<Option<FileRecord>> {
        self.db.with(|conn| {
            let row = conn
                .query_row(
                    r"
                    SELECT path, title, frontmatter, hash, etag, size, created_at, modified_at
                    FROM files WHERE path = ?1
                    ",
                    params![path],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, Option<String>>(4)?,
                            row.get::<_, i64>(5)?,
                            row.get::<_, Option<String>>(6)?,
                            row.get::<_, String>(7)?,
                        ))
                    },
                )
                .optional()?;

            let Some((path, title, frontmatter, hash, etag, size, created_at, modified_at)) = row
            else {
                return Ok(None);
            };

            let frontmatter: Frontmatter = serde_json::from_str(&frontmatter)?;
            let modified_at = decode_ts(&modified_at)
                .ok_or_else(|| Error::invalid_input(format!("bad timestamp on file {path}")))?;
            Ok(Some(FileRecord {
                path,
                title,
                frontmatter,
                hash,
                etag,
                size: size as u64,
                created_at: created_at.as_deref().and_then(decode_ts),
                modified_at,
            }))
        })
    }

    // ==================== Chunk operations ====================

    /// Inserts or replaces a chunk row, preserving cached degree counts
    /// on replacement.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn upsert_chunk(&self, chunk: &NoteChunk) -> Result<()> {
        self.db.with(|conn| {
            conn.execute(
                r"
                INSERT INTO chunks (id, path, heading, heading_level, start_line, text,
                                    created_at, modified_at, hash)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(id) DO UPDATE SET
                    path = excluded.path,
                    heading = excluded.heading,
                    heading_level = excluded.heading_level,
                    start_line = excluded.start_line,
                    text = excluded.text,
                    created_at = excluded.created_at,
                    modified_at = excluded.modified_at,
                    hash = excluded.hash
                ",
                params![
                    chunk.id,
                    chunk.path,
                    chunk.heading,
                    i64::from(chunk.heading_level),
                    i64::from(chunk.start_line),
                    chunk.text,
                    chunk.created_at.map(encode_ts),
                    encode_ts(chunk.modified_at),
                    chunk.hash,
                ],
            )?;
            Ok(())
        })
    }

    /// Fetches a chunk by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn chunk(&self, id: &str) -> Result<Option<NoteChunk>> {
        let raw = self.db.with(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {CHUNK_COLUMNS} FROM chunks c WHERE c.id = ?1"),
                    params![id],
                    raw_from_row,
                )
                .optional()?)
        })?;
        raw.map(from_raw).transpose()
    }

    /// Fetches several chunks by id, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn chunks_by_ids(&self, ids: &[String]) -> Result<Vec<NoteChunk>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let raws = self.db.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CHUNK_COLUMNS} FROM chunks c WHERE c.id IN ({placeholders})"
            ))?;
            let rows = stmt
                .query_map(params_from_iter(ids.iter()), raw_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;
        raws.into_iter().map(from_raw).collect()
    }

    /// Fetches all chunks of a file, ordered by start line.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn chunks_for_path(&self, path: &str) -> Result<Vec<NoteChunk>> {
        let raws = self.db.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CHUNK_COLUMNS} FROM chunks c WHERE c.path = ?1 ORDER BY c.start_line"
            ))?;
            let rows = stmt
                .query_map(params![path], raw_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;
        raws.into_iter().map(from_raw).collect()
    }

    /// Deletes chunks of `path` whose ids are not in `keep`. Cascades to
    /// tags, mentions, and embeddings.
    ///
    /// Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete_chunks_for_path(&self, path: &str, keep: &[String]) -> Result<usize> {
        self.db.with(|conn| {
            let removed = if keep.is_empty() {
                conn.execute("DELETE FROM chunks WHERE path = ?1", params![path])?
            } else {
                let placeholders = vec!["?"; keep.len()].join(", ");
                let mut values: Vec<Value> = vec![Value::from(path.to_string())];
                values.extend(keep.iter().map(|id| Value::from(id.clone())));
                conn.execute(
                    &format!("DELETE FROM chunks WHERE path = ?1 AND id NOT IN ({placeholders})"),
                    params_from_iter(values),
                )?
            };
            Ok(removed)
        })
    }

    // ==================== Tag operations ====================

    /// Atomically replaces the tag set of a chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub fn replace_chunk_tags(&self, chunk_id: &str, tags: &[String]) -> Result<()> {
        self.db.with_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM chunk_tags WHERE chunk_id = ?1", params![chunk_id])?;
            {
                let mut stmt =
                    tx.prepare("INSERT INTO chunk_tags (chunk_id, tag) VALUES (?1, ?2)")?;
                for tag in tags {
                    stmt.execute(params![chunk_id, tag])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Fetches the sorted tag set of a chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn tags_for_chunk(&self, chunk_id: &str) -> Result<Vec<String>> {
        self.db.with(|conn| {
            let mut stmt =
                conn.prepare("SELECT tag FROM chunk_tags WHERE chunk_id = ?1 ORDER BY tag")?;
            let tags = stmt
                .query_map(params![chunk_id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(tags)
        })
    }

    // ==================== Candidate fetch ====================

    /// Fetches up to `cap` chunks passing the filters. Ordering is
    /// undefined; downstream rankers impose it.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn fetch_candidates(
        &self,
        filters: &FilterSpec,
        date_field: DateField,
        cap: usize,
    ) -> Result<Vec<NoteChunk>> {
        let mut sql = format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks c WHERE ({} BETWEEN ? AND ?)",
            date_field.sql_expr()
        );
        let mut values: Vec<Value> = vec![
            Value::from(encode_ts(filters.since)),
            Value::from(encode_ts(filters.until)),
        ];

        if let Some(prefix) = &filters.path_prefix {
            sql.push_str(" AND c.path LIKE ?");
            values.push(Value::from(format!("{prefix}%")));
        }

        if !filters.tags.is_empty() {
            let placeholders = vec!["?"; filters.tags.len()].join(", ");
            if filters.require_all {
                // AND semantics: the chunk must carry every requested tag.
                sql.push_str(&format!(
                    " AND c.id IN (SELECT ct.chunk_id FROM chunk_tags ct \
                     WHERE ct.tag IN ({placeholders}) \
                     GROUP BY ct.chunk_id HAVING COUNT(DISTINCT ct.tag) = ?)"
                ));
                values.extend(filters.tags.iter().map(|t| Value::from(t.clone())));
                values.push(Value::from(i64::try_from(filters.tags.len()).unwrap_or(i64::MAX)));
            } else {
                // OR semantics: any requested tag qualifies.
                sql.push_str(&format!(
                    " AND c.id IN (SELECT DISTINCT ct.chunk_id FROM chunk_tags ct \
                     WHERE ct.tag IN ({placeholders}))"
                ));
                values.extend(filters.tags.iter().map(|t| Value::from(t.clone())));
            }
        }

        sql.push_str(" LIMIT ?");
        values.push(Value::from(i64::try_from(cap).unwrap_or(i64::MAX)));

        let raws = self.db.with(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values), raw_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;
        raws.into_iter().map(from_raw).collect()
    }

    // ==================== Facets ====================

    /// Aggregates the top 50 tags and a 24-bucket monthly histogram over
    /// the filtered window.
    ///
    /// # Errors
    ///
    /// Returns an error if the aggregation queries fail.
    pub fn fetch_facets(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        path_prefix: Option<&str>,
    ) -> Result<FacetReport> {
        let mut where_clause =
            "(COALESCE(chunks.created_at, chunks.modified_at) BETWEEN ?1 AND ?2)".to_string();
        let mut values: Vec<Value> =
            vec![Value::from(encode_ts(since)), Value::from(encode_ts(until))];
        if let Some(prefix) = path_prefix {
            where_clause.push_str(" AND chunks.path LIKE ?3");
            values.push(Value::from(format!("{prefix}%")));
        }

        self.db.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                r"
                SELECT tag, COUNT(*) AS count
                FROM chunk_tags
                JOIN chunks ON chunks.id = chunk_tags.chunk_id
                WHERE {where_clause}
                GROUP BY tag
                ORDER BY count DESC, tag
                LIMIT 50
                "
            ))?;
            let top_tags = stmt
                .query_map(params_from_iter(values.clone()), |row| {
                    Ok(TagCount {
                        tag: row.get(0)?,
                        count: row.get(1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut stmt = conn.prepare(&format!(
                r"
                SELECT strftime('%Y-%m', COALESCE(chunks.created_at, chunks.modified_at)) AS bucket,
                       COUNT(*) AS count
                FROM chunks
                WHERE {where_clause}
                GROUP BY bucket
                ORDER BY bucket DESC
                LIMIT 24
                "
            ))?;
            let time_histogram = stmt
                .query_map(params_from_iter(values), |row| {
                    Ok(HistogramBucket {
                        bucket: row.get(0)?,
                        count: row.get(1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(FacetReport {
                top_tags,
                time_histogram,
            })
        })
    }

    // ==================== Metrics ====================

    /// Updates the cached hub/authority degree counts of a chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn set_degrees(&self, chunk_id: &str, hub: u32, authority: u32) -> Result<()> {
        self.db.with(|conn| {
            conn.execute(
                "UPDATE chunks SET hub_count = ?1, authority_count = ?2 WHERE id = ?3",
                params![i64::from(hub), i64::from(authority), chunk_id],
            )?;
            Ok(())
        })
    }

    /// Row counts for the status surface.
    ///
    /// # Errors
    ///
    /// Returns an error if the count queries fail.
    #[allow(clippy::cast_sign_loss)]
    pub fn counts(&self) -> Result<StoreCounts> {
        self.db.with(|conn| {
            let files: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |r| r.get(0))?;
            let chunks: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |r| r.get(0))?;
            let tags: i64 =
                conn.query_row("SELECT COUNT(DISTINCT tag) FROM chunk_tags", [], |r| r.get(0))?;
            Ok(StoreCounts {
                files: files as u64,
                chunks: chunks as u64,
                tags: tags as u64,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ChunkStore {
        ChunkStore::new(Db::in_memory_index().expect("db"))
    }

    fn put_chunk(store: &ChunkStore, path: &str, line: u32, text: &str, tags: &[&str]) -> String {
        let chunk = NoteChunk::new(
            path,
            Some("H".to_string()),
            1,
            line,
            text.to_string(),
            None,
            Utc::now(),
            "hash".to_string(),
        );
        store.upsert_chunk(&chunk).expect("upsert");
        let tags: Vec<String> = tags.iter().map(|t| (*t).to_string()).collect();
        store.replace_chunk_tags(&chunk.id, &tags).expect("tags");
        chunk.id
    }

    #[test]
    fn test_upsert_file_roundtrip() {
        let store = store();
        let record = FileRecord {
            path: "notes/a.md".to_string(),
            title: "A".to_string(),
            frontmatter: Frontmatter::new(),
            hash: "h1".to_string(),
            etag: Some("e1".to_string()),
            size: 42,
            created_at: None,
            modified_at: Utc::now(),
        };
        store.upsert_file(&record).expect("upsert");
        let loaded = store.file("notes/a.md").expect("fetch").expect("present");
        assert_eq!(loaded.hash, "h1");
        assert!(loaded.is_unchanged("h1"));

        // Replace by path keeps a single row.
        let mut updated = record;
        updated.hash = "h2".to_string();
        store.upsert_file(&updated).expect("upsert");
        let loaded = store.file("notes/a.md").expect("fetch").expect("present");
        assert_eq!(loaded.hash, "h2");
    }

    #[test]
    fn test_upsert_chunk_idempotent() {
        let store = store();
        let id1 = put_chunk(&store, "a.md", 2, "same text", &[]);
        let id2 = put_chunk(&store, "a.md", 2, "same text", &[]);
        assert_eq!(id1, id2);
        assert_eq!(store.chunks_for_path("a.md").expect("fetch").len(), 1);
    }

    #[test]
    fn test_tag_and_vs_or_semantics() {
        let store = store();
        let only_ai = put_chunk(&store, "a.md", 1, "first", &["ai"]);
        let both = put_chunk(&store, "a.md", 5, "second", &["ai", "ml"]);
        let only_ml = put_chunk(&store, "a.md", 9, "third", &["ml"]);

        let mut filters = FilterSpec::unfiltered();
        filters.until = Utc::now() + chrono::Duration::minutes(1);
        filters.tags = vec!["ai".to_string(), "ml".to_string()];

        filters.require_all = true;
        let hits = store
            .fetch_candidates(&filters, DateField::Auto, 100)
            .expect("fetch");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, both);

        filters.require_all = false;
        let hits = store
            .fetch_candidates(&filters, DateField::Auto, 100)
            .expect("fetch");
        let mut ids: Vec<String> = hits.into_iter().map(|c| c.id).collect();
        ids.sort();
        let mut expected = vec![only_ai, both, only_ml];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_candidate_cap_and_prefix() {
        let store = store();
        for i in 0..10 {
            put_chunk(&store, "notes/a.md", i * 3 + 1, &format!("text {i}"), &[]);
        }
        put_chunk(&store, "other/b.md", 1, "elsewhere", &[]);

        let mut filters = FilterSpec::unfiltered();
        filters.until = Utc::now() + chrono::Duration::minutes(1);
        filters.path_prefix = Some("notes/".to_string());

        let hits = store
            .fetch_candidates(&filters, DateField::Auto, 4)
            .expect("fetch");
        assert_eq!(hits.len(), 4);
        assert!(hits.iter().all(|c| c.path.starts_with("notes/")));
    }

    #[test]
    fn test_window_excludes_outside_dates() {
        let store = store();
        let old: DateTime<Utc> = "2020-01-01T00:00:00Z".parse().expect("ts");
        let recent: DateTime<Utc> = "2024-06-15T00:00:00Z".parse().expect("ts");
        for (line, ts) in [(1, old), (5, recent)] {
            let chunk = NoteChunk::new(
                "a.md",
                None,
                0,
                line,
                format!("chunk at line {line}"),
                None,
                ts,
                "h".to_string(),
            );
            store.upsert_chunk(&chunk).expect("upsert");
        }

        let mut filters = FilterSpec::unfiltered();
        filters.since = "2024-01-01T00:00:00Z".parse().expect("ts");
        filters.until = "2024-12-31T23:59:59Z".parse().expect("ts");
        let hits = store
            .fetch_candidates(&filters, DateField::Modified, 100)
            .expect("fetch");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].start_line, 5);
    }

    #[test]
    fn test_replace_chunk_tags_atomic() {
        let store = store();
        let id = put_chunk(&store, "a.md", 1, "text", &["x", "y"]);
        store
            .replace_chunk_tags(&id, &["z".to_string()])
            .expect("replace");
        assert_eq!(store.tags_for_chunk(&id).expect("tags"), vec!["z"]);
    }

    #[test]
    fn test_facets() {
        let store = store();
        put_chunk(&store, "a.md", 1, "one", &["ai"]);
        put_chunk(&store, "a.md", 4, "two", &["ai", "ml"]);
        put_chunk(&store, "b.md", 1, "three", &["ml"]);

        let report = store
            .fetch_facets(
                DateTime::<Utc>::UNIX_EPOCH,
                Utc::now() + chrono::Duration::minutes(1),
                None,
            )
            .expect("facets");
        assert_eq!(report.top_tags.len(), 2);
        assert_eq!(report.top_tags[0].count, 2);
        assert_eq!(report.time_histogram.len(), 1);
        // Bucket label is YYYY-MM.
        assert_eq!(report.time_histogram[0].bucket.len(), 7);
        assert_eq!(report.time_histogram[0].count, 3);
    }

    #[test]
    fn test_delete_chunks_for_path_keeps_listed() {
        let store = store();
        let keep = put_chunk(&store, "a.md", 1, "keep me", &[]);
        put_chunk(&store, "a.md", 7, "drop me", &[]);

        let removed = store
            .delete_chunks_for_path("a.md", std::slice::from_ref(&keep))
            .expect("delete");
        assert_eq!(removed, 1);
        let remaining = store.chunks_for_path("a.md").expect("fetch");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, keep);
    }

    #[test]
    fn test_set_degrees() {
        let store = store();
        let id = put_chunk(&store, "a.md", 1, "text", &[]);
        store.set_degrees(&id, 3, 5).expect("set");
        let chunk = store.chunk(&id).expect("fetch").expect("present");
        assert_eq!(chunk.hub_count, 3);
        assert_eq!(chunk.authority_count, 5);
    }
}
