//! Link store: typed edges, pending proposals, and degree queries.
//!
//! Edge identity is `(source_id, target_id, link_type)`. An upsert only
//! overwrites an existing row when the new strength is higher, so repeated
//! linking passes can never weaken an edge.

use crate::error::{Error, Result};
use crate::model::{LinkProvenance, LinkType, PendingLink, PendingStatus, SemanticLink};
use crate::store::chunk_store::{decode_ts, encode_ts};
use crate::store::db::Db;
use chrono::Utc;
use rusqlite::{OptionalExtension, params};

/// Outcome of an edge upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeUpsert {
    /// A new edge row was created.
    Created,
    /// An existing row was replaced by a stronger edge.
    Upgraded,
    /// An equal-or-stronger row already existed; nothing changed.
    Unchanged,
}

fn link_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(SemanticLink, String, String)> {
    let link_type: String = row.get(2)?;
    let provenance: String = row.get(5)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;
    Ok((
        SemanticLink {
            source_id: row.get(0)?,
            target_id: row.get(1)?,
            link_type: LinkType::parse(&link_type).unwrap_or(LinkType::Related),
            strength: row.get(3)?,
            rationale: row.get(4)?,
            provenance: LinkProvenance::parse(&provenance).unwrap_or(LinkProvenance::Auto),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        },
        created_at,
        updated_at,
    ))
}

fn finish_link((mut link, created, updated): (SemanticLink, String, String)) -> SemanticLink {
    if let Some(ts) = decode_ts(&created) {
        link.created_at = ts;
    }
    if let Some(ts) = decode_ts(&updated) {
        link.updated_at = ts;
    }
    link
}

const LINK_COLUMNS: &str =
    "source_id, target_id, link_type, strength, rationale, provenance, created_at, updated_at";

/// `SQLite`-backed store for semantic links and pending proposals.
#[derive(Clone, Debug)]
pub struct LinkStore {
    db: Db,
}

impl LinkStore {
    /// Creates a store over a shared database handle.
    #[must_use]
    pub const fn new(db: Db) -> Self {
        Self { db }
    }

    // ==================== Edges ====================

    /// Inserts an edge, or upgrades the stored row when the new strength
    /// is strictly higher.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails, or `InvalidInput` when an
    /// AUTO edge carries an empty rationale.
    pub fn upsert_edge(&self, link: &SemanticLink) -> Result<EdgeUpsert> {
        if link.provenance == LinkProvenance::Auto && link.rationale.trim().is_empty() {
            return Err(Error::invalid_input(
                "auto edge requires a non-empty rationale",
            ));
        }

        self.db.with(|conn| {
            let existing: Option<f64> = conn
                .query_row(
                    "SELECT strength FROM semantic_links \
                     WHERE source_id = ?1 AND target_id = ?2 AND link_type = ?3",
                    params![link.source_id, link.target_id, link.link_type.as_str()],
                    |row| row.get(0),
                )
                .optional()?;

            let now = encode_ts(Utc::now());
            match existing {
                None => {
                    conn.execute(
                        r"
                        INSERT INTO semantic_links
                            (source_id, target_id, link_type, strength, rationale,
                             provenance, created_at, updated_at)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                        ",
                        params![
                            link.source_id,
                            link.target_id,
                            link.link_type.as_str(),
                            link.strength,
                            link.rationale,
                            link.provenance.as_str(),
                            now,
                        ],
                    )?;
                    Ok(EdgeUpsert::Created)
                }
                Some(strength) if link.strength > strength => {
                    conn.execute(
                        r"
                        UPDATE semantic_links
                        SET strength = ?4, rationale = ?5, provenance = ?6, updated_at = ?7
                        WHERE source_id = ?1 AND target_id = ?2 AND link_type = ?3
                        ",
                        params![
                            link.source_id,
                            link.target_id,
                            link.link_type.as_str(),
                            link.strength,
                            link.rationale,
                            link.provenance.as_str(),
                            now,
                        ],
                    )?;
                    Ok(EdgeUpsert::Upgraded)
                }
                Some(_) => Ok(EdgeUpsert::Unchanged),
            }
        })
    }

    /// Fetches outgoing edges of a chunk, strongest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn links_from(
        &self,
        source_id: &str,
        min_strength: f64,
        link_type: Option<LinkType>,
    ) -> Result<Vec<SemanticLink>> {
        self.db.with(|conn| {
            let mut sql = format!(
                "SELECT {LINK_COLUMNS} FROM semantic_links \
                 WHERE source_id = ?1 AND strength >= ?2"
            );
            if link_type.is_some() {
                sql.push_str(" AND link_type = ?3");
            }
            sql.push_str(" ORDER BY strength DESC");

            let mut stmt = conn.prepare(&sql)?;
            let rows = match link_type {
                Some(lt) => stmt
                    .query_map(params![source_id, min_strength, lt.as_str()], link_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?,
                None => stmt
                    .query_map(params![source_id, min_strength], link_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?,
            };
            Ok(rows.into_iter().map(finish_link).collect())
        })
    }

    /// Fetches one edge by its full identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn edge(
        &self,
        source_id: &str,
        target_id: &str,
        link_type: LinkType,
    ) -> Result<Option<SemanticLink>> {
        self.db.with(|conn| {
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {LINK_COLUMNS} FROM semantic_links \
                         WHERE source_id = ?1 AND target_id = ?2 AND link_type = ?3"
                    ),
                    params![source_id, target_id, link_type.as_str()],
                    link_from_row,
                )
                .optional()?;
            Ok(row.map(finish_link))
        })
    }

    /// Outgoing edge count (hub degree).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub fn outgoing_count(&self, chunk_id: &str) -> Result<u32> {
        self.db.with(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM semantic_links WHERE source_id = ?1",
                params![chunk_id],
                |row| row.get(0),
            )?;
            Ok(count as u32)
        })
    }

    /// Incoming edge count (authority degree).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub fn incoming_count(&self, chunk_id: &str) -> Result<u32> {
        self.db.with(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM semantic_links WHERE target_id = ?1",
                params![chunk_id],
                |row| row.get(0),
            )?;
            Ok(count as u32)
        })
    }

    /// Total edge count.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    #[allow(clippy::cast_sign_loss)]
    pub fn edge_count(&self) -> Result<u64> {
        self.db.with(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM semantic_links", [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }

    // ==================== Pending links ====================

    /// Records an edge proposal awaiting approval.
    ///
    /// Returns the assigned row id.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn create_pending(
        &self,
        source_id: &str,
        target_id: &str,
        link_type: LinkType,
        strength: f64,
        rationale: &str,
    ) -> Result<i64> {
        self.db.with(|conn| {
            conn.execute(
                r"
                INSERT INTO pending_links
                    (source_id, target_id, link_type, strength, rationale, status, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6)
                ",
                params![
                    source_id,
                    target_id,
                    link_type.as_str(),
                    strength,
                    rationale,
                    encode_ts(Utc::now()),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// True when an undecided proposal already exists for the pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn has_pending(&self, source_id: &str, target_id: &str) -> Result<bool> {
        self.db.with(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM pending_links \
                 WHERE source_id = ?1 AND target_id = ?2 AND status = 'pending'",
                params![source_id, target_id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Lists pending-link rows with the given status, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn pending(&self, status: PendingStatus) -> Result<Vec<PendingLink>> {
        self.db.with(|conn| {
            let mut stmt = conn.prepare(
                r"
                SELECT id, source_id, target_id, link_type, strength, rationale,
                       status, created_at, decided_at
                FROM pending_links WHERE status = ?1 ORDER BY id DESC
                ",
            )?;
            let rows = stmt
                .query_map(params![status.as_str()], |row| {
                    let link_type: String = row.get(3)?;
                    let status: String = row.get(6)?;
                    let created_at: String = row.get(7)?;
                    let decided_at: Option<String> = row.get(8)?;
                    Ok(PendingLink {
                        id: row.get(0)?,
                        source_id: row.get(1)?,
                        target_id: row.get(2)?,
                        link_type: LinkType::parse(&link_type).unwrap_or(LinkType::Related),
                        strength: row.get(4)?,
                        rationale: row.get(5)?,
                        status: PendingStatus::parse(&status).unwrap_or(PendingStatus::Pending),
                        created_at: decode_ts(&created_at).unwrap_or_else(Utc::now),
                        decided_at: decided_at.as_deref().and_then(decode_ts),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Fetches a pending-link row by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no such row exists.
    pub fn pending_by_id(&self, id: i64) -> Result<PendingLink> {
        let rows = self.db.with(|conn| {
            let row = conn
                .query_row(
                    r"
                    SELECT id, source_id, target_id, link_type, strength, rationale,
                           status, created_at, decided_at
                    FROM pending_links WHERE id = ?1
                    ",
                    params![id],
                    |row| {
                        let link_type: String = row.get(3)?;
                        let status: String = row.get(6)?;
                        let created_at: String = row.get(7)?;
                        let decided_at: Option<String> = row.get(8)?;
                        Ok(PendingLink {
                            id: row.get(0)?,
                            source_id: row.get(1)?,
                            target_id: row.get(2)?,
                            link_type: LinkType::parse(&link_type).unwrap_or(LinkType::Related),
                            strength: row.get(4)?,
                            rationale: row.get(5)?,
                            status: PendingStatus::parse(&status)
                                .unwrap_or(PendingStatus::Pending),
                            created_at: decode_ts(&created_at).unwrap_or_else(Utc::now),
                            decided_at: decided_at.as_deref().and_then(decode_ts),
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })?;
        rows.ok_or_else(|| Error::not_found(format!("pending link {id}")))
    }

    /// Records the decision on a pending link. The row is retained either
    /// way; approval to an edge happens in the linking engine.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no such row exists, or `Conflict` when the
    /// row was already decided.
    pub fn decide_pending(&self, id: i64, status: PendingStatus) -> Result<PendingLink> {
        let row = self.pending_by_id(id)?;
        if row.status != PendingStatus::Pending {
            return Err(Error::conflict(format!(
                "pending link {id} already {}",
                row.status.as_str()
            )));
        }
        self.db.with(|conn| {
            conn.execute(
                "UPDATE pending_links SET status = ?1, decided_at = ?2 WHERE id = ?3",
                params![status.as_str(), encode_ts(Utc::now()), id],
            )?;
            Ok(())
        })?;
        self.pending_by_id(id)
    }
}
