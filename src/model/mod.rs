//! Domain types for the notegraph engine.
//!
//! Plain data carried between the stores, the ingestion pipeline, the
//! retriever, and the linking engine.

pub mod chunk;
pub mod document;
pub mod entity;
pub mod link;

pub use chunk::{NoteChunk, chunk_id};
pub use document::{FileRecord, Frontmatter};
pub use entity::{Entity, EntityLabel, EntityMention};
pub use link::{LinkProvenance, LinkType, PendingLink, PendingStatus, SemanticLink};
