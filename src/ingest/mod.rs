//! Ingestion pipeline: front-matter, chunking, tags, and persistence.
//!
//! Raw markdown payloads enter here and come out as chunk rows, tag
//! relations, entity mentions, and embeddings. Re-ingestion of unchanged
//! content is a no-op thanks to content hashing and deterministic chunk
//! identity.

pub mod chunker;
pub mod frontmatter;
pub mod pipeline;
pub mod source;
pub mod tags;

pub use chunker::{ChunkSpan, DEFAULT_MAX_SPAN_CHARS, HeadingChunker};
pub use frontmatter::{ParsedDocument, parse_date_permissive, parse_document};
pub use pipeline::{
    BatchError, BatchReport, DEFAULT_MAX_CONCURRENT, IngestOutcome, IngestPipeline, IngestRequest,
    TOPIC_INGESTION_COMPLETED,
};
pub use source::{FsObjectStore, ObjectInfo, ObjectPayload, ObjectStore};
pub use tags::{normalize_tag, normalize_tags, tags_from_frontmatter};
