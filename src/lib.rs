//! # notegraph
//!
//! Knowledge-management engine for a corpus of markdown documents.
//!
//! Documents carry YAML front-matter and heading-structured bodies.
//! notegraph ingests them into a content-addressed chunk index, links
//! chunks into a typed semantic graph, and serves search, answer, and
//! facet queries over the result.
//!
//! ## Subsystems
//!
//! - **Ingestion**: heading-aware chunking, tag normalization, content
//!   fingerprinting, incremental upsert, embedding persistence
//! - **Retrieval**: a filterable chunk store with BM25 over candidates,
//!   vector similarity, and a query planner choosing among five
//!   strategies
//! - **Link graph**: bi-directional typed edges scored from vector and
//!   shared-entity evidence, with a pending-approval workflow
//! - **Orchestration**: an in-process message bus with priority queues
//!   and circuit breakers, plus a persisted DAG workflow executor

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![warn(unsafe_code)]

pub mod app;
pub mod bus;
pub mod cli;
pub mod embedding;
pub mod entity;
pub mod error;
pub mod index;
pub mod ingest;
pub mod link;
pub mod model;
pub mod search;
pub mod store;
pub mod synthesis;
pub mod time;
pub mod workflow;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

// Re-export core domain types
pub use model::{
    Entity, EntityLabel, EntityMention, FileRecord, Frontmatter, LinkProvenance, LinkType,
    NoteChunk, PendingLink, PendingStatus, SemanticLink, chunk_id,
};

// Re-export storage types
pub use store::{ChunkStore, DEFAULT_DB_PATH, DateField, Db, FilterSpec, LinkStore};

// Re-export ingestion types
pub use ingest::{HeadingChunker, IngestPipeline, IngestRequest, ObjectStore};

// Re-export embedding types
pub use embedding::{DEFAULT_DIMENSIONS, Embedder, HashEmbedder, cosine_similarity};

// Re-export retrieval types
pub use search::{QueryClass, Retriever, RetrieverConfig, SearchOutcome, SearchRequest, Strategy};

// Re-export linking types
pub use link::{LinkConfig, LinkingEngine};

// Re-export orchestration types
pub use bus::{BusConfig, Message, MessageBus, MessagePriority, MessageType};
pub use workflow::{StepSpec, StepStatus, WorkflowEngine, WorkflowStatus, WorkflowStore};

// Re-export the composition root
pub use app::{Engine, EngineConfig};

// Re-export CLI types
pub use cli::{Cli, Commands, OutputFormat};
