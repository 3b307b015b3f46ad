//! Persistence layer for notegraph.
//!
//! `SQLite`-backed stores for files, chunks, tags, embeddings, entities,
//! and semantic links. All stores in the primary index share one [`Db`]
//! handle; the workflow store opens its own namespace (see
//! `crate::workflow::store`).

pub mod chunk_store;
pub mod db;
pub mod link_store;
pub mod schema;

pub use chunk_store::{ChunkStore, DateField, FacetReport, FilterSpec, StoreCounts};
pub use db::Db;
pub use link_store::{EdgeUpsert, LinkStore};
pub use schema::{CURRENT_SCHEMA_VERSION, SCHEMA_SQL};

/// Default primary database path relative to the working directory.
pub const DEFAULT_DB_PATH: &str = ".notegraph/index.db";

/// Default workflow database path relative to the working directory.
pub const DEFAULT_WORKFLOW_DB_PATH: &str = ".notegraph/workflows.db";
