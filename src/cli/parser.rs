//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros. The search,
//! answer, and facets subcommands mirror the query surface; ingest and
//! links cover the write paths.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// notegraph: knowledge-management engine for markdown corpora.
///
/// Ingests markdown documents into a chunk index, links them into a
/// semantic graph, and serves search, answer, and facet queries.
#[derive(Parser, Debug)]
#[command(name = "notegraph")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the primary index database.
    #[arg(long, env = "NOTEGRAPH_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Path to the workflow database.
    #[arg(long, env = "NOTEGRAPH_WORKFLOW_DB_PATH")]
    pub workflow_db_path: Option<PathBuf>,

    /// Root directory documents are read from.
    #[arg(long, env = "NOTEGRAPH_NOTES_ROOT", default_value = ".")]
    pub notes_root: PathBuf,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Shared query filter flags.
#[derive(Parser, Debug, Clone)]
pub struct FilterArgs {
    /// Comma-separated tag filter.
    #[arg(long)]
    pub tags: Option<String>,

    /// Require every tag (AND) instead of any (OR).
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub require_all_tags: bool,

    /// Window start: YYYY, YYYY-MM, YYYY-MM-DD, Nd, or Nm.
    #[arg(long)]
    pub since: Option<String>,

    /// Window end: YYYY, YYYY-MM, YYYY-MM-DD, Nd, or Nm.
    #[arg(long)]
    pub until: Option<String>,

    /// Date column the window applies to (auto, created, modified).
    #[arg(long, default_value = "auto")]
    pub date_field: String,

    /// Restrict to paths under this prefix.
    #[arg(long)]
    pub path_prefix: Option<String>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the databases.
    Init,

    /// Ingest markdown documents under a prefix of the notes root.
    Ingest {
        /// Path prefix to ingest (empty for everything).
        #[arg(default_value = "")]
        prefix: String,

        /// Re-ingest documents whose content hash is unchanged.
        #[arg(short, long)]
        force: bool,

        /// Skip the linking pass after ingestion.
        #[arg(long)]
        no_link: bool,
    },

    /// Search the corpus.
    Search {
        /// The query.
        #[arg(short, long)]
        query: String,

        /// Maximum results.
        #[arg(short, long, default_value = "10")]
        k: usize,

        /// Result ordering (score, date_desc, date_asc).
        #[arg(long, default_value = "score")]
        sort: String,

        /// Prefer semantic evidence (may upgrade to hybrid).
        #[arg(long)]
        prefer_semantic: bool,

        /// Prefer graph evidence (may upgrade to hybrid).
        #[arg(long)]
        prefer_graph: bool,

        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Answer a question with extractive bullets and citations.
    Answer {
        /// The question.
        #[arg(short, long)]
        query: String,

        /// Maximum supporting chunks.
        #[arg(short, long, default_value = "6")]
        k: usize,

        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Tag and time-histogram facets.
    Facets {
        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Pending-link workflow.
    #[command(subcommand)]
    Links(LinkCommands),

    /// Workflow operations.
    #[command(subcommand)]
    Workflow(WorkflowCommands),

    /// Store counts and index health.
    Status,
}

/// Pending-link subcommands.
#[derive(Subcommand, Debug)]
pub enum LinkCommands {
    /// List pending link proposals.
    Pending,

    /// Approve a pending link by id.
    Approve {
        /// Pending link id.
        id: i64,
    },

    /// Reject a pending link by id.
    Reject {
        /// Pending link id.
        id: i64,
    },

    /// Score link candidates for a chunk without persisting.
    Suggest {
        /// Chunk id.
        chunk_id: String,
    },
}

/// Workflow subcommands.
#[derive(Subcommand, Debug)]
pub enum WorkflowCommands {
    /// Create a workflow from a JSON definition file.
    Create {
        /// JSON file: {"name", "description", "steps": [...]}.
        file: PathBuf,
    },

    /// Run a pending workflow to completion.
    Run {
        /// Workflow id.
        id: String,
    },

    /// Show workflow progress.
    Status {
        /// Workflow id.
        id: String,
    },

    /// Cancel a workflow.
    Cancel {
        /// Workflow id.
        id: String,
    },
}

impl Cli {
    /// Returns the primary database path, using the default if not set.
    #[must_use]
    pub fn get_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(crate::store::DEFAULT_DB_PATH))
    }

    /// Returns the workflow database path, using the default if not set.
    #[must_use]
    pub fn get_workflow_db_path(&self) -> PathBuf {
        self.workflow_db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(crate::store::DEFAULT_WORKFLOW_DB_PATH))
    }
}
