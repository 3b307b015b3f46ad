//! Retrieval: query planning, candidate ranking, and scoring.
//!
//! The chunk store filters the candidate universe; the planner picks a
//! strategy from the query class; the retriever scores candidates with
//! vector, graph, recency, and structural signals and reranks.

pub mod bm25;
pub mod planner;
pub mod retriever;

pub use bm25::{B, K1, SNIPPET_CHARS, bm25_scores, snippet, tokenize};
pub use planner::{Preferences, QueryClass, Strategy, classify, select_strategy};
pub use retriever::{
    RetrievedChunk, Retriever, RetrieverConfig, SearchOutcome, SearchRequest, recency_score,
};
