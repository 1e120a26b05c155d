//! Scoped vector search
//!
//! The second retrieval stage: embed the query, find the nearest chunks whose
//! document belongs to the candidate set, optionally rerank with a
//! cross-encoder.

pub mod embedder;
pub mod reranker;
pub mod scope;
pub mod scoped;
pub mod vector_index;

pub use embedder::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
pub use reranker::{FastEmbedReranker, RerankError, RerankProvider};
pub use scope::ScopeFilter;
pub use scoped::{ScopedSearcher, SearchHit, SearchRequest, SearchSettings};
pub use vector_index::{
    HnswParams, HnswVectorIndex, IndexEntry, IndexHit, VectorIndexError, VectorStore,
};

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Collaborator stage of a search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Embedding,
    VectorIndex,
    Reranking,
    Store,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Embedding => "embedding",
            Stage::VectorIndex => "vector index query",
            Stage::Reranking => "reranking",
            Stage::Store => "chunk lookup",
        })
    }
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector index failed: {0}")]
    VectorIndex(#[from] VectorIndexError),

    #[error("Reranking failed: {0}")]
    Reranking(#[from] RerankError),

    #[error("{stage} timed out after {timeout:?}")]
    Timeout { stage: Stage, timeout: Duration },

    #[error("{stage} task aborted: {message}")]
    Aborted { stage: Stage, message: String },

    #[error("Store lookup failed: {0}")]
    Store(String),
}
