//! docsieve - two-stage document retrieval
//!
//! Stage one narrows a collection to a candidate set using structured
//! metadata: categories, document names and paths, query templates and a
//! small predicate language. Stage two runs a vector similarity search scoped
//! to that set, optionally reranked by a cross-encoder.

pub mod candidates;
pub mod cli;
pub mod config;
pub mod error;
pub mod metadata;
pub mod predicate;
pub mod retrieval;
pub mod search;
pub mod store;
pub mod templates;

pub use candidates::{CandidateSetBuilder, SearchOptions};
pub use error::{Result, SieveError};
pub use retrieval::{RequestContext, RetrievalOrchestrator, RetrievalResult};
