//! Relational store collaborator
//!
//! The retrieval core only reads through [`DocumentStore`]; the SQLite
//! implementation additionally exposes the writers used by the template loader
//! and the `embed` command.

pub mod database;

use crate::error::Result;
use crate::metadata::MetadataValue;
use crate::templates::QueryTemplate;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub use database::{Database, DbPool, DbStats, NewChunk, NewDocument, StoredEmbedding};

pub type CollectionId = i64;
pub type OrganisationId = i64;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Primary key of a document
    DocumentId
);
id_type!(
    /// Primary key of an indexed text chunk
    ChunkId
);
id_type!(
    /// Primary key of a query template
    TemplateId
);

/// A document as seen by retrieval: identity, placement and metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub collection_id: CollectionId,
    pub name: String,
    pub path: String,
    /// Unique within a collection
    pub relative_path: String,
    pub category: Option<String>,
    pub language: Option<String>,
    pub use_in_search: bool,
    pub metadata: Option<MetadataValue>,
}

impl Document {
    /// Metadata record unless absent or blank
    pub fn metadata(&self) -> Option<&MetadataValue> {
        self.metadata.as_ref().filter(|m| !m.is_blank())
    }
}

/// One text fragment of a document page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub page_number: i64,
    pub text_number: i64,
    pub language: Option<String>,
    pub text: String,
}

/// Text of a neighbouring chunk on the same page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextText {
    pub text_number: i64,
    pub text: String,
}

/// Chunks surrounding a hit, each side ordered by `text_number`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkContext {
    pub left: Vec<ContextText>,
    pub right: Vec<ContextText>,
}

/// Restricts which documents a listing returns
#[derive(Debug, Clone, Copy)]
pub struct DocumentFilter {
    /// Skip documents flagged as not usable in search
    pub only_searchable: bool,
}

impl Default for DocumentFilter {
    fn default() -> Self {
        Self {
            only_searchable: true,
        }
    }
}

/// Immutable record of a query and the response it produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRecord {
    pub organisation_id: OrganisationId,
    pub collection_id: CollectionId,
    pub query: String,
    pub options: serde_json::Value,
    pub template_ids: Vec<TemplateId>,
    pub stats: serde_json::Value,
    pub detailed_results: serde_json::Value,
    pub structured_results: serde_json::Value,
}

/// Read side of the relational store.
///
/// Implementations must return a consistent metadata snapshot for the
/// duration of one retrieval call.
pub trait DocumentStore: Send + Sync {
    fn list_documents(
        &self,
        collection: CollectionId,
        filter: &DocumentFilter,
    ) -> Result<Vec<Document>>;

    fn get_template(&self, id: TemplateId) -> Result<Option<QueryTemplate>>;

    /// Active templates visible to an organisation
    fn templates_for_organisation(&self, organisation: OrganisationId)
        -> Result<Vec<QueryTemplate>>;

    /// Chunks by id; unknown ids are skipped and order is not guaranteed
    fn get_chunks(&self, ids: &[ChunkId]) -> Result<Vec<Chunk>>;

    /// Up to `surrounding` chunks on each side of `chunk` within its page
    fn chunk_context(&self, chunk: &Chunk, surrounding: usize) -> Result<ChunkContext>;

    /// Persist a query record and return its stable identifier
    fn record_query(&self, record: &QueryRecord) -> Result<Uuid>;
}
