//! Retrieval orchestration
//!
//! One call runs the whole two-stage pipeline: candidate resolution over the
//! metadata snapshot, scoped vector search, then context, statistics,
//! structured results and the persisted query record.

mod stats;
mod structured;

pub use stats::{
    compute_stats, filter_stats, top_documents_by_share, DocumentStats, HitSample,
    SMOOTHING_FACTOR,
};
pub use structured::{
    build_structured_results, extract_fields, factored_fields, structured_fields,
    StructuredResult,
};

use crate::candidates::{CandidateSetBuilder, ResolvedCandidates, SearchOptions};
use crate::config::RetrievalConfig;
use crate::error::{Result, SieveError};
use crate::search::{ScopeFilter, ScopedSearcher, SearchHit, SearchRequest};
use crate::store::{
    Chunk, ChunkContext, CollectionId, ContextText, Document, DocumentFilter, DocumentId,
    DocumentStore, OrganisationId, QueryRecord,
};
use crate::templates::{SearchGrammar, TemplateSnapshot};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// Caller identity for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub organisation_id: OrganisationId,
    pub collection_id: CollectionId,
}

/// A hit with its document identity and surrounding text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedResult {
    #[serde(flatten)]
    pub hit: SearchHit,
    pub document_name: String,
    pub relative_path: String,
    pub left_context: Vec<ContextText>,
    pub right_context: Vec<ContextText>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Identifier of the persisted query record
    pub query_response_id: Uuid,
    pub query: String,
    pub language: Option<String>,
    /// Size of the resolved candidate set
    pub candidates: usize,
    pub stats: BTreeMap<String, DocumentStats>,
    pub detailed_results: Vec<DetailedResult>,
    /// Empty unless a resolved template asks for a structured response
    pub structured_results: Vec<StructuredResult>,
    /// Non-blank system prompts of the resolved templates, in request order
    pub template_prompts: Vec<String>,
}

pub struct RetrievalOrchestrator {
    store: Arc<dyn DocumentStore>,
    searcher: ScopedSearcher,
    grammar: Arc<SearchGrammar>,
    config: RetrievalConfig,
}

impl RetrievalOrchestrator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        searcher: ScopedSearcher,
        grammar: SearchGrammar,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            searcher,
            grammar: Arc::new(grammar),
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Run one retrieval request end to end
    pub async fn run(
        &self,
        query: &str,
        options: &SearchOptions,
        context: &RequestContext,
    ) -> Result<RetrievalResult> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SieveError::InvalidQuery("query text is empty".to_string()));
        }
        let max_results = options.max_results.unwrap_or(self.config.default_max_results);
        if max_results == 0 {
            return Err(SieveError::InvalidQuery(
                "max_results must be greater than zero".to_string(),
            ));
        }

        let started = Instant::now();
        let language = options.effective_language(self.config.default_language.as_deref());

        let (documents, candidates) = self.resolve_candidates(options, context).await?;
        let by_id: AHashMap<DocumentId, &Document> = documents.iter().map(|d| (d.id, d)).collect();

        let request = SearchRequest {
            query: query.to_string(),
            scope: ScopeFilter::new(candidates.ids.iter().copied(), language.clone()),
            max_results,
            rerank: options.rerank_results,
            keep_full_pool: options.return_with_factored_fields,
        };
        let mut hits = self.searcher.search(request).await?;

        if options.return_with_factored_fields {
            let fields = factored_fields(&candidates.templates);
            if !fields.is_empty() {
                for hit in &mut hits {
                    if let Some(document) = by_id.get(&hit.document_id) {
                        hit.fields = extract_fields(document, &fields);
                    }
                }
            }
        }

        let contexts = self.fetch_contexts(&hits).await?;
        let detailed_results: Vec<DetailedResult> = hits
            .into_iter()
            .zip(contexts)
            .map(|(hit, ctx)| {
                let (document_name, relative_path) = by_id
                    .get(&hit.document_id)
                    .map(|d| (d.name.clone(), d.relative_path.clone()))
                    .unwrap_or_default();
                DetailedResult {
                    hit,
                    document_name,
                    relative_path,
                    left_context: ctx.left,
                    right_context: ctx.right,
                }
            })
            .collect();

        let stats = filter_stats(
            compute_stats(detailed_results.iter().map(|r| HitSample {
                document_name: &r.document_name,
                document_id: r.hit.document_id,
                relative_path: &r.relative_path,
                score: r.hit.score,
                page_number: r.hit.page_number,
            })),
            self.config.min_hits,
            self.config.min_pages,
        );

        let template_prompts: Vec<String> = candidates
            .templates
            .iter()
            .filter_map(|t| t.prompt())
            .map(str::to_string)
            .collect();

        let structured_results = structured_fields(&candidates.templates)
            .map(|fields| {
                build_structured_results(
                    detailed_results.iter().map(|r| &r.hit.document_id),
                    &by_id,
                    fields,
                )
            })
            .unwrap_or_default();

        let record = QueryRecord {
            organisation_id: context.organisation_id,
            collection_id: context.collection_id,
            query: query.to_string(),
            options: to_value(options, "search options")?,
            template_ids: candidates.templates.iter().map(|t| t.id).collect(),
            stats: to_value(&stats, "document stats")?,
            detailed_results: to_value(&detailed_results, "detailed results")?,
            structured_results: to_value(&structured_results, "structured results")?,
        };
        let store = Arc::clone(&self.store);
        let query_response_id = blocking(move || store.record_query(&record)).await?;

        info!(
            "Query {} answered with {} hits from {} documents in {:?}",
            query_response_id,
            detailed_results.len(),
            stats.len(),
            started.elapsed()
        );

        Ok(RetrievalResult {
            query_response_id,
            query: query.to_string(),
            language,
            candidates: candidates.len(),
            stats,
            detailed_results,
            structured_results,
            template_prompts,
        })
    }

    /// Load the request snapshot and build the candidate set off the executor
    async fn resolve_candidates(
        &self,
        options: &SearchOptions,
        context: &RequestContext,
    ) -> Result<(Vec<Document>, ResolvedCandidates)> {
        let collection = context.collection_id;
        let organisation = context.organisation_id;

        let documents_store = Arc::clone(&self.store);
        let templates_store = Arc::clone(&self.store);
        let (documents, templates) = tokio::join!(
            blocking(move || documents_store.list_documents(collection, &DocumentFilter::default())),
            blocking(move || templates_store.templates_for_organisation(organisation)),
        );
        let documents = documents?;
        let snapshot = TemplateSnapshot::new(organisation, templates?);
        debug!(
            "Snapshot for organisation {}: {} documents, {} templates",
            organisation,
            documents.len(),
            snapshot.len()
        );

        let grammar = Arc::clone(&self.grammar);
        let options = options.clone();
        blocking(move || {
            let candidates = CandidateSetBuilder::new(&grammar).build(&options, &documents, &snapshot);
            Ok((documents, candidates))
        })
        .await
    }

    /// Neighbouring chunks for every hit, in hit order
    async fn fetch_contexts(&self, hits: &[SearchHit]) -> Result<Vec<ChunkContext>> {
        let surrounding = self.config.surrounding_chunks;
        if surrounding == 0 || hits.is_empty() {
            return Ok(vec![ChunkContext::default(); hits.len()]);
        }

        let chunks: Vec<Chunk> = hits
            .iter()
            .map(|h| Chunk {
                id: h.chunk_id,
                document_id: h.document_id,
                page_number: h.page_number,
                text_number: h.text_number,
                language: h.language.clone(),
                text: String::new(),
            })
            .collect();
        let store = Arc::clone(&self.store);
        blocking(move || {
            chunks
                .iter()
                .map(|chunk| store.chunk_context(chunk, surrounding))
                .collect()
        })
        .await
    }
}

async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| SieveError::Other(anyhow::anyhow!("blocking task failed: {}", e)))?
}

fn to_value<T: Serialize + ?Sized>(value: &T, context: &str) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|source| SieveError::Json {
        source,
        context: format!("Failed to serialize {}", context),
    })
}
