//! Scoped search pipeline: embed, k-NN within scope, hydrate, rerank

use super::{
    EmbeddingProvider, IndexHit, RerankError, RerankProvider, ScopeFilter, SearchError, Stage,
    VectorStore,
};
use crate::config::RetrievalConfig;
use crate::metadata::MetadataValue;
use crate::store::{Chunk, ChunkId, DocumentId, DocumentStore};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One retrieved chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Final ranking score: reranker score when reranked, else similarity
    pub score: f32,
    pub similarity: f32,
    pub document_id: DocumentId,
    pub chunk_id: ChunkId,
    pub page_number: i64,
    pub text_number: i64,
    pub language: Option<String>,
    pub text: String,
    /// Structured template fields taken from the document metadata
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, MetadataValue>,
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub scope: ScopeFilter,
    pub max_results: usize,
    pub rerank: bool,
    /// Return the whole oversampled pool instead of `max_results` hits
    pub keep_full_pool: bool,
}

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub search_multiplier: usize,
    pub rerank_candidates_limit: usize,
    pub embed_timeout: Duration,
    pub index_timeout: Duration,
    pub rerank_timeout: Duration,
    pub store_timeout: Duration,
}

impl From<&RetrievalConfig> for SearchSettings {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            search_multiplier: config.search_multiplier,
            rerank_candidates_limit: config.rerank_candidates_limit,
            embed_timeout: config.embed_timeout(),
            index_timeout: config.index_timeout(),
            rerank_timeout: config.rerank_timeout(),
            store_timeout: config.index_timeout(),
        }
    }
}

/// Vector search restricted to a resolved candidate set
pub struct ScopedSearcher {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorStore>,
    reranker: Option<Arc<dyn RerankProvider>>,
    store: Arc<dyn DocumentStore>,
    settings: SearchSettings,
}

impl ScopedSearcher {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorStore>,
        store: Arc<dyn DocumentStore>,
        settings: SearchSettings,
    ) -> Self {
        Self {
            embedder,
            index,
            reranker: None,
            store,
            settings,
        }
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn RerankProvider>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Run the search. Stages are sequential and each one is bounded by its
    /// own timeout; an empty scope returns before any collaborator is called.
    pub async fn search(&self, request: SearchRequest) -> Result<Vec<SearchHit>, SearchError> {
        if request.scope.is_empty() {
            info!("Empty candidate set, skipping vector search");
            return Ok(Vec::new());
        }
        if request.max_results == 0 {
            return Ok(Vec::new());
        }

        let k = request
            .max_results
            .saturating_mul(self.settings.search_multiplier.max(1));

        let embedder = Arc::clone(&self.embedder);
        let query = request.query.clone();
        let vector = run_stage(Stage::Embedding, self.settings.embed_timeout, move || {
            Ok(embedder.embed(&query)?)
        })
        .await?;

        let index = Arc::clone(&self.index);
        let scope = request.scope;
        let matches = run_stage(Stage::VectorIndex, self.settings.index_timeout, move || {
            Ok(index.query_similar(&vector, k, &scope)?)
        })
        .await?;
        debug!("Vector index returned {} of {} requested neighbours", matches.len(), k);

        if matches.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits = self.hydrate(matches).await?;

        if request.rerank {
            let reranker = self.reranker.as_ref().ok_or(RerankError::NotConfigured)?;
            hits = self.rerank(Arc::clone(reranker), &request.query, hits).await?;
        }

        if !request.keep_full_pool {
            hits.truncate(request.max_results);
        }
        Ok(hits)
    }

    async fn hydrate(&self, matches: Vec<IndexHit>) -> Result<Vec<SearchHit>, SearchError> {
        let store = Arc::clone(&self.store);
        let ids: Vec<ChunkId> = matches.iter().map(|m| m.chunk_id).collect();
        let chunks = run_stage(Stage::Store, self.settings.store_timeout, move || {
            store
                .get_chunks(&ids)
                .map_err(|e| SearchError::Store(e.to_string()))
        })
        .await?;

        let mut by_id: AHashMap<ChunkId, Chunk> =
            chunks.into_iter().map(|chunk| (chunk.id, chunk)).collect();

        let mut hits = Vec::with_capacity(matches.len());
        for m in matches {
            let Some(chunk) = by_id.remove(&m.chunk_id) else {
                warn!("Indexed chunk {} no longer exists, skipping", m.chunk_id);
                continue;
            };
            hits.push(SearchHit {
                score: m.score,
                similarity: m.score,
                document_id: chunk.document_id,
                chunk_id: chunk.id,
                page_number: chunk.page_number,
                text_number: chunk.text_number,
                language: chunk.language,
                text: chunk.text,
                fields: BTreeMap::new(),
            });
        }
        Ok(hits)
    }

    /// Re-score the head of the list; the tail keeps its similarity order
    /// behind the reranked head.
    async fn rerank(
        &self,
        reranker: Arc<dyn RerankProvider>,
        query: &str,
        mut hits: Vec<SearchHit>,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let limit = self.settings.rerank_candidates_limit.min(hits.len());
        if limit == 0 {
            return Ok(hits);
        }
        let tail = hits.split_off(limit);

        let texts: Vec<String> = hits.iter().map(|h| h.text.clone()).collect();
        let query = query.to_string();
        let scores = run_stage(Stage::Reranking, self.settings.rerank_timeout, move || {
            Ok(reranker.rerank(&query, &texts)?)
        })
        .await?;

        if scores.len() != hits.len() {
            return Err(SearchError::Reranking(super::RerankError::RerankingError(format!(
                "expected {} scores, got {}",
                hits.len(),
                scores.len()
            ))));
        }

        for (hit, score) in hits.iter_mut().zip(scores) {
            hit.score = score;
        }
        // Stable: ties keep similarity order
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.extend(tail);
        Ok(hits)
    }
}

/// Run blocking collaborator work off the async executor under a deadline
async fn run_stage<T, F>(stage: Stage, timeout: Duration, work: F) -> Result<T, SearchError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SearchError> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(work);
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(SearchError::Aborted {
            stage,
            message: join_error.to_string(),
        }),
        Err(_) => Err(SearchError::Timeout { stage, timeout }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as SieveResult;
    use crate::search::{EmbeddingError, IndexEntry, VectorIndexError};
    use crate::store::{
        ChunkContext, CollectionId, Document, DocumentFilter, OrganisationId, QueryRecord,
        TemplateId,
    };
    use crate::templates::QueryTemplate;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Mutex;
    use uuid::Uuid;

    struct FixedEmbedder {
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl EmbeddingProvider for FixedEmbedder {
        fn embed(&self, _text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            Ok(vec![1.0, 0.0])
        }
        fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }
        fn dimension(&self) -> usize {
            2
        }
        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    /// Returns in-scope hits from a fixed table, best first
    struct TableIndex {
        rows: Vec<IndexHit>,
        calls: AtomicUsize,
        last_k: Mutex<usize>,
    }

    impl VectorStore for TableIndex {
        fn insert(&self, _: IndexEntry, _: &[f32]) -> std::result::Result<(), VectorIndexError> {
            Ok(())
        }
        fn query_similar(
            &self,
            _vector: &[f32],
            k: usize,
            scope: &ScopeFilter,
        ) -> std::result::Result<Vec<IndexHit>, VectorIndexError> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            *self.last_k.lock().unwrap() = k;
            Ok(self
                .rows
                .iter()
                .filter(|h| scope.admits(h.document_id, None))
                .take(k)
                .cloned()
                .collect())
        }
        fn len(&self) -> usize {
            self.rows.len()
        }
    }

    struct ChunkTable;

    impl DocumentStore for ChunkTable {
        fn list_documents(&self, _: CollectionId, _: &DocumentFilter) -> SieveResult<Vec<Document>> {
            Ok(vec![])
        }
        fn get_template(&self, _: TemplateId) -> SieveResult<Option<QueryTemplate>> {
            Ok(None)
        }
        fn templates_for_organisation(&self, _: OrganisationId) -> SieveResult<Vec<QueryTemplate>> {
            Ok(vec![])
        }
        fn get_chunks(&self, ids: &[ChunkId]) -> SieveResult<Vec<Chunk>> {
            Ok(ids
                .iter()
                .map(|id| Chunk {
                    id: *id,
                    document_id: DocumentId(id.0 / 10),
                    page_number: 1,
                    text_number: id.0 % 10,
                    language: None,
                    text: format!("chunk {}", id.0),
                })
                .collect())
        }
        fn chunk_context(&self, _: &Chunk, _: usize) -> SieveResult<ChunkContext> {
            Ok(ChunkContext::default())
        }
        fn record_query(&self, _: &QueryRecord) -> SieveResult<Uuid> {
            Ok(Uuid::nil())
        }
    }

    /// Scores candidates by their text length
    struct LengthReranker;

    impl RerankProvider for LengthReranker {
        fn rerank(&self, _query: &str, candidates: &[String]) -> std::result::Result<Vec<f32>, RerankError> {
            Ok(candidates.iter().map(|c| c.len() as f32).collect())
        }
        fn model_name(&self) -> &str {
            "length"
        }
    }

    fn settings() -> SearchSettings {
        SearchSettings {
            search_multiplier: 10,
            rerank_candidates_limit: 100,
            embed_timeout: Duration::from_secs(5),
            index_timeout: Duration::from_secs(5),
            rerank_timeout: Duration::from_secs(5),
            store_timeout: Duration::from_secs(5),
        }
    }

    fn hit(chunk: i64, score: f32) -> IndexHit {
        IndexHit {
            chunk_id: ChunkId(chunk),
            document_id: DocumentId(chunk / 10),
            score,
        }
    }

    fn fixture(delay: Option<Duration>) -> (Arc<FixedEmbedder>, Arc<TableIndex>, ScopedSearcher) {
        let embedder = Arc::new(FixedEmbedder {
            calls: AtomicUsize::new(0),
            delay,
        });
        let index = Arc::new(TableIndex {
            rows: vec![hit(11, 0.9), hit(21, 0.8), hit(12, 0.7), hit(1000, 0.6), hit(31, 0.5)],
            calls: AtomicUsize::new(0),
            last_k: Mutex::new(0),
        });
        let searcher = ScopedSearcher::new(
            embedder.clone(),
            index.clone(),
            Arc::new(ChunkTable),
            settings(),
        );
        (embedder, index, searcher)
    }

    fn request(documents: &[i64], max_results: usize) -> SearchRequest {
        SearchRequest {
            query: "q".into(),
            scope: ScopeFilter::new(documents.iter().map(|d| DocumentId(*d)), None),
            max_results,
            rerank: false,
            keep_full_pool: false,
        }
    }

    #[tokio::test]
    async fn test_empty_scope_skips_collaborators() {
        let (embedder, index, searcher) = fixture(None);
        let hits = searcher.search(request(&[], 5)).await.unwrap();
        assert!(hits.is_empty());
        assert_eq!(embedder.calls.load(AtomicOrdering::SeqCst), 0);
        assert_eq!(index.calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_scope_oversampling_and_truncation() {
        let (_, index, searcher) = fixture(None);
        let hits = searcher.search(request(&[1, 2], 2)).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.chunk_id).collect();
        assert_eq!(ids, vec![ChunkId(11), ChunkId(21)]);
        assert_eq!(*index.last_k.lock().unwrap(), 20);
        assert!(hits.iter().all(|h| h.score == h.similarity));
    }

    #[tokio::test]
    async fn test_full_pool_is_not_truncated() {
        let (_, _, searcher) = fixture(None);
        let mut req = request(&[1, 2, 100], 1);
        req.keep_full_pool = true;
        let hits = searcher.search(req).await.unwrap();
        assert_eq!(hits.len(), 4);
    }

    #[tokio::test]
    async fn test_rerank_reorders_and_keeps_similarity() {
        let (_, _, searcher) = fixture(None);
        let searcher = searcher.with_reranker(Arc::new(LengthReranker));
        let mut req = request(&[1, 2, 100], 3);
        req.rerank = true;
        let hits = searcher.search(req).await.unwrap();

        // "chunk 1000" is the longest text
        assert_eq!(hits[0].chunk_id, ChunkId(1000));
        assert!((hits[0].similarity - 0.6).abs() < 1e-6);
        // Equal lengths keep similarity order
        assert_eq!(hits[1].chunk_id, ChunkId(11));
        assert_eq!(hits[2].chunk_id, ChunkId(21));
    }

    #[tokio::test]
    async fn test_rerank_without_reranker_is_an_error() {
        let (_, _, searcher) = fixture(None);
        let mut req = request(&[1, 2], 2);
        req.rerank = true;
        let err = searcher.search(req).await.unwrap_err();
        assert!(matches!(err, SearchError::Reranking(RerankError::NotConfigured)));
    }

    #[tokio::test]
    async fn test_stage_timeout_is_an_error() {
        let (_, _, searcher) = fixture(Some(Duration::from_millis(200)));
        let mut searcher = searcher;
        searcher.settings.embed_timeout = Duration::from_millis(10);
        let err = searcher.search(request(&[1], 5)).await.unwrap_err();
        assert!(matches!(
            err,
            SearchError::Timeout {
                stage: Stage::Embedding,
                ..
            }
        ));
    }
}
