//! HNSW vector index with scope-filtered k-NN search
use super::scope::ScopeFilter;
use crate::store::{ChunkId, DocumentId, StoredEmbedding};
use ahash::AHashMap;
use hnsw_rs::prelude::*;
use std::cmp::Ordering;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Insert failed: {0}")]
    InsertError(String),

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Index is at capacity ({0} vectors)")]
    Full(usize),
}

/// Scope attributes stored next to each indexed chunk vector
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub language: Option<String>,
}

/// One neighbour returned by a scoped query, similarity in `[-1, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub score: f32,
}

/// Nearest-neighbour lookup restricted to a scope
pub trait VectorStore: Send + Sync {
    fn insert(&self, entry: IndexEntry, vector: &[f32]) -> Result<(), VectorIndexError>;

    /// Up to `k` most similar in-scope chunks, best first
    fn query_similar(
        &self,
        vector: &[f32],
        k: usize,
        scope: &ScopeFilter,
    ) -> Result<Vec<IndexHit>, VectorIndexError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// HNSW construction and query parameters
#[derive(Debug, Clone, Copy)]
pub struct HnswParams {
    pub dimension: usize,
    pub max_elements: usize,
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    /// In-scope populations at or below this size are scanned exactly
    pub exact_scan_limit: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            dimension: 384,
            max_elements: 100_000,
            m: 16,
            ef_construction: 200,
            ef_search: 64,
            exact_scan_limit: 2_048,
        }
    }
}

const MAX_LAYERS: usize = 16;

struct Slot {
    entry: IndexEntry,
    vector: Vec<f32>,
}

#[derive(Default)]
struct Payloads {
    slots: Vec<Slot>,
    by_document: AHashMap<DocumentId, Vec<usize>>,
}

/// In-memory HNSW over chunk vectors.
///
/// The HNSW data id of a vector is its position in the payload table. Small
/// scopes bypass the graph and are scored exactly, since graph traversal with
/// a highly selective filter loses recall.
pub struct HnswVectorIndex {
    hnsw: Hnsw<'static, f32, DistCosine>,
    payloads: RwLock<Payloads>,
    params: HnswParams,
}

impl HnswVectorIndex {
    pub fn new(params: HnswParams) -> Self {
        let hnsw = Hnsw::<f32, DistCosine>::new(
            params.m,
            params.max_elements,
            MAX_LAYERS,
            params.ef_construction,
            DistCosine {},
        );
        Self {
            hnsw,
            payloads: RwLock::new(Payloads::default()),
            params,
        }
    }

    pub fn dimension(&self) -> usize {
        self.params.dimension
    }

    /// Seed the index from persisted embeddings, returning how many were added
    pub fn load_stored<I>(&self, embeddings: I) -> Result<usize, VectorIndexError>
    where
        I: IntoIterator<Item = StoredEmbedding>,
    {
        let mut loaded = 0;
        for stored in embeddings {
            let entry = IndexEntry {
                chunk_id: stored.chunk_id,
                document_id: stored.document_id,
                language: stored.language,
            };
            self.insert(entry, &stored.vector)?;
            loaded += 1;
        }
        Ok(loaded)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), VectorIndexError> {
        if vector.len() != self.params.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.params.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    fn exact_scan(
        payloads: &Payloads,
        vector: &[f32],
        k: usize,
        scope: &ScopeFilter,
    ) -> Vec<IndexHit> {
        let mut hits: Vec<IndexHit> = scope
            .documents
            .iter()
            .filter_map(|doc| payloads.by_document.get(doc))
            .flatten()
            .map(|&pos| &payloads.slots[pos])
            .filter(|slot| scope.admits(slot.entry.document_id, slot.entry.language.as_deref()))
            .map(|slot| IndexHit {
                chunk_id: slot.entry.chunk_id,
                document_id: slot.entry.document_id,
                score: cosine_similarity(vector, &slot.vector),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(k);
        hits
    }
}

impl VectorStore for HnswVectorIndex {
    fn insert(&self, entry: IndexEntry, vector: &[f32]) -> Result<(), VectorIndexError> {
        self.check_dimension(vector)?;

        let mut payloads = self
            .payloads
            .write()
            .map_err(|e| VectorIndexError::InsertError(e.to_string()))?;
        let position = payloads.slots.len();
        if position >= self.params.max_elements {
            return Err(VectorIndexError::Full(self.params.max_elements));
        }

        self.hnsw.insert((vector, position));
        payloads
            .by_document
            .entry(entry.document_id)
            .or_default()
            .push(position);
        payloads.slots.push(Slot {
            entry,
            vector: vector.to_vec(),
        });
        Ok(())
    }

    fn query_similar(
        &self,
        vector: &[f32],
        k: usize,
        scope: &ScopeFilter,
    ) -> Result<Vec<IndexHit>, VectorIndexError> {
        self.check_dimension(vector)?;
        if k == 0 || scope.is_empty() {
            return Ok(Vec::new());
        }

        let payloads = self
            .payloads
            .read()
            .map_err(|e| VectorIndexError::SearchError(e.to_string()))?;
        if payloads.slots.is_empty() {
            return Ok(Vec::new());
        }

        let in_scope: usize = scope
            .documents
            .iter()
            .filter_map(|doc| payloads.by_document.get(doc))
            .map(Vec::len)
            .sum();
        if in_scope == 0 {
            return Ok(Vec::new());
        }
        if in_scope <= self.params.exact_scan_limit {
            return Ok(Self::exact_scan(&payloads, vector, k, scope));
        }

        let filter = |id: &usize| {
            payloads
                .slots
                .get(*id)
                .is_some_and(|slot| scope.admits(slot.entry.document_id, slot.entry.language.as_deref()))
        };
        let ef = self.params.ef_search.max(k);
        let neighbours = self
            .hnsw
            .search_filter(vector, k, ef, Some(&filter as &dyn FilterT));

        Ok(neighbours
            .into_iter()
            .filter_map(|n| {
                let slot = payloads.slots.get(n.d_id)?;
                Some(IndexHit {
                    chunk_id: slot.entry.chunk_id,
                    document_id: slot.entry.document_id,
                    score: 1.0 - n.distance,
                })
            })
            .collect())
    }

    fn len(&self) -> usize {
        self.payloads.read().map(|p| p.slots.len()).unwrap_or(0)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(exact_scan_limit: usize) -> HnswParams {
        HnswParams {
            dimension: 3,
            max_elements: 1_000,
            exact_scan_limit,
            ..HnswParams::default()
        }
    }

    fn entry(chunk: i64, document: i64, language: &str) -> IndexEntry {
        IndexEntry {
            chunk_id: ChunkId(chunk),
            document_id: DocumentId(document),
            language: Some(language.to_string()),
        }
    }

    fn populated(exact_scan_limit: usize) -> HnswVectorIndex {
        let index = HnswVectorIndex::new(params(exact_scan_limit));
        index.insert(entry(1, 10, "pl"), &[1.0, 0.0, 0.0]).unwrap();
        index.insert(entry(2, 10, "pl"), &[0.9, 0.1, 0.0]).unwrap();
        index.insert(entry(3, 20, "en"), &[1.0, 0.0, 0.0]).unwrap();
        index.insert(entry(4, 30, "pl"), &[0.0, 1.0, 0.0]).unwrap();
        index
    }

    #[test]
    fn test_dimension_checked() {
        let index = HnswVectorIndex::new(params(10));
        let err = index.insert(entry(1, 1, "pl"), &[1.0, 0.0]).unwrap_err();
        assert!(matches!(err, VectorIndexError::InvalidDimension { expected: 3, actual: 2 }));
    }

    #[test]
    fn test_exact_scope_respected() {
        let index = populated(100);
        let scope = ScopeFilter::new([DocumentId(10), DocumentId(30)], Some("pl".into()));
        let hits = index.query_similar(&[1.0, 0.0, 0.0], 10, &scope).unwrap();

        let chunks: Vec<_> = hits.iter().map(|h| h.chunk_id).collect();
        assert_eq!(chunks, vec![ChunkId(1), ChunkId(2), ChunkId(4)]);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_graph_search_respects_scope() {
        let index = populated(0);
        let scope = ScopeFilter::new([DocumentId(20)], None);
        let hits = index.query_similar(&[1.0, 0.0, 0.0], 2, &scope).unwrap();
        assert!(!hits.is_empty());
        assert!(hits.iter().all(|h| h.document_id == DocumentId(20)));
    }

    #[test]
    fn test_empty_scope_or_index() {
        let index = populated(100);
        let none = ScopeFilter::new(std::iter::empty(), None);
        assert!(index.query_similar(&[1.0, 0.0, 0.0], 5, &none).unwrap().is_empty());

        let empty = HnswVectorIndex::new(params(100));
        let scope = ScopeFilter::new([DocumentId(1)], None);
        assert!(empty.query_similar(&[1.0, 0.0, 0.0], 5, &scope).unwrap().is_empty());
        assert!(empty.is_empty());
    }
}
