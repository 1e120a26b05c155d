//! End-to-end retrieval over a SQLite store and an in-memory HNSW index

use docsieve::candidates::SearchOptions;
use docsieve::config::RetrievalConfig;
use docsieve::metadata::MetadataValue;
use docsieve::retrieval::{RequestContext, RetrievalOrchestrator};
use docsieve::search::{
    EmbeddingError, EmbeddingProvider, FastEmbedProvider, HnswParams, HnswVectorIndex,
    ScopedSearcher, SearchSettings, VectorStore,
};
use docsieve::store::{ChunkId, Database, NewChunk, NewDocument};
use docsieve::templates::{SearchGrammar, TemplateLoader};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

const DIMENSION: usize = 32;

/// Bag-of-words vectors: each token bumps one hashed bucket
struct HashingEmbedder;

impl EmbeddingProvider for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0f32; DIMENSION];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = blake3::hash(token.to_lowercase().as_bytes());
            vector[hash.as_bytes()[0] as usize % DIMENSION] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt().max(1e-6);
        Ok(vector.into_iter().map(|v| v / norm).collect())
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn model_name(&self) -> &str {
        "hashing"
    }
}

struct Fixture {
    _dir: TempDir,
    db: Arc<Database>,
    collection_id: i64,
}

fn seed() -> Fixture {
    let dir = TempDir::new().unwrap();
    let db = Arc::new(Database::new(&dir.path().join("docsieve.sqlite"), 4).unwrap());
    let collection_id = db.ensure_collection("city").unwrap();

    let documents = [
        (
            "jazz-night",
            "Events",
            json!({"type": "event", "kind": "concert", "title": "Jazz night", "date": {"end": "2999-01-01"}}),
            vec!["Jazz concert in the old town square", "Tickets for the concert at the gate"],
        ),
        (
            "old-festival",
            "Events",
            json!({"type": "event", "kind": "concert", "title": "Old festival", "date": {"end": "2001-01-01"}}),
            vec!["Festival concert with local bands", "Concert stage near the river"],
        ),
        (
            "parking-act",
            "Law",
            json!({"type": "regulation", "title": "Parking act"}),
            vec!["Parking fees apply on weekdays", "Residents receive parking permits"],
        ),
    ];

    for (name, category, metadata, texts) in documents {
        let id = db
            .upsert_document(&NewDocument {
                collection_id,
                name: name.to_string(),
                path: format!("/srv/city/{}.pdf", name),
                relative_path: format!("{}.pdf", name),
                category: Some(category.to_string()),
                language: Some("en".to_string()),
                use_in_search: true,
                metadata: Some(MetadataValue::from(metadata)),
            })
            .unwrap();
        let chunks: Vec<NewChunk> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| NewChunk {
                page_number: 1,
                text_number: i as i64 + 1,
                language: Some("en".to_string()),
                text: text.to_string(),
            })
            .collect();
        db.replace_chunks(id, &chunks).unwrap();
    }

    let embedder = HashingEmbedder;
    let pending = db.chunks_missing_embeddings(collection_id, "hashing", 100).unwrap();
    let texts: Vec<String> = pending.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder.embed_batch(&texts).unwrap();
    let rows: Vec<(ChunkId, Vec<f32>)> = pending.iter().map(|c| c.id).zip(vectors).collect();
    assert_eq!(db.store_embeddings("hashing", &rows).unwrap(), 6);

    Fixture {
        _dir: dir,
        db,
        collection_id,
    }
}

fn orchestrator(fixture: &Fixture) -> (Arc<HnswVectorIndex>, RetrievalOrchestrator) {
    let index = Arc::new(HnswVectorIndex::new(HnswParams {
        dimension: DIMENSION,
        max_elements: 1_000,
        ..HnswParams::default()
    }));
    let stored = fixture
        .db
        .load_embeddings(fixture.collection_id, "hashing")
        .unwrap();
    assert_eq!(index.load_stored(stored).unwrap(), 6);

    let config = RetrievalConfig {
        surrounding_chunks: 1,
        ..RetrievalConfig::default()
    };
    let searcher = ScopedSearcher::new(
        Arc::new(HashingEmbedder),
        index.clone(),
        fixture.db.clone(),
        SearchSettings::from(&config),
    );
    let orchestrator = RetrievalOrchestrator::new(
        fixture.db.clone(),
        searcher,
        SearchGrammar::new(true),
        config,
    );
    (index, orchestrator)
}

#[tokio::test]
async fn test_category_search_end_to_end() {
    let fixture = seed();
    let (index, orchestrator) = orchestrator(&fixture);
    assert_eq!(index.len(), 6);

    let context = RequestContext {
        organisation_id: 1,
        collection_id: fixture.collection_id,
    };
    let options = SearchOptions {
        categories: vec!["Law".into()],
        ..Default::default()
    };
    let result = orchestrator.run("parking permits", &options, &context).await.unwrap();

    assert_eq!(result.candidates, 1);
    assert_eq!(result.detailed_results.len(), 2);
    assert!(result
        .detailed_results
        .iter()
        .all(|r| r.relative_path == "parking-act.pdf"));
    assert_eq!(result.stats["parking-act"].hits, 2);

    // Context comes from the same page, ordered by text number
    let first = &result.detailed_results[0];
    let neighbours: Vec<_> = first
        .left_context
        .iter()
        .chain(first.right_context.iter())
        .collect();
    assert_eq!(neighbours.len(), 1);
    assert_ne!(neighbours[0].text_number, first.hit.text_number);

    let record = fixture.db.get_query_record(result.query_response_id).unwrap().unwrap();
    assert_eq!(record.query, "parking permits");
    assert_eq!(record.collection_id, fixture.collection_id);
}

#[tokio::test]
async fn test_template_search_end_to_end() {
    let fixture = seed();
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("concerts.txt"), "Answer with upcoming concerts only.").unwrap();
    let config = json!({
        "template_name": "city-events",
        "templates_grammar": {"tokens": {}, "alphabet": {}},
        "query_templates": [{
            "name": "upcoming concerts",
            "data_connector": {"kind": "concert"},
            "data_filter_expressions": {},
            "structured_response_if_exists": true,
            "structured_response_data_fields": ["title", "kind"],
            "prompt_file": "concerts.txt"
        }]
    });
    let report = TemplateLoader::from_json(&config.to_string(), dir.path())
        .unwrap()
        .load_into(&fixture.db, 1)
        .unwrap();

    let (_, orchestrator) = orchestrator(&fixture);
    let context = RequestContext {
        organisation_id: 1,
        collection_id: fixture.collection_id,
    };
    let options = SearchOptions {
        template_ids: report.template_ids.clone(),
        only_template_documents: true,
        ..Default::default()
    };
    let result = orchestrator.run("concert tickets", &options, &context).await.unwrap();

    // The grammar drops the festival whose end date has passed
    assert_eq!(result.candidates, 1);
    assert!(result
        .detailed_results
        .iter()
        .all(|r| r.document_name == "jazz-night"));
    assert_eq!(
        result.template_prompts,
        vec!["Answer with upcoming concerts only.".to_string()]
    );

    let structured = &result.structured_results;
    assert_eq!(structured.len(), 1);
    assert_eq!(structured[0].fields["title"], MetadataValue::from("Jazz night"));

    // Another organisation cannot use these templates and searches everything
    let foreign = RequestContext {
        organisation_id: 2,
        ..context
    };
    let result = orchestrator.run("concert tickets", &options, &foreign).await.unwrap();
    assert_eq!(result.candidates, 3);
    assert!(result.template_prompts.is_empty());
    assert!(result.structured_results.is_empty());
}

#[tokio::test]
#[ignore] // Requires model download (~90MB) - run with: cargo test -- --ignored
async fn test_fastembed_search_end_to_end() {
    let fixture = seed();
    let embedder = Arc::new(FastEmbedProvider::new("all-MiniLM-L6-v2").unwrap());
    let index = Arc::new(HnswVectorIndex::new(HnswParams {
        dimension: embedder.dimension(),
        ..HnswParams::default()
    }));

    let pending = fixture
        .db
        .chunks_missing_embeddings(fixture.collection_id, "all-MiniLM-L6-v2", 100)
        .unwrap();
    let texts: Vec<String> = pending.iter().map(|c| c.text.clone()).collect();
    let rows: Vec<(ChunkId, Vec<f32>)> = pending
        .iter()
        .map(|c| c.id)
        .zip(embedder.embed_batch(&texts).unwrap())
        .collect();
    fixture.db.store_embeddings("all-MiniLM-L6-v2", &rows).unwrap();
    index
        .load_stored(
            fixture
                .db
                .load_embeddings(fixture.collection_id, "all-MiniLM-L6-v2")
                .unwrap(),
        )
        .unwrap();

    let config = RetrievalConfig::default();
    let searcher = ScopedSearcher::new(embedder, index, fixture.db.clone(), SearchSettings::from(&config));
    let orchestrator = RetrievalOrchestrator::new(fixture.db.clone(), searcher, SearchGrammar::new(true), config);

    let result = orchestrator
        .run(
            "where can I park my car",
            &SearchOptions::default(),
            &RequestContext {
                organisation_id: 1,
                collection_id: fixture.collection_id,
            },
        )
        .await
        .unwrap();

    println!("✓ {} hits", result.detailed_results.len());
    assert_eq!(result.detailed_results[0].document_name, "parking-act");
}
