//! Cross-encoder reranking using FastEmbed

use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RerankError {
    #[error("Reranker initialization failed: {0}")]
    InitializationError(String),

    #[error("Reranking failed: {0}")]
    RerankingError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Reranking requested but no reranker is configured")]
    NotConfigured,
}

/// Scores `(query, candidate)` pairs; higher is more relevant
pub trait RerankProvider: Send + Sync {
    /// One score per candidate, in input order
    fn rerank(&self, query: &str, candidates: &[String]) -> Result<Vec<f32>, RerankError>;

    fn model_name(&self) -> &str;
}

pub struct FastEmbedReranker {
    model: Arc<TextRerank>,
    model_name: String,
}

impl FastEmbedReranker {
    pub fn new(model_name: &str) -> Result<Self, RerankError> {
        let reranker_model = match model_name {
            "BAAI/bge-reranker-base" | "bge-reranker-base" => RerankerModel::BGERerankerBase,
            "rozgo/bge-reranker-v2-m3" | "bge-reranker-v2-m3" => RerankerModel::BGERerankerV2M3,
            "jinaai/jina-reranker-v2-base-multilingual" | "jina-reranker-v2-base-multilingual" => {
                RerankerModel::JINARerankerV2BaseMultiligual
            }
            _ => {
                return Err(RerankError::InitializationError(format!(
                    "Unsupported reranker model: {}",
                    model_name
                )))
            }
        };

        tracing::info!("Initializing reranker model: {}", model_name);

        let init_options = RerankInitOptions::new(reranker_model).with_show_download_progress(true);
        let model = TextRerank::try_new(init_options)
            .map_err(|e| RerankError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
        })
    }
}

impl RerankProvider for FastEmbedReranker {
    fn rerank(&self, query: &str, candidates: &[String]) -> Result<Vec<f32>, RerankError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        if query.trim().is_empty() {
            return Err(RerankError::InvalidInput(
                "Query cannot be empty".to_string(),
            ));
        }

        let documents: Vec<&str> = candidates.iter().map(String::as_str).collect();
        let results = self
            .model
            .rerank(query, documents, false, None)
            .map_err(|e| RerankError::RerankingError(e.to_string()))?;

        let mut scores = vec![None; candidates.len()];
        for result in results {
            if let Some(slot) = scores.get_mut(result.index) {
                *slot = Some(result.score);
            }
        }
        scores
            .into_iter()
            .enumerate()
            .map(|(i, score)| {
                score.ok_or_else(|| {
                    RerankError::RerankingError(format!("No score returned for candidate {}", i))
                })
            })
            .collect()
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
