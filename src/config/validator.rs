use crate::config::Config;
use crate::error::{Result, SieveError, ValidationError};
use crate::search::FastEmbedProvider;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every problem before failing
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_indexing(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_templates(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SieveError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        // The file may not exist yet; it is created on first open.
        if config.storage.database_path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.database_path",
                "Database path cannot be empty",
            ));
        }

        if config.storage.pool_size == 0 {
            errors.push(ValidationError::new(
                "storage.pool_size",
                "Pool size must be greater than 0",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Embedding dimension must be greater than 0",
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
            return;
        }

        let dimension = config.embedding.dimension;
        match FastEmbedProvider::model_dimension(&config.embedding.model) {
            Some(expected) if dimension != 0 && expected != dimension => {
                errors.push(ValidationError::new(
                    "embedding.dimension",
                    format!(
                        "Dimension {} does not match {} ({}D)",
                        dimension, config.embedding.model, expected
                    ),
                ));
            }
            Some(_) => {}
            None => errors.push(ValidationError::new(
                "embedding.model",
                format!(
                    "Unsupported model: {}. Supported: {}",
                    config.embedding.model,
                    FastEmbedProvider::SUPPORTED.join(", ")
                ),
            )),
        }
    }

    fn validate_indexing(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.indexing.max_elements == 0 {
            errors.push(ValidationError::new(
                "indexing.max_elements",
                "Index capacity must be greater than 0",
            ));
        }

        if config.indexing.hnsw_ef_construction == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_ef_construction",
                "HNSW ef_construction must be greater than 0",
            ));
        }

        if config.indexing.hnsw_ef_search == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_ef_search",
                "HNSW ef_search must be greater than 0",
            ));
        }

        if config.indexing.hnsw_m == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_m",
                "HNSW M must be greater than 0",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;

        if retrieval.default_max_results == 0 {
            errors.push(ValidationError::new(
                "retrieval.default_max_results",
                "Default max results must be greater than 0",
            ));
        }

        if retrieval.search_multiplier == 0 {
            errors.push(ValidationError::new(
                "retrieval.search_multiplier",
                "Search multiplier must be at least 1",
            ));
        }

        if retrieval.rerank_candidates_limit == 0 {
            errors.push(ValidationError::new(
                "retrieval.rerank_candidates_limit",
                "Rerank candidates limit must be greater than 0",
            ));
        }

        if let Some(model) = &retrieval.reranker_model {
            if model.trim().is_empty() {
                errors.push(ValidationError::new(
                    "retrieval.reranker_model",
                    "Reranker model cannot be blank; omit it to disable reranking",
                ));
            }
        }

        for (key, value) in [
            ("retrieval.embed_timeout_ms", retrieval.embed_timeout_ms),
            ("retrieval.index_timeout_ms", retrieval.index_timeout_ms),
            ("retrieval.rerank_timeout_ms", retrieval.rerank_timeout_ms),
        ] {
            if value == 0 {
                errors.push(ValidationError::new(key, "Timeout must be greater than 0"));
            }
        }
    }

    fn validate_templates(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.templates.config_path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "templates.config_path",
                "Template configuration path cannot be empty",
            ));
        }
    }
}
