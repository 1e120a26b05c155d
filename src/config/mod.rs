//! Configuration management for docsieve
//!
//! Loads the TOML configuration, applies `DOCSIEVE_SECTION__KEY` environment
//! overrides and named profiles, then validates the result.

use crate::error::{Result, SieveError};
use crate::search::FastEmbedProvider;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub indexing: IndexingConfig,
    pub retrieval: RetrievalConfig,
    pub templates: TemplatesConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn default_reranker_model() -> Option<String> {
    Some("BAAI/bge-reranker-base".to_string())
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub pool_size: u32,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
    pub batch_size: usize,
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    pub max_elements: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_ef_search: usize,
    pub hnsw_m: usize,
}

/// Retrieval pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Used when a request carries no `max_results`
    pub default_max_results: usize,
    /// Oversampling factor applied to `max_results` when querying the index
    pub search_multiplier: usize,
    /// Upper bound on hits handed to the reranker
    pub rerank_candidates_limit: usize,
    /// Cross-encoder model; a rerank request fails when none is configured
    #[serde(default = "default_reranker_model", skip_serializing_if = "Option::is_none")]
    pub reranker_model: Option<String>,
    /// Language constraint used when the request does not set one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_language: Option<String>,
    /// Neighbouring chunks attached on each side of a hit
    pub surrounding_chunks: usize,
    pub min_hits: usize,
    pub min_pages: usize,
    pub embed_timeout_ms: u64,
    pub index_timeout_ms: u64,
    pub rerank_timeout_ms: u64,
}

impl RetrievalConfig {
    pub fn embed_timeout(&self) -> Duration {
        Duration::from_millis(self.embed_timeout_ms)
    }

    pub fn index_timeout(&self) -> Duration {
        Duration::from_millis(self.index_timeout_ms)
    }

    pub fn rerank_timeout(&self) -> Duration {
        Duration::from_millis(self.rerank_timeout_ms)
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_max_results: 50,
            search_multiplier: 10,
            rerank_candidates_limit: 100,
            reranker_model: default_reranker_model(),
            default_language: None,
            surrounding_chunks: 2,
            min_hits: 1,
            min_pages: 1,
            embed_timeout_ms: 10_000,
            index_timeout_ms: 5_000,
            rerank_timeout_ms: 30_000,
        }
    }
}

/// Query template configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    /// JSON file consumed by `docsieve templates load`
    pub config_path: PathBuf,
    /// Exclude documents with grammar problems quietly instead of warning
    pub lenient_grammar: bool,
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reranker_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_max_results: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_language: Option<String>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SieveError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| SieveError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SieveError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| SieveError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| SieveError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(model) = overrides.embedding_model {
            self.set_embedding_model(model);
        }
        if let Some(model) = overrides.reranker_model {
            self.retrieval.reranker_model = Some(model);
        }
        if let Some(max_results) = overrides.default_max_results {
            self.retrieval.default_max_results = max_results;
        }
        if let Some(language) = overrides.default_language {
            self.retrieval.default_language = Some(language);
        }
        ConfigValidator::validate(self)
    }

    /// Apply environment variable overrides
    /// Environment variables in format: DOCSIEVE_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    fn apply_overrides(&mut self, vars: impl Iterator<Item = (String, String)>) {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix("DOCSIEVE_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    /// Switch the embedding model, following its dimension when known
    fn set_embedding_model(&mut self, model: String) {
        if let Some(dimension) = FastEmbedProvider::model_dimension(&model) {
            self.embedding.dimension = dimension;
        }
        self.embedding.model = model;
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORAGE__DATABASE_PATH" => {
                self.storage.database_path = PathBuf::from(value);
            }
            "EMBEDDING__MODEL" => {
                self.set_embedding_model(value.to_string());
            }
            "RETRIEVAL__RERANKER_MODEL" => {
                self.retrieval.reranker_model = Some(value.to_string());
            }
            "RETRIEVAL__DEFAULT_LANGUAGE" => {
                self.retrieval.default_language = Some(value.to_string());
            }
            "RETRIEVAL__DEFAULT_MAX_RESULTS" => {
                self.retrieval.default_max_results = parse_env(path, value)?;
            }
            "TEMPLATES__LENIENT_GRAMMAR" => {
                self.templates.lenient_grammar = parse_env(path, value)?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| SieveError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("docsieve").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| SieveError::Config("Cannot determine home directory".to_string()))?;

        Ok(home_dir.join(".docsieve"))
    }
}

fn parse_env<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| SieveError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("~/.docsieve");
        let config_dir = PathBuf::from("~/.config/docsieve");

        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                database_path: data_dir.join("docsieve.sqlite"),
                pool_size: 8,
            },
            embedding: EmbeddingConfig {
                model: "all-MiniLM-L6-v2".to_string(),
                dimension: 384,
                batch_size: 32,
            },
            indexing: IndexingConfig {
                max_elements: 100_000,
                hnsw_ef_construction: 200,
                hnsw_ef_search: 64,
                hnsw_m: 16,
            },
            retrieval: RetrievalConfig::default(),
            templates: TemplatesConfig {
                config_path: config_dir.join("query-templates.json"),
                lenient_grammar: true,
            },
            profiles: HashMap::new(),
        }
    }
}
