use docsieve::cli::{Cli, Commands, ConfigAction, TemplateAction};
use docsieve::config::Config;
use docsieve::error::{Result, SieveError};
use docsieve::retrieval::{top_documents_by_share, RequestContext, RetrievalOrchestrator, RetrievalResult};
use docsieve::search::{
    EmbeddingProvider, FastEmbedProvider, FastEmbedReranker, HnswParams, HnswVectorIndex,
    ScopedSearcher, SearchError, SearchSettings,
};
use docsieve::store::{ChunkId, CollectionId, Database, DocumentStore, TemplateId};
use docsieve::templates::{SearchGrammar, TemplateLoader};
use docsieve::SearchOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Search {
            query,
            options,
            collection,
            organisation,
            json,
            top_share,
        } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_search(&config, &query, options, &collection, organisation, json, top_share)?;
        }
        Commands::Embed { collection } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_embed(&config, &collection)?;
        }
        Commands::Templates { action } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_templates(&config, action)?;
        }
        Commands::Status => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_status(&config)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "docsieve=debug" } else { "docsieve=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn cmd_search(
    config: &Config,
    query: &str,
    options_path: Option<PathBuf>,
    collection: &str,
    organisation: i64,
    json: bool,
    top_share: Option<f64>,
) -> Result<()> {
    let options = match options_path {
        Some(path) => read_options(&path)?,
        None => SearchOptions::default(),
    };

    let db = Arc::new(open_database(config)?);
    let collection_id = require_collection(&db, collection)?;

    let embedder = Arc::new(FastEmbedProvider::new(&config.embedding.model).map_err(SearchError::from)?);
    if embedder.dimension() != config.embedding.dimension {
        return Err(SieveError::Config(format!(
            "embedding.dimension is {} but {} produces {}D vectors",
            config.embedding.dimension,
            config.embedding.model,
            embedder.dimension()
        )));
    }
    let index = HnswVectorIndex::new(HnswParams {
        dimension: config.embedding.dimension,
        max_elements: config.indexing.max_elements,
        m: config.indexing.hnsw_m,
        ef_construction: config.indexing.hnsw_ef_construction,
        ef_search: config.indexing.hnsw_ef_search,
        ..HnswParams::default()
    });
    let loaded = index
        .load_stored(db.load_embeddings(collection_id, &config.embedding.model)?)
        .map_err(SearchError::from)?;
    tracing::info!("Loaded {} vectors for collection '{}'", loaded, collection);
    if loaded == 0 {
        tracing::warn!("No embeddings found. Run 'docsieve embed --collection {}' first.", collection);
    }

    let mut searcher = ScopedSearcher::new(
        embedder,
        Arc::new(index),
        db.clone(),
        SearchSettings::from(&config.retrieval),
    );
    if options.rerank_results {
        if let Some(model) = &config.retrieval.reranker_model {
            let reranker = FastEmbedReranker::new(model).map_err(SearchError::from)?;
            searcher = searcher.with_reranker(Arc::new(reranker));
        }
    }

    let orchestrator = RetrievalOrchestrator::new(
        db,
        searcher,
        SearchGrammar::new(config.templates.lenient_grammar),
        config.retrieval.clone(),
    );
    let context = RequestContext {
        organisation_id: organisation,
        collection_id,
    };

    let rt = tokio::runtime::Runtime::new().map_err(|e| SieveError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })?;
    let result = rt.block_on(orchestrator.run(query, &options, &context))?;

    if json {
        let out = serde_json::to_string_pretty(&result).map_err(|e| SieveError::Json {
            source: e,
            context: "Failed to serialize results".to_string(),
        })?;
        println!("{}", out);
    } else {
        print_result(&result, top_share);
    }
    Ok(())
}

fn print_result(result: &RetrievalResult, top_share: Option<f64>) {
    println!("Query: {}", result.query);
    println!("Response id: {}", result.query_response_id);
    println!(
        "{} candidate documents, {} hits",
        result.candidates,
        result.detailed_results.len()
    );

    for prompt in &result.template_prompts {
        println!("\nTemplate prompt:\n{}", prompt);
    }

    println!();
    for (rank, detail) in result.detailed_results.iter().enumerate() {
        let preview: String = detail.hit.text.chars().take(160).collect();
        println!(
            "{:>3}. [{:.3}] {} (page {}, #{})",
            rank + 1,
            detail.hit.score,
            detail.relative_path,
            detail.hit.page_number,
            detail.hit.text_number
        );
        println!("     {}", preview.replace('\n', " "));
    }

    if !result.stats.is_empty() {
        println!("\nDocuments:");
        for (name, stats) in &result.stats {
            println!(
                "  {:<40} hits {:>3}  pages {:?}  share {:.3}",
                name, stats.hits, stats.pages, stats.score_weighted_scaled
            );
        }
    }

    if let Some(share) = top_share {
        println!("\nTop documents:");
        for name in top_documents_by_share(&result.stats, share) {
            println!("  {}", name);
        }
    }

    if !result.structured_results.is_empty() {
        println!("\nStructured results: {}", result.structured_results.len());
        for entry in &result.structured_results {
            println!("  {} {:?}", entry.relative_path, entry.fields);
        }
    }
}

fn cmd_embed(config: &Config, collection: &str) -> Result<()> {
    let db = open_database(config)?;
    let collection_id = require_collection(&db, collection)?;
    let model = &config.embedding.model;
    let embedder = FastEmbedProvider::new(model).map_err(SearchError::from)?;

    let mut total = 0;
    loop {
        let chunks = db.chunks_missing_embeddings(collection_id, model, config.embedding.batch_size)?;
        if chunks.is_empty() {
            break;
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed_batch(&texts).map_err(SearchError::from)?;
        let rows: Vec<(ChunkId, Vec<f32>)> = chunks.iter().map(|c| c.id).zip(vectors).collect();
        total += db.store_embeddings(model, &rows)?;
        tracing::debug!("Embedded {} chunks so far", total);
    }

    println!("✓ Embedded {} chunks with {}", total, model);
    Ok(())
}

fn cmd_templates(config: &Config, action: TemplateAction) -> Result<()> {
    let db = open_database(config)?;

    match action {
        TemplateAction::Load { file, organisation } => {
            let path = match file {
                Some(path) => path,
                None => expand_path(&config.templates.config_path)?,
            };
            let loader = TemplateLoader::from_path(&path)?;
            let report = loader.load_into(&db, organisation)?;

            println!(
                "✓ Loaded {} templates into '{}'",
                report.template_ids.len(),
                loader.template_set().name
            );
            println!("  Grammar id: {}", report.grammar_id);
            println!("  Deactivated: {}", report.deactivated);
        }
        TemplateAction::Show { id } => match db.get_template(TemplateId(id))? {
            Some(template) => {
                let json = serde_json::to_string_pretty(&template).map_err(|e| SieveError::Json {
                    source: e,
                    context: "Failed to serialize template".to_string(),
                })?;
                println!("{}", json);
            }
            None => println!("Template {} not found", id),
        },
    }

    Ok(())
}

fn cmd_status(config: &Config) -> Result<()> {
    let db = open_database(config)?;
    let stats = db.stats()?;

    println!("Database: {}", expand_path(&config.storage.database_path)?.display());
    println!("  Collections: {}", stats.collection_count);
    println!("  Documents:   {}", stats.document_count);
    println!("  Chunks:      {}", stats.chunk_count);
    println!("  Embeddings:  {}", stats.embedding_count);
    println!("  Templates:   {}", stats.template_count);
    println!("  Queries:     {}", stats.query_count);
    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = load_config(config_path, None)?;
            let value = serde_json::to_value(&config).map_err(|e| SieveError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;

            let shown = match section {
                Some(section) => value
                    .get(&section)
                    .cloned()
                    .ok_or_else(|| SieveError::Config(format!("Unknown section: {}", section)))?,
                None => value,
            };
            let json = serde_json::to_string_pretty(&shown).map_err(|e| SieveError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!("Config file not found, using defaults. Run 'docsieve config init' to create one.");
        let mut config = Config::default();
        config.apply_env_overrides();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        return Ok(config);
    }

    if let Some(profile) = profile {
        Config::load_with_profile(&path, &profile)
    } else {
        Config::load(&path)
    }
}

fn read_options(path: &Path) -> Result<SearchOptions> {
    let raw = std::fs::read_to_string(path).map_err(|e| SieveError::Io {
        source: e,
        context: format!("Failed to read options file: {:?}", path),
    })?;
    serde_json::from_str(&raw).map_err(|e| SieveError::Json {
        source: e,
        context: format!("Invalid search options in {:?}", path),
    })
}

fn open_database(config: &Config) -> Result<Database> {
    let path = expand_path(&config.storage.database_path)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| SieveError::Io {
            source: e,
            context: format!("Failed to create data directory: {:?}", parent),
        })?;
    }
    Database::new(&path, config.storage.pool_size)
}

fn require_collection(db: &Database, name: &str) -> Result<CollectionId> {
    db.collection_by_name(name)?
        .ok_or_else(|| SieveError::Config(format!("Unknown collection: {}", name)))
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| SieveError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| SieveError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}
