//! SQLite database management with migrations
//!
//! Holds collections, documents, chunks, embeddings, template sets and the
//! query log.

use super::{
    Chunk, ChunkContext, ChunkId, CollectionId, ContextText, Document, DocumentFilter, DocumentId,
    DocumentStore, OrganisationId, QueryRecord, TemplateId,
};
use crate::error::{Result, SieveError};
use crate::metadata::MetadataValue;
use crate::templates::{LoadReport, QueryTemplate, TemplateSet};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// SQLite bound on host parameters per statement is generous, but id lists
/// coming from a vector search can be large.
const ID_BATCH: usize = 500;

/// Database manager with migration support
pub struct Database {
    pool: DbPool,
}

/// Document to insert or update, keyed by collection and relative path
#[derive(Debug, Clone, Default)]
pub struct NewDocument {
    pub collection_id: CollectionId,
    pub name: String,
    pub path: String,
    pub relative_path: String,
    pub category: Option<String>,
    pub language: Option<String>,
    pub use_in_search: bool,
    pub metadata: Option<MetadataValue>,
}

#[derive(Debug, Clone)]
pub struct NewChunk {
    pub page_number: i64,
    pub text_number: i64,
    pub language: Option<String>,
    pub text: String,
}

/// Persisted embedding together with the scope attributes the vector index
/// filters on
#[derive(Debug, Clone)]
pub struct StoredEmbedding {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub language: Option<String>,
    pub vector: Vec<f32>,
}

impl Database {
    /// Open (or create) the database at `db_path` and apply pending migrations
    pub fn new(db_path: &Path, pool_size: u32) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SieveError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        // Per-connection pragmas; WAL is a property of the file
        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });

        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .map_err(|e| SieveError::Config(format!("Failed to create connection pool: {}", e)))?;

        {
            let conn = pool.get()?;
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                ",
            )?;
        }

        let db = Self { pool };
        db.migrate()?;

        Ok(db)
    }

    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying migration {}", version);
                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.get_conn()?;
        let count = |table: &str| -> Result<usize> {
            let n: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
            Ok(n as usize)
        };

        Ok(DbStats {
            collection_count: count("collections")?,
            document_count: count("documents")?,
            chunk_count: count("chunks")?,
            embedding_count: count("embeddings")?,
            template_count: count("query_templates")?,
            query_count: count("query_log")?,
        })
    }

    /// Create a collection, or return the id of the existing one with that name
    pub fn ensure_collection(&self, name: &str) -> Result<CollectionId> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO collections (name, created_at) VALUES (?1, datetime('now'))
             ON CONFLICT(name) DO NOTHING",
            params![name],
        )?;
        Ok(conn.query_row(
            "SELECT id FROM collections WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?)
    }

    pub fn collection_by_name(&self, name: &str) -> Result<Option<CollectionId>> {
        let conn = self.get_conn()?;
        Ok(conn
            .query_row(
                "SELECT id FROM collections WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Insert a document or update the one at the same relative path
    pub fn upsert_document(&self, doc: &NewDocument) -> Result<DocumentId> {
        let metadata = doc
            .metadata
            .as_ref()
            .map(|m| to_json(m, "document metadata"))
            .transpose()?;

        let conn = self.get_conn()?;
        let id = conn.query_row(
            "INSERT INTO documents
                (collection_id, name, path, relative_path, category, language, use_in_search, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(collection_id, relative_path) DO UPDATE SET
                name = excluded.name,
                path = excluded.path,
                category = excluded.category,
                language = excluded.language,
                use_in_search = excluded.use_in_search,
                metadata = excluded.metadata
             RETURNING id",
            params![
                doc.collection_id,
                doc.name,
                doc.path,
                doc.relative_path,
                doc.category,
                doc.language,
                doc.use_in_search,
                metadata,
            ],
            |row| row.get(0),
        )?;
        Ok(DocumentId(id))
    }

    /// Replace the chunks of a document. Embeddings of removed chunks cascade.
    pub fn replace_chunks(&self, document: DocumentId, chunks: &[NewChunk]) -> Result<Vec<ChunkId>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM chunks WHERE document_id = ?1", params![document.0])?;

        let mut ids = Vec::with_capacity(chunks.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks (document_id, page_number, text_number, language, text, text_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for chunk in chunks {
                let hash = blake3::hash(chunk.text.as_bytes()).to_hex().to_string();
                stmt.execute(params![
                    document.0,
                    chunk.page_number,
                    chunk.text_number,
                    chunk.language,
                    chunk.text,
                    hash,
                ])?;
                ids.push(ChunkId(tx.last_insert_rowid()));
            }
        }
        tx.commit()?;
        Ok(ids)
    }

    /// Chunks of searchable documents in a collection that have no embedding
    /// for `model` yet
    pub fn chunks_missing_embeddings(
        &self,
        collection: CollectionId,
        model: &str,
        limit: usize,
    ) -> Result<Vec<Chunk>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT c.id, c.document_id, c.page_number, c.text_number, c.language, c.text
             FROM chunks c
             JOIN documents d ON d.id = c.document_id
             LEFT JOIN embeddings e ON e.chunk_id = c.id AND e.model = ?2
             WHERE d.collection_id = ?1 AND e.chunk_id IS NULL
             ORDER BY c.id
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![collection, model, limit as i64], chunk_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn store_embeddings(&self, model: &str, embeddings: &[(ChunkId, Vec<f32>)]) -> Result<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO embeddings (chunk_id, vector, model, created_at)
                 VALUES (?1, ?2, ?3, strftime('%s', 'now'))
                 ON CONFLICT(chunk_id) DO UPDATE SET
                    vector = excluded.vector,
                    model = excluded.model,
                    created_at = excluded.created_at",
            )?;
            for (chunk_id, vector) in embeddings {
                stmt.execute(params![chunk_id.0, encode_vector(vector), model])?;
            }
        }
        tx.commit()?;
        Ok(embeddings.len())
    }

    /// Every embedding of `model` in a collection, ready to seed the vector index
    pub fn load_embeddings(&self, collection: CollectionId, model: &str) -> Result<Vec<StoredEmbedding>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT c.id, c.document_id, c.language, e.vector
             FROM embeddings e
             JOIN chunks c ON c.id = e.chunk_id
             JOIN documents d ON d.id = c.document_id
             WHERE d.collection_id = ?1 AND e.model = ?2
             ORDER BY c.id",
        )?;
        let rows = stmt.query_map(params![collection, model], |row| {
            let bytes: Vec<u8> = row.get(3)?;
            Ok(StoredEmbedding {
                chunk_id: ChunkId(row.get(0)?),
                document_id: DocumentId(row.get(1)?),
                language: row.get(2)?,
                vector: decode_vector(&bytes),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Persist a template set in one transaction.
    ///
    /// All templates of the set's grammar are deactivated first; the ones
    /// present in `set` are then upserted and reactivated.
    pub fn apply_template_set(&self, set: &TemplateSet, organisation: OrganisationId) -> Result<LoadReport> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let collection_id: i64 = tx.query_row(
            "INSERT INTO template_collections (name, organisation_id, created_at)
             VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(name, organisation_id) DO UPDATE SET name = excluded.name
             RETURNING id",
            params![set.name, organisation],
            |row| row.get(0),
        )?;

        let grammar_id: i64 = tx.query_row(
            "INSERT INTO template_grammars (template_collection_id, tokens, alphabet)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(template_collection_id) DO UPDATE SET
                tokens = excluded.tokens,
                alphabet = excluded.alphabet
             RETURNING id",
            params![
                collection_id,
                to_json(&set.grammar.tokens, "grammar tokens")?,
                to_json(&set.grammar.alphabet, "grammar alphabet")?,
            ],
            |row| row.get(0),
        )?;

        let deactivated = tx.execute(
            "UPDATE query_templates SET is_active = 0 WHERE grammar_id = ?1 AND is_active = 1",
            params![grammar_id],
        )?;

        let mut template_ids = Vec::with_capacity(set.templates.len());
        for draft in &set.templates {
            let id: i64 = tx.query_row(
                "INSERT INTO query_templates
                    (grammar_id, name, display, is_active, data_connector, data_filter_expressions,
                     structured_response, structured_response_fields, system_prompt)
                 VALUES (?1, ?2, ?3, 1, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(grammar_id, name) DO UPDATE SET
                    display = excluded.display,
                    is_active = 1,
                    data_connector = excluded.data_connector,
                    data_filter_expressions = excluded.data_filter_expressions,
                    structured_response = excluded.structured_response,
                    structured_response_fields = excluded.structured_response_fields,
                    system_prompt = excluded.system_prompt
                 RETURNING id",
                params![
                    grammar_id,
                    draft.name,
                    draft.display,
                    to_json(&draft.data_connector, "data_connector")?,
                    to_json(&draft.data_filter_expressions, "data_filter_expressions")?,
                    draft.structured_response,
                    to_json(&draft.structured_response_fields, "structured_response_fields")?,
                    draft.system_prompt,
                ],
                |row| row.get(0),
            )?;
            template_ids.push(TemplateId(id));
        }

        tx.commit()?;

        Ok(LoadReport {
            template_collection_id: collection_id,
            grammar_id,
            deactivated,
            template_ids,
        })
    }

    /// Stored query record by id
    pub fn get_query_record(&self, id: Uuid) -> Result<Option<QueryRecord>> {
        let conn = self.get_conn()?;
        Ok(conn
            .query_row(
                "SELECT organisation_id, collection_id, query, options, template_ids, stats,
                        detailed_results, structured_results
                 FROM query_log WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok(QueryRecord {
                        organisation_id: row.get(0)?,
                        collection_id: row.get(1)?,
                        query: row.get(2)?,
                        options: json_column(row, 3)?,
                        template_ids: json_column(row, 4)?,
                        stats: json_column(row, 5)?,
                        detailed_results: json_column(row, 6)?,
                        structured_results: json_column(row, 7)?,
                    })
                },
            )
            .optional()?)
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T, what: &str) -> Result<String> {
    serde_json::to_string(value).map_err(|e| SieveError::Json {
        source: e,
        context: format!("Failed to encode {}", what),
    })
}

impl DocumentStore for Database {
    fn list_documents(&self, collection: CollectionId, filter: &DocumentFilter) -> Result<Vec<Document>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, collection_id, name, path, relative_path, category, language,
                    use_in_search, metadata
             FROM documents
             WHERE collection_id = ?1 AND (?2 = 0 OR use_in_search = 1)
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![collection, filter.only_searchable], |row| {
            let metadata: Option<String> = row.get(8)?;
            let metadata = metadata
                .map(|raw| serde_json::from_str::<MetadataValue>(&raw))
                .transpose()
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e)))?;
            Ok(Document {
                id: DocumentId(row.get(0)?),
                collection_id: row.get(1)?,
                name: row.get(2)?,
                path: row.get(3)?,
                relative_path: row.get(4)?,
                category: row.get(5)?,
                language: row.get(6)?,
                use_in_search: row.get(7)?,
                metadata,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn get_template(&self, id: TemplateId) -> Result<Option<QueryTemplate>> {
        let conn = self.get_conn()?;
        let sql = format!("{} WHERE t.id = ?1", TEMPLATE_SELECT);
        Ok(conn
            .query_row(&sql, params![id.0], template_from_row)
            .optional()?)
    }

    fn templates_for_organisation(&self, organisation: OrganisationId) -> Result<Vec<QueryTemplate>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "{} WHERE c.organisation_id = ?1 AND t.is_active = 1 ORDER BY t.id",
            TEMPLATE_SELECT
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![organisation], template_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn get_chunks(&self, ids: &[ChunkId]) -> Result<Vec<Chunk>> {
        let conn = self.get_conn()?;
        let mut chunks = Vec::with_capacity(ids.len());
        for batch in ids.chunks(ID_BATCH) {
            let placeholders = vec!["?"; batch.len()].join(",");
            let mut stmt = conn.prepare(&format!(
                "SELECT id, document_id, page_number, text_number, language, text
                 FROM chunks WHERE id IN ({})",
                placeholders
            ))?;
            let rows = stmt.query_map(params_from_iter(batch.iter().map(|id| id.0)), chunk_from_row)?;
            for row in rows {
                chunks.push(row?);
            }
        }
        Ok(chunks)
    }

    fn chunk_context(&self, chunk: &Chunk, surrounding: usize) -> Result<ChunkContext> {
        if surrounding == 0 {
            return Ok(ChunkContext::default());
        }

        let conn = self.get_conn()?;
        let read = |sql: &str| -> Result<Vec<ContextText>> {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(
                params![
                    chunk.document_id.0,
                    chunk.page_number,
                    chunk.text_number,
                    surrounding as i64
                ],
                |row| {
                    Ok(ContextText {
                        text_number: row.get(0)?,
                        text: row.get(1)?,
                    })
                },
            )?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        };

        let mut left = read(
            "SELECT text_number, text FROM chunks
             WHERE document_id = ?1 AND page_number = ?2 AND text_number < ?3
             ORDER BY text_number DESC LIMIT ?4",
        )?;
        left.reverse();
        let right = read(
            "SELECT text_number, text FROM chunks
             WHERE document_id = ?1 AND page_number = ?2 AND text_number > ?3
             ORDER BY text_number ASC LIMIT ?4",
        )?;

        Ok(ChunkContext { left, right })
    }

    fn record_query(&self, record: &QueryRecord) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO query_log
                (id, organisation_id, collection_id, query, options, template_ids, stats,
                 detailed_results, structured_results, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id.to_string(),
                record.organisation_id,
                record.collection_id,
                record.query,
                to_json(&record.options, "query options")?,
                to_json(&record.template_ids, "template ids")?,
                to_json(&record.stats, "query stats")?,
                to_json(&record.detailed_results, "detailed results")?,
                to_json(&record.structured_results, "structured results")?,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(id)
    }
}

const TEMPLATE_SELECT: &str = "
    SELECT t.id, t.grammar_id, c.organisation_id, t.name, t.display, t.is_active,
           t.data_connector, t.data_filter_expressions, t.structured_response,
           t.structured_response_fields, t.system_prompt
    FROM query_templates t
    JOIN template_grammars g ON g.id = t.grammar_id
    JOIN template_collections c ON c.id = g.template_collection_id";

fn template_from_row(row: &Row<'_>) -> rusqlite::Result<QueryTemplate> {
    Ok(QueryTemplate {
        id: TemplateId(row.get(0)?),
        grammar_id: row.get(1)?,
        organisation_id: row.get(2)?,
        name: row.get(3)?,
        display: row.get(4)?,
        is_active: row.get(5)?,
        data_connector: json_column(row, 6)?,
        data_filter_expressions: json_column(row, 7)?,
        structured_response: row.get(8)?,
        structured_response_fields: json_column(row, 9)?,
        system_prompt: row.get(10)?,
    })
}

fn chunk_from_row(row: &Row<'_>) -> rusqlite::Result<Chunk> {
    Ok(Chunk {
        id: ChunkId(row.get(0)?),
        document_id: DocumentId(row.get(1)?),
        page_number: row.get(2)?,
        text_number: row.get(3)?,
        language: row.get(4)?,
        text: row.get(5)?,
    })
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[derive(Debug)]
pub struct DbStats {
    pub collection_count: usize,
    pub document_count: usize,
    pub chunk_count: usize,
    pub embedding_count: usize,
    pub template_count: usize,
    pub query_count: usize,
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: documents and chunks
    r#"
    CREATE TABLE collections (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL
    );

    CREATE TABLE documents (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        collection_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        path TEXT NOT NULL,
        relative_path TEXT NOT NULL,
        category TEXT,
        language TEXT,
        use_in_search BOOLEAN NOT NULL DEFAULT 1,
        metadata TEXT,  -- JSON metadata
        FOREIGN KEY (collection_id) REFERENCES collections(id) ON DELETE CASCADE,
        UNIQUE (collection_id, relative_path)
    );

    CREATE INDEX idx_documents_collection ON documents(collection_id);
    CREATE INDEX idx_documents_category ON documents(category);

    CREATE TABLE chunks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        document_id INTEGER NOT NULL,
        page_number INTEGER NOT NULL,
        text_number INTEGER NOT NULL,
        language TEXT,
        text TEXT NOT NULL,
        text_hash TEXT NOT NULL,
        FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
    );

    CREATE INDEX idx_chunks_document_page ON chunks(document_id, page_number, text_number);

    CREATE TABLE embeddings (
        chunk_id INTEGER PRIMARY KEY,
        vector BLOB NOT NULL,
        model TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        FOREIGN KEY (chunk_id) REFERENCES chunks(id) ON DELETE CASCADE
    );

    CREATE INDEX idx_embeddings_model ON embeddings(model);
    "#,
    // Migration 2: query templates
    r#"
    CREATE TABLE template_collections (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        organisation_id INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (name, organisation_id)
    );

    CREATE TABLE template_grammars (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        template_collection_id INTEGER NOT NULL UNIQUE,
        tokens TEXT NOT NULL,
        alphabet TEXT NOT NULL,
        FOREIGN KEY (template_collection_id) REFERENCES template_collections(id) ON DELETE CASCADE
    );

    CREATE TABLE query_templates (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        grammar_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        display TEXT,
        is_active BOOLEAN NOT NULL DEFAULT 1,
        data_connector TEXT NOT NULL DEFAULT '{}',
        data_filter_expressions TEXT NOT NULL DEFAULT '{}',
        structured_response BOOLEAN NOT NULL DEFAULT 0,
        structured_response_fields TEXT NOT NULL DEFAULT '[]',
        system_prompt TEXT,
        FOREIGN KEY (grammar_id) REFERENCES template_grammars(id) ON DELETE CASCADE,
        UNIQUE (grammar_id, name)
    );

    CREATE INDEX idx_query_templates_active ON query_templates(grammar_id, is_active);
    "#,
    // Migration 3: query log
    r#"
    CREATE TABLE query_log (
        id TEXT PRIMARY KEY,
        organisation_id INTEGER NOT NULL,
        collection_id INTEGER NOT NULL,
        query TEXT NOT NULL,
        options TEXT NOT NULL,
        template_ids TEXT NOT NULL,
        stats TEXT NOT NULL,
        detailed_results TEXT NOT NULL,
        structured_results TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE INDEX idx_query_log_collection ON query_log(collection_id);
    "#,
];
