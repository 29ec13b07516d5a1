//! Postgres/pgvector storage for crawled chunks.
//!
//! One physical table per collection, sharing the column set used for code
//! chunks so web and code content stay queryable together. Web rows reuse
//! the line columns for character offsets and mark `source_type = 'web'`.

use crate::config::{CrawlConfig, STORE_BATCH_SIZE};
use crate::error::Result;
use crate::storage::{validate_collection_name, vector_literal, StoredChunk};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::info;
use uuid::Uuid;

const SCHEMA: &str = "claude_context";

/// Search/read projection of a stored chunk.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChunkRecord {
    pub id: String,
    pub chunk_text: String,
    pub summary: String,
    pub is_code: bool,
    pub language: String,
    pub relative_path: String,
    pub chunk_index: usize,
    pub similarity_score: f64,
    pub model_used: String,
    pub project_id: String,
    pub dataset_id: String,
    pub scope: String,
}

/// Per-collection statistics for the scopes listing.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ScopeStats {
    pub scope: String,
    pub collection_name: String,
    pub chunk_count: i64,
    pub code_chunks: i64,
    pub text_chunks: i64,
}

pub struct PostgresVectorStore {
    connection_string: String,
    max_connections: u32,
    batch_size: usize,
    pool: OnceCell<PgPool>,
}

impl PostgresVectorStore {
    pub fn new(config: &CrawlConfig) -> Self {
        Self {
            connection_string: config.postgres_connection_string.clone(),
            max_connections: 10,
            batch_size: STORE_BATCH_SIZE,
            pool: OnceCell::new(),
        }
    }

    /// Connection pool, created once on first use.
    pub async fn pool(&self) -> Result<&PgPool> {
        self.pool
            .get_or_try_init(|| async {
                let pool = PgPoolOptions::new()
                    .min_connections(1)
                    .max_connections(self.max_connections)
                    .acquire_timeout(Duration::from_secs(10))
                    .connect(&self.connection_string)
                    .await?;
                info!(
                    "PostgresVectorStore initialized with pool size {}",
                    self.max_connections
                );
                Ok(pool)
            })
            .await
    }

    pub async fn close(&self) {
        if let Some(pool) = self.pool.get() {
            pool.close().await;
        }
    }

    /// Create the per-collection chunk table and its indexes.
    pub async fn create_chunks_collection(&self, collection: &str, dimension: usize) -> Result<()> {
        validate_collection_name(collection)?;
        let pool = self.pool().await?;
        let table = format!("{}.{}", SCHEMA, collection);

        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", SCHEMA))
            .execute(pool)
            .await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                vector vector({dimension}),
                content TEXT,
                relative_path TEXT,
                start_line INTEGER,
                end_line INTEGER,
                file_extension TEXT,
                project_id UUID,
                dataset_id UUID,
                source_type TEXT,
                repo TEXT,
                branch TEXT,
                sha TEXT,
                lang TEXT,
                symbol JSONB,
                metadata JSONB DEFAULT '{{}}'::jsonb,
                created_at TIMESTAMPTZ DEFAULT NOW()
            )"
        ))
        .execute(pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {collection}_vector_idx
             ON {table} USING ivfflat (vector vector_cosine_ops)
             WITH (lists = 100)"
        ))
        .execute(pool)
        .await?;

        for (suffix, column) in [
            ("project_idx", "project_id"),
            ("dataset_idx", "dataset_id"),
            ("source_type_idx", "source_type"),
        ] {
            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS {collection}_{suffix} ON {table}({column})"
            ))
            .execute(pool)
            .await?;
        }

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {collection}_metadata_idx ON {table} USING GIN (metadata)"
        ))
        .execute(pool)
        .await?;

        info!("Created collection {} ({}d)", collection, dimension);
        Ok(())
    }

    /// Upsert chunks in batches of `batch_size`, one transaction per batch.
    pub async fn insert_chunks(&self, collection: &str, chunks: &[StoredChunk]) -> Result<usize> {
        validate_collection_name(collection)?;
        let pool = self.pool().await?;
        let table = format!("{}.{}", SCHEMA, collection);
        let mut inserted = 0usize;

        let statement = format!(
            "INSERT INTO {table}
                (id, vector, content, relative_path, start_line, end_line, file_extension,
                 project_id, dataset_id, source_type, repo, branch, sha, lang, symbol, metadata)
             VALUES ($1, $2::vector, $3, $4, $5, $6, NULL,
                     $7, $8, 'web', NULL, NULL, NULL, $9, NULL, $10::jsonb)
             ON CONFLICT (id) DO UPDATE SET
               vector = EXCLUDED.vector,
               content = EXCLUDED.content,
               metadata = EXCLUDED.metadata"
        );

        for batch in chunks.chunks(self.batch_size) {
            let mut tx = pool.begin().await?;
            for chunk in batch {
                let metadata = json!({
                    "summary": chunk.summary,
                    "is_code": chunk.is_code,
                    "chunk_index": chunk.chunk_index,
                    "model_used": chunk.model_used,
                    "scope": chunk.scope,
                    "confidence": chunk.metadata.get("confidence"),
                });
                sqlx::query(&statement)
                    .bind(chunk.id.to_string())
                    .bind(vector_literal(&chunk.vector))
                    .bind(&chunk.chunk_text)
                    .bind(&chunk.relative_path)
                    .bind(chunk.start_char as i32)
                    .bind(chunk.end_char as i32)
                    .bind(chunk.project_id)
                    .bind(chunk.dataset_id)
                    .bind(&chunk.language)
                    .bind(metadata)
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;

            inserted += batch.len();
            info!(
                "Inserted {}/{} chunks into {}",
                inserted,
                chunks.len(),
                collection
            );
        }

        Ok(inserted)
    }

    /// Cosine similarity search over one collection, optionally filtered to
    /// code or text chunks.
    pub async fn search_chunks(
        &self,
        collection: &str,
        query_vector: &[f32],
        limit: usize,
        filter_is_code: Option<bool>,
    ) -> Result<Vec<ChunkRecord>> {
        validate_collection_name(collection)?;
        let pool = self.pool().await?;
        let table = format!("{}.{}", SCHEMA, collection);

        let filter_clause = match filter_is_code {
            Some(_) => "WHERE (metadata->>'is_code')::boolean = $3",
            None => "",
        };

        let statement = format!(
            "SELECT id, content, relative_path, lang, project_id, dataset_id, metadata,
                    1 - (vector <=> $1::vector) AS similarity_score
             FROM {table}
             {filter_clause}
             ORDER BY vector <=> $1::vector
             LIMIT $2"
        );

        let mut query = sqlx::query(&statement)
            .bind(vector_literal(query_vector))
            .bind(limit as i64);
        if let Some(is_code) = filter_is_code {
            query = query.bind(is_code);
        }

        let rows = query.fetch_all(pool).await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    /// Look a chunk up by id across every collection table in the schema.
    pub async fn get_chunk(&self, chunk_id: &str) -> Result<Option<ChunkRecord>> {
        let pool = self.pool().await?;

        for collection in self.list_collection_tables().await? {
            let table = format!("{}.{}", SCHEMA, collection);
            let statement = format!(
                "SELECT id, content, relative_path, lang, project_id, dataset_id, metadata,
                        0.0::float8 AS similarity_score
                 FROM {table} WHERE id = $1"
            );
            if let Some(row) = sqlx::query(&statement)
                .bind(chunk_id)
                .fetch_optional(pool)
                .await?
            {
                return Ok(Some(row_to_record(&row)));
            }
        }

        Ok(None)
    }

    /// Per-collection chunk statistics for the scopes listing.
    pub async fn collection_stats(&self) -> Result<Vec<ScopeStats>> {
        let pool = self.pool().await?;
        let mut stats = Vec::new();

        for collection in self.list_collection_tables().await? {
            let table = format!("{}.{}", SCHEMA, collection);
            let statement = format!(
                "SELECT COUNT(*) AS total,
                        COUNT(*) FILTER (WHERE (metadata->>'is_code')::boolean) AS code_chunks,
                        COALESCE(MAX(metadata->>'scope'), 'global') AS scope
                 FROM {table}"
            );
            let row = sqlx::query(&statement).fetch_one(pool).await?;
            let total: i64 = row.try_get("total")?;
            let code_chunks: i64 = row.try_get("code_chunks")?;
            stats.push(ScopeStats {
                scope: row.try_get("scope")?,
                collection_name: collection,
                chunk_count: total,
                code_chunks,
                text_chunks: total - code_chunks,
            });
        }

        Ok(stats)
    }

    /// Collection tables, excluding the canonical metadata tables that share
    /// the schema.
    async fn list_collection_tables(&self) -> Result<Vec<String>> {
        let pool = self.pool().await?;
        let rows = sqlx::query(
            "SELECT table_name FROM information_schema.tables
             WHERE table_schema = $1
               AND (table_name LIKE 'project\\_%' OR table_name = 'global_knowledge')",
        )
        .bind(SCHEMA)
        .fetch_all(pool)
        .await?;

        Ok(rows
            .iter()
            .filter_map(|row| row.try_get::<String, _>("table_name").ok())
            .collect())
    }
}

fn row_to_record(row: &sqlx::postgres::PgRow) -> ChunkRecord {
    let metadata: serde_json::Value = row.try_get("metadata").unwrap_or(serde_json::Value::Null);
    ChunkRecord {
        id: row.try_get("id").unwrap_or_default(),
        chunk_text: row.try_get("content").unwrap_or_default(),
        summary: metadata
            .get("summary")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        is_code: metadata
            .get("is_code")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        language: row.try_get("lang").unwrap_or_default(),
        relative_path: row.try_get("relative_path").unwrap_or_default(),
        chunk_index: metadata
            .get("chunk_index")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize,
        similarity_score: row.try_get("similarity_score").unwrap_or(0.0),
        model_used: metadata
            .get("model_used")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        project_id: row
            .try_get::<Uuid, _>("project_id")
            .map(|id| id.to_string())
            .unwrap_or_default(),
        dataset_id: row
            .try_get::<Uuid, _>("dataset_id")
            .map(|id| id.to_string())
            .unwrap_or_default(),
        scope: metadata
            .get("scope")
            .and_then(|v| v.as_str())
            .unwrap_or("global")
            .to_string(),
    }
}
