//! Canonical relational rows for projects, datasets, pages, and chunks.
//!
//! These tables are the source of truth independent of the vector stores:
//! deterministic v5 UUIDs keep page and chunk identities stable across
//! re-ingests, and all writes for one page group happen inside a single
//! transaction.

use crate::chunking::Chunk;
use crate::config::CrawlConfig;
use crate::error::Result;
use crate::storage::vector_literal;
use crate::strategies::PageResult;
use sha2::{Digest, Sha256};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

const SCHEMA: &str = "claude_context";

/// Result of upserting a batch of crawled pages.
#[derive(Debug, Clone)]
pub struct WebPageIngestResult {
    pub project_id: Uuid,
    pub dataset_id: Uuid,
    pub page_ids: HashMap<String, Uuid>,
}

pub struct CanonicalMetadataStore {
    connection_string: String,
    pool: OnceCell<PgPool>,
}

impl CanonicalMetadataStore {
    pub fn new(config: &CrawlConfig) -> Self {
        Self {
            connection_string: config.postgres_connection_string.clone(),
            pool: OnceCell::new(),
        }
    }

    async fn pool(&self) -> Result<&PgPool> {
        self.pool
            .get_or_try_init(|| async {
                let pool = PgPoolOptions::new()
                    .min_connections(1)
                    .max_connections(5)
                    .acquire_timeout(Duration::from_secs(10))
                    .connect(&self.connection_string)
                    .await?;
                ensure_schema(&pool).await?;
                Ok(pool)
            })
            .await
    }

    pub async fn close(&self) {
        if let Some(pool) = self.pool.get() {
            pool.close().await;
        }
    }

    /// Ensure project/dataset rows exist and upsert crawled pages, all in
    /// one transaction. Pages with no markdown are skipped.
    pub async fn upsert_web_pages(
        &self,
        project_name: Option<&str>,
        dataset_name: Option<&str>,
        pages: &[PageResult],
    ) -> Result<WebPageIngestResult> {
        let pool = self.pool().await?;
        let mut tx = pool.begin().await?;

        let project_id = ensure_project(&mut tx, project_name).await?;
        let dataset_id = ensure_dataset(&mut tx, project_id, dataset_name).await?;

        let mut page_ids = HashMap::new();
        for page in pages {
            if page.markdown_content.is_empty() {
                continue;
            }
            let page_id = upsert_web_page(&mut tx, dataset_id, page).await?;
            page_ids.insert(page.url.clone(), page_id);
        }

        tx.commit().await?;

        Ok(WebPageIngestResult {
            project_id,
            dataset_id,
            page_ids,
        })
    }

    /// Upsert chunk rows with embeddings. Entries missing an embedding or an
    /// upstream page id are skipped with a warning.
    pub async fn upsert_chunks(
        &self,
        dataset_id: Uuid,
        page_ids: &HashMap<String, Uuid>,
        chunks: &[Chunk],
        summaries: &[String],
        embeddings: &[Vec<f32>],
    ) -> Result<usize> {
        let pool = self.pool().await?;
        let total = chunks.len().min(embeddings.len());
        let mut written = 0usize;

        let mut tx = pool.begin().await?;
        for index in 0..total {
            let chunk = &chunks[index];
            let embedding = &embeddings[index];
            if embedding.is_empty() {
                continue;
            }

            let Some(web_page_id) = page_ids.get(&chunk.source_path) else {
                warn!(
                    "Skipping chunk {}: source path {} has no canonical page",
                    index, chunk.source_path
                );
                continue;
            };

            let summary = summaries.get(index).map(String::as_str).unwrap_or("");
            let chunk_id = stable_chunk_id(*web_page_id, chunk);
            let metadata = json!({
                "language": chunk.language,
                "model_used": chunk.model_hint.as_str(),
                "is_code": chunk.is_code,
                "confidence": chunk.confidence,
                "start_char": chunk.start_char,
                "end_char": chunk.end_char,
                "source_path": chunk.source_path,
            });

            sqlx::query(&format!(
                "INSERT INTO {SCHEMA}.chunks
                    (id, dataset_id, web_page_id, source_type, chunk_index, text, summary, embedding, metadata)
                 VALUES ($1, $2, $3, 'web', $4, $5, $6, $7::vector, $8::jsonb)
                 ON CONFLICT (id) DO UPDATE SET
                    text = EXCLUDED.text,
                    summary = EXCLUDED.summary,
                    embedding = EXCLUDED.embedding,
                    metadata = EXCLUDED.metadata"
            ))
            .bind(chunk_id)
            .bind(dataset_id)
            .bind(web_page_id)
            .bind(chunk.chunk_index as i32)
            .bind(&chunk.text)
            .bind(summary)
            .bind(vector_literal(embedding))
            .bind(metadata)
            .execute(&mut *tx)
            .await?;

            written += 1;
        }
        tx.commit().await?;

        Ok(written)
    }

    /// Keep the dataset → collection mapping current so listing tools can
    /// find the collection and its vector counts.
    pub async fn upsert_collection_record(
        &self,
        dataset_id: Uuid,
        collection_name: &str,
        dimension: usize,
    ) -> Result<()> {
        let pool = self.pool().await?;
        sqlx::query(&format!(
            "INSERT INTO {SCHEMA}.dataset_collections
                (dataset_id, collection_name, vector_db_type, dimension, is_hybrid, point_count)
             VALUES ($1, $2, 'qdrant', $3, true, 0)
             ON CONFLICT (dataset_id) DO UPDATE SET
                collection_name = EXCLUDED.collection_name,
                dimension = EXCLUDED.dimension,
                updated_at = NOW()"
        ))
        .bind(dataset_id)
        .bind(collection_name)
        .bind(dimension as i32)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn update_collection_point_count(
        &self,
        collection_name: &str,
        point_count: usize,
    ) -> Result<()> {
        let pool = self.pool().await?;
        sqlx::query(&format!(
            "UPDATE {SCHEMA}.dataset_collections
             SET point_count = $1, last_indexed_at = NOW(), updated_at = NOW()
             WHERE collection_name = $2"
        ))
        .bind(point_count as i64)
        .bind(collection_name)
        .execute(pool)
        .await?;
        Ok(())
    }
}

async fn ensure_schema(pool: &PgPool) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", SCHEMA))
        .execute(pool)
        .await?;

    let statements = [
        format!(
            "CREATE TABLE IF NOT EXISTS {SCHEMA}.projects (
                id UUID PRIMARY KEY,
                name TEXT UNIQUE NOT NULL,
                description TEXT DEFAULT '',
                is_active BOOLEAN DEFAULT true,
                is_global BOOLEAN DEFAULT false,
                created_at TIMESTAMPTZ DEFAULT NOW()
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {SCHEMA}.datasets (
                id UUID PRIMARY KEY,
                project_id UUID REFERENCES {SCHEMA}.projects(id),
                name TEXT NOT NULL,
                status TEXT DEFAULT 'active',
                is_global BOOLEAN DEFAULT false,
                created_at TIMESTAMPTZ DEFAULT NOW(),
                UNIQUE(project_id, name)
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {SCHEMA}.web_pages (
                id UUID PRIMARY KEY,
                dataset_id UUID REFERENCES {SCHEMA}.datasets(id),
                url TEXT NOT NULL,
                title TEXT,
                content TEXT,
                status TEXT,
                metadata JSONB DEFAULT '{{}}'::jsonb,
                crawled_at TIMESTAMPTZ,
                updated_at TIMESTAMPTZ,
                UNIQUE(dataset_id, url)
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {SCHEMA}.chunks (
                id UUID PRIMARY KEY,
                dataset_id UUID,
                web_page_id UUID,
                source_type TEXT,
                chunk_index INTEGER,
                text TEXT,
                summary TEXT,
                embedding vector(768),
                metadata JSONB DEFAULT '{{}}'::jsonb
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {SCHEMA}.dataset_collections (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                dataset_id UUID UNIQUE,
                collection_name TEXT,
                vector_db_type TEXT,
                dimension INTEGER,
                is_hybrid BOOLEAN DEFAULT true,
                point_count BIGINT DEFAULT 0,
                last_indexed_at TIMESTAMPTZ,
                updated_at TIMESTAMPTZ DEFAULT NOW()
            )"
        ),
    ];

    for statement in &statements {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

async fn ensure_project(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    name: Option<&str>,
) -> Result<Uuid> {
    let project_name = name.unwrap_or("default");

    let existing = sqlx::query(&format!(
        "SELECT id FROM {SCHEMA}.projects WHERE name = $1"
    ))
    .bind(project_name)
    .fetch_optional(&mut **tx)
    .await?;
    if let Some(row) = existing {
        return Ok(row.try_get("id")?);
    }

    let project_id = Uuid::new_v5(&Uuid::NAMESPACE_DNS, project_name.as_bytes());
    sqlx::query(&format!(
        "INSERT INTO {SCHEMA}.projects (id, name, description, is_active, is_global)
         VALUES ($1, $2, '', true, false)
         ON CONFLICT (name) DO NOTHING"
    ))
    .bind(project_id)
    .bind(project_name)
    .execute(&mut **tx)
    .await?;

    info!("Created project '{}'", project_name);
    Ok(project_id)
}

async fn ensure_dataset(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    project_id: Uuid,
    name: Option<&str>,
) -> Result<Uuid> {
    let dataset_name = name.unwrap_or("default");

    let existing = sqlx::query(&format!(
        "SELECT id FROM {SCHEMA}.datasets WHERE project_id = $1 AND name = $2"
    ))
    .bind(project_id)
    .bind(dataset_name)
    .fetch_optional(&mut **tx)
    .await?;
    if let Some(row) = existing {
        return Ok(row.try_get("id")?);
    }

    let dataset_id = Uuid::new_v5(&Uuid::NAMESPACE_DNS, dataset_name.as_bytes());
    sqlx::query(&format!(
        "INSERT INTO {SCHEMA}.datasets (id, project_id, name, status, is_global)
         VALUES ($1, $2, $3, 'active', false)
         ON CONFLICT (project_id, name) DO NOTHING"
    ))
    .bind(dataset_id)
    .bind(project_id)
    .bind(dataset_name)
    .execute(&mut **tx)
    .await?;

    info!("Created dataset '{}'", dataset_name);
    Ok(dataset_id)
}

async fn upsert_web_page(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    dataset_id: Uuid,
    page: &PageResult,
) -> Result<Uuid> {
    let page_id = canonical_page_id(dataset_id, &page.url);

    let mut metadata = serde_json::Value::Object(page.metadata.clone());
    let extra = json!({
        "source_url": page.source_url,
        "word_count": page.word_count,
        "char_count": page.char_count,
        "domain": Url::parse(&page.url).ok().and_then(|u| u.host_str().map(String::from)),
        "content_hash": sha256_hex(&page.markdown_content),
        "html_content": page.html_content,
    });
    if let (Some(target), Some(source)) = (metadata.as_object_mut(), extra.as_object()) {
        for (key, value) in source {
            target.insert(key.clone(), value.clone());
        }
    }

    sqlx::query(&format!(
        "INSERT INTO {SCHEMA}.web_pages
            (id, dataset_id, url, title, content, status, metadata, crawled_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, 'indexed', $6::jsonb, NOW(), NOW())
         ON CONFLICT (dataset_id, url) DO UPDATE SET
            title = EXCLUDED.title,
            content = EXCLUDED.content,
            status = 'indexed',
            metadata = EXCLUDED.metadata,
            updated_at = NOW()"
    ))
    .bind(page_id)
    .bind(dataset_id)
    .bind(&page.url)
    .bind(&page.title)
    .bind(&page.markdown_content)
    .bind(metadata)
    .execute(&mut **tx)
    .await?;

    Ok(page_id)
}

/// Deterministic page id: v5 over `<dataset_id>:<url>`.
pub fn canonical_page_id(dataset_id: Uuid, url: &str) -> Uuid {
    Uuid::new_v5(
        &Uuid::NAMESPACE_URL,
        format!("{}:{}", dataset_id, url).as_bytes(),
    )
}

/// Deterministic chunk id: v5 over `<page_id>:<chunk_index>:<sha256(text)>`.
pub fn stable_chunk_id(web_page_id: Uuid, chunk: &Chunk) -> Uuid {
    let digest = sha256_hex(&chunk.text);
    let seed = format!("{}:{}:{}", web_page_id, chunk.chunk_index, digest);
    Uuid::new_v5(&Uuid::NAMESPACE_URL, seed.as_bytes())
}

fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
