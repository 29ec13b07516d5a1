//! Qdrant point storage with named vectors.
//!
//! Each collection carries a dense channel ("vector", cosine) and a sparse
//! channel ("sparse", IDF modifier) so hybrid retrieval can attach sparse
//! vectors later without a migration. Upserts are idempotent by point id.

use crate::config::{CrawlConfig, STORE_BATCH_SIZE};
use crate::error::Result;
use crate::storage::StoredChunk;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, Modifier, NamedVectors, PointStruct,
    SparseVectorParamsBuilder, SparseVectorsConfigBuilder, UpsertPointsBuilder,
    VectorParamsBuilder, VectorsConfigBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{debug, info};

pub const DENSE_VECTOR_NAME: &str = "vector";
pub const SPARSE_VECTOR_NAME: &str = "sparse";

pub struct QdrantVectorStore {
    url: String,
    api_key: Option<String>,
    batch_size: usize,
    client: OnceCell<Qdrant>,
}

impl QdrantVectorStore {
    pub fn new(config: &CrawlConfig) -> Self {
        Self {
            url: config.qdrant_url.clone(),
            api_key: config.qdrant_api_key.clone(),
            batch_size: STORE_BATCH_SIZE,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&Qdrant> {
        self.client
            .get_or_try_init(|| async {
                let mut builder = Qdrant::from_url(&self.url);
                if let Some(api_key) = &self.api_key {
                    builder = builder.api_key(api_key.clone());
                }
                let client = builder.build()?;
                info!("QdrantVectorStore initialized at {}", self.url);
                Ok(client)
            })
            .await
    }

    /// Create a collection with the named dense + sparse channels. Existing
    /// collections are left untouched.
    pub async fn create_collection(&self, collection: &str, dimension: usize) -> Result<()> {
        let client = self.client().await?;

        if client.collection_exists(collection).await? {
            debug!("Collection {} already exists", collection);
            return Ok(());
        }

        let mut vectors_config = VectorsConfigBuilder::default();
        vectors_config.add_named_vector_params(
            DENSE_VECTOR_NAME,
            VectorParamsBuilder::new(dimension as u64, Distance::Cosine),
        );

        let mut sparse_config = SparseVectorsConfigBuilder::default();
        sparse_config.add_named_vector_params(
            SPARSE_VECTOR_NAME,
            SparseVectorParamsBuilder::default().modifier(Modifier::Idf),
        );

        client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(vectors_config)
                    .sparse_vectors_config(sparse_config),
            )
            .await?;

        info!("Created Qdrant collection {} ({}d)", collection, dimension);
        Ok(())
    }

    /// Upsert chunks as points in batches; payload mirrors the relational
    /// metadata so either store can answer reads alone.
    pub async fn insert_chunks(&self, collection: &str, chunks: &[StoredChunk]) -> Result<usize> {
        let client = self.client().await?;
        let mut inserted = 0usize;

        for batch in chunks.chunks(self.batch_size) {
            let mut points = Vec::with_capacity(batch.len());
            for chunk in batch {
                let payload: Payload = json!({
                    "chunk_text": chunk.chunk_text,
                    "summary": chunk.summary,
                    "is_code": chunk.is_code,
                    "language": chunk.language,
                    "relative_path": chunk.relative_path,
                    "chunk_index": chunk.chunk_index,
                    "start_char": chunk.start_char,
                    "end_char": chunk.end_char,
                    "model_used": chunk.model_used,
                    "project_id": chunk.project_id.to_string(),
                    "dataset_id": chunk.dataset_id.to_string(),
                    "scope": chunk.scope,
                    "metadata": chunk.metadata,
                })
                .try_into()?;

                points.push(PointStruct::new(
                    chunk.id.to_string(),
                    NamedVectors::default().add_vector(DENSE_VECTOR_NAME, chunk.vector.clone()),
                    payload,
                ));
            }

            client
                .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
                .await?;

            inserted += batch.len();
            info!(
                "Inserted {}/{} chunk points into {}",
                inserted,
                chunks.len(),
                collection
            );
        }

        Ok(inserted)
    }
}
