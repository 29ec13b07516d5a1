//! Persistence: relational vector store, point vector store, and the
//! canonical metadata schema. The two vector stores are written
//! independently; one failing never blocks the other.

pub mod metadata;
pub mod postgres;
pub mod qdrant;

use uuid::Uuid;

pub use metadata::{CanonicalMetadataStore, WebPageIngestResult};
pub use postgres::{ChunkRecord, PostgresVectorStore, ScopeStats};
pub use qdrant::QdrantVectorStore;

/// A chunk with its persisted identity, ready for the stores. The id is
/// deterministic over `(page_id, chunk_index, sha256(text))` so re-ingests
/// upsert instead of duplicating.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub id: Uuid,
    pub chunk_text: String,
    pub summary: String,
    pub vector: Vec<f32>,
    pub is_code: bool,
    pub language: String,
    pub relative_path: String,
    pub chunk_index: usize,
    pub start_char: usize,
    pub end_char: usize,
    pub model_used: String,
    pub project_id: Uuid,
    pub dataset_id: Uuid,
    pub scope: String,
    pub metadata: serde_json::Value,
}

/// pgvector text literal for a dense vector.
pub(crate) fn vector_literal(vector: &[f32]) -> String {
    let mut literal = String::with_capacity(vector.len() * 10 + 2);
    literal.push('[');
    for (i, value) in vector.iter().enumerate() {
        if i > 0 {
            literal.push(',');
        }
        literal.push_str(&value.to_string());
    }
    literal.push(']');
    literal
}

/// Collection names are interpolated into DDL, so they must stay within the
/// sanitized alphabet produced by the scope manager.
pub(crate) fn validate_collection_name(name: &str) -> crate::error::Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(crate::error::Error::InvalidInput(format!(
            "invalid collection name: {}",
            name
        )))
    }
}
