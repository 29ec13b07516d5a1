use thiserror::Error;

/// Crate-wide error type. Strategy-level failures are absorbed by the
/// orchestrator; only validation and unrecoverable orchestration errors
/// surface to API callers.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("discovery probe rejected: {0}")]
    Discovery(String),

    #[error("embedding request failed: {0}")]
    Embedding(String),

    #[error("summary request failed: {0}")]
    Summary(String),

    #[error("crawl cancelled")]
    Cancelled,

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    PointStore(#[from] qdrant_client::QdrantError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True when the error is the cooperative cancellation signal rather
    /// than a real failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
