//! Embedding client and model router.
//!
//! Two dense embedding services sit behind the same wire shape
//! (`POST /embed {inputs, model}` returning 768-dim vectors). Chunks carry a
//! model hint and the router keeps output vectors positionally aligned with
//! the input chunk list no matter which batching strategy runs.

use crate::chunking::{Chunk, ModelHint};
use crate::config::{
    CrawlConfig, EMBEDDING_BATCH_SIZE, EMBEDDING_DIMENSION, EMBEDDING_RETRIES,
    EMBEDDING_TIMEOUT_SECS,
};
use crate::error::{Error, Result};
use serde::Deserialize;
use serde_json::json;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Client for the two dense embedding endpoints.
pub struct EmbeddingClient {
    client: reqwest::Client,
    text_url: String,
    code_url: String,
    text_model: String,
    code_model: String,
    retries: u32,
    pub batch_size: usize,
    pub dimension: usize,
}

// The services answer either a bare array of vectors or a wrapped object.
#[derive(Deserialize)]
#[serde(untagged)]
enum EmbedResponse {
    Plain(Vec<Vec<f32>>),
    Wrapped { embeddings: Vec<Vec<f32>> },
}

impl EmbeddingClient {
    pub fn new(config: &CrawlConfig) -> Result<Self> {
        Self::with_endpoints(
            config.text_model_url(),
            config.code_model_url(),
            config.text_model_name.clone(),
            config.code_model_name.clone(),
        )
    }

    pub fn with_endpoints(
        text_url: String,
        code_url: String,
        text_model: String,
        code_model: String,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(EMBEDDING_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            text_url,
            code_url,
            text_model,
            code_model,
            retries: EMBEDDING_RETRIES,
            batch_size: EMBEDDING_BATCH_SIZE,
            dimension: EMBEDDING_DIMENSION,
        })
    }

    fn endpoint(&self, model: ModelHint) -> (&str, &str) {
        match model {
            ModelHint::Text => (&self.text_url, &self.text_model),
            ModelHint::Code => (&self.code_url, &self.code_model),
        }
    }

    /// Embed a full list, batching internally. Fails if any batch fails
    /// after retries; callers wanting degradation use [`embed_single_batch`]
    /// per batch instead.
    ///
    /// [`embed_single_batch`]: EmbeddingClient::embed_single_batch
    pub async fn embed_batch(&self, texts: &[String], model: ModelHint) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let embeddings = self.embed_single_batch(batch, model).await?;
            all_embeddings.extend(embeddings);
        }
        Ok(all_embeddings)
    }

    /// One HTTP round for at most `batch_size` inputs, with retry/backoff.
    pub async fn embed_single_batch(
        &self,
        texts: &[String],
        model: ModelHint,
    ) -> Result<Vec<Vec<f32>>> {
        let (base_url, model_name) = self.endpoint(model);

        let mut last_error = Error::Embedding("no attempts made".to_string());
        for attempt in 1..=self.retries {
            match self.request_embeddings(base_url, model_name, texts).await {
                Ok(embeddings) => {
                    if embeddings.len() != texts.len() {
                        return Err(Error::Embedding(format!(
                            "service returned {} vectors for {} inputs",
                            embeddings.len(),
                            texts.len()
                        )));
                    }
                    return Ok(embeddings);
                }
                Err(exc) => {
                    if attempt < self.retries {
                        let delay = (1u64 << (attempt - 1)).min(5);
                        warn!(
                            "Embedding request failed (attempt {}/{}), retrying in {}s: {}",
                            attempt, self.retries, delay, exc
                        );
                        tokio::time::sleep(Duration::from_secs(delay)).await;
                    }
                    last_error = exc;
                }
            }
        }

        Err(last_error)
    }

    async fn request_embeddings(
        &self,
        base_url: &str,
        model_name: &str,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(format!("{}/embed", base_url))
            .json(&json!({ "inputs": texts, "model": model_name }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Embedding(format!("{} returned {}", base_url, status)));
        }

        match response.json::<EmbedResponse>().await? {
            EmbedResponse::Plain(embeddings) => Ok(embeddings),
            EmbedResponse::Wrapped { embeddings } => Ok(embeddings),
        }
    }

    pub async fn check_health(&self, model: ModelHint) -> bool {
        let (base_url, _) = self.endpoint(model);
        match self.client.get(format!("{}/health", base_url)).send().await {
            Ok(response) => response.status().is_success(),
            Err(exc) => {
                warn!("Embedding health check failed for {}: {}", base_url, exc);
                false
            }
        }
    }
}

/// Routes chunks to the two models and keeps output order aligned.
pub struct EmbeddingRouter {
    client: EmbeddingClient,
    parallel_enabled: bool,
    metrics_enabled: bool,
}

impl EmbeddingRouter {
    pub fn new(client: EmbeddingClient, config: &CrawlConfig) -> Self {
        // Parallel rounds keep one in-flight batch per model, so anything
        // below two concurrent requests forces the sequential strategy
        let parallel_enabled =
            config.enable_parallel_embedding && config.max_embedding_concurrency >= 2;
        Self {
            client,
            parallel_enabled,
            metrics_enabled: config.embedding_metrics_enabled,
        }
    }

    pub fn client(&self) -> &EmbeddingClient {
        &self.client
    }

    /// Embed every chunk, returning vectors positionally aligned with the
    /// input. Batch failures degrade to zero vectors of the model dimension
    /// rather than failing the call.
    pub async fn embed_chunks(&self, chunks: &[Chunk]) -> Vec<Vec<f32>> {
        if chunks.is_empty() {
            return Vec::new();
        }

        let mut text_queue: VecDeque<(usize, String)> = VecDeque::new();
        let mut code_queue: VecDeque<(usize, String)> = VecDeque::new();
        for (index, chunk) in chunks.iter().enumerate() {
            match chunk.model_hint {
                ModelHint::Text => text_queue.push_back((index, chunk.text.clone())),
                ModelHint::Code => code_queue.push_back((index, chunk.text.clone())),
            }
        }

        let mut vectors = vec![vec![0.0; self.client.dimension]; chunks.len()];
        let started = Instant::now();
        let text_total = text_queue.len();
        let code_total = code_queue.len();

        if text_queue.is_empty() || code_queue.is_empty() {
            // Only one model in use: direct batched submission.
            let (queue, model) = if text_queue.is_empty() {
                (code_queue, ModelHint::Code)
            } else {
                (text_queue, ModelHint::Text)
            };
            self.drain_queue(queue, model, &mut vectors).await;
        } else if self.parallel_enabled {
            self.unified_parallel_batching(text_queue, code_queue, &mut vectors)
                .await;
        } else {
            self.drain_queue(text_queue, ModelHint::Text, &mut vectors).await;
            self.drain_queue(code_queue, ModelHint::Code, &mut vectors).await;
        }

        if self.metrics_enabled {
            let elapsed = started.elapsed().as_millis();
            let per_second = if elapsed > 0 {
                chunks.len() as f64 * 1000.0 / elapsed as f64
            } else {
                0.0
            };
            info!(
                "Embedding complete: {} chunks ({} text-embed, {} code-embed) in {}ms ({:.1}/s)",
                chunks.len(),
                text_total,
                code_total,
                elapsed,
                per_second
            );
        }

        vectors
    }

    /// Advance both per-model queues in lockstep rounds: one batch per model
    /// submitted concurrently, spliced back by original position.
    async fn unified_parallel_batching(
        &self,
        mut text_queue: VecDeque<(usize, String)>,
        mut code_queue: VecDeque<(usize, String)>,
        vectors: &mut [Vec<f32>],
    ) {
        let batch_size = self.client.batch_size;

        while !text_queue.is_empty() || !code_queue.is_empty() {
            let text_batch = pop_batch(&mut text_queue, batch_size);
            let code_batch = pop_batch(&mut code_queue, batch_size);

            let text_future = self.submit_batch(&text_batch, ModelHint::Text);
            let code_future = self.submit_batch(&code_batch, ModelHint::Code);
            let (text_result, code_result) = tokio::join!(text_future, code_future);

            self.splice(&text_batch, text_result, ModelHint::Text, vectors);
            self.splice(&code_batch, code_result, ModelHint::Code, vectors);
        }
    }

    async fn drain_queue(
        &self,
        mut queue: VecDeque<(usize, String)>,
        model: ModelHint,
        vectors: &mut [Vec<f32>],
    ) {
        let batch_size = self.client.batch_size;
        while !queue.is_empty() {
            let batch = pop_batch(&mut queue, batch_size);
            let result = self.submit_batch(&batch, model).await;
            self.splice(&batch, result, model, vectors);
        }
    }

    async fn submit_batch(
        &self,
        batch: &[(usize, String)],
        model: ModelHint,
    ) -> Option<Result<Vec<Vec<f32>>>> {
        if batch.is_empty() {
            return None;
        }
        let texts: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
        Some(self.client.embed_single_batch(&texts, model).await)
    }

    fn splice(
        &self,
        batch: &[(usize, String)],
        result: Option<Result<Vec<Vec<f32>>>>,
        model: ModelHint,
        vectors: &mut [Vec<f32>],
    ) {
        match result {
            Some(Ok(embeddings)) => {
                for ((index, _), embedding) in batch.iter().zip(embeddings) {
                    vectors[*index] = embedding;
                }
            }
            Some(Err(exc)) => {
                // Affected positions keep their zero vectors.
                warn!(
                    "Embedding batch of {} failed for {}: {}",
                    batch.len(),
                    model.as_str(),
                    exc
                );
            }
            None => {}
        }
    }
}

fn pop_batch(queue: &mut VecDeque<(usize, String)>, batch_size: usize) -> Vec<(usize, String)> {
    let take = queue.len().min(batch_size);
    queue.drain(..take).collect()
}
