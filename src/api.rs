//! HTTP surface over the orchestrator.

use crate::error::Error;
use crate::orchestrator::{CrawlMode, CrawlOrchestrator, CrawlRequestContext};
use crate::progress::JobStatus;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Deserialize)]
pub struct CrawlRequest {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub dataset: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    pub urls: Vec<String>,
    #[serde(default = "default_mode")]
    pub mode: CrawlMode,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    #[serde(default = "default_true")]
    pub same_domain_only: bool,
    #[serde(default)]
    pub include_links: bool,
    #[serde(default = "default_true")]
    pub auto_discovery: bool,
    #[serde(default)]
    pub max_concurrent: Option<usize>,
    #[serde(default)]
    pub knowledge_type: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

fn default_mode() -> CrawlMode {
    CrawlMode::Single
}

fn default_max_depth() -> usize {
    1
}

fn default_max_pages() -> usize {
    20
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct CrawlStartResponse {
    pub progress_id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct CrawlProgressResponse {
    pub progress_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub log: String,
    pub current_url: Option<String>,
    pub current_phase: String,
    pub phase_detail: Option<String>,
    pub total_pages: Option<usize>,
    pub processed_pages: usize,
    pub chunks_total: usize,
    pub chunks_processed: usize,
    pub summaries_generated: usize,
    pub embeddings_generated: usize,
    pub chunks_stored: usize,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Serialize)]
pub struct CrawledPagePayload {
    pub url: String,
    pub source_url: Option<String>,
    pub title: Option<String>,
    pub markdown_content: String,
    pub html_content: String,
    pub word_count: usize,
    pub char_count: usize,
    pub discovered_links: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CrawlResultResponse {
    pub project: Option<String>,
    pub dataset: Option<String>,
    pub mode: Option<String>,
    pub total_pages: usize,
    pub pages: Vec<CrawledPagePayload>,
}

#[derive(Debug, Deserialize)]
pub struct SearchChunksRequest {
    pub query: String,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub dataset: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub filter_code: Option<bool>,
    #[serde(default)]
    pub filter_text: Option<bool>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    10
}

#[derive(Debug, Serialize)]
pub struct SearchChunksResponse {
    pub query: String,
    pub results: Vec<crate::storage::ChunkRecord>,
    pub total: usize,
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<CrawlOrchestrator>,
}

/// API Routes
pub fn routes(orchestrator: Arc<CrawlOrchestrator>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/crawl", post(crawl))
        .route("/progress/:id", get(get_progress))
        .route("/result/:id", get(get_result))
        .route("/cancel/:id", post(cancel))
        .route("/search", post(search_chunks))
        .route("/chunk/:id", get(get_chunk))
        .route("/scopes", get(list_scopes))
        .with_state(AppState { orchestrator })
}

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "crawldex",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Crawl-and-index pipeline with vector-searchable storage"
    }))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.orchestrator.metrics.render()
}

async fn crawl(
    State(state): State<AppState>,
    Json(request): Json<CrawlRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    let ctx = CrawlRequestContext {
        urls: request.urls,
        mode: request.mode,
        project: request.project,
        dataset: request.dataset,
        scope: request.scope,
        max_depth: request.max_depth,
        max_pages: request.max_pages,
        same_domain_only: request.same_domain_only,
        include_links: request.include_links,
        auto_discovery: request.auto_discovery,
        max_concurrent: request.max_concurrent,
        knowledge_type: request.knowledge_type,
        tags: request.tags,
    };

    match state.orchestrator.clone().orchestrate_crawl(ctx) {
        Ok(progress_id) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "progress_id": progress_id,
                "status": "running",
            })),
        ),
        Err(Error::InvalidInput(message)) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": message })),
        ),
        Err(exc) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": exc.to_string() })),
        ),
    }
}

async fn get_progress(
    State(state): State<AppState>,
    Path(progress_id): Path<String>,
) -> Result<Json<CrawlProgressResponse>, (StatusCode, Json<serde_json::Value>)> {
    let progress = state.orchestrator.get_progress(&progress_id).ok_or((
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "Unknown progress id" })),
    ))?;

    Ok(Json(CrawlProgressResponse {
        progress_id,
        status: progress.status,
        progress: progress.progress,
        log: progress.log,
        current_url: progress.current_url,
        current_phase: progress.current_phase,
        phase_detail: progress.phase_detail,
        total_pages: progress.total_pages,
        processed_pages: progress.processed_pages,
        chunks_total: progress.chunks_total,
        chunks_processed: progress.chunks_processed,
        summaries_generated: progress.summaries_generated,
        embeddings_generated: progress.embeddings_generated,
        chunks_stored: progress.chunks_stored,
        started_at: progress.started_at,
        finished_at: progress.finished_at,
    }))
}

async fn get_result(
    State(state): State<AppState>,
    Path(progress_id): Path<String>,
) -> Result<Json<CrawlResultResponse>, (StatusCode, Json<serde_json::Value>)> {
    let progress = state.orchestrator.get_progress(&progress_id).ok_or((
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "Unknown progress id" })),
    ))?;

    if progress.status != JobStatus::Completed {
        return Err((
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "error": "Crawl not completed" })),
        ));
    }

    let pages: Vec<CrawledPagePayload> = progress
        .documents
        .iter()
        .map(|page| CrawledPagePayload {
            url: page.url.clone(),
            source_url: page.source_url.clone(),
            title: page.title.clone(),
            markdown_content: page.markdown_content.clone(),
            html_content: page.html_content.clone(),
            word_count: page.word_count,
            char_count: page.char_count,
            discovered_links: page.discovered_links.clone(),
        })
        .collect();

    Ok(Json(CrawlResultResponse {
        project: progress.project,
        dataset: progress.dataset,
        mode: progress.requested_mode,
        total_pages: pages.len(),
        pages,
    }))
}

async fn cancel(
    State(state): State<AppState>,
    Path(progress_id): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    if state.orchestrator.cancel(&progress_id) {
        (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "cancelled" })),
        )
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Unknown progress id" })),
        )
    }
}

async fn search_chunks(
    State(state): State<AppState>,
    Json(request): Json<SearchChunksRequest>,
) -> Result<Json<SearchChunksResponse>, (StatusCode, Json<serde_json::Value>)> {
    let started = Instant::now();

    // filter_code=true keeps code chunks; filter_text=true keeps text chunks
    let filter_is_code = request.filter_code.or(request.filter_text.map(|keep| !keep));

    let results = state
        .orchestrator
        .search(
            &request.query,
            request.project.as_deref(),
            request.dataset.as_deref(),
            request.scope.as_deref(),
            filter_is_code,
            request.limit,
        )
        .await
        .map_err(|exc| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": exc.to_string() })),
            )
        })?;

    state
        .orchestrator
        .metrics
        .record_search(started.elapsed().as_secs_f64() * 1000.0);

    Ok(Json(SearchChunksResponse {
        query: request.query,
        total: results.len(),
        results,
    }))
}

async fn get_chunk(
    State(state): State<AppState>,
    Path(chunk_id): Path<String>,
) -> Result<Json<crate::storage::ChunkRecord>, (StatusCode, Json<serde_json::Value>)> {
    let chunk = state
        .orchestrator
        .postgres_store()
        .get_chunk(&chunk_id)
        .await
        .map_err(|exc| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": exc.to_string() })),
            )
        })?;

    match chunk {
        Some(chunk) => Ok(Json(chunk)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Chunk not found" })),
        )),
    }
}

async fn list_scopes(
    State(state): State<AppState>,
) -> Result<Json<Vec<crate::storage::ScopeStats>>, (StatusCode, Json<serde_json::Value>)> {
    state
        .orchestrator
        .postgres_store()
        .collection_stats()
        .await
        .map(Json)
        .map_err(|exc| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": exc.to_string() })),
            )
        })
}
