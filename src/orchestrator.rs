//! High level orchestration for crawl jobs.
//!
//! Owns the job-state map, drives discovery → crawl → chunk → summarize →
//! embed → store, and exposes progress/cancel/result lookups. Stage failures
//! after the crawl degrade to fallbacks instead of failing the job; only
//! validation and crawl-level errors are fatal.

use crate::chunking::{Chunk, SmartChunker};
use crate::config::{CrawlConfig, ProcessingMode, EMBEDDING_DIMENSION};
use crate::discovery::{DiscoveredFile, DiscoveryService};
use crate::embedding::{EmbeddingClient, EmbeddingRouter};
use crate::error::{Error, Result};
use crate::fetcher::{Fetcher, USER_AGENT};
use crate::metrics::MetricsCollector;
use crate::progress::{CancelFlag, JobStatus, ProgressMapper, ProgressState};
use crate::scope::{ScopeLevel, ScopeManager};
use crate::sitemap::{parse_sitemap, parse_sitemap_xml};
use crate::storage::{
    metadata::{canonical_page_id, stable_chunk_id},
    CanonicalMetadataStore, PostgresVectorStore, QdrantVectorStore, StoredChunk,
};
use crate::strategies::{
    crawl_batch_with_progress, crawl_recursive_with_progress, crawl_single_page, PageResult,
    ProgressCallback, RecursiveOptions, SinglePageOptions,
};
use crate::summary::{fallback_summary, ChatSummaryProvider, SummaryProvider};
use crate::urls::{ensure_https, is_llms_variant, is_sitemap};
use dashmap::DashMap;
use futures::future::join_all;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlMode {
    Single,
    Batch,
    Recursive,
    Sitemap,
}

impl CrawlMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlMode::Single => "single",
            CrawlMode::Batch => "batch",
            CrawlMode::Recursive => "recursive",
            CrawlMode::Sitemap => "sitemap",
        }
    }
}

/// Everything a submitted crawl request carries into the pipeline.
#[derive(Debug, Clone)]
pub struct CrawlRequestContext {
    pub urls: Vec<String>,
    pub mode: CrawlMode,
    pub project: Option<String>,
    pub dataset: Option<String>,
    pub scope: Option<String>,
    pub max_depth: usize,
    pub max_pages: usize,
    pub same_domain_only: bool,
    pub include_links: bool,
    pub auto_discovery: bool,
    pub max_concurrent: Option<usize>,
    pub knowledge_type: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl Default for CrawlRequestContext {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            mode: CrawlMode::Single,
            project: None,
            dataset: None,
            scope: None,
            max_depth: 1,
            max_pages: 20,
            same_domain_only: true,
            include_links: false,
            auto_discovery: true,
            max_concurrent: None,
            knowledge_type: None,
            tags: None,
        }
    }
}

/// One job's live record: state snapshot, phase mapper, and cancel flag.
pub struct JobEntry {
    pub state: RwLock<ProgressState>,
    pub mapper: Mutex<ProgressMapper>,
    pub cancel: CancelFlag,
}

impl JobEntry {
    fn new(ctx: &CrawlRequestContext) -> Self {
        let mut state = ProgressState::default();
        state.requested_mode = Some(ctx.mode.as_str().to_string());
        state.project = ctx.project.clone();
        state.dataset = ctx.dataset.clone();
        Self {
            state: RwLock::new(state),
            mapper: Mutex::new(ProgressMapper::new()),
            cancel: CancelFlag::new(),
        }
    }

    pub fn update<F: FnOnce(&mut ProgressState)>(&self, apply: F) {
        if let Ok(mut state) = self.state.write() {
            apply(&mut state);
        }
    }

    /// Map phase-local progress through the monotonic mapper and record it,
    /// skipping writes when the overall percentage did not move.
    pub fn set_progress(&self, phase: &str, phase_progress: u8, log: Option<String>) {
        let overall = match self.mapper.lock() {
            Ok(mut mapper) => mapper.map_progress(phase, phase_progress),
            Err(_) => return,
        };
        self.update(|state| {
            if overall != state.last_progress_percentage || log.is_some() {
                state.progress = overall;
                state.last_progress_percentage = overall;
                state.current_phase = phase.to_string();
                if let Some(log) = log {
                    state.log = log;
                }
            }
        });
    }

    pub fn snapshot(&self) -> ProgressState {
        self.state
            .read()
            .map(|state| state.clone())
            .unwrap_or_default()
    }
}

/// Process-wide orchestrator: shared fetcher, embedding clients, and stores,
/// plus the in-process job map with LRU retention of finished jobs.
pub struct CrawlOrchestrator {
    pub config: CrawlConfig,
    pub(crate) fetcher: Arc<dyn Fetcher>,
    discovery: DiscoveryService,
    pub(crate) embedding: EmbeddingRouter,
    summary: Option<Arc<dyn SummaryProvider>>,
    pub(crate) postgres: PostgresVectorStore,
    pub(crate) qdrant: QdrantVectorStore,
    pub(crate) canonical: CanonicalMetadataStore,
    pub metrics: Arc<MetricsCollector>,
    http: reqwest::Client,
    jobs: DashMap<String, Arc<JobEntry>>,
    finished: Mutex<LruCache<String, ()>>,
}

impl CrawlOrchestrator {
    pub fn new(config: CrawlConfig, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        let embedding_client = EmbeddingClient::new(&config)?;
        let summary: Option<Arc<dyn SummaryProvider>> = match ChatSummaryProvider::new(&config) {
            Ok(provider) => Some(Arc::new(provider)),
            Err(_) => {
                info!("Summary endpoint not configured; using prefix summaries");
                None
            }
        };
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(20))
            .build()?;
        let retention = NonZeroUsize::new(config.completed_job_retention)
            .unwrap_or(NonZeroUsize::new(256).expect("nonzero"));

        Ok(Self {
            embedding: EmbeddingRouter::new(embedding_client, &config),
            summary,
            discovery: DiscoveryService::new()?,
            postgres: PostgresVectorStore::new(&config),
            qdrant: QdrantVectorStore::new(&config),
            canonical: CanonicalMetadataStore::new(&config),
            metrics: Arc::new(MetricsCollector::new()),
            http,
            jobs: DashMap::new(),
            finished: Mutex::new(LruCache::new(retention)),
            config,
            fetcher,
        })
    }

    /// Validate and launch a crawl job, returning its progress handle.
    pub fn orchestrate_crawl(self: Arc<Self>, ctx: CrawlRequestContext) -> Result<String> {
        if ctx.urls.is_empty() {
            return Err(Error::InvalidInput("at least one URL is required".to_string()));
        }
        for url in &ctx.urls {
            let parsed = url::Url::parse(url)
                .map_err(|_| Error::InvalidInput(format!("invalid URL: {}", url)))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(Error::InvalidInput(format!(
                    "unsupported scheme for {}",
                    url
                )));
            }
        }

        let progress_id = Uuid::new_v4().simple().to_string();
        let entry = Arc::new(JobEntry::new(&ctx));
        self.jobs.insert(progress_id.clone(), Arc::clone(&entry));
        self.metrics.record_job();

        let job_id = progress_id.clone();
        tokio::spawn(async move {
            self.run_crawl(job_id, entry, ctx).await;
        });

        Ok(progress_id)
    }

    pub fn get_progress(&self, progress_id: &str) -> Option<ProgressState> {
        self.jobs.get(progress_id).map(|entry| entry.snapshot())
    }

    pub fn postgres_store(&self) -> &PostgresVectorStore {
        &self.postgres
    }

    /// Request cooperative cancellation. Returns false for unknown jobs.
    pub fn cancel(&self, progress_id: &str) -> bool {
        match self.jobs.get(progress_id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    async fn run_crawl(
        self: Arc<Self>,
        progress_id: String,
        entry: Arc<JobEntry>,
        ctx: CrawlRequestContext,
    ) {
        let outcome = self.execute_job(&entry, &ctx).await;

        match outcome {
            Ok(()) => {
                entry.set_progress("completed", 100, Some("Crawl finished".to_string()));
                entry.update(|state| {
                    state.status = JobStatus::Completed;
                    state.progress = 100;
                });
            }
            Err(Error::Cancelled) => {
                info!("Job {} cancelled", progress_id);
                entry.update(|state| {
                    state.status = JobStatus::Cancelled;
                    state.log = "Crawl cancelled".to_string();
                });
            }
            Err(exc) => {
                error!("Job {} failed: {}", progress_id, exc);
                entry.update(|state| {
                    state.status = JobStatus::Failed;
                    state.log = exc.to_string();
                });
            }
        }
        entry.update(|state| state.finished_at = Some(chrono::Utc::now()));

        self.retire_job(&progress_id);
    }

    /// Keep finished jobs queryable up to the retention bound; evicted ids
    /// drop out of the progress map entirely.
    fn retire_job(&self, progress_id: &str) {
        if let Ok(mut finished) = self.finished.lock() {
            if let Some((evicted_id, _)) = finished.push(progress_id.to_string(), ()) {
                if evicted_id != progress_id {
                    self.jobs.remove(&evicted_id);
                }
            }
        }
    }

    async fn execute_job(&self, entry: &Arc<JobEntry>, ctx: &CrawlRequestContext) -> Result<()> {
        entry.set_progress("initializing", 100, Some("Starting crawl".to_string()));

        let urls: Vec<String> = ctx.urls.iter().map(|url| ensure_https(url)).collect();

        let discovered = if ctx.auto_discovery {
            entry.set_progress("discovery", 0, Some("Running discovery".to_string()));
            let found = self.discovery.discover_files(&urls).await;
            entry.set_progress("discovery", 100, Some("Discovery complete".to_string()));
            found
        } else {
            None
        };

        let crawl_urls = self.determine_urls(ctx, urls, discovered).await;
        entry.update(|state| state.total_pages = Some(crawl_urls.len()));
        entry.set_progress("crawling", 0, Some("Starting crawl".to_string()));

        entry.cancel.check()?;

        let has_storage_context = ctx.project.is_some() || ctx.dataset.is_some();
        let hybrid_eligible = has_storage_context
            && self.config.processing_mode == ProcessingMode::Hybrid
            && matches!(ctx.mode, CrawlMode::Batch | CrawlMode::Sitemap)
            && crawl_urls.len() > 1;

        if hybrid_eligible {
            return self.run_hybrid(entry, ctx, &crawl_urls).await;
        }

        let documents = self.execute_crawl(entry, ctx, &crawl_urls).await?;
        self.metrics.record_pages(documents.len() as u64);
        entry.update(|state| state.documents = documents.clone());
        entry.set_progress("crawling", 100, Some("Crawling complete".to_string()));

        if documents.is_empty() || !has_storage_context {
            return Ok(());
        }

        self.process_documents(entry, ctx, &documents).await
    }

    /// Run the tail stages over a document group with per-stage degradation.
    pub(crate) async fn process_documents(
        &self,
        entry: &Arc<JobEntry>,
        ctx: &CrawlRequestContext,
        documents: &[PageResult],
    ) -> Result<()> {
        entry.cancel.check()?;
        let chunks = match self.chunk_documents(entry, documents) {
            Ok(chunks) => chunks,
            Err(exc) => {
                error!("Chunking failed, continuing with no chunks: {}", exc);
                entry.set_progress("chunking", 100, Some(format!("Chunking failed: {}", exc)));
                Vec::new()
            }
        };

        entry.cancel.check()?;
        let summaries = self.summarize_chunks(entry, &chunks).await;

        entry.cancel.check()?;
        let embeddings = self.embed_chunks(entry, &chunks).await;

        entry.cancel.check()?;
        match self
            .store_chunks(entry, ctx, documents, &chunks, &summaries, &embeddings)
            .await
        {
            Ok(stored) => {
                entry.update(|state| state.chunks_stored += stored);
                entry.set_progress("storing", 100, Some(format!("Stored {} chunks", stored)));
                self.metrics.record_chunks_stored(stored as u64);
            }
            Err(exc) => {
                error!("Storage failed: {}", exc);
                entry.set_progress("storing", 100, Some(format!("Storage failed: {}", exc)));
            }
        }

        Ok(())
    }

    async fn determine_urls(
        &self,
        ctx: &CrawlRequestContext,
        base_urls: Vec<String>,
        discovered: Option<DiscoveredFile>,
    ) -> Vec<String> {
        let Some(discovered) = discovered else {
            if ctx.mode == CrawlMode::Sitemap {
                let mut urls = Vec::new();
                for sitemap_url in &base_urls {
                    urls.extend(parse_sitemap(&self.http, sitemap_url).await);
                }
                return if urls.is_empty() { base_urls } else { urls };
            }
            return base_urls;
        };

        if is_llms_variant(&discovered.url) {
            let urls: Vec<String> = discovered
                .content
                .lines()
                .map(str::trim)
                .filter(|line| line.starts_with("http"))
                .map(str::to_string)
                .collect();
            return if urls.is_empty() { base_urls } else { urls };
        }

        if is_sitemap(&discovered.url) {
            let urls = parse_sitemap_xml(&discovered.content);
            return if urls.is_empty() { base_urls } else { urls };
        }

        base_urls
    }

    pub(crate) fn crawl_progress_callback(&self, entry: &Arc<JobEntry>) -> ProgressCallback {
        let entry = Arc::clone(entry);
        Arc::new(move |done, total, current| {
            let phase_progress = if total > 0 {
                ((done * 100) / total).min(100) as u8
            } else {
                100
            };
            entry.update(|state| {
                state.processed_pages = done;
                state.current_url = Some(current.to_string());
            });
            entry.set_progress(
                "crawling",
                phase_progress,
                Some(format!("Crawled {}/{}", done, total)),
            );
        })
    }

    async fn execute_crawl(
        &self,
        entry: &Arc<JobEntry>,
        ctx: &CrawlRequestContext,
        urls: &[String],
    ) -> Result<Vec<PageResult>> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }

        let callback = self.crawl_progress_callback(entry);
        let cancel = entry.cancel.clone();

        if ctx.mode == CrawlMode::Single || urls.len() == 1 {
            let options = SinglePageOptions {
                include_links: ctx.include_links,
                ..Default::default()
            };
            let page = crawl_single_page(self.fetcher.as_ref(), &urls[0], &options, &cancel).await?;
            callback.as_ref()(1, 1, &page.url);
            return Ok(vec![page]);
        }

        if ctx.mode == CrawlMode::Recursive {
            let options = RecursiveOptions {
                max_depth: ctx.max_depth.max(1),
                max_pages: ctx.max_pages,
                same_domain_only: ctx.same_domain_only,
                include_links: ctx.include_links,
                max_concurrent: ctx.max_concurrent,
            };
            return crawl_recursive_with_progress(
                Arc::clone(&self.fetcher),
                urls,
                &options,
                &self.config,
                Some(callback),
                &cancel,
            )
            .await;
        }

        let max_concurrency = ctx.max_concurrent.unwrap_or(10).min(urls.len().max(1));
        let mut results = crawl_batch_with_progress(
            Arc::clone(&self.fetcher),
            urls,
            ctx.include_links,
            max_concurrency,
            Some(callback.clone()),
            &cancel,
        )
        .await?;

        if ctx.mode == CrawlMode::Sitemap {
            return Ok(results);
        }

        // Batch mode optionally expands one level of discovered links
        if ctx.max_depth > 1 && ctx.include_links {
            let seeds: Vec<String> = results.iter().map(|page| page.url.clone()).collect();
            let options = RecursiveOptions {
                max_depth: ctx.max_depth - 1,
                max_pages: ctx.max_pages,
                same_domain_only: ctx.same_domain_only,
                include_links: ctx.include_links,
                max_concurrent: ctx.max_concurrent,
            };
            let nested = crawl_recursive_with_progress(
                Arc::clone(&self.fetcher),
                &seeds,
                &options,
                &self.config,
                Some(callback),
                &cancel,
            )
            .await?;
            results.extend(nested);
        }

        Ok(results)
    }

    pub(crate) fn chunk_documents(
        &self,
        entry: &Arc<JobEntry>,
        documents: &[PageResult],
    ) -> Result<Vec<Chunk>> {
        entry.update(|state| {
            state.chunks_total = documents.len();
            state.chunks_processed = 0;
        });
        entry.set_progress("chunking", 0, Some("Chunking documents".to_string()));

        let chunker = SmartChunker::new(&self.config)?;
        let mut all_chunks = Vec::new();

        for (index, document) in documents.iter().enumerate() {
            let chunks = chunker.chunk_text(&document.markdown_content, &document.url, None);
            all_chunks.extend(chunks);

            let processed = index + 1;
            entry.update(|state| state.chunks_processed = processed);
            let phase_progress = ((processed * 100) / documents.len().max(1)) as u8;
            entry.set_progress(
                "chunking",
                phase_progress,
                Some(format!("Chunked {}/{} documents", processed, documents.len())),
            );
        }

        let info = SmartChunker::routing_info(&all_chunks);
        info!(
            "Chunking complete: {} total chunks ({} text, {} code)",
            info.total_chunks, info.text_chunks, info.code_chunks
        );

        Ok(all_chunks)
    }

    pub(crate) async fn summarize_chunks(
        &self,
        entry: &Arc<JobEntry>,
        chunks: &[Chunk],
    ) -> Vec<String> {
        entry.update(|state| {
            state.chunks_total = chunks.len();
            state.summaries_generated = 0;
        });
        entry.set_progress("summarizing", 0, Some("Generating summaries".to_string()));

        let Some(provider) = &self.summary else {
            let summaries: Vec<String> =
                chunks.iter().map(|chunk| fallback_summary(&chunk.text)).collect();
            entry.update(|state| state.summaries_generated = summaries.len());
            entry.set_progress("summarizing", 100, None);
            return summaries;
        };

        let mut summaries = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(10) {
            if entry.cancel.is_cancelled() {
                // Fill remaining with fallbacks; the caller notices the flag
                summaries.extend(batch.iter().map(|chunk| fallback_summary(&chunk.text)));
                continue;
            }

            let requests = batch.iter().map(|chunk| provider.summarize(&chunk.text));
            for (chunk, outcome) in batch.iter().zip(join_all(requests).await) {
                match outcome {
                    Ok(summary) => summaries.push(summary),
                    Err(exc) => {
                        warn!("Summary failed for chunk, using fallback: {}", exc);
                        summaries.push(fallback_summary(&chunk.text));
                    }
                }
            }

            let generated = summaries.len();
            entry.update(|state| state.summaries_generated = generated);
            let phase_progress = ((generated * 100) / chunks.len().max(1)) as u8;
            entry.set_progress(
                "summarizing",
                phase_progress,
                Some(format!("Summarized {}/{} chunks", generated, chunks.len())),
            );
        }

        info!("Generated {} summaries", summaries.len());
        summaries
    }

    pub(crate) async fn embed_chunks(&self, entry: &Arc<JobEntry>, chunks: &[Chunk]) -> Vec<Vec<f32>> {
        let text_chunks = chunks.iter().filter(|c| !c.is_code).count();
        entry.update(|state| {
            state.embeddings_generated = 0;
            state.phase_detail = Some(format!(
                "{} text / {} code embeddings",
                text_chunks,
                chunks.len() - text_chunks
            ));
        });
        entry.set_progress("embedding", 0, Some("Generating embeddings".to_string()));

        let vectors = self.embedding.embed_chunks(chunks).await;

        entry.update(|state| state.embeddings_generated = vectors.len());
        entry.set_progress(
            "embedding",
            100,
            Some(format!("Embedded {} chunks", vectors.len())),
        );
        vectors
    }

    /// Write one document group to the canonical schema and both vector
    /// stores. Store failures are independent; the returned count reflects
    /// whichever store accepted the most chunks.
    pub(crate) async fn store_chunks(
        &self,
        entry: &Arc<JobEntry>,
        ctx: &CrawlRequestContext,
        documents: &[PageResult],
        chunks: &[Chunk],
        summaries: &[String],
        embeddings: &[Vec<f32>],
    ) -> Result<usize> {
        if chunks.is_empty() {
            entry.set_progress("storing", 100, Some("No chunks to store".to_string()));
            return Ok(0);
        }

        entry.set_progress("storing", 0, Some("Storing chunks".to_string()));

        let scope = ScopeManager::resolve_scope(
            ctx.project.as_deref(),
            ctx.dataset.as_deref(),
            ctx.scope.as_deref().or(Some(self.config.default_scope.as_str())),
        );
        let collection =
            ScopeManager::collection_name(ctx.project.as_deref(), ctx.dataset.as_deref(), scope);
        let project_id = ScopeManager::project_id(ctx.project.as_deref());
        let dataset_id = ScopeManager::dataset_id(ctx.dataset.as_deref());

        info!(
            "Storing {} chunks in scope={}, collection={}",
            chunks.len(),
            scope.as_str(),
            collection
        );

        // Canonical rows first; failure leaves the vector stores unaffected.
        let page_ids = match self
            .canonical
            .upsert_web_pages(ctx.project.as_deref(), ctx.dataset.as_deref(), documents)
            .await
        {
            Ok(result) => {
                let written = self
                    .canonical
                    .upsert_chunks(result.dataset_id, &result.page_ids, chunks, summaries, embeddings)
                    .await
                    .unwrap_or_else(|exc| {
                        error!("Canonical chunk upsert failed: {}", exc);
                        0
                    });
                info!("Canonical store: {} chunk rows", written);
                result.page_ids
            }
            Err(exc) => {
                error!("Canonical page upsert failed: {}", exc);
                Default::default()
            }
        };

        let stored_chunks =
            build_stored_chunks(ctx, scope, project_id, dataset_id, chunks, summaries, embeddings);
        let dimension = stored_chunks
            .first()
            .map(|chunk| chunk.vector.len())
            .unwrap_or(EMBEDDING_DIMENSION);

        let mut postgres_count = 0usize;
        entry.update(|state| state.phase_detail = Some("relational store".to_string()));
        entry.set_progress("storing", 30, Some("Inserting into relational store".to_string()));
        match self.postgres.create_chunks_collection(&collection, dimension).await {
            Ok(()) => match self.postgres.insert_chunks(&collection, &stored_chunks).await {
                Ok(count) => postgres_count = count,
                Err(exc) => error!("Relational store insert failed: {}", exc),
            },
            Err(exc) => error!("Relational store setup failed: {}", exc),
        }

        let mut qdrant_count = 0usize;
        entry.update(|state| state.phase_detail = Some("point store".to_string()));
        entry.set_progress("storing", 60, Some("Inserting into point store".to_string()));
        match self.qdrant.create_collection(&collection, dimension).await {
            Ok(()) => match self.qdrant.insert_chunks(&collection, &stored_chunks).await {
                Ok(count) => qdrant_count = count,
                Err(exc) => error!("Point store insert failed: {}", exc),
            },
            Err(exc) => error!("Point store setup failed: {}", exc),
        }

        if !page_ids.is_empty() {
            if let Err(exc) = self
                .canonical
                .upsert_collection_record(dataset_id, &collection, dimension)
                .await
            {
                warn!("Collection record update failed: {}", exc);
            }
            if qdrant_count > 0 {
                if let Err(exc) = self
                    .canonical
                    .update_collection_point_count(&collection, qdrant_count)
                    .await
                {
                    warn!("Point count sync failed: {}", exc);
                }
            }
        }

        info!(
            "Storage complete: total={}, relational={}, points={}",
            stored_chunks.len(),
            postgres_count,
            qdrant_count
        );

        Ok(postgres_count.max(qdrant_count))
    }

    /// Embed the query with the text model and run similarity search.
    pub async fn search(
        &self,
        query: &str,
        project: Option<&str>,
        dataset: Option<&str>,
        requested_scope: Option<&str>,
        filter_is_code: Option<bool>,
        limit: usize,
    ) -> Result<Vec<crate::storage::ChunkRecord>> {
        let scope = ScopeManager::resolve_scope(
            project,
            dataset,
            requested_scope.or(Some(self.config.default_scope.as_str())),
        );
        let collection = ScopeManager::collection_name(project, dataset, scope);

        let query_vectors = self
            .embedding
            .client()
            .embed_batch(&[query.to_string()], crate::chunking::ModelHint::Text)
            .await?;
        let query_vector = query_vectors
            .first()
            .ok_or_else(|| Error::Embedding("no query embedding returned".to_string()))?;

        self.postgres
            .search_chunks(&collection, query_vector, limit, filter_is_code)
            .await
    }
}

fn build_stored_chunks(
    ctx: &CrawlRequestContext,
    scope: ScopeLevel,
    project_id: Uuid,
    dataset_id: Uuid,
    chunks: &[Chunk],
    summaries: &[String],
    embeddings: &[Vec<f32>],
) -> Vec<StoredChunk> {
    let mut stored = Vec::with_capacity(chunks.len());

    for (index, chunk) in chunks.iter().enumerate() {
        let Some(vector) = embeddings.get(index) else {
            warn!("Skipping chunk {} without embedding", index);
            continue;
        };
        let summary = summaries
            .get(index)
            .cloned()
            .unwrap_or_else(|| fallback_summary(&chunk.text));

        let page_id = canonical_page_id(dataset_id, &chunk.source_path);
        let id = stable_chunk_id(page_id, chunk);

        stored.push(StoredChunk {
            id,
            chunk_text: chunk.text.clone(),
            summary,
            vector: vector.clone(),
            is_code: chunk.is_code,
            language: chunk.language.clone(),
            relative_path: chunk.source_path.clone(),
            chunk_index: chunk.chunk_index,
            start_char: chunk.start_char,
            end_char: chunk.end_char,
            model_used: chunk.model_hint.as_str().to_string(),
            project_id,
            dataset_id,
            scope: scope.as_str().to_string(),
            metadata: json!({
                "confidence": chunk.confidence,
                "knowledge_type": ctx.knowledge_type,
                "tags": ctx.tags,
            }),
        });
    }

    stored
}
