use async_trait::async_trait;
use crawldex::config::{CrawlConfig, ProcessingMode};
use crawldex::error::{Error, Result};
use crawldex::fetcher::{CacheMode, FetchResult, Fetcher};
use crawldex::orchestrator::{CrawlMode, CrawlOrchestrator, CrawlRequestContext};
use crawldex::progress::{JobStatus, ProgressState};
use httpmock::prelude::*;
use serde_json::Map;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

struct MockFetcher {
    pages: HashMap<String, String>,
    delay: Option<Duration>,
}

impl MockFetcher {
    fn new(pages: Vec<(&str, String)>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|(url, html)| (url.to_string(), html))
                .collect(),
            delay: None,
        }
    }

    async fn serve(&self, url: &str) -> Result<FetchResult> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let key = url.trim_end_matches('/');
        match self.pages.get(key).or_else(|| self.pages.get(url)) {
            Some(html) => Ok(FetchResult {
                final_url: key.to_string(),
                html: html.clone(),
                status_code: 200,
                metadata: Map::new(),
            }),
            None => Err(Error::Fetch(format!("{} returned 404", url))),
        }
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch_http(&self, url: &str) -> Result<FetchResult> {
        self.serve(url).await
    }

    async fn fetch_browser(
        &self,
        url: &str,
        _wait_selector: Option<&str>,
        _cache_mode: CacheMode,
    ) -> Result<FetchResult> {
        self.serve(url).await
    }
}

fn simple_page(body: &str) -> String {
    format!("<html><head><title>Test Page</title></head><body><p>{}</p></body></html>", body)
}

fn base_config() -> CrawlConfig {
    CrawlConfig {
        processing_mode: ProcessingMode::Sequential,
        // Point the stores at closed ports so failures are fast
        postgres_connection_string: "postgresql://postgres@127.0.0.1:1/claude_context".to_string(),
        qdrant_url: "http://127.0.0.1:1".to_string(),
        ..Default::default()
    }
}

fn simple_request(urls: Vec<&str>) -> CrawlRequestContext {
    CrawlRequestContext {
        urls: urls.into_iter().map(String::from).collect(),
        auto_discovery: false,
        ..Default::default()
    }
}

async fn wait_for_terminal(orchestrator: &Arc<CrawlOrchestrator>, id: &str) -> ProgressState {
    // Generous bound: jobs pointed at unreachable stores wait out the pool
    // acquire timeouts before finishing
    for _ in 0..2000 {
        let Some(state) = orchestrator.get_progress(id) else {
            panic!("job {} disappeared", id);
        };
        if state.status != JobStatus::Running {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {} never finished", id);
}

#[tokio::test]
async fn test_single_page_job_completes() {
    let fetcher = Arc::new(MockFetcher::new(vec![(
        "https://example.com/a",
        simple_page("Hello. World."),
    )]));
    let orchestrator =
        Arc::new(CrawlOrchestrator::new(base_config(), fetcher).unwrap());

    let id = orchestrator
        .clone()
        .orchestrate_crawl(simple_request(vec!["https://example.com/a"]))
        .unwrap();

    let state = wait_for_terminal(&orchestrator, &id).await;
    assert_eq!(state.status, JobStatus::Completed);
    assert_eq!(state.progress, 100);
    assert_eq!(state.documents.len(), 1);
    assert_eq!(state.documents[0].title.as_deref(), Some("Test Page"));
    assert!(state.documents[0].markdown_content.contains("Hello. World."));
}

#[tokio::test]
async fn test_progress_is_monotonic() {
    let fetcher = Arc::new(MockFetcher::new(vec![
        ("https://example.com/a", simple_page("Alpha page content")),
        ("https://example.com/b", simple_page("Beta page content")),
        ("https://example.com/c", simple_page("Gamma page content")),
    ]));
    let orchestrator =
        Arc::new(CrawlOrchestrator::new(base_config(), fetcher).unwrap());

    let mut ctx = simple_request(vec![
        "https://example.com/a",
        "https://example.com/b",
        "https://example.com/c",
    ]);
    ctx.mode = CrawlMode::Batch;

    let id = orchestrator.clone().orchestrate_crawl(ctx).unwrap();

    let mut samples = Vec::new();
    loop {
        let state = orchestrator.get_progress(&id).expect("job exists");
        samples.push(state.progress);
        if state.status != JobStatus::Running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    for pair in samples.windows(2) {
        assert!(pair[1] >= pair[0], "progress regressed: {:?}", samples);
    }
    assert_eq!(*samples.last().unwrap(), 100);
}

#[tokio::test]
async fn test_submission_validation() {
    let fetcher = Arc::new(MockFetcher::new(vec![]));
    let orchestrator =
        Arc::new(CrawlOrchestrator::new(base_config(), fetcher).unwrap());

    let empty = orchestrator.clone().orchestrate_crawl(simple_request(vec![]));
    assert!(matches!(empty, Err(Error::InvalidInput(_))));

    let bad_scheme = orchestrator.clone().orchestrate_crawl(simple_request(vec!["ftp://example.com/x"]));
    assert!(matches!(bad_scheme, Err(Error::InvalidInput(_))));

    let relative = orchestrator.clone().orchestrate_crawl(simple_request(vec!["not-a-url"]));
    assert!(matches!(relative, Err(Error::InvalidInput(_))));
}

#[tokio::test]
async fn test_unknown_job_lookups() {
    let fetcher = Arc::new(MockFetcher::new(vec![]));
    let orchestrator =
        Arc::new(CrawlOrchestrator::new(base_config(), fetcher).unwrap());

    assert!(orchestrator.get_progress("missing").is_none());
    assert!(!orchestrator.cancel("missing"));
}

#[tokio::test]
async fn test_cancellation_mid_crawl() {
    let mut fetcher = MockFetcher::new(vec![
        ("https://example.com/a", simple_page("Page A")),
        ("https://example.com/b", simple_page("Page B")),
        ("https://example.com/c", simple_page("Page C")),
        ("https://example.com/d", simple_page("Page D")),
    ]);
    fetcher.delay = Some(Duration::from_millis(200));
    let orchestrator =
        Arc::new(CrawlOrchestrator::new(base_config(), Arc::new(fetcher)).unwrap());

    let mut ctx = simple_request(vec![
        "https://example.com/a",
        "https://example.com/b",
        "https://example.com/c",
        "https://example.com/d",
    ]);
    ctx.mode = CrawlMode::Batch;
    ctx.max_concurrent = Some(1);

    let id = orchestrator.clone().orchestrate_crawl(ctx).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(orchestrator.cancel(&id));

    let state = wait_for_terminal(&orchestrator, &id).await;
    assert_eq!(state.status, JobStatus::Cancelled);
}

/// Hybrid mode interleaves crawling and processing per batch but ends in the
/// same terminal state with every page accounted for.
#[tokio::test]
async fn test_hybrid_pipeline_processes_all_pages() {
    let embed_server = MockServer::start_async().await;
    embed_server
        .mock_async(|when, then| {
            when.method(POST).path("/embed");
            then.status(200).json_body(serde_json::json!([[0.1, 0.2]]));
        })
        .await;

    let mut config = base_config();
    config.processing_mode = ProcessingMode::Hybrid;
    config.hybrid_process_batch = 2;
    config.embedding_host = "127.0.0.1".to_string();
    config.text_model_port = embed_server.port();
    config.code_model_port = embed_server.port();

    let fetcher = Arc::new(MockFetcher::new(vec![
        ("https://example.com/a", simple_page("First hybrid page.")),
        ("https://example.com/b", simple_page("Second hybrid page.")),
    ]));
    let orchestrator = Arc::new(CrawlOrchestrator::new(config, fetcher).unwrap());

    let mut ctx = simple_request(vec!["https://example.com/a", "https://example.com/b"]);
    ctx.mode = CrawlMode::Batch;
    ctx.project = Some("demo".to_string());
    ctx.dataset = Some("docs".to_string());

    let id = orchestrator.clone().orchestrate_crawl(ctx).unwrap();
    let state = wait_for_terminal(&orchestrator, &id).await;

    assert_eq!(state.status, JobStatus::Completed);
    assert_eq!(state.documents.len(), 2);
    assert!(state.embeddings_generated >= 1);
}

/// With a project context the tail stages run: chunks are embedded through
/// the mock endpoint and storage failures degrade without failing the job.
#[tokio::test]
async fn test_tail_stages_with_unreachable_stores() {
    let embed_server = MockServer::start_async().await;
    embed_server
        .mock_async(|when, then| {
            when.method(POST).path("/embed");
            then.status(200).json_body(serde_json::json!([[0.1, 0.2, 0.3]]));
        })
        .await;

    let mut config = base_config();
    config.embedding_host = "127.0.0.1".to_string();
    config.text_model_port = embed_server.port();
    config.code_model_port = embed_server.port();

    let fetcher = Arc::new(MockFetcher::new(vec![(
        "https://example.com/doc",
        simple_page("A short documentation paragraph."),
    )]));
    let orchestrator = Arc::new(CrawlOrchestrator::new(config, fetcher).unwrap());

    let mut ctx = simple_request(vec!["https://example.com/doc"]);
    ctx.project = Some("demo".to_string());
    ctx.dataset = Some("docs".to_string());

    let id = orchestrator.clone().orchestrate_crawl(ctx).unwrap();
    let state = wait_for_terminal(&orchestrator, &id).await;

    assert_eq!(state.status, JobStatus::Completed);
    assert!(state.chunks_total >= 1);
    assert!(state.summaries_generated >= 1);
    assert!(state.embeddings_generated >= 1);
    // Both stores were unreachable, so nothing was counted as stored
    assert_eq!(state.chunks_stored, 0);
}
