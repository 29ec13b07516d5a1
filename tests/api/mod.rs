use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use crawldex::api;
use crawldex::config::{CrawlConfig, ProcessingMode};
use crawldex::error::{Error, Result};
use crawldex::fetcher::{CacheMode, FetchResult, Fetcher};
use crawldex::orchestrator::CrawlOrchestrator;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct MockFetcher {
    pages: HashMap<String, String>,
    delay: Option<Duration>,
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch_http(&self, url: &str) -> Result<FetchResult> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.pages.get(url.trim_end_matches('/')) {
            Some(html) => Ok(FetchResult {
                final_url: url.trim_end_matches('/').to_string(),
                html: html.clone(),
                status_code: 200,
                metadata: Map::new(),
            }),
            None => Err(Error::Fetch(format!("{} returned 404", url))),
        }
    }

    async fn fetch_browser(
        &self,
        url: &str,
        _wait_selector: Option<&str>,
        _cache_mode: CacheMode,
    ) -> Result<FetchResult> {
        self.fetch_http(url).await
    }
}

fn test_app(delay: Option<Duration>) -> Router {
    let pages: HashMap<String, String> = [(
        "https://example.com/a".to_string(),
        "<html><head><title>A</title></head><body><p>Hello. World.</p></body></html>".to_string(),
    )]
    .into_iter()
    .collect();

    let config = CrawlConfig {
        processing_mode: ProcessingMode::Sequential,
        postgres_connection_string: "postgresql://postgres@127.0.0.1:1/claude_context".to_string(),
        qdrant_url: "http://127.0.0.1:1".to_string(),
        ..Default::default()
    };
    let fetcher = Arc::new(MockFetcher { pages, delay });
    let orchestrator = Arc::new(CrawlOrchestrator::new(config, fetcher).unwrap());
    api::routes(orchestrator)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_and_root() {
    let app = test_app(None);

    let health = app.clone().oneshot(get_request("/health")).await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(body_json(health).await["status"], "ok");

    let root = app.oneshot(get_request("/")).await.unwrap();
    assert_eq!(root.status(), StatusCode::OK);
    assert_eq!(body_json(root).await["name"], "crawldex");
}

#[tokio::test]
async fn test_crawl_requires_urls() {
    let app = test_app(None);
    let response = app
        .oneshot(json_request("POST", "/crawl", json!({ "urls": [] })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_crawl_rejects_non_http_urls() {
    let app = test_app(None);
    let response = app
        .oneshot(json_request(
            "POST",
            "/crawl",
            json!({ "urls": ["file:///etc/passwd"] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_ids_return_404() {
    let app = test_app(None);

    let progress = app
        .clone()
        .oneshot(get_request("/progress/nope"))
        .await
        .unwrap();
    assert_eq!(progress.status(), StatusCode::NOT_FOUND);

    let result = app.clone().oneshot(get_request("/result/nope")).await.unwrap();
    assert_eq!(result.status(), StatusCode::NOT_FOUND);

    let cancel = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/cancel/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(cancel.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_crawl_lifecycle_over_http() {
    let app = test_app(None);

    let started = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/crawl",
            json!({
                "urls": ["https://example.com/a"],
                "mode": "single",
                "auto_discovery": false,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(started.status(), StatusCode::OK);
    let started = body_json(started).await;
    assert_eq!(started["status"], "running");
    let progress_id = started["progress_id"].as_str().unwrap().to_string();

    // Poll until the job reaches a terminal state
    let mut last = json!(null);
    for _ in 0..200 {
        let response = app
            .clone()
            .oneshot(get_request(&format!("/progress/{}", progress_id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        last = body_json(response).await;
        if last["status"] != "running" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(last["status"], "completed", "final progress: {}", last);
    assert_eq!(last["progress"], 100);

    let result = app
        .oneshot(get_request(&format!("/result/{}", progress_id)))
        .await
        .unwrap();
    assert_eq!(result.status(), StatusCode::OK);
    let result = body_json(result).await;
    assert_eq!(result["total_pages"], 1);
    assert_eq!(result["pages"][0]["title"], "A");
}

#[tokio::test]
async fn test_result_conflicts_while_running() {
    let app = test_app(Some(Duration::from_millis(500)));

    let started = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/crawl",
            json!({
                "urls": ["https://example.com/a"],
                "auto_discovery": false,
            }),
        ))
        .await
        .unwrap();
    let progress_id = body_json(started).await["progress_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .oneshot(get_request(&format!("/result/{}", progress_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_cancel_endpoint() {
    let app = test_app(Some(Duration::from_millis(500)));

    let started = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/crawl",
            json!({
                "urls": ["https://example.com/a"],
                "auto_discovery": false,
            }),
        ))
        .await
        .unwrap();
    let progress_id = body_json(started).await["progress_id"]
        .as_str()
        .unwrap()
        .to_string();

    let cancelled = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(&format!("/cancel/{}", progress_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(cancelled.status(), StatusCode::OK);
    assert_eq!(body_json(cancelled).await["status"], "cancelled");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = test_app(None);
    let response = app.oneshot(get_request("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("crawldex_pages_crawled_total"));
    assert!(text.contains("crawldex_jobs_submitted_total"));
}
