//! Shared fetcher backing the crawl strategies with HTTP and browser fetches.
//!
//! The browser path talks to a headless renderer sidecar over HTTP. When no
//! sidecar is configured the manager degrades to the plain HTTP client so the
//! strategies never have to care which backend actually served the page.

use crate::config::{CrawlConfig, HTTP_KEEPALIVE_CONNECTIONS, HTTP_TIMEOUT_SECS};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

pub const USER_AGENT: &str = "crawldex/0.3 (+https://crawldex.dev; bot)";

/// Cache behaviour requested from the browser renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheMode {
    Enabled,
    Bypass,
}

/// Raw fetch output, uniform across HTTP and browser backends.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub final_url: String,
    pub html: String,
    pub status_code: u16,
    pub metadata: Map<String, Value>,
}

/// Capability consumed by the strategies. Implemented by [`CrawlerManager`]
/// in production and by in-memory fakes in tests.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_http(&self, url: &str) -> Result<FetchResult>;

    async fn fetch_browser(
        &self,
        url: &str,
        wait_selector: Option<&str>,
        cache_mode: CacheMode,
    ) -> Result<FetchResult>;
}

#[derive(Serialize)]
struct RenderRequest<'a> {
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    wait_selector: Option<&'a str>,
    cache_mode: CacheMode,
    page_timeout_ms: u64,
    wait_until: &'a str,
}

#[derive(Deserialize)]
struct RenderResponse {
    html: String,
    final_url: Option<String>,
    status: Option<u16>,
    #[serde(default)]
    timings: Map<String, Value>,
}

/// Coordinates the pooled HTTP client and the browser renderer sidecar.
/// Shared across all jobs; initialization happens once behind a one-shot cell.
pub struct CrawlerManager {
    http_client: OnceCell<reqwest::Client>,
    browser_endpoint: Option<String>,
    page_timeout_ms: u64,
    wait_strategy: String,
}

impl CrawlerManager {
    pub fn new(config: &CrawlConfig) -> Self {
        Self {
            http_client: OnceCell::new(),
            browser_endpoint: config.browser_endpoint.clone(),
            page_timeout_ms: config.crawl_page_timeout_ms,
            wait_strategy: config.crawl_wait_strategy.clone(),
        }
    }

    async fn client(&self) -> Result<&reqwest::Client> {
        self.http_client
            .get_or_try_init(|| async {
                reqwest::Client::builder()
                    .user_agent(USER_AGENT)
                    .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
                    .pool_max_idle_per_host(HTTP_KEEPALIVE_CONNECTIONS)
                    .build()
                    .map_err(Error::from)
            })
            .await
    }
}

#[async_trait]
impl Fetcher for CrawlerManager {
    async fn fetch_http(&self, url: &str) -> Result<FetchResult> {
        let client = self.client().await?;
        let response = client.get(url).send().await?;
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(Error::Fetch(format!("{} returned {}", url, status)));
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let html = response.text().await?;

        let mut metadata = Map::new();
        metadata.insert("from_browser".to_string(), Value::Bool(false));
        if let Some(content_type) = content_type {
            metadata.insert("content_type".to_string(), Value::String(content_type));
        }

        Ok(FetchResult {
            final_url,
            html,
            status_code: status.as_u16(),
            metadata,
        })
    }

    async fn fetch_browser(
        &self,
        url: &str,
        wait_selector: Option<&str>,
        cache_mode: CacheMode,
    ) -> Result<FetchResult> {
        let Some(endpoint) = self.browser_endpoint.as_deref() else {
            warn!("Browser renderer not configured; falling back to HTTP for {}", url);
            return self.fetch_http(url).await;
        };

        let client = self.client().await?;
        let request = RenderRequest {
            url,
            wait_selector,
            cache_mode,
            page_timeout_ms: self.page_timeout_ms,
            wait_until: &self.wait_strategy,
        };

        debug!(url, ?cache_mode, "Dispatching browser fetch");
        let response = match client.post(endpoint).json(&request).send().await {
            Ok(response) => response,
            Err(exc) => {
                warn!("Browser fetch failed ({}); falling back to HTTP for {}", exc, url);
                return self.fetch_http(url).await;
            }
        };

        if !response.status().is_success() {
            warn!(
                "Browser renderer returned {}; falling back to HTTP for {}",
                response.status(),
                url
            );
            return self.fetch_http(url).await;
        }

        let rendered: RenderResponse = response.json().await?;
        let mut metadata = Map::new();
        metadata.insert("from_browser".to_string(), Value::Bool(true));
        metadata.insert("timings".to_string(), Value::Object(rendered.timings));

        Ok(FetchResult {
            final_url: rendered.final_url.unwrap_or_else(|| url.to_string()),
            html: rendered.html,
            status_code: rendered.status.unwrap_or(200),
            metadata,
        })
    }
}
