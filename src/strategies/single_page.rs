//! Single page crawling strategy.
//!
//! Attempts lightweight HTTP fetches first and escalates to browser
//! rendering when needed (documentation frameworks, JavaScript-heavy pages,
//! or suspiciously short responses). Produces the uniform [`PageResult`]
//! consumed by the rest of the pipeline.

use crate::error::{Error, Result};
use crate::fetcher::{CacheMode, FetchResult, Fetcher};
use crate::html::{extract_title, html_to_markdown, is_documentation_site};
use crate::progress::CancelFlag;
use crate::urls::{
    generate_unique_source_id, is_binary_file, iter_links_from_markdown, normalize_url,
    transform_github_url,
};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// A fetched page converted to markdown, immutable once built.
#[derive(Debug, Clone)]
pub struct PageResult {
    pub url: String,
    pub source_url: Option<String>,
    pub title: Option<String>,
    pub html_content: String,
    pub markdown_content: String,
    pub word_count: usize,
    pub char_count: usize,
    pub discovered_links: Vec<String>,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Default)]
pub struct SinglePageOptions {
    pub source_url: Option<String>,
    pub include_links: bool,
    pub prefer_browser: bool,
}

const ATTEMPTS: u32 = 3;
const CACHE_MODES: [CacheMode; 3] = [CacheMode::Enabled, CacheMode::Bypass, CacheMode::Bypass];
const MIN_HTML_BYTES: usize = 50;

/// Fetch a single URL and convert it into markdown, retrying with
/// exponential backoff and escalating to the browser on weak results.
pub async fn crawl_single_page(
    fetcher: &dyn Fetcher,
    url: &str,
    options: &SinglePageOptions,
    cancel: &CancelFlag,
) -> Result<PageResult> {
    let effective_url = transform_github_url(url);
    let doc_site = is_documentation_site(Some(&effective_url), None);
    let mut use_browser = options.prefer_browser || doc_site;

    for attempt in 0..ATTEMPTS {
        cancel.check()?;

        let cache_mode = CACHE_MODES[attempt.min(CACHE_MODES.len() as u32 - 1) as usize];

        let fetch_result =
            match fetch_page(fetcher, &effective_url, use_browser, doc_site, cache_mode).await {
                Ok(result) => result,
                Err(exc) => {
                    warn!("Single page fetch failed for {}: {}", effective_url, exc);
                    use_browser = true;
                    tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                    continue;
                }
            };

        if fetch_result.html.len() < MIN_HTML_BYTES && !use_browser {
            debug!("Escalating to browser for {} due to short HTML", effective_url);
            use_browser = true;
            tokio::time::sleep(Duration::from_secs(1)).await;
            continue;
        }

        return Ok(build_result(fetch_result, options, doc_site));
    }

    Err(Error::Fetch(format!(
        "failed to crawl {} after {} attempts",
        effective_url, ATTEMPTS
    )))
}

async fn fetch_page(
    fetcher: &dyn Fetcher,
    url: &str,
    use_browser: bool,
    is_doc_site: bool,
    cache_mode: CacheMode,
) -> Result<FetchResult> {
    if !use_browser {
        return fetcher.fetch_http(url).await;
    }

    // Doc layouts render content into article/main containers
    let wait_selector = if is_doc_site { "article, main, .markdown" } else { "main" };
    fetcher.fetch_browser(url, Some(wait_selector), cache_mode).await
}

fn build_result(
    fetch_result: FetchResult,
    options: &SinglePageOptions,
    prune_navigation: bool,
) -> PageResult {
    let html = fetch_result.html;
    let title = if html.is_empty() { None } else { extract_title(&html) };
    let markdown = if html.is_empty() {
        String::new()
    } else {
        html_to_markdown(&html, prune_navigation)
    };

    let mut discovered_links = Vec::new();
    if options.include_links && !markdown.is_empty() {
        for link in iter_links_from_markdown(&markdown) {
            if !is_binary_file(&link) {
                discovered_links.push(normalize_url(&link));
            }
        }
    }

    let word_count = markdown.split_whitespace().count();
    let char_count = markdown.chars().count();

    let mut metadata = fetch_result.metadata;
    metadata.insert(
        "source_id".to_string(),
        Value::String(generate_unique_source_id(&fetch_result.final_url)),
    );

    PageResult {
        url: fetch_result.final_url,
        source_url: options.source_url.clone(),
        title,
        html_content: html,
        markdown_content: markdown,
        word_count,
        char_count,
        discovered_links,
        metadata,
    }
}
