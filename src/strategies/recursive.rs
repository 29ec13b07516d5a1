//! Recursive crawling strategy using depth-based parallel batching.
//!
//! The frontier expands breadth-first one depth level at a time. Each level
//! is partitioned into batches; batch fetches stream results back through a
//! channel while the memory-adaptive dispatcher gates how many fetches run
//! at once. Links come from the fetched HTML directly, filtered against the
//! visited set, the binary-extension list, and optionally the seed domains.

use crate::config::CrawlConfig;
use crate::error::Result;
use crate::fetcher::{CacheMode, Fetcher};
use crate::html::{extract_internal_links, extract_title, html_to_markdown};
use crate::metrics::{get_memory_usage_bytes, get_total_memory_bytes};
use crate::progress::CancelFlag;
use crate::strategies::batch::ProgressCallback;
use crate::strategies::single_page::PageResult;
use crate::urls::{host_of, is_binary_file, normalize_url};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

/// Admits new fetches only while process RSS stays below the configured
/// percentage of system memory. This is the sole memory bound for the
/// recursive strategy.
pub struct MemoryAdaptiveDispatcher {
    semaphore: Arc<Semaphore>,
    memory_threshold_percent: f64,
    check_interval: Duration,
    total_memory: u64,
}

impl MemoryAdaptiveDispatcher {
    pub fn new(memory_threshold_percent: f64, check_interval: Duration, max_session_permit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_session_permit.max(1))),
            memory_threshold_percent,
            check_interval,
            total_memory: get_total_memory_bytes(),
        }
    }

    fn over_threshold(&self) -> bool {
        if self.total_memory == 0 {
            return false;
        }
        let used_percent = get_memory_usage_bytes() as f64 * 100.0 / self.total_memory as f64;
        used_percent > self.memory_threshold_percent
    }

    /// Wait until memory pressure clears, then take a concurrency permit.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        while self.over_threshold() {
            debug!(
                "Memory above {:.0}% threshold, delaying dispatch",
                self.memory_threshold_percent
            );
            tokio::time::sleep(self.check_interval).await;
        }
        Arc::clone(&self.semaphore).acquire_owned().await.ok()
    }
}

#[derive(Debug, Clone)]
pub struct RecursiveOptions {
    pub max_depth: usize,
    /// 0 means unlimited
    pub max_pages: usize,
    pub same_domain_only: bool,
    pub include_links: bool,
    pub max_concurrent: Option<usize>,
}

impl Default for RecursiveOptions {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_pages: 50,
            same_domain_only: true,
            include_links: true,
            max_concurrent: None,
        }
    }
}

/// Breadth-first crawl over normalized URLs with a depth limit and page cap.
pub async fn crawl_recursive_with_progress(
    fetcher: Arc<dyn Fetcher>,
    seed_urls: &[String],
    options: &RecursiveOptions,
    config: &CrawlConfig,
    progress_callback: Option<ProgressCallback>,
    cancel: &CancelFlag,
) -> Result<Vec<PageResult>> {
    let batch_size = config.crawl_batch_size.max(1);
    let max_concurrent = options.max_concurrent.unwrap_or(config.crawl_max_concurrent).max(1);

    let dispatcher = Arc::new(MemoryAdaptiveDispatcher::new(
        config.memory_threshold_percent,
        Duration::from_millis(500),
        max_concurrent,
    ));

    let mut visited: HashSet<String> = HashSet::new();
    let mut results: Vec<PageResult> = Vec::new();
    let mut total_processed = 0usize;

    let mut current_urls: HashSet<String> =
        seed_urls.iter().map(|url| normalize_url(url)).collect();
    let mut total_discovered = current_urls.len();
    let seed_domains: HashSet<String> = seed_urls.iter().filter_map(|url| host_of(url)).collect();

    for depth in 0..options.max_depth {
        cancel.check()?;

        let urls_to_crawl: Vec<String> = current_urls
            .iter()
            .filter(|url| !visited.contains(*url))
            .cloned()
            .collect();
        if urls_to_crawl.is_empty() {
            break;
        }
        if options.max_pages > 0 && results.len() >= options.max_pages {
            break;
        }

        if let Some(callback) = &progress_callback {
            callback.as_ref()(
                total_processed,
                total_discovered,
                &format!(
                    "Depth {}/{}: {} URLs to crawl",
                    depth + 1,
                    options.max_depth,
                    urls_to_crawl.len()
                ),
            );
        }

        let mut next_level_urls: HashSet<String> = HashSet::new();
        let mut depth_successful = 0usize;

        for (batch_index, batch) in urls_to_crawl.chunks(batch_size).enumerate() {
            cancel.check()?;
            if options.max_pages > 0 && results.len() >= options.max_pages {
                break;
            }

            if let Some(callback) = &progress_callback {
                callback.as_ref()(
                    total_processed,
                    total_discovered,
                    &format!(
                        "Crawling batch {} ({} URLs) at depth {}",
                        batch_index + 1,
                        batch.len(),
                        depth + 1
                    ),
                );
            }

            let mut stream = stream_batch(Arc::clone(&fetcher), batch, Arc::clone(&dispatcher), cancel);

            while let Some((url, fetch_outcome)) = stream.recv().await {
                cancel.check()?;
                if options.max_pages > 0 && results.len() >= options.max_pages {
                    break;
                }

                let norm_url = normalize_url(&url);
                visited.insert(norm_url);
                total_processed += 1;

                let page_html = match fetch_outcome {
                    Ok(html) => html,
                    Err(exc) => {
                        warn!("Recursive fetch failed for {}: {}", url, exc);
                        continue;
                    }
                };

                let markdown = html_to_markdown(&page_html, false);
                if markdown.is_empty() {
                    continue;
                }

                let mut metadata = Map::new();
                metadata.insert("depth".to_string(), Value::from(depth));
                metadata.insert("batch_idx".to_string(), Value::from(batch_index));

                let mut page = PageResult {
                    url: url.clone(),
                    source_url: None,
                    title: extract_title(&page_html),
                    markdown_content: markdown,
                    word_count: 0,
                    char_count: 0,
                    discovered_links: Vec::new(),
                    metadata,
                    html_content: page_html,
                };
                page.word_count = page.markdown_content.split_whitespace().count();
                page.char_count = page.markdown_content.chars().count();

                // Expand the frontier from the page's own links
                if options.include_links && depth < options.max_depth - 1 {
                    for link in extract_internal_links(&page.html_content, &page.url) {
                        let next_url = normalize_url(&link);

                        if visited.contains(&next_url) || is_binary_file(&next_url) {
                            continue;
                        }
                        if options.same_domain_only {
                            match host_of(&next_url) {
                                Some(domain) if seed_domains.contains(&domain) => {}
                                _ => continue,
                            }
                        }
                        if next_level_urls.insert(next_url.clone()) {
                            total_discovered += 1;
                            page.discovered_links.push(next_url);
                        }
                    }
                }

                results.push(page);
                depth_successful += 1;
            }
        }

        if let Some(callback) = &progress_callback {
            callback.as_ref()(
                total_processed,
                total_discovered,
                &format!(
                    "Depth {} complete: {} pages crawled, {} URLs for next depth",
                    depth + 1,
                    depth_successful,
                    next_level_urls.len()
                ),
            );
        }

        current_urls = next_level_urls;
    }

    info!(
        "Recursive crawl complete: {} pages across {} depth levels",
        results.len(),
        options.max_depth
    );
    if let Some(callback) = &progress_callback {
        callback.as_ref()(
            total_processed,
            total_discovered,
            &format!("Recursive crawl complete: {} total pages", results.len()),
        );
    }

    Ok(results)
}

/// Fan a batch out through the dispatcher; results stream back as they land.
fn stream_batch(
    fetcher: Arc<dyn Fetcher>,
    batch: &[String],
    dispatcher: Arc<MemoryAdaptiveDispatcher>,
    cancel: &CancelFlag,
) -> mpsc::Receiver<(String, Result<String>)> {
    let (tx, rx) = mpsc::channel(batch.len().max(1));

    for url in batch {
        let fetcher = Arc::clone(&fetcher);
        let dispatcher = Arc::clone(&dispatcher);
        let cancel = cancel.clone();
        let tx = tx.clone();
        let url = url.clone();

        tokio::spawn(async move {
            let Some(_permit) = dispatcher.acquire().await else {
                return;
            };
            if cancel.is_cancelled() {
                return;
            }

            let outcome = fetcher
                .fetch_browser(&url, None, CacheMode::Bypass)
                .await
                .map(|fetched| fetched.html);
            // Receiver may be gone after cancellation or page cap
            let _ = tx.send((url, outcome)).await;
        });
    }

    rx
}
