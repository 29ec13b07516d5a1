//! Batch crawling strategy with bounded concurrency.

use crate::error::Result;
use crate::fetcher::Fetcher;
use crate::progress::CancelFlag;
use crate::strategies::single_page::{crawl_single_page, PageResult, SinglePageOptions};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::warn;

/// Progress observer: `(done, total, current_url_or_message)`.
pub type ProgressCallback = Arc<dyn Fn(usize, usize, &str) + Send + Sync>;

const MAX_BATCH_CONCURRENCY: usize = 50;

/// Crawl a URL list in parallel. Per-URL failures are logged and counted but
/// never fail the batch; the progress callback fires exactly once per URL.
pub async fn crawl_batch_with_progress(
    fetcher: Arc<dyn Fetcher>,
    urls: &[String],
    include_links: bool,
    max_concurrency: usize,
    progress_callback: Option<ProgressCallback>,
    cancel: &CancelFlag,
) -> Result<Vec<PageResult>> {
    let semaphore = Arc::new(Semaphore::new(
        max_concurrency.clamp(1, MAX_BATCH_CONCURRENCY),
    ));
    let total = urls.len();
    let completed = Arc::new(AtomicUsize::new(0));
    let results = Arc::new(Mutex::new(Vec::with_capacity(total)));

    let mut tasks = JoinSet::new();
    for url in urls {
        let fetcher = Arc::clone(&fetcher);
        let semaphore = Arc::clone(&semaphore);
        let completed = Arc::clone(&completed);
        let results = Arc::clone(&results);
        let progress_callback = progress_callback.clone();
        let cancel = cancel.clone();
        let url = url.clone();

        tasks.spawn(async move {
            if cancel.is_cancelled() {
                return;
            }
            let Ok(_permit) = semaphore.acquire().await else {
                return;
            };

            let options = SinglePageOptions {
                include_links,
                ..Default::default()
            };

            match crawl_single_page(fetcher.as_ref(), &url, &options, &cancel).await {
                Ok(page) => {
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    let page_url = page.url.clone();
                    results.lock().await.push(page);
                    if let Some(callback) = &progress_callback {
                        callback.as_ref()(done, total, &page_url);
                    }
                }
                Err(exc) => {
                    if !exc.is_cancelled() {
                        warn!("Batch crawl failed for {}: {}", url, exc);
                    }
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(callback) = &progress_callback {
                        callback.as_ref()(done, total, &url);
                    }
                }
            }
        });
    }

    while tasks.join_next().await.is_some() {}

    cancel.check()?;
    Ok(Arc::try_unwrap(results)
        .map(|mutex| mutex.into_inner())
        .unwrap_or_default())
}
