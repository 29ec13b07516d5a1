//! Hybrid batch-stream topology.
//!
//! A producer task crawls the URL list in batches while the consumer runs
//! the tail stages (chunk → summarize → embed → store) for each group of
//! pages as soon as it fills. The channel between them is bounded at
//! `hybrid_max_memory_pages`, which is the memory backpressure for the
//! whole pipeline. A failing stage degrades that group only.

use crate::error::Result;
use crate::orchestrator::{CrawlOrchestrator, CrawlRequestContext, JobEntry};
use crate::strategies::{crawl_batch_with_progress, PageResult};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

impl CrawlOrchestrator {
    /// Interleaved crawl and processing over a known URL list.
    pub(crate) async fn run_hybrid(
        &self,
        entry: &Arc<JobEntry>,
        ctx: &CrawlRequestContext,
        crawl_urls: &[String],
    ) -> Result<()> {
        let crawl_batch = self.config.hybrid_crawl_batch;
        let process_batch = self.config.hybrid_process_batch;
        let (tx, mut rx) = mpsc::channel::<PageResult>(self.config.hybrid_max_memory_pages);

        info!(
            "Hybrid pipeline: {} URLs, crawl batches of {}, process groups of {}",
            crawl_urls.len(),
            crawl_batch,
            process_batch
        );

        // The producer only needs the shared fetcher, the job entry, and the
        // crawl parameters; it runs until the URL list is exhausted or the
        // consumer goes away.
        let producer = {
            let fetcher = Arc::clone(&self.fetcher);
            let callback = self.crawl_progress_callback(entry);
            let entry = Arc::clone(entry);
            let include_links = ctx.include_links;
            let max_concurrency = ctx.max_concurrent.unwrap_or(10);
            let urls = crawl_urls.to_vec();
            let tx = tx.clone();

            tokio::spawn(async move {
                for batch in urls.chunks(crawl_batch) {
                    if entry.cancel.is_cancelled() {
                        break;
                    }

                    let pages = match crawl_batch_with_progress(
                        Arc::clone(&fetcher),
                        batch,
                        include_links,
                        max_concurrency,
                        Some(callback.clone()),
                        &entry.cancel,
                    )
                    .await
                    {
                        Ok(pages) => pages,
                        Err(exc) => {
                            if exc.is_cancelled() {
                                break;
                            }
                            warn!("Hybrid crawl batch failed, skipping: {}", exc);
                            continue;
                        }
                    };

                    for page in pages {
                        // Bounded channel: blocks while too many unprocessed
                        // pages are resident
                        if tx.send(page).await.is_err() {
                            return;
                        }
                    }
                }
            })
        };
        drop(tx);

        let mut group: Vec<PageResult> = Vec::with_capacity(process_batch);
        let mut total_pages = 0usize;

        while let Some(page) = rx.recv().await {
            entry.cancel.check().inspect_err(|_| producer.abort())?;

            total_pages += 1;
            entry.update(|state| state.documents.push(page.clone()));
            group.push(page);

            if group.len() >= process_batch {
                self.process_group(entry, ctx, &mut group).await?;
            }
        }

        if !group.is_empty() {
            self.process_group(entry, ctx, &mut group).await?;
        }

        // Surface producer panics rather than silently completing
        if let Err(join_error) = producer.await {
            if join_error.is_panic() {
                warn!("Hybrid producer panicked: {}", join_error);
            }
        }

        entry.cancel.check()?;
        self.metrics.record_pages(total_pages as u64);
        info!("Hybrid pipeline complete: {} pages processed", total_pages);
        Ok(())
    }

    async fn process_group(
        &self,
        entry: &Arc<JobEntry>,
        ctx: &CrawlRequestContext,
        group: &mut Vec<PageResult>,
    ) -> Result<()> {
        let documents = std::mem::take(group);
        self.process_documents(entry, ctx, &documents).await
    }
}
