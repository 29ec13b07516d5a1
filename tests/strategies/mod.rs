use async_trait::async_trait;
use crawldex::config::CrawlConfig;
use crawldex::error::{Error, Result};
use crawldex::fetcher::{CacheMode, FetchResult, Fetcher};
use crawldex::progress::CancelFlag;
use crawldex::strategies::{
    crawl_batch_with_progress, crawl_recursive_with_progress, crawl_single_page, RecursiveOptions,
    SinglePageOptions,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory fetcher serving a fixed site graph.
struct MockFetcher {
    pages: HashMap<String, String>,
    browser_pages: HashMap<String, String>,
    requests: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl MockFetcher {
    fn new(pages: Vec<(&str, String)>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|(url, html)| (url.to_string(), html))
                .collect(),
            browser_pages: HashMap::new(),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    fn requested(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn lookup(&self, map: &HashMap<String, String>, url: &str) -> Option<String> {
        map.get(url)
            .or_else(|| map.get(url.trim_end_matches('/')))
            .cloned()
    }

    async fn serve(&self, map: &HashMap<String, String>, url: &str) -> Result<FetchResult> {
        self.requests.lock().unwrap().push(url.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.lookup(map, url) {
            Some(html) => Ok(FetchResult {
                final_url: url.trim_end_matches('/').to_string(),
                html,
                status_code: 200,
                metadata: Map::<String, Value>::new(),
            }),
            None => Err(Error::Fetch(format!("{} returned 404", url))),
        }
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch_http(&self, url: &str) -> Result<FetchResult> {
        self.serve(&self.pages, url).await
    }

    async fn fetch_browser(
        &self,
        url: &str,
        _wait_selector: Option<&str>,
        _cache_mode: CacheMode,
    ) -> Result<FetchResult> {
        if self.browser_pages.is_empty() {
            self.serve(&self.pages, url).await
        } else {
            self.serve(&self.browser_pages, url).await
        }
    }
}

fn page(body: &str, links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!("<a href=\"{}\">link</a>", href))
        .collect();
    format!("<html><body><p>{}</p>{}</body></html>", body, anchors)
}

fn site() -> MockFetcher {
    MockFetcher::new(vec![
        (
            "https://example.org",
            page(
                "Root page content",
                &["/a", "/b", "/c", "/d", "/image.png", "https://other.com/x"],
            ),
        ),
        ("https://example.org/a", page("Page A content", &["/e"])),
        ("https://example.org/b", page("Page B content", &["/f"])),
        ("https://example.org/c", page("Page C content", &["/g"])),
        ("https://example.org/d", page("Page D content", &["/h"])),
        ("https://example.org/e", page("Page E content", &[])),
    ])
}

/// Depth-2 crawl with a page cap: at most five pages, all on the seed
/// domain, with no binary URL ever fetched.
#[tokio::test]
async fn test_recursive_depth_two_with_page_cap() {
    let fetcher = Arc::new(site());
    let options = RecursiveOptions {
        max_depth: 2,
        max_pages: 5,
        same_domain_only: true,
        include_links: true,
        max_concurrent: Some(4),
    };
    let config = CrawlConfig::default();
    let cancel = CancelFlag::new();

    let results = crawl_recursive_with_progress(
        Arc::clone(&fetcher) as Arc<dyn Fetcher>,
        &["https://example.org/".to_string()],
        &options,
        &config,
        None,
        &cancel,
    )
    .await
    .unwrap();

    assert!(results.len() <= 5, "page cap violated: {}", results.len());
    assert!(!results.is_empty());

    for result in &results {
        assert!(
            result.url.starts_with("https://example.org"),
            "off-domain page: {}",
            result.url
        );
        assert!(!result.markdown_content.is_empty());
    }

    for requested in fetcher.requested() {
        assert!(!requested.ends_with(".png"), "binary URL fetched: {}", requested);
        assert!(!requested.contains("other.com"), "off-domain fetch: {}", requested);
    }
}

/// The seed page records the next-level URLs it contributed.
#[tokio::test]
async fn test_recursive_discovered_links_recorded() {
    let fetcher = Arc::new(site());
    let options = RecursiveOptions {
        max_depth: 2,
        max_pages: 0,
        same_domain_only: true,
        include_links: true,
        max_concurrent: Some(2),
    };
    let results = crawl_recursive_with_progress(
        fetcher as Arc<dyn Fetcher>,
        &["https://example.org/".to_string()],
        &options,
        &CrawlConfig::default(),
        None,
        &CancelFlag::new(),
    )
    .await
    .unwrap();

    let root = results
        .iter()
        .find(|p| p.url == "https://example.org")
        .expect("root page crawled");
    let mut links = root.discovered_links.clone();
    links.sort();
    assert_eq!(
        links,
        vec![
            "https://example.org/a",
            "https://example.org/b",
            "https://example.org/c",
            "https://example.org/d",
        ]
    );
}

/// The progress callback fires exactly once per URL, failures included, and
/// failures never abort the batch.
#[tokio::test]
async fn test_batch_progress_and_failure_isolation() {
    let fetcher = Arc::new(MockFetcher::new(vec![
        ("https://example.org/ok-1", page("First page", &[])),
        ("https://example.org/ok-2", page("Second page", &[])),
    ]));

    let calls: Arc<Mutex<Vec<(usize, usize)>>> = Arc::new(Mutex::new(Vec::new()));
    let calls_ref = Arc::clone(&calls);
    let callback = Arc::new(move |done: usize, total: usize, _current: &str| {
        calls_ref.lock().unwrap().push((done, total));
    });

    let urls = vec![
        "https://example.org/ok-1".to_string(),
        "https://example.org/missing".to_string(),
        "https://example.org/ok-2".to_string(),
    ];

    let results = crawl_batch_with_progress(
        fetcher as Arc<dyn Fetcher>,
        &urls,
        false,
        2,
        Some(callback),
        &CancelFlag::new(),
    )
    .await
    .unwrap();

    assert_eq!(results.len(), 2);

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 3, "one callback per URL");
    let mut dones: Vec<usize> = calls.iter().map(|(done, _)| *done).collect();
    dones.sort();
    assert_eq!(dones, vec![1, 2, 3]);
    assert!(calls.iter().all(|(_, total)| *total == 3));
}

/// GitHub blob URLs are rewritten to raw URLs before fetching.
#[tokio::test]
async fn test_single_page_github_rewrite() {
    let raw_url = "https://raw.githubusercontent.com/owner/repo/main/README.md";
    let fetcher =
        MockFetcher::new(vec![(raw_url, page("Readme body text here for the test", &[]))]);

    let result = crawl_single_page(
        &fetcher,
        "https://github.com/owner/repo/blob/main/README.md",
        &SinglePageOptions::default(),
        &CancelFlag::new(),
    )
    .await
    .unwrap();

    assert!(fetcher.requested().contains(&raw_url.to_string()));
    assert!(result.markdown_content.contains("Readme body"));
    assert!(result.word_count > 0);
}

/// Short HTML from the lightweight path escalates to the browser fetch.
#[tokio::test]
async fn test_single_page_browser_escalation() {
    let url = "https://example.org/app";
    let mut fetcher = MockFetcher::new(vec![(url, "<p>x</p>".to_string())]);
    fetcher.browser_pages.insert(
        url.to_string(),
        page("Rendered application content with plenty of text", &[]),
    );

    let result = crawl_single_page(
        &fetcher,
        url,
        &SinglePageOptions::default(),
        &CancelFlag::new(),
    )
    .await
    .unwrap();

    assert!(result.markdown_content.contains("Rendered application content"));
}

/// Cancellation mid-batch surfaces as a cancelled crawl.
#[tokio::test]
async fn test_batch_cancellation() {
    let mut fetcher = MockFetcher::new(vec![
        ("https://example.org/slow-1", page("Slow page one", &[])),
        ("https://example.org/slow-2", page("Slow page two", &[])),
        ("https://example.org/slow-3", page("Slow page three", &[])),
    ]);
    fetcher.delay = Some(Duration::from_millis(200));
    let cancel = CancelFlag::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let result = crawl_batch_with_progress(
        Arc::new(fetcher) as Arc<dyn Fetcher>,
        &[
            "https://example.org/slow-1".to_string(),
            "https://example.org/slow-2".to_string(),
            "https://example.org/slow-3".to_string(),
        ],
        false,
        1,
        None,
        &cancel,
    )
    .await;

    assert!(matches!(result, Err(Error::Cancelled)));
}
