//! Sitemap download and `<loc>` extraction.

use crate::urls::normalize_url;
use tracing::warn;

/// Download a sitemap and return its normalized `<loc>` entries. Failures are
/// logged and yield an empty list so a bad sitemap never aborts a crawl.
pub async fn parse_sitemap(client: &reqwest::Client, sitemap_url: &str) -> Vec<String> {
    let response = match client.get(sitemap_url).send().await {
        Ok(response) => response,
        Err(exc) => {
            warn!("Failed to download sitemap {}: {}", sitemap_url, exc);
            return Vec::new();
        }
    };

    let text = match response.text().await {
        Ok(text) => text,
        Err(exc) => {
            warn!("Failed to read sitemap body {}: {}", sitemap_url, exc);
            return Vec::new();
        }
    };

    parse_sitemap_xml(&text)
}

/// Extract `<loc>` values from sitemap XML. Handles both urlset and sitemap
/// index documents; parse errors yield an empty list.
pub fn parse_sitemap_xml(xml: &str) -> Vec<String> {
    let document = match roxmltree::Document::parse(xml) {
        Ok(document) => document,
        Err(_) => return Vec::new(),
    };

    document
        .descendants()
        .filter(|node| node.has_tag_name("loc"))
        .filter_map(|node| node.text())
        .map(|text| normalize_url(text.trim()))
        .filter(|url| !url.is_empty())
        .collect()
}
