//! URL munging shared across the crawl strategies and discovery.
//!
//! All helpers here are pure and side-effect free so they can be called from
//! both sync and async contexts. Binary detection and GitHub blob rewriting
//! live in one place so the filtering rules stay consistent.

use regex::Regex;
use sha2::{Digest, Sha256};
use url::Url;

/// A markdown link with its visible text preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownLink {
    pub text: String,
    pub url: String,
}

const WELL_KNOWN_SUFFIXES: [&str; 3] = [
    "/.well-known/llms.txt",
    "/.well-known/llms-full.txt",
    "/.well-known/robots.txt",
];

const BINARY_EXTENSIONS: [&str; 52] = [
    // Archives
    ".zip", ".tar", ".gz", ".tgz", ".bz2", ".xz", ".rar", ".7z", ".iso",
    // Images
    ".png", ".jpg", ".jpeg", ".gif", ".bmp", ".tiff", ".svg", ".ico", ".webp",
    // Audio
    ".mp3", ".wav", ".aac", ".ogg", ".flac", ".m4a",
    // Video
    ".mp4", ".avi", ".mov", ".mkv", ".webm", ".flv",
    // Documents / binaries
    ".pdf", ".doc", ".docx", ".ppt", ".pptx", ".xls", ".xlsx",
    ".exe", ".bin", ".dll", ".dmg", ".pkg", ".msi",
    // Fonts
    ".ttf", ".otf", ".woff", ".woff2",
    // Compiled artifacts
    ".dat", ".img", ".class", ".pyc", ".wasm",
];

/// Rewrite GitHub blob URLs into raw file URLs so the fetcher gets file
/// contents instead of the HTML code viewer.
pub fn transform_github_url(url: &str) -> String {
    let pattern =
        Regex::new(r"^https://github\.com/([^/]+)/([^/]+)/blob/([^/]+?)/(.+)$").expect("static regex");
    match pattern.captures(url) {
        Some(caps) => format!(
            "https://raw.githubusercontent.com/{}/{}/{}/{}",
            &caps[1], &caps[2], &caps[3], &caps[4]
        ),
        None => url.to_string(),
    }
}

pub fn is_sitemap(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.ends_with(".xml") || lower.ends_with("sitemap") || lower.contains("/sitemap")
}

pub fn is_txt(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.ends_with(".txt") || lower.ends_with(".text")
}

pub fn is_markdown(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.ends_with(".md") || lower.ends_with(".mdx")
}

pub fn is_llms_variant(url: &str) -> bool {
    let lower = url.to_lowercase();
    if lower.ends_with("llms.txt") || lower.ends_with("llms-full.txt") {
        return true;
    }
    WELL_KNOWN_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

pub fn is_robots_txt(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.ends_with("robots.txt") || lower.ends_with("/.well-known/robots.txt")
}

/// True if the URL path ends in a known binary extension. URLs with no
/// recognizable suffix (including bare origins) are treated as not binary.
pub fn is_binary_file(url: &str) -> bool {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_lowercase(),
        Err(_) => url.to_lowercase(),
    };
    BINARY_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Extract `[text](href)` pairs, ignoring links with an empty side.
pub fn extract_markdown_links(markdown: &str) -> Vec<MarkdownLink> {
    let pattern = Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("static regex");
    pattern
        .captures_iter(markdown)
        .filter_map(|caps| {
            let text = caps[1].trim().to_string();
            let url = caps[2].trim().to_string();
            if text.is_empty() || url.is_empty() {
                None
            } else {
                Some(MarkdownLink { text, url })
            }
        })
        .collect()
}

/// Canonical form `scheme://host/path[?query]` with the trailing slash
/// stripped. Scheme defaults to https when missing.
pub fn normalize_url(url: &str) -> String {
    let candidate = if url.contains("://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    };

    match Url::parse(&candidate) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or("");
            let port = parsed
                .port()
                .map(|p| format!(":{}", p))
                .unwrap_or_default();
            let path = if parsed.path().is_empty() { "/" } else { parsed.path() };
            let mut normalized = format!("{}://{}{}{}", parsed.scheme(), host, port, path);
            if let Some(query) = parsed.query() {
                normalized = format!("{}?{}", normalized, query);
            }
            normalized.trim_end_matches('/').to_string()
        }
        Err(_) => candidate.trim_end_matches('/').to_string(),
    }
}

pub fn is_same_domain(url: &str, other: &str) -> bool {
    host_of(url) == host_of(other)
}

pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok().and_then(|u| u.host_str().map(|h| h.to_lowercase()))
}

pub fn resolve_relative_url(base_url: &str, link: &str) -> Option<String> {
    let base = Url::parse(base_url).ok()?;
    base.join(link).ok().map(|u| u.to_string())
}

/// Keep only absolute http(s) URLs.
pub fn sanitize_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    match parsed.scheme() {
        "http" | "https" => Some(url.to_string()),
        _ => None,
    }
}

/// Iterate sanitized link targets out of markdown content.
pub fn iter_links_from_markdown(markdown: &str) -> Vec<String> {
    extract_markdown_links(markdown)
        .into_iter()
        .filter_map(|link| sanitize_url(&link.url))
        .collect()
}

/// Deterministic 32-hex-char ID for a crawl source, stable across sessions.
pub fn generate_unique_source_id(url: &str) -> String {
    let normalized = normalize_url(url);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..32].to_string()
}

/// Upgrade the scheme to https, leaving https URLs untouched.
pub fn ensure_https(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            if parsed.scheme() == "https" {
                return url.to_string();
            }
            if parsed.set_scheme("https").is_ok() {
                parsed.to_string()
            } else {
                url.to_string()
            }
        }
        Err(_) => format!("https://{}", url),
    }
}
