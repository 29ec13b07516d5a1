//! Auto-discovery of documentation auxiliary files.
//!
//! Probes seed origins for llms.txt manifests, sitemaps, and robots.txt in a
//! fixed priority order. Every probe is SSRF-guarded: the hostname is resolved
//! before fetching and any non-public address rejects the candidate, redirects
//! included.

use crate::config::{
    DISCOVERY_CONNECT_TIMEOUT_SECS, DISCOVERY_MAX_REDIRECTS, DISCOVERY_MAX_RESPONSE_BYTES,
    DISCOVERY_TIMEOUT_SECS,
};
use crate::error::{Error, Result};
use crate::fetcher::USER_AGENT;
use crate::urls::{ensure_https, is_llms_variant, is_robots_txt, is_sitemap, sanitize_url};
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Auxiliary file found for a set of seeds.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub url: String,
    pub content: String,
    pub content_type: String,
}

const COMMON_SUBDIRS: [&str; 10] = [
    "docs", "doc", "api", "static", "public", "sitemaps", "xml", "feed", "assets", "help",
];

pub struct DiscoveryService {
    client: reqwest::Client,
    max_bytes: usize,
    allow_private_hosts: bool,
}

impl DiscoveryService {
    pub fn new() -> Result<Self> {
        // Redirects are followed manually so every hop gets re-validated.
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(DISCOVERY_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(DISCOVERY_CONNECT_TIMEOUT_SECS))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            max_bytes: DISCOVERY_MAX_RESPONSE_BYTES,
            allow_private_hosts: false,
        })
    }

    /// Disable the public-address requirement. Intended for test rigs and
    /// deployments that crawl intranet documentation on purpose.
    pub fn allow_private_hosts(mut self, allow: bool) -> Self {
        self.allow_private_hosts = allow;
        self
    }

    /// Public probing always upgrades to https; intranet mode keeps the
    /// seed's scheme so plain-http hosts stay reachable.
    fn upgrade_scheme(&self, url: &str) -> String {
        if self.allow_private_hosts {
            url.to_string()
        } else {
            ensure_https(url)
        }
    }

    /// Probe candidates for every seed and return the first valid auxiliary
    /// file, preferring llms manifests over sitemaps over robots.txt.
    pub async fn discover_files(&self, urls: &[String]) -> Option<DiscoveredFile> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut candidates: Vec<String> = Vec::new();

        for url in urls {
            let normalized = self.upgrade_scheme(url);
            for candidate in build_candidate_urls(&normalized) {
                if seen.insert(candidate.clone()) {
                    candidates.push(candidate);
                }
            }
        }

        for candidate in &candidates {
            match self.classify_probe(candidate).await {
                Ok(Some(found)) => {
                    info!("Discovery found {} ({})", found.url, found.content_type);
                    return Some(found);
                }
                Ok(None) => {}
                Err(exc) => {
                    debug!("Discovery probe skipped {}: {}", candidate, exc);
                }
            }
        }

        // Fallback: scan the seed pages themselves for sitemap declarations.
        for url in urls {
            let normalized = self.upgrade_scheme(url);
            if !seen.insert(normalized.clone()) {
                continue;
            }
            if let Ok(Some(raw)) = self.probe(&normalized).await {
                if raw.content_type.contains("text/html") {
                    if let Some(sitemap_url) = extract_html_sitemap(&raw.content, &raw.url) {
                        if let Ok(Some(nested)) = self.classify_probe(&sitemap_url).await {
                            info!("Discovery found {} via HTML reference", nested.url);
                            return Some(nested);
                        }
                    }
                }
            }
        }

        None
    }

    /// Probe a candidate and resolve nested references (robots → sitemap).
    async fn classify_probe(&self, candidate: &str) -> Result<Option<DiscoveredFile>> {
        let Some(raw) = self.probe(candidate).await? else {
            return Ok(None);
        };

        if is_llms_variant(&raw.url) || is_sitemap(&raw.url) {
            return Ok(Some(raw));
        }

        if is_robots_txt(&raw.url) {
            if let Some(sitemap_url) = extract_sitemap_from_robots(&raw.content, &raw.url) {
                match self.probe(&sitemap_url).await {
                    Ok(Some(nested)) => return Ok(Some(nested)),
                    Ok(None) => {}
                    Err(exc) => warn!("Nested sitemap probe failed for {}: {}", sitemap_url, exc),
                }
            }
            return Ok(Some(raw));
        }

        Ok(None)
    }

    /// Fetch one candidate with SSRF validation on the URL and every
    /// redirect hop. Returns None for 4xx/5xx or oversized responses.
    async fn probe(&self, url: &str) -> Result<Option<DiscoveredFile>> {
        let mut current = sanitize_url(url)
            .ok_or_else(|| Error::Discovery(format!("unsupported scheme: {}", url)))?;

        for _ in 0..=DISCOVERY_MAX_REDIRECTS {
            if !self.allow_private_hosts {
                validate_public_host(&current).await?;
            }

            let response = self
                .client
                .get(&current)
                .send()
                .await
                .map_err(|exc| Error::Discovery(exc.to_string()))?;

            let status = response.status();
            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| Error::Discovery("redirect without location".to_string()))?;
                let base = Url::parse(&current)
                    .map_err(|exc| Error::Discovery(exc.to_string()))?;
                let target = base
                    .join(location)
                    .map_err(|exc| Error::Discovery(exc.to_string()))?;
                current = sanitize_url(target.as_str())
                    .ok_or_else(|| Error::Discovery("redirect to unsupported scheme".to_string()))?;
                continue;
            }

            if status.is_client_error() || status.is_server_error() {
                return Ok(None);
            }

            if let Some(length) = response.content_length() {
                if length as usize > self.max_bytes {
                    return Ok(None);
                }
            }

            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("text/plain")
                .to_string();

            let content = response
                .text()
                .await
                .map_err(|exc| Error::Discovery(exc.to_string()))?;
            if content.len() > self.max_bytes {
                return Ok(None);
            }

            return Ok(Some(DiscoveredFile {
                url: current,
                content,
                content_type,
            }));
        }

        Err(Error::Discovery("too many redirects".to_string()))
    }
}

/// Candidate URLs for one seed, in priority order.
fn build_candidate_urls(base_url: &str) -> Vec<String> {
    let Ok(parsed) = Url::parse(base_url) else {
        return Vec::new();
    };
    let origin = format!(
        "{}://{}{}",
        parsed.scheme(),
        parsed.host_str().unwrap_or(""),
        parsed.port().map(|p| format!(":{}", p)).unwrap_or_default()
    );

    let mut candidates = vec![
        format!("{}/llms.txt", origin),
        format!("{}/llms-full.txt", origin),
        format!("{}/.well-known/llms.txt", origin),
        format!("{}/.well-known/llms-full.txt", origin),
        format!("{}/sitemap.xml", origin),
        format!("{}/sitemap_index.xml", origin),
        format!("{}/robots.txt", origin),
        format!("{}/.well-known/robots.txt", origin),
    ];

    // Sibling directory of the seed, when the seed is below the root.
    let path = parsed.path();
    if let Some(slash) = path.rfind('/') {
        let directory = &path[..slash];
        if !directory.is_empty() {
            for file in ["llms.txt", "llms-full.txt", "sitemap.xml"] {
                candidates.push(format!("{}{}/{}", origin, directory, file));
            }
        }
    }

    for subdir in COMMON_SUBDIRS {
        candidates.push(format!("{}/{}/llms.txt", origin, subdir));
        candidates.push(format!("{}/{}/sitemap.xml", origin, subdir));
    }

    candidates
}

/// Pull the first `Sitemap:` declaration out of robots.txt, defaulting to
/// `<origin>/sitemap.xml` when none is declared.
fn extract_sitemap_from_robots(robots_text: &str, robots_url: &str) -> Option<String> {
    for line in robots_text.lines() {
        let trimmed = line.trim();
        if trimmed.len() > 8 && trimmed[..8].eq_ignore_ascii_case("sitemap:") {
            let declared = trimmed[8..].trim();
            if !declared.is_empty() {
                return Some(declared.to_string());
            }
        }
    }

    let base = Url::parse(robots_url).ok()?;
    base.join("/sitemap.xml").ok().map(|u| u.to_string())
}

/// Look for `<link rel="sitemap">` or `<meta name="sitemap">` references.
fn extract_html_sitemap(html: &str, base_url: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok()?;

    let link_selector = Selector::parse("link[rel='sitemap']").ok()?;
    if let Some(node) = document.select(&link_selector).next() {
        if let Some(href) = node.value().attr("href") {
            return base.join(href).ok().map(|u| u.to_string());
        }
    }

    let meta_selector = Selector::parse("meta[name='sitemap']").ok()?;
    if let Some(node) = document.select(&meta_selector).next() {
        if let Some(content) = node.value().attr("content") {
            return base.join(content).ok().map(|u| u.to_string());
        }
    }

    None
}

/// Resolve the hostname and reject any candidate whose addresses are not
/// publicly routable. Literal IPs are checked directly.
pub async fn validate_public_host(url: &str) -> Result<()> {
    let parsed = Url::parse(url).map_err(|exc| Error::Discovery(exc.to_string()))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| Error::Discovery("missing hostname".to_string()))?;

    if let Ok(ip) = host.trim_matches(['[', ']']).parse::<IpAddr>() {
        if !is_public_ip(&ip) {
            return Err(Error::Discovery(format!("blocked non-public address {}", ip)));
        }
        return Ok(());
    }

    let addrs = tokio::net::lookup_host((host, parsed.port_or_known_default().unwrap_or(443)))
        .await
        .map_err(|exc| Error::Discovery(format!("failed to resolve {}: {}", host, exc)))?;

    let mut resolved_any = false;
    for addr in addrs {
        resolved_any = true;
        if !is_public_ip(&addr.ip()) {
            return Err(Error::Discovery(format!(
                "{} resolves to non-public address {}",
                host,
                addr.ip()
            )));
        }
    }

    if !resolved_any {
        return Err(Error::Discovery(format!("{} resolved to no addresses", host)));
    }
    Ok(())
}

/// Publicly-routable check covering private, loopback, link-local, CGNAT,
/// multicast, reserved, and documentation ranges. 169.254.169.254 (cloud
/// metadata) falls inside the link-local block.
pub fn is_public_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            !(v4.is_unspecified()
                || v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_documentation()
                || v4.is_multicast()
                || octets[0] == 0
                // CGNAT 100.64.0.0/10
                || (octets[0] == 100 && (octets[1] & 0xc0) == 64)
                // IETF protocol assignments 192.0.0.0/24
                || (octets[0] == 192 && octets[1] == 0 && octets[2] == 0)
                // Benchmarking 198.18.0.0/15
                || (octets[0] == 198 && (octets[1] & 0xfe) == 18)
                // Reserved 240.0.0.0/4
                || octets[0] >= 240)
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_public_ip(&IpAddr::V4(mapped));
            }
            let segments = v6.segments();
            !(v6.is_unspecified()
                || v6.is_loopback()
                || v6.is_multicast()
                // Unique local fc00::/7
                || (segments[0] & 0xfe00) == 0xfc00
                // Link local fe80::/10
                || (segments[0] & 0xffc0) == 0xfe80
                // Documentation 2001:db8::/32
                || (segments[0] == 0x2001 && segments[1] == 0x0db8))
        }
    }
}
