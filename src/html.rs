//! HTML inspection and markdown conversion for fetched pages.
//!
//! Conversion walks the parsed DOM directly: scripts, styles, and (when link
//! pruning is requested) navigation chrome are skipped during emission, and
//! the remaining structure is rendered as markdown. The documentation-site
//! heuristics tilt fetching towards browser rendering for the common doc
//! frameworks.

use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use url::Url;

const DOC_KEYWORDS: [&str; 10] = [
    "readthedocs",
    "docusaurus",
    "vitepress",
    "gitbook",
    "mkdocs",
    "docsify",
    "nextra",
    "nuxt-content",
    "sphinx",
    "storybook",
];

const DOC_PATH_HINTS: [&str; 5] = ["/docs/", "/documentation", "/guide", "/handbook", "/kb/"];

const NAVIGATION_TAGS: [&str; 4] = ["nav", "header", "aside", "footer"];
const NAVIGATION_CLASSES: [&str; 3] = ["sidebar", "toc", "table-of-contents"];

/// Page title from `<title>`, falling back to the first `<h1>`.
pub fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    for selector in ["title", "h1"] {
        let selector = Selector::parse(selector).ok()?;
        if let Some(node) = document.select(&selector).next() {
            let text: String = node.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

/// Heuristic detection of documentation frameworks from the URL and, when
/// available, the fetched HTML.
pub fn is_documentation_site(url: Option<&str>, html: Option<&str>) -> bool {
    if let Some(url) = url {
        let lower = url.to_lowercase();
        if DOC_KEYWORDS.iter().any(|keyword| lower.contains(keyword)) {
            return true;
        }
        if DOC_PATH_HINTS.iter().any(|hint| lower.contains(hint)) {
            return true;
        }
    }

    let Some(html) = html else {
        return false;
    };
    let document = Html::parse_document(html);

    if let Ok(selector) = Selector::parse("meta") {
        for meta in document.select(&selector) {
            let haystack = ["content", "name", "property"]
                .iter()
                .filter_map(|attr| meta.value().attr(attr))
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase();
            if DOC_KEYWORDS.iter().any(|keyword| haystack.contains(keyword)) {
                return true;
            }
        }
    }

    if let Ok(selector) = Selector::parse("body") {
        if let Some(body) = document.select(&selector).next() {
            let classes = body.value().attr("class").unwrap_or("").to_lowercase();
            if DOC_KEYWORDS.iter().any(|keyword| classes.contains(keyword)) {
                return true;
            }
        }
    }

    for probe in ["[data-theme='docs']", ".theme-doc-markdown"] {
        if let Ok(selector) = Selector::parse(probe) {
            if document.select(&selector).next().is_some() {
                return true;
            }
        }
    }

    false
}

/// Convert HTML to markdown. With `prune_navigation` set, nav chrome
/// (nav/header/aside, role=navigation, sidebar and toc classes) is dropped
/// along with the always-dropped script/style/noscript elements.
pub fn html_to_markdown(html: &str, prune_navigation: bool) -> String {
    if html.is_empty() {
        return String::new();
    }

    let document = Html::parse_document(html);
    let mut output = String::new();

    let root = match Selector::parse("body").ok().and_then(|selector| {
        document.select(&selector).next()
    }) {
        Some(body) => body,
        None => document.root_element(),
    };

    walk_element(root, prune_navigation, &mut output, 0);

    collapse_blank_lines(&output)
}

fn should_skip(element: ElementRef, prune_navigation: bool) -> bool {
    let name = element.value().name();
    if matches!(name, "script" | "style" | "noscript") {
        return true;
    }
    if !prune_navigation {
        return false;
    }
    if NAVIGATION_TAGS.contains(&name) {
        return true;
    }
    if element.value().attr("role") == Some("navigation") {
        return true;
    }
    if let Some(classes) = element.value().attr("class") {
        let lower = classes.to_lowercase();
        if NAVIGATION_CLASSES
            .iter()
            .any(|class| lower.split_whitespace().any(|c| c == *class))
        {
            return true;
        }
    }
    false
}

fn walk_element(element: ElementRef, prune: bool, output: &mut String, list_depth: usize) {
    if should_skip(element, prune) {
        return;
    }

    let name = element.value().name();
    match name {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = name[1..].parse::<usize>().unwrap_or(1);
            let text = element_text(element);
            if !text.is_empty() {
                output.push_str(&format!("\n{} {}\n\n", "#".repeat(level), text));
            }
        }
        "p" => {
            let mut paragraph = String::new();
            walk_children(element, prune, &mut paragraph, list_depth);
            let trimmed = paragraph.trim();
            if !trimmed.is_empty() {
                output.push_str(trimmed);
                output.push_str("\n\n");
            }
        }
        "pre" => {
            let text = element_text_raw(element);
            if !text.trim().is_empty() {
                let language = fence_language(element).unwrap_or_default();
                output.push_str(&format!("\n```{}\n{}\n```\n\n", language, text.trim_end()));
            }
        }
        "code" => {
            // Inline code; block code is handled by the pre branch
            let text = element_text(element);
            if !text.is_empty() {
                output.push('`');
                output.push_str(&text);
                output.push('`');
            }
        }
        "a" => {
            let text = element_text(element);
            match element.value().attr("href") {
                Some(href) if !text.is_empty() => {
                    output.push_str(&format!("[{}]({})", text, href));
                }
                _ => output.push_str(&text),
            }
        }
        "li" => {
            let mut item = String::new();
            walk_children(element, prune, &mut item, list_depth + 1);
            let trimmed = item.trim();
            if !trimmed.is_empty() {
                output.push_str(&format!(
                    "{}- {}\n",
                    "  ".repeat(list_depth.saturating_sub(1)),
                    trimmed
                ));
            }
        }
        "ul" | "ol" => {
            walk_children(element, prune, output, list_depth + 1);
            output.push('\n');
        }
        "br" => output.push('\n'),
        "strong" | "b" => {
            let text = element_text(element);
            if !text.is_empty() {
                output.push_str(&format!("**{}**", text));
            }
        }
        "em" | "i" => {
            let text = element_text(element);
            if !text.is_empty() {
                output.push_str(&format!("*{}*", text));
            }
        }
        "blockquote" => {
            let text = element_text(element);
            if !text.is_empty() {
                output.push_str(&format!("\n> {}\n\n", text));
            }
        }
        _ => walk_children(element, prune, output, list_depth),
    }
}

fn walk_children(element: ElementRef, prune: bool, output: &mut String, list_depth: usize) {
    for child in element.children() {
        match child.value() {
            Node::Element(_) => {
                if let Some(child_ref) = ElementRef::wrap(child) {
                    walk_element(child_ref, prune, output, list_depth);
                }
            }
            Node::Text(text) => {
                let content = text.trim_matches(['\n', '\r']);
                if !content.trim().is_empty() {
                    output.push_str(content);
                }
            }
            _ => {}
        }
    }
}

fn element_text(element: ElementRef) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn element_text_raw(element: ElementRef) -> String {
    element.text().collect::<String>()
}

fn fence_language(element: ElementRef) -> Option<String> {
    // <pre><code class="language-python"> is the common convention
    let selector = Selector::parse("code").ok()?;
    let code = element.select(&selector).next()?;
    let classes = code.value().attr("class")?;
    classes
        .split_whitespace()
        .find_map(|class| class.strip_prefix("language-"))
        .map(|language| language.to_string())
}

fn collapse_blank_lines(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
            result.push('\n');
        } else {
            blank_run = 0;
            result.push_str(line.trim_end());
            result.push('\n');
        }
    }
    result.trim().to_string()
}

/// Anchor targets resolved against the base URL, restricted to http(s).
pub fn extract_internal_links(html: &str, base_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut links = Vec::new();
    for node in document.select(&selector) {
        let Some(href) = node.value().attr("href") else {
            continue;
        };
        if href.starts_with('#') {
            continue;
        }
        if let Ok(resolved) = base.join(href) {
            if matches!(resolved.scheme(), "http" | "https") {
                links.push(resolved.to_string());
            }
        }
    }
    links
}
