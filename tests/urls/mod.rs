use crawldex::urls::{
    ensure_https, extract_markdown_links, generate_unique_source_id, is_binary_file,
    is_same_domain, iter_links_from_markdown, normalize_url, transform_github_url,
};

/// Links pulled out of rendered markdown go through sanitization and binary
/// filtering before the frontier sees them.
#[test]
fn test_markdown_link_pipeline() {
    let markdown = "\
Read the [guide](https://example.com/docs/guide) first.
Download [the installer](https://example.com/setup.exe) or the
[archive](https://example.com/src.tar.gz), then see [api](ftp://example.com/api)
and [reference](https://example.com/api/reference).";

    let links = iter_links_from_markdown(markdown);
    // ftp link is dropped at sanitization
    assert_eq!(links.len(), 4);

    let crawlable: Vec<String> = links
        .into_iter()
        .filter(|link| !is_binary_file(link))
        .map(|link| normalize_url(&link))
        .collect();

    assert_eq!(
        crawlable,
        vec![
            "https://example.com/docs/guide",
            "https://example.com/api/reference",
        ]
    );
}

#[test]
fn test_link_text_preserved() {
    let links = extract_markdown_links("[Getting Started](https://example.com/start)");
    assert_eq!(links[0].text, "Getting Started");
}

#[test]
fn test_normalization_equivalences() {
    let variants = [
        "https://Example.com/path/",
        "https://example.com/path",
        "https://example.com/path#fragment",
    ];
    let ids: Vec<String> = variants
        .iter()
        .map(|url| generate_unique_source_id(url))
        .collect();
    // Host casing differs, so the first variant may differ; the slash and
    // fragment variants must collapse to the same id.
    assert_eq!(ids[1], ids[2]);
}

#[test]
fn test_github_blob_to_raw_then_not_binary() {
    let url = "https://github.com/rust-lang/rust/blob/master/src/lib.rs";
    let raw = transform_github_url(url);
    assert_eq!(
        raw,
        "https://raw.githubusercontent.com/rust-lang/rust/master/src/lib.rs"
    );
    assert!(!is_binary_file(&raw));
    assert!(is_same_domain(&raw, "https://raw.githubusercontent.com/other"));
}

#[test]
fn test_ensure_https_for_seed_lists() {
    let seeds = ["http://example.com/docs", "https://example.org", "example.net"];
    for seed in seeds {
        let upgraded = ensure_https(seed);
        assert!(upgraded.starts_with("https://"), "{} -> {}", seed, upgraded);
    }
}

#[test]
fn test_binary_filter_over_extension_table() {
    let binary = [
        "https://example.com/a.zip",
        "https://example.com/b.PNG",
        "https://example.com/c.woff2",
        "https://example.com/d.pdf",
        "https://example.com/e.wasm?v=1",
    ];
    for url in binary {
        assert!(is_binary_file(url), "{} should be binary", url);
    }

    let not_binary = [
        "https://example.com/",
        "https://example.com/docs",
        "https://example.com/page.html",
        "https://example.com/data.json",
    ];
    for url in not_binary {
        assert!(!is_binary_file(url), "{} should not be binary", url);
    }
}
