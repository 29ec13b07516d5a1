use crawldex::discovery::DiscoveryService;
use httpmock::prelude::*;

fn intranet_service() -> DiscoveryService {
    DiscoveryService::new().unwrap().allow_private_hosts(true)
}

/// llms.txt at the origin wins over everything else.
#[tokio::test]
async fn test_llms_manifest_preferred() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/llms.txt");
            then.status(200)
                .header("content-type", "text/plain")
                .body("https://example.com/a\nhttps://example.com/b\n");
        })
        .await;

    let service = intranet_service();
    let found = service
        .discover_files(&[server.base_url()])
        .await
        .expect("llms manifest should be discovered");

    assert!(found.url.ends_with("llms.txt"));
    assert!(found.content.contains("https://example.com/a"));
}

/// A robots.txt declaring a sitemap yields the sitemap content, not the
/// robots content.
#[tokio::test]
async fn test_sitemap_declared_in_robots() {
    let server = MockServer::start_async().await;
    let sitemap_body = r#"<?xml version="1.0"?>
<urlset><url><loc>https://example.org/page</loc></url></urlset>"#;

    server
        .mock_async(|when, then| {
            when.method(GET).path("/robots.txt");
            then.status(200)
                .header("content-type", "text/plain")
                .body(format!("User-agent: *\nSitemap: {}/sm.xml\n", server.base_url()));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/sm.xml");
            then.status(200)
                .header("content-type", "application/xml")
                .body(sitemap_body);
        })
        .await;

    let service = intranet_service();
    let found = service
        .discover_files(&[server.base_url()])
        .await
        .expect("sitemap should be discovered through robots");

    assert!(found.url.ends_with("/sm.xml"));
    assert!(found.content.contains("example.org/page"));
    assert!(!found.content.contains("User-agent"));
}

/// The HTML fallback finds `<link rel="sitemap">` on the seed page when no
/// well-known candidate exists.
#[tokio::test]
async fn test_html_link_fallback() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(200)
                .header("content-type", "text/html")
                .body(r#"<html><head><link rel="sitemap" href="/deep/map.xml"></head></html>"#);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/deep/map.xml");
            then.status(200)
                .header("content-type", "application/xml")
                .body("<urlset><url><loc>https://example.org/x</loc></url></urlset>");
        })
        .await;

    let service = intranet_service();
    let found = service
        .discover_files(&[server.base_url()])
        .await
        .expect("sitemap should be found via HTML reference");

    assert!(found.url.ends_with("map.xml"));
}

/// Cloud metadata addresses are rejected before any request is made; with
/// only that seed, discovery returns nothing and the job carries on.
#[tokio::test]
async fn test_metadata_endpoint_is_skipped() {
    let service = DiscoveryService::new().unwrap();
    let found = service
        .discover_files(&["http://169.254.169.254/latest/meta-data/".to_string()])
        .await;
    assert!(found.is_none());
}

/// Private-range hosts are rejected by the default service configuration.
#[tokio::test]
async fn test_private_host_rejected_by_default() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/llms.txt");
            then.status(200).body("https://example.com/a\n");
        })
        .await;

    // Same server, but without the private-host allowance
    let service = DiscoveryService::new().unwrap();
    let found = service.discover_files(&[server.base_url()]).await;
    assert!(found.is_none(), "loopback probe should be rejected");
}
