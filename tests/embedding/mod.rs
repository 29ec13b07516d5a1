use crawldex::chunking::{Chunk, ModelHint};
use crawldex::config::CrawlConfig;
use crawldex::embedding::{EmbeddingClient, EmbeddingRouter};
use httpmock::prelude::*;

fn chunk(text: &str, index: usize, hint: ModelHint) -> Chunk {
    Chunk {
        text: text.to_string(),
        is_code: hint == ModelHint::Code,
        language: "unknown".to_string(),
        start_char: 0,
        end_char: text.len(),
        chunk_index: index,
        confidence: 1.0,
        source_path: "https://example.com/doc".to_string(),
        model_hint: hint,
    }
}

fn router_for(server: &MockServer, parallel: bool) -> EmbeddingRouter {
    let client = EmbeddingClient::with_endpoints(
        server.base_url(),
        server.base_url(),
        "text-embed-v1".to_string(),
        "code-embed-v1".to_string(),
    )
    .unwrap();
    let config = CrawlConfig {
        enable_parallel_embedding: parallel,
        ..Default::default()
    };
    EmbeddingRouter::new(client, &config)
}

/// Output vectors line up with input chunk positions even when the two
/// model queues advance concurrently.
#[tokio::test]
async fn test_positional_alignment_under_parallel_batching() {
    let server = MockServer::start_async().await;

    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/embed")
                .json_body_partial(r#"{"model": "text-embed-v1"}"#);
            then.status(200).json_body(serde_json::json!([[1.0], [2.0], [3.0]]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/embed")
                .json_body_partial(r#"{"model": "code-embed-v1"}"#);
            // Wrapped response shape must also be handled
            then.status(200)
                .json_body(serde_json::json!({ "embeddings": [[9.0], [8.0]] }));
        })
        .await;

    // text at 0/2/4, code at 1/3
    let chunks = vec![
        chunk("t0", 0, ModelHint::Text),
        chunk("c0", 1, ModelHint::Code),
        chunk("t1", 2, ModelHint::Text),
        chunk("c1", 3, ModelHint::Code),
        chunk("t2", 4, ModelHint::Text),
    ];

    let router = router_for(&server, true);
    let vectors = router.embed_chunks(&chunks).await;

    assert_eq!(vectors.len(), 5);
    assert_eq!(vectors[0], vec![1.0]);
    assert_eq!(vectors[1], vec![9.0]);
    assert_eq!(vectors[2], vec![2.0]);
    assert_eq!(vectors[3], vec![8.0]);
    assert_eq!(vectors[4], vec![3.0]);
}

/// Sequential routing produces the same alignment as parallel routing.
#[tokio::test]
async fn test_sequential_mode_alignment() {
    let server = MockServer::start_async().await;

    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/embed")
                .json_body_partial(r#"{"model": "text-embed-v1"}"#);
            then.status(200).json_body(serde_json::json!([[1.0]]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/embed")
                .json_body_partial(r#"{"model": "code-embed-v1"}"#);
            then.status(200).json_body(serde_json::json!([[9.0]]));
        })
        .await;

    let chunks = vec![
        chunk("code first", 0, ModelHint::Code),
        chunk("then text", 1, ModelHint::Text),
    ];

    let router = router_for(&server, false);
    let vectors = router.embed_chunks(&chunks).await;
    assert_eq!(vectors[0], vec![9.0]);
    assert_eq!(vectors[1], vec![1.0]);
}

/// One model failing fills its positions with 768-dim zero vectors while the
/// other model's vectors land untouched; the count always matches the input.
#[tokio::test]
async fn test_failed_model_degrades_to_zero_vectors() {
    let server = MockServer::start_async().await;

    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/embed")
                .json_body_partial(r#"{"model": "text-embed-v1"}"#);
            then.status(200).json_body(serde_json::json!([[0.5], [0.6]]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/embed")
                .json_body_partial(r#"{"model": "code-embed-v1"}"#);
            then.status(500).body("internal error");
        })
        .await;

    let chunks = vec![
        chunk("t0", 0, ModelHint::Text),
        chunk("c0", 1, ModelHint::Code),
        chunk("t1", 2, ModelHint::Text),
    ];

    let router = router_for(&server, true);
    let vectors = router.embed_chunks(&chunks).await;

    assert_eq!(vectors.len(), chunks.len());
    assert_eq!(vectors[0], vec![0.5]);
    assert_eq!(vectors[2], vec![0.6]);
    // Failed batch positions become zero vectors of the model dimension
    assert_eq!(vectors[1].len(), 768);
    assert!(vectors[1].iter().all(|v| *v == 0.0));
}

/// A count mismatch from the service is an error, not silent misalignment.
#[tokio::test]
async fn test_count_mismatch_rejected() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/embed");
            then.status(200).json_body(serde_json::json!([[1.0]]));
        })
        .await;

    let client = EmbeddingClient::with_endpoints(
        server.base_url(),
        server.base_url(),
        "text-embed-v1".to_string(),
        "code-embed-v1".to_string(),
    )
    .unwrap();

    let texts = vec!["a".to_string(), "b".to_string()];
    let result = client.embed_single_batch(&texts, ModelHint::Text).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_health_check() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(200).body("ok");
        })
        .await;

    let client = EmbeddingClient::with_endpoints(
        server.base_url(),
        "http://127.0.0.1:1".to_string(),
        "text-embed-v1".to_string(),
        "code-embed-v1".to_string(),
    )
    .unwrap();

    assert!(client.check_health(ModelHint::Text).await);
    assert!(!client.check_health(ModelHint::Code).await);
}
