use crawldex::chunking::{ModelHint, SmartChunker};
use crawldex::config::CrawlConfig;

fn chunker_with(size: usize, overlap: usize) -> SmartChunker {
    let config = CrawlConfig {
        chunk_size: size,
        chunk_overlap: overlap,
        ..Default::default()
    };
    SmartChunker::new(&config).unwrap()
}

/// Short plain text produces one text-routed chunk.
#[test]
fn test_single_page_text_scenario() {
    let chunker = chunker_with(1000, 0);
    let chunks = chunker.chunk_text("Hello. World.", "https://example.com/a", None);

    assert_eq!(chunks.len(), 1);
    assert!(!chunks[0].is_code);
    assert_eq!(chunks[0].model_hint, ModelHint::Text);
    assert_eq!(chunks[0].source_path, "https://example.com/a");
}

/// Markdown with a fenced python block routes the code to the code model
/// with full confidence.
#[test]
fn test_markdown_with_fenced_code_scenario() {
    let chunker = chunker_with(1000, 200);
    let markdown = "Some introduction prose that describes the function below.\n\
                    \n```python\ndef f():\n    return 1\n```\n\
                    \nAnd a closing paragraph after the example.";

    let chunks = chunker.chunk_text(markdown, "https://example.com/doc", None);
    assert!(chunks.len() >= 2, "expected prose + code chunks, got {}", chunks.len());

    let code: Vec<_> = chunks.iter().filter(|c| c.is_code).collect();
    assert_eq!(code.len(), 1);
    assert_eq!(code[0].language, "python");
    assert_eq!(code[0].model_hint, ModelHint::Code);
    assert_eq!(code[0].confidence, 1.0);
    assert!(code[0].text.contains("def f():"));

    for chunk in chunks.iter().filter(|c| !c.is_code) {
        assert_eq!(chunk.language, "markdown");
        assert_eq!(chunk.model_hint, ModelHint::Text);
    }
}

/// Every chunk respects the size bound and overlap bound, and offsets are
/// valid ranges into the document.
#[test]
fn test_chunk_invariants_on_long_document() {
    let size = 300;
    let overlap = 60;
    let chunker = chunker_with(size, overlap);

    let document = "The service processes incoming requests. \
                    Each request is validated and logged. "
        .repeat(40);
    let chunks = chunker.chunk_text(&document, "https://example.com/long", None);
    assert!(chunks.len() > 1);

    for chunk in &chunks {
        assert!(chunk.start_char < chunk.end_char);
        assert!(chunk.end_char <= document.len());
        assert!(chunk.text.len() <= size + overlap);
        assert!((0.0..=1.0).contains(&chunk.confidence));
    }

    for pair in chunks.windows(2) {
        assert!(pair[1].start_char >= pair[0].start_char, "chunk order broken");
        assert!(
            pair[0].end_char.saturating_sub(pair[1].start_char) <= overlap,
            "overlap bound exceeded"
        );
    }
}

/// Chunk order matches document order and indexes are sequential.
#[test]
fn test_chunk_order_matches_text_order() {
    let chunker = chunker_with(120, 0);
    let document = (0..20)
        .map(|i| format!("Paragraph number {} with some padding text.", i))
        .collect::<Vec<_>>()
        .join("\n\n");

    let chunks = chunker.chunk_text(&document, "doc", None);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_index, i);
    }
    for pair in chunks.windows(2) {
        assert!(pair[0].start_char <= pair[1].start_char);
    }
}

/// A source-path extension biases detection toward that language.
#[test]
fn test_language_hint_from_extension() {
    let chunker = chunker_with(1000, 0);
    let code = "fn compute(input: u32) -> u32 {\n    let mut total = input;\n    total * 2\n}\n";
    let chunks = chunker.chunk_documents(&[(code.to_string(), "src/compute.rs".to_string())]);

    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].is_code);
    assert_eq!(chunks[0].language, "rust");
    assert_eq!(chunks[0].model_hint, ModelHint::Code);
}

/// Exactly one model hint per chunk, whatever the mix.
#[test]
fn test_model_hint_is_total() {
    let chunker = chunker_with(400, 80);
    let mixed = "Intro prose.\n\n```go\nfunc main() {\n\tfmt.Println(\"hi\")\n}\n```\n\nMore prose.\n\n\
                 ```sql\nSELECT id FROM users;\n```\n\nThe end.";
    let chunks = chunker.chunk_text(mixed, "https://example.com/mixed", None);

    assert!(!chunks.is_empty());
    for chunk in &chunks {
        // Code chunks route to the code model, text chunks to the text model
        assert_eq!(chunk.is_code, chunk.model_hint == ModelHint::Code);
    }
    assert!(chunks.iter().any(|c| c.model_hint == ModelHint::Code));
    assert!(chunks.iter().any(|c| c.model_hint == ModelHint::Text));
}
