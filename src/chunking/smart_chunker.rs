//! Chunking orchestration: split, classify, and tag for model routing.
//!
//! Markdown with fenced code is segmented first so code blocks route to the
//! code embedding model with full confidence; everything else is split and
//! run through the code detector chunk by chunk.

use crate::chunking::code_detector::{CodeDetector, Language};
use crate::chunking::markdown::MarkdownCodeExtractor;
use crate::chunking::text_splitter::RecursiveTextSplitter;
use crate::config::CrawlConfig;
use crate::error::Result;

/// Routing tag selecting the embedding model for a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelHint {
    Text,
    Code,
}

impl ModelHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelHint::Text => "text-embed",
            ModelHint::Code => "code-embed",
        }
    }
}

/// A chunk ready for summarization, embedding, and storage. `source_path`
/// keys back to the originating page URL.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub text: String,
    pub is_code: bool,
    pub language: String,
    pub start_char: usize,
    pub end_char: usize,
    pub chunk_index: usize,
    pub confidence: f64,
    pub source_path: String,
    pub model_hint: ModelHint,
}

pub struct SmartChunker {
    splitter: RecursiveTextSplitter,
    detector: CodeDetector,
    extractor: MarkdownCodeExtractor,
}

impl SmartChunker {
    pub fn new(config: &CrawlConfig) -> Result<Self> {
        Ok(Self {
            splitter: RecursiveTextSplitter::new(config.chunk_size, config.chunk_overlap)?,
            detector: CodeDetector::new(config.enable_tree_sitter),
            extractor: MarkdownCodeExtractor::new(),
        })
    }

    /// Split one document into routed chunks.
    pub fn chunk_text(&self, text: &str, source_path: &str, language_hint: Option<&str>) -> Vec<Chunk> {
        if text.is_empty() {
            return Vec::new();
        }

        if is_markdown_with_code(text) {
            return self.chunk_markdown_with_code(text, source_path);
        }

        let text_chunks = self.splitter.split_text(text);
        let mut chunks = Vec::with_capacity(text_chunks.len());

        for (index, text_chunk) in text_chunks.into_iter().enumerate() {
            let detection = self.detector.detect(&text_chunk.text, language_hint);
            let model_hint = if detection.is_code { ModelHint::Code } else { ModelHint::Text };

            chunks.push(Chunk {
                text: text_chunk.text,
                is_code: detection.is_code,
                language: detection.language.as_str().to_string(),
                start_char: text_chunk.start_char,
                end_char: text_chunk.end_char,
                chunk_index: index,
                confidence: detection.confidence,
                source_path: source_path.to_string(),
                model_hint,
            });
        }

        chunks
    }

    /// Fenced-markdown path: each segment is split independently and tagged
    /// from its segment kind rather than re-detected.
    fn chunk_markdown_with_code(&self, text: &str, source_path: &str) -> Vec<Chunk> {
        let segments = self.extractor.extract_segments(text);
        let mut chunks = Vec::new();
        let mut chunk_index = 0;

        for segment in segments {
            for text_chunk in self.splitter.split_text(&segment.content) {
                let model_hint = if segment.is_code { ModelHint::Code } else { ModelHint::Text };
                chunks.push(Chunk {
                    text: text_chunk.text,
                    is_code: segment.is_code,
                    language: segment.language.clone(),
                    start_char: segment.start_pos + text_chunk.start_char,
                    end_char: segment.start_pos + text_chunk.end_char,
                    chunk_index,
                    confidence: 1.0,
                    source_path: source_path.to_string(),
                    model_hint,
                });
                chunk_index += 1;
            }
        }

        chunks
    }

    /// Chunk a batch of (text, path) documents, inferring language hints
    /// from the path extension.
    pub fn chunk_documents(&self, documents: &[(String, String)]) -> Vec<Chunk> {
        let mut all_chunks = Vec::new();
        for (text, path) in documents {
            let hint = infer_language_from_path(path);
            all_chunks.extend(self.chunk_text(text, path, hint.map(|l| l.as_str())));
        }
        all_chunks
    }

    /// Routing statistics for a chunk list, used for post-chunking logs.
    pub fn routing_info(chunks: &[Chunk]) -> RoutingInfo {
        let code_chunks = chunks.iter().filter(|c| c.model_hint == ModelHint::Code).count();
        let total = chunks.len();
        let avg_confidence = if total > 0 {
            chunks.iter().map(|c| c.confidence).sum::<f64>() / total as f64
        } else {
            0.0
        };
        RoutingInfo {
            total_chunks: total,
            text_chunks: total - code_chunks,
            code_chunks,
            avg_confidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoutingInfo {
    pub total_chunks: usize,
    pub text_chunks: usize,
    pub code_chunks: usize,
    pub avg_confidence: f64,
}

fn is_markdown_with_code(text: &str) -> bool {
    text.contains("```") && text.contains("\n```")
}

/// Fixed extension → language table for source-path hints.
pub fn infer_language_from_path(path: &str) -> Option<Language> {
    let extension = path.rsplit_once('.')?.1.to_lowercase();
    match extension.as_str() {
        "py" => Some(Language::Python),
        "js" | "jsx" => Some(Language::JavaScript),
        "ts" | "tsx" => Some(Language::TypeScript),
        "java" => Some(Language::Java),
        "go" => Some(Language::Go),
        "rs" => Some(Language::Rust),
        "c" | "h" => Some(Language::C),
        "cpp" | "cc" | "cxx" | "hpp" => Some(Language::Cpp),
        "cs" => Some(Language::CSharp),
        "php" => Some(Language::Php),
        "rb" => Some(Language::Ruby),
        "swift" => Some(Language::Swift),
        "kt" => Some(Language::Kotlin),
        "scala" => Some(Language::Scala),
        "r" => Some(Language::R),
        "sh" | "bash" => Some(Language::Shell),
        "sql" => Some(Language::Sql),
        "html" => Some(Language::Html),
        "css" => Some(Language::Css),
        "md" | "mdx" => Some(Language::Markdown),
        _ => None,
    }
}
