//! Fenced-code extraction from markdown.
//!
//! Splits a document into an ordered sequence of segments where fenced blocks
//! become code segments carrying their declared language and everything in
//! between stays markdown text. Byte offsets into the original document are
//! preserved for provenance.

use regex::Regex;

/// One stretch of a markdown document, either prose or a fenced block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownSegment {
    pub content: String,
    pub is_code: bool,
    /// Declared fence language for code, "markdown" for text.
    pub language: String,
    pub start_pos: usize,
    pub end_pos: usize,
}

pub struct MarkdownCodeExtractor {
    fenced_pattern: Regex,
}

impl Default for MarkdownCodeExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownCodeExtractor {
    pub fn new() -> Self {
        Self {
            fenced_pattern: Regex::new(r"(?ms)^```(\w+)?[ \t]*\r?\n(.*?)^```[ \t]*$")
                .expect("static regex"),
        }
    }

    /// Split markdown into interleaved text and code segments, in document
    /// order. A document without fences comes back as one text segment.
    pub fn extract_segments(&self, markdown: &str) -> Vec<MarkdownSegment> {
        if markdown.is_empty() {
            return Vec::new();
        }

        let mut segments = Vec::new();
        let mut last_end = 0;

        for caps in self.fenced_pattern.captures_iter(markdown) {
            let whole = caps.get(0).expect("match group 0");
            let language = caps
                .get(1)
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let code = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");

            if whole.start() > last_end {
                let text_content = markdown[last_end..whole.start()].trim();
                if !text_content.is_empty() {
                    segments.push(MarkdownSegment {
                        content: text_content.to_string(),
                        is_code: false,
                        language: "markdown".to_string(),
                        start_pos: last_end,
                        end_pos: whole.start(),
                    });
                }
            }

            if !code.is_empty() {
                segments.push(MarkdownSegment {
                    content: code.to_string(),
                    is_code: true,
                    language,
                    start_pos: whole.start(),
                    end_pos: whole.end(),
                });
            }

            last_end = whole.end();
        }

        if last_end < markdown.len() {
            let text_content = markdown[last_end..].trim();
            if !text_content.is_empty() {
                segments.push(MarkdownSegment {
                    content: text_content.to_string(),
                    is_code: false,
                    language: "markdown".to_string(),
                    start_pos: last_end,
                    end_pos: markdown.len(),
                });
            }
        }

        if segments.is_empty() {
            segments.push(MarkdownSegment {
                content: markdown.to_string(),
                is_code: false,
                language: "markdown".to_string(),
                start_pos: 0,
                end_pos: markdown.len(),
            });
        }

        segments
    }
}
