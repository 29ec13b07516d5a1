//! Recursive text splitter with overlap and boundary-aware packing.
//!
//! Splits on a hierarchy of separators so chunks break at paragraph and
//! sentence boundaries where possible, keeps markdown headers attached to
//! their sections, and extends chunks backward for overlap as a post-pass.
//! Offsets are byte positions into the original document and always land on
//! UTF-8 character boundaries.

use crate::error::{Error, Result};
use regex::Regex;

/// A contiguous slice of the source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub text: String,
    pub start_char: usize,
    pub end_char: usize,
}

// Separator hierarchy, coarsest first. The empty separator is the
// fixed-width character fallback.
const SEPARATORS: [&str; 10] = [
    "\n\n\n", "\n\n", "\n", ". ", "! ", "? ", "; ", ", ", " ", "",
];

pub struct RecursiveTextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    header_pattern: Regex,
}

impl RecursiveTextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidInput("chunk size must be positive".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(Error::InvalidInput(
                "chunk overlap must be less than chunk size".to_string(),
            ));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            header_pattern: Regex::new(r"(?m)^(#{1,6})\s+(.+)$").expect("static regex"),
        })
    }

    pub fn split_text(&self, text: &str) -> Vec<TextChunk> {
        if text.is_empty() {
            return Vec::new();
        }
        let chunks = self.split_with_headers(text);
        self.apply_overlap(chunks, text)
    }

    /// Partition on markdown headers so each section stays attached to its
    /// heading, recursing into oversized sections.
    fn split_with_headers(&self, text: &str) -> Vec<TextChunk> {
        let headers: Vec<_> = self.header_pattern.find_iter(text).collect();
        if headers.is_empty() {
            return self.split_recursive(text, 0);
        }

        let mut chunks = Vec::new();

        // Text before the first header
        if headers[0].start() > 0 {
            chunks.extend(self.split_recursive(&text[..headers[0].start()], 0));
        }

        for (i, header) in headers.iter().enumerate() {
            let start = header.start();
            let end = if i + 1 < headers.len() {
                headers[i + 1].start()
            } else {
                text.len()
            };
            let section = &text[start..end];

            if section.len() <= self.chunk_size {
                chunks.push(TextChunk {
                    text: section.to_string(),
                    start_char: start,
                    end_char: end,
                });
            } else {
                chunks.extend(self.split_recursive(section, start));
            }
        }

        chunks
    }

    fn split_recursive(&self, text: &str, offset: usize) -> Vec<TextChunk> {
        if text.len() <= self.chunk_size {
            return vec![TextChunk {
                text: text.to_string(),
                start_char: offset,
                end_char: offset + text.len(),
            }];
        }

        for separator in SEPARATORS {
            if separator.is_empty() {
                return self.split_by_characters(text, offset);
            }
            if text.contains(separator) {
                return self.split_by_separator(text, separator, offset);
            }
        }

        self.split_by_characters(text, offset)
    }

    /// Greedily pack separator-delimited pieces up to the chunk size. A
    /// single oversized piece falls through to fixed-width slicing.
    fn split_by_separator(&self, text: &str, separator: &str, offset: usize) -> Vec<TextChunk> {
        let splits: Vec<&str> = text.split(separator).collect();
        let last_index = splits.len() - 1;

        let mut chunks = Vec::new();
        let mut current_chunk = String::new();
        let mut current_start = offset;

        for (i, split) in splits.into_iter().enumerate() {
            let mut piece = split.to_string();
            if i < last_index {
                piece.push_str(separator);
            }

            if current_chunk.len() + piece.len() <= self.chunk_size {
                current_chunk.push_str(&piece);
                continue;
            }

            if !current_chunk.is_empty() {
                let end = current_start + current_chunk.len();
                chunks.push(TextChunk {
                    text: std::mem::take(&mut current_chunk),
                    start_char: current_start,
                    end_char: end,
                });
                current_start = end;
            }

            if piece.len() > self.chunk_size {
                let sub_chunks = self.split_by_characters(&piece, current_start);
                if let Some(last) = sub_chunks.last() {
                    current_start = last.end_char;
                }
                chunks.extend(sub_chunks);
            } else {
                current_chunk = piece;
            }
        }

        if !current_chunk.is_empty() {
            let end = current_start + current_chunk.len();
            chunks.push(TextChunk {
                text: current_chunk,
                start_char: current_start,
                end_char: end,
            });
        }

        chunks
    }

    /// Fixed-width fallback; cuts on character boundaries.
    fn split_by_characters(&self, text: &str, offset: usize) -> Vec<TextChunk> {
        let mut chunks = Vec::new();
        let mut slice_start = 0;

        while slice_start < text.len() {
            let mut slice_end = (slice_start + self.chunk_size).min(text.len());
            while !text.is_char_boundary(slice_end) {
                slice_end -= 1;
            }
            chunks.push(TextChunk {
                text: text[slice_start..slice_end].to_string(),
                start_char: offset + slice_start,
                end_char: offset + slice_end,
            });
            slice_start = slice_end;
        }

        chunks
    }

    /// Extend every chunk after the first backward into its predecessor,
    /// bounded by the overlap and the predecessor's own start.
    fn apply_overlap(&self, chunks: Vec<TextChunk>, full_text: &str) -> Vec<TextChunk> {
        if chunks.is_empty() || self.chunk_overlap == 0 {
            return chunks;
        }

        let mut overlapped: Vec<TextChunk> = Vec::with_capacity(chunks.len());

        for (i, chunk) in chunks.iter().enumerate() {
            if i == 0 {
                overlapped.push(chunk.clone());
                continue;
            }

            let floor = chunks[i - 1].start_char + 1;
            let mut overlap_start = chunk
                .start_char
                .saturating_sub(self.chunk_overlap)
                .max(floor)
                .min(chunk.start_char);
            while !full_text.is_char_boundary(overlap_start) {
                overlap_start += 1;
            }

            overlapped.push(TextChunk {
                text: full_text[overlap_start..chunk.end_char].to_string(),
                start_char: overlap_start,
                end_char: chunk.end_char,
            });
        }

        overlapped
    }
}
