//! Content segmentation: recursive splitting, code detection, markdown
//! fence extraction, and the smart chunker that composes them.

pub mod code_detector;
pub mod markdown;
pub mod smart_chunker;
pub mod text_splitter;

pub use code_detector::{CodeDetector, DetectionResult, Language};
pub use markdown::{MarkdownCodeExtractor, MarkdownSegment};
pub use smart_chunker::{Chunk, ModelHint, SmartChunker};
pub use text_splitter::{RecursiveTextSplitter, TextChunk};
