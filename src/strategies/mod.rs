//! Crawl strategies: single page, bounded-concurrency batch, and BFS
//! recursive frontier expansion.

pub mod batch;
pub mod recursive;
pub mod single_page;

pub use batch::{crawl_batch_with_progress, ProgressCallback};
pub use recursive::{crawl_recursive_with_progress, MemoryAdaptiveDispatcher, RecursiveOptions};
pub use single_page::{crawl_single_page, PageResult, SinglePageOptions};
