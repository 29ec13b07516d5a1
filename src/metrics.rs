//! Prometheus-style metrics collection for Ops observability.
//!
//! Atomic counters and a sliding latency window exposed via the `/metrics`
//! endpoint in Prometheus text exposition format. Also home to the process
//! RSS sampler used by the memory-adaptive dispatcher.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Maximum latency samples to keep for P99 calculation
const LATENCY_WINDOW_SIZE: usize = 1000;

/// Collects and exposes Prometheus-format metrics
pub struct MetricsCollector {
    /// Pages fetched across all jobs since startup
    pub pages_crawled: AtomicU64,
    /// Chunks written to any store since startup
    pub chunks_stored: AtomicU64,
    /// Crawl jobs submitted since startup
    pub jobs_submitted: AtomicU64,
    /// Search requests served since startup
    pub search_count: AtomicU64,
    /// Sliding window of recent search latencies (ms)
    search_latencies: RwLock<VecDeque<f64>>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            pages_crawled: AtomicU64::new(0),
            chunks_stored: AtomicU64::new(0),
            jobs_submitted: AtomicU64::new(0),
            search_count: AtomicU64::new(0),
            search_latencies: RwLock::new(VecDeque::with_capacity(LATENCY_WINDOW_SIZE)),
        }
    }

    pub fn record_pages(&self, count: u64) {
        self.pages_crawled.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_chunks_stored(&self, count: u64) {
        self.chunks_stored.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_job(&self) {
        self.jobs_submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a search request with its latency
    pub fn record_search(&self, latency_ms: f64) {
        self.search_count.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut latencies) = self.search_latencies.write() {
            if latencies.len() >= LATENCY_WINDOW_SIZE {
                latencies.pop_front();
            }
            latencies.push_back(latency_ms);
        }
    }

    /// Calculate P99 latency from the sliding window
    pub fn get_p99_latency(&self) -> f64 {
        if let Ok(latencies) = self.search_latencies.read() {
            if latencies.is_empty() {
                return 0.0;
            }

            let mut sorted: Vec<f64> = latencies.iter().copied().collect();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

            let p99_index = ((sorted.len() as f64) * 0.99).ceil() as usize - 1;
            let p99_index = p99_index.min(sorted.len() - 1);
            sorted[p99_index]
        } else {
            0.0
        }
    }

    /// Render counters in Prometheus text exposition format
    pub fn render(&self) -> String {
        format!(
            "# TYPE crawldex_pages_crawled_total counter\n\
             crawldex_pages_crawled_total {}\n\
             # TYPE crawldex_chunks_stored_total counter\n\
             crawldex_chunks_stored_total {}\n\
             # TYPE crawldex_jobs_submitted_total counter\n\
             crawldex_jobs_submitted_total {}\n\
             # TYPE crawldex_search_total counter\n\
             crawldex_search_total {}\n\
             # TYPE crawldex_search_p99_ms gauge\n\
             crawldex_search_p99_ms {}\n\
             # TYPE crawldex_memory_rss_bytes gauge\n\
             crawldex_memory_rss_bytes {}\n",
            self.pages_crawled.load(Ordering::Relaxed),
            self.chunks_stored.load(Ordering::Relaxed),
            self.jobs_submitted.load(Ordering::Relaxed),
            self.search_count.load(Ordering::Relaxed),
            self.get_p99_latency(),
            get_memory_usage_bytes(),
        )
    }
}

/// Get current process memory usage in bytes (RSS)
/// Uses getrusage() which works on both Linux and macOS
pub fn get_memory_usage_bytes() -> u64 {
    #[cfg(unix)]
    {
        use std::mem::MaybeUninit;

        let mut rusage = MaybeUninit::<libc::rusage>::uninit();
        let ret = unsafe { libc::getrusage(libc::RUSAGE_SELF, rusage.as_mut_ptr()) };

        if ret == 0 {
            let rusage = unsafe { rusage.assume_init() };
            // ru_maxrss is in kilobytes on Linux, bytes on macOS
            #[cfg(target_os = "macos")]
            {
                rusage.ru_maxrss as u64
            }
            #[cfg(not(target_os = "macos"))]
            {
                (rusage.ru_maxrss as u64) * 1024
            }
        } else {
            0
        }
    }
    #[cfg(not(unix))]
    {
        0
    }
}

/// Total system memory in bytes, from /proc/meminfo on Linux. Returns 0 when
/// unavailable, which disables percentage-based throttling.
pub fn get_total_memory_bytes() -> u64 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(contents) = std::fs::read_to_string("/proc/meminfo") {
            for line in contents.lines() {
                if let Some(rest) = line.strip_prefix("MemTotal:") {
                    let kb: u64 = rest
                        .trim()
                        .trim_end_matches("kB")
                        .trim()
                        .parse()
                        .unwrap_or(0);
                    return kb * 1024;
                }
            }
        }
        0
    }
    #[cfg(not(target_os = "linux"))]
    {
        0
    }
}
