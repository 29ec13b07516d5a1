//! Per-job progress state and the phase → overall progress mapping.
//!
//! Overall progress is guaranteed monotonically non-decreasing: each phase
//! owns a fixed slice of 0–100 and phase-local progress is mapped into that
//! slice, clamped to never move backwards.

use crate::error::{Error, Result};
use crate::strategies::PageResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag, observable from every stage.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Error out of the current stage when cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

/// Mutable per-job progress record. Owned by the orchestration task; the
/// API reads snapshots through the job map.
#[derive(Debug, Clone)]
pub struct ProgressState {
    pub status: JobStatus,
    pub progress: u8,
    pub log: String,
    pub current_url: Option<String>,
    pub current_phase: String,
    pub phase_detail: Option<String>,
    pub total_pages: Option<usize>,
    pub processed_pages: usize,
    pub chunks_total: usize,
    pub chunks_processed: usize,
    pub summaries_generated: usize,
    pub embeddings_generated: usize,
    pub chunks_stored: usize,
    pub documents: Vec<PageResult>,
    pub requested_mode: Option<String>,
    pub project: Option<String>,
    pub dataset: Option<String>,
    pub last_progress_percentage: u8,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            status: JobStatus::Running,
            progress: 0,
            log: String::new(),
            current_url: None,
            current_phase: "initializing".to_string(),
            phase_detail: None,
            total_pages: None,
            processed_pages: 0,
            chunks_total: 0,
            chunks_processed: 0,
            summaries_generated: 0,
            embeddings_generated: 0,
            chunks_stored: 0,
            documents: Vec::new(),
            requested_mode: None,
            project: None,
            dataset: None,
            last_progress_percentage: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

// Overall progress slice owned by each phase.
const PHASE_RANGES: [(&str, u8, u8); 8] = [
    ("initializing", 0, 5),
    ("discovery", 5, 15),
    ("crawling", 15, 60),
    ("chunking", 60, 70),
    ("summarizing", 70, 80),
    ("embedding", 80, 92),
    ("storing", 92, 98),
    ("completed", 98, 100),
];

/// Maps phase-local progress to overall progress, never decreasing.
#[derive(Debug)]
pub struct ProgressMapper {
    last_overall: u8,
    current_phase: &'static str,
}

impl Default for ProgressMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressMapper {
    pub fn new() -> Self {
        Self {
            last_overall: 0,
            current_phase: "initializing",
        }
    }

    /// Map `phase_progress` (0–100 within the phase) to overall progress.
    /// Unknown phases keep the current value.
    pub fn map_progress(&mut self, phase: &str, phase_progress: u8) -> u8 {
        let Some((name, start, end)) = PHASE_RANGES
            .iter()
            .find(|(name, _, _)| *name == phase)
            .copied()
        else {
            return self.last_overall;
        };

        let phase_progress = phase_progress.min(100) as u32;
        let range = (end - start) as u32;
        let overall = start as u32 + (phase_progress * range) / 100;
        let overall = (overall as u8).max(self.last_overall);

        self.last_overall = overall;
        self.current_phase = name;
        overall
    }

    pub fn current_progress(&self) -> u8 {
        self.last_overall
    }

    pub fn current_phase(&self) -> &'static str {
        self.current_phase
    }
}
