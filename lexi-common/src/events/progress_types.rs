//! Supporting types carried by curation events

use serde::{Deserialize, Serialize};

/// Point-in-time counters of a running batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Words in the batch after filtering
    pub total: usize,
    /// Words finished (success, failure or skip)
    pub processed: usize,
    /// Words that got a selected image
    pub successful: usize,
    /// Words that ended without a selection
    pub failed: usize,
    /// Words skipped because a selection already existed
    pub skipped: usize,
    /// Word currently being worked on
    pub current_word: Option<String>,
    pub elapsed_seconds: u64,
}

impl ProgressSnapshot {
    /// Completion ratio in 0.0..=1.0
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.processed as f64 / self.total as f64
    }
}

/// Compact view of a scored candidate for live displays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub provider: String,
    pub url: String,
    pub score_total: u32,
    pub relevance: u8,
    /// False when the score is the neutral fallback rather than a model verdict
    pub model_scored: bool,
}
