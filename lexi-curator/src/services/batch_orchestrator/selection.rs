//! Selection policy
//!
//! Candidates are ranked by total score (stable, so ties keep search order)
//! and the first one passing both the total-score gate and the relevance
//! gate wins.

use crate::models::{BatchConfig, ScoredCandidate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionPolicy {
    pub min_total: u32,
    pub min_relevance: u8,
}

impl SelectionPolicy {
    pub fn new(min_total: u32, min_relevance: u8) -> Self {
        Self {
            min_total,
            min_relevance,
        }
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(config.min_score, config.min_relevance)
    }

    /// Best total first; equal totals keep their original order
    pub fn rank(mut scored: Vec<ScoredCandidate>) -> Vec<ScoredCandidate> {
        scored.sort_by(|a, b| b.total().cmp(&a.total()));
        scored
    }

    /// Index of the winner within a ranked list
    pub fn choose(&self, ranked: &[ScoredCandidate]) -> Option<usize> {
        ranked
            .iter()
            .position(|c| c.qualifies(self.min_total, self.min_relevance))
    }

    /// Why nothing qualified, for the per-word failure message
    pub fn explain_rejection(&self, ranked: &[ScoredCandidate]) -> String {
        match ranked.first() {
            Some(best) => format!(
                "no candidate met min score {} and min relevance {} (best: total {}, relevance {})",
                self.min_total,
                self.min_relevance,
                best.total(),
                best.relevance()
            ),
            None => "no candidates".to_string(),
        }
    }
}
