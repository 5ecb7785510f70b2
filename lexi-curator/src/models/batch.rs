//! Batch run configuration and state machine
//!
//! Idle → Running → (Paused ⇄ Running) → Completed | Stopped

use chrono::{DateTime, Utc};
use lexi_common::events::ProgressSnapshot;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::error::WordFailure;

/// One vocabulary entry submitted for curation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyItem {
    #[serde(default)]
    pub word_id: Option<String>,
    pub word: String,
    pub translation: String,
    #[serde(default)]
    pub lesson_id: String,
    #[serde(default)]
    pub category: Option<String>,
}

/// Explicit batch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Vision model; empty means auto-detect
    #[serde(default)]
    pub vision_model: Option<String>,
    #[serde(default = "default_candidates_per_word")]
    pub candidates_per_word: usize,
    /// Minimum total score out of 40
    #[serde(default = "default_min_score")]
    pub min_score: u32,
    /// Minimum relevance criterion out of 10
    #[serde(default = "default_min_relevance")]
    pub min_relevance: u8,
    /// GPU utilization percentage at which scoring is skipped
    #[serde(default = "default_gpu_throttle_percent")]
    pub gpu_throttle_percent: u8,
    /// Persist non-winning candidates as `rejected`
    #[serde(default = "default_true")]
    pub save_rejected: bool,
    #[serde(default = "default_true")]
    pub download_images: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_true")]
    pub use_cache: bool,
    #[serde(default = "default_true")]
    pub scoring_enabled: bool,
    /// Pacing delay between words
    #[serde(default = "default_word_delay_ms")]
    pub word_delay_ms: u64,
    /// Substring match on lesson id
    #[serde(default)]
    pub lesson_filter: Option<String>,
    /// Exact category match
    #[serde(default)]
    pub category_filter: Option<String>,
    /// Explicit list of words to process
    #[serde(default)]
    pub word_filter: Vec<String>,
}

fn default_candidates_per_word() -> usize {
    5
}

fn default_min_score() -> u32 {
    28
}

fn default_min_relevance() -> u8 {
    7
}

fn default_gpu_throttle_percent() -> u8 {
    75
}

fn default_word_delay_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            vision_model: None,
            candidates_per_word: default_candidates_per_word(),
            min_score: default_min_score(),
            min_relevance: default_min_relevance(),
            gpu_throttle_percent: default_gpu_throttle_percent(),
            save_rejected: true,
            download_images: true,
            dry_run: false,
            use_cache: true,
            scoring_enabled: true,
            word_delay_ms: default_word_delay_ms(),
            lesson_filter: None,
            category_filter: None,
            word_filter: Vec::new(),
        }
    }
}

impl BatchConfig {
    /// Whether an item passes the lesson/category/word filters
    pub fn accepts(&self, item: &VocabularyItem) -> bool {
        if let Some(lesson) = &self.lesson_filter {
            if !item.lesson_id.contains(lesson.as_str()) {
                return false;
            }
        }
        if let Some(category) = &self.category_filter {
            if item.category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }
        if !self.word_filter.is_empty() && !self.word_filter.iter().any(|w| w == &item.word) {
            return false;
        }
        true
    }
}

/// Batch run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchState {
    Idle,
    Running,
    Paused,
    Completed,
    Stopped,
}

impl BatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchState::Idle => "idle",
            BatchState::Running => "running",
            BatchState::Paused => "paused",
            BatchState::Completed => "completed",
            BatchState::Stopped => "stopped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchState::Completed | BatchState::Stopped)
    }

    /// Allowed transitions of the batch state machine
    pub fn can_transition_to(&self, next: BatchState) -> bool {
        use BatchState::*;
        matches!(
            (self, next),
            (Idle, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Completed)
                | (Running, Stopped)
                | (Paused, Stopped)
        )
    }
}

#[derive(Debug, Error)]
#[error("Invalid batch transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: BatchState,
    pub to: BatchState,
}

/// Batch state transition event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub batch_id: Uuid,
    pub old_state: BatchState,
    pub new_state: BatchState,
    pub transitioned_at: DateTime<Utc>,
}

/// In-memory session of one batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSession {
    pub batch_id: Uuid,
    pub state: BatchState,
    pub config: BatchConfig,
    pub progress: ProgressSnapshot,
    pub failures: Vec<WordFailure>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl BatchSession {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            state: BatchState::Idle,
            config,
            progress: ProgressSnapshot::default(),
            failures: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Transition to new state, rejecting moves the state machine does not allow
    pub fn transition_to(&mut self, new_state: BatchState) -> Result<StateTransition, InvalidTransition> {
        if !self.state.can_transition_to(new_state) {
            return Err(InvalidTransition {
                from: self.state,
                to: new_state,
            });
        }

        let transition = StateTransition {
            batch_id: self.batch_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        if new_state == BatchState::Running && self.progress.processed == 0 {
            self.started_at = transition.transitioned_at;
        }
        if new_state.is_terminal() {
            self.ended_at = Some(transition.transitioned_at);
        }

        Ok(transition)
    }

    pub fn update_elapsed(&mut self) {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        self.progress.elapsed_seconds = (end - self.started_at).num_seconds().max(0) as u64;
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            batch_id: self.batch_id,
            state: self.state,
            total: self.progress.total,
            processed: self.progress.processed,
            successful: self.progress.successful,
            failed: self.progress.failed,
            skipped: self.progress.skipped,
            completed: self.state == BatchState::Completed,
            dry_run: self.config.dry_run,
            elapsed_seconds: self.progress.elapsed_seconds,
            failures: self.failures.clone(),
        }
    }
}

/// Final (or current) outcome of a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: Uuid,
    pub state: BatchState,
    pub total: usize,
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    /// False when stopped before every word was processed
    pub completed: bool,
    pub dry_run: bool,
    pub elapsed_seconds: u64,
    pub failures: Vec<WordFailure>,
}
