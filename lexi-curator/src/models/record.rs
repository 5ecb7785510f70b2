//! Persisted curation records, audit trail and work queue

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::models::{Candidate, ScoreResult};

/// Lifecycle status of a curation record
///
/// `candidate` → `selected` | `rejected`. At most one `selected` per word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurationStatus {
    Candidate,
    Selected,
    Rejected,
}

impl CurationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CurationStatus::Candidate => "candidate",
            CurationStatus::Selected => "selected",
            CurationStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for CurationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CurationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "candidate" => Ok(CurationStatus::Candidate),
            "selected" => Ok(CurationStatus::Selected),
            "rejected" => Ok(CurationStatus::Rejected),
            other => Err(format!("Unknown curation status: {}", other)),
        }
    }
}

/// Authoritative row for one candidate attempt against one word
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurationRecord {
    pub id: i64,
    pub word: String,
    pub word_id: Option<String>,
    pub lesson_id: Option<String>,
    pub category: Option<String>,
    pub provider: String,
    /// Provider-qualified candidate identifier
    pub source_id: Option<String>,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub local_path: Option<String>,
    pub format: Option<String>,
    pub file_size: Option<i64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub photographer: Option<String>,
    pub attribution: Option<String>,
    pub license: Option<String>,
    pub alt_text: Option<String>,
    pub tags: Vec<String>,
    pub score_relevance: Option<i64>,
    pub score_clarity: Option<i64>,
    pub score_appropriateness: Option<i64>,
    pub score_quality: Option<i64>,
    pub score_total: Option<i64>,
    pub score_reason: Option<String>,
    pub scoring_model: Option<String>,
    pub scored_at: Option<DateTime<Utc>>,
    pub status: CurationStatus,
    pub manually_verified: bool,
    pub verified_by: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for `add_candidate`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCandidateRecord {
    pub word: String,
    pub word_id: Option<String>,
    pub lesson_id: Option<String>,
    pub category: Option<String>,
    pub provider: String,
    pub source_id: Option<String>,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub photographer: Option<String>,
    pub attribution: Option<String>,
    pub license: Option<String>,
    pub alt_text: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub score_relevance: Option<i64>,
    pub score_clarity: Option<i64>,
    pub score_appropriateness: Option<i64>,
    pub score_quality: Option<i64>,
    pub score_total: Option<i64>,
    pub score_reason: Option<String>,
    pub scoring_model: Option<String>,
}

impl NewCandidateRecord {
    /// Build the record for a scored candidate of a vocabulary word
    pub fn from_scored(
        word: &str,
        word_id: Option<&str>,
        lesson_id: Option<&str>,
        category: Option<&str>,
        candidate: &Candidate,
        score: &ScoreResult,
    ) -> Self {
        let scoring_model = match score.model() {
            Some(model) => Some(model.to_string()),
            None => Some("neutral".to_string()),
        };

        Self {
            word: word.to_string(),
            word_id: word_id.map(str::to_string),
            lesson_id: lesson_id.filter(|l| !l.is_empty()).map(str::to_string),
            category: category.map(str::to_string),
            provider: candidate.provider.clone(),
            source_id: Some(candidate.id.clone()),
            url: candidate.url.clone(),
            thumbnail_url: candidate.thumbnail_url.clone(),
            width: candidate.width.map(i64::from),
            height: candidate.height.map(i64::from),
            photographer: candidate.photographer.clone(),
            attribution: candidate.attribution.clone(),
            license: candidate.license.clone(),
            alt_text: candidate.alt_text.clone(),
            tags: candidate.tags.clone(),
            score_relevance: Some(score.relevance as i64),
            score_clarity: Some(score.clarity as i64),
            score_appropriateness: Some(score.appropriateness as i64),
            score_quality: Some(score.quality as i64),
            score_total: Some(score.total() as i64),
            score_reason: Some(score.reason.clone()),
            scoring_model,
        }
    }
}

/// Audited action tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Created,
    Updated,
    Selected,
    Rejected,
    Verified,
    Deleted,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Created => "created",
            AuditAction::Updated => "updated",
            AuditAction::Selected => "selected",
            AuditAction::Rejected => "rejected",
            AuditAction::Verified => "verified",
            AuditAction::Deleted => "deleted",
        }
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(AuditAction::Created),
            "updated" => Ok(AuditAction::Updated),
            "selected" => Ok(AuditAction::Selected),
            "rejected" => Ok(AuditAction::Rejected),
            "verified" => Ok(AuditAction::Verified),
            "deleted" => Ok(AuditAction::Deleted),
            other => Err(format!("Unknown audit action: {}", other)),
        }
    }
}

/// Append-only audit row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub record_id: i64,
    pub action: AuditAction,
    pub actor: String,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Audit row joined with the record it refers to (if it still exists)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    #[serde(flatten)]
    pub entry: AuditEntry,
    pub word: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Completed => "completed",
        }
    }
}

impl FromStr for QueueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QueueStatus::Pending),
            "processing" => Ok(QueueStatus::Processing),
            "completed" => Ok(QueueStatus::Completed),
            other => Err(format!("Unknown queue status: {}", other)),
        }
    }
}

/// A (word, lesson) pair queued for processing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: i64,
    pub word: String,
    pub translation: String,
    /// Empty string when the word has no lesson
    pub lesson_id: String,
    pub category: Option<String>,
    pub word_id: Option<String>,
    pub priority: i64,
    pub status: QueueStatus,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
}

/// Filters for `search`; every field is optional and combined with AND
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordFilter {
    /// Substring match on the word
    pub word: Option<String>,
    pub lesson_id: Option<String>,
    pub category: Option<String>,
    pub status: Option<CurationStatus>,
    pub provider: Option<String>,
    pub min_score: Option<i64>,
    pub verified: Option<bool>,
}

/// Aggregate counts over the store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibraryStatistics {
    pub total_records: i64,
    pub by_status: BTreeMap<String, i64>,
    pub by_provider: BTreeMap<String, i64>,
    pub by_category: BTreeMap<String, i64>,
    pub words_with_selection: i64,
    pub average_score: Option<f64>,
    pub verified_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            CurationStatus::Candidate,
            CurationStatus::Selected,
            CurationStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<CurationStatus>(), Ok(status));
        }
        assert!("archived".parse::<CurationStatus>().is_err());
    }

    #[test]
    fn test_from_scored_marks_neutral_model() {
        let candidate = Candidate::new("pexels_1", "pexels", "https://img/1.jpg");
        let score = ScoreResult::neutral(crate::models::NeutralReason::Disabled);

        let record =
            NewCandidateRecord::from_scored("três", None, Some(""), Some("numbers"), &candidate, &score);
        assert_eq!(record.scoring_model.as_deref(), Some("neutral"));
        assert_eq!(record.score_total, Some(20));
        assert_eq!(record.lesson_id, None, "empty lesson ids are stored as NULL");
        assert_eq!(record.source_id.as_deref(), Some("pexels_1"));
    }
}
