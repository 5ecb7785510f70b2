//! Image candidates and their scores

use serde::{Deserialize, Serialize};

/// Highest value of a single scoring criterion
pub const MAX_CRITERION: u8 = 10;

/// Highest possible total across the four criteria
pub const MAX_TOTAL: u32 = 40;

/// Value every criterion receives when no model verdict is available
pub const NEUTRAL_CRITERION: u8 = 5;

/// An externally sourced image proposal for one word
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Provider-qualified identifier, e.g. `pexels_12345`
    pub id: String,
    pub provider: String,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub photographer: Option<String>,
    pub attribution: Option<String>,
    pub license: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub alt_text: Option<String>,
}

impl Candidate {
    /// Minimal candidate; adapters fill in the optional metadata
    pub fn new(id: impl Into<String>, provider: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            provider: provider.into(),
            url: url.into(),
            thumbnail_url: None,
            width: None,
            height: None,
            photographer: None,
            attribution: None,
            license: None,
            tags: Vec::new(),
            alt_text: None,
        }
    }
}

/// Why a candidate carries the neutral score instead of a model verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeutralReason {
    /// Resource gate reported the GPU as saturated
    Throttled,
    /// Scoring turned off in the batch configuration
    Disabled,
    /// Model answered but nothing usable could be parsed
    Unparsable,
    /// Scoring call errored or timed out
    Failed,
}

impl NeutralReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            NeutralReason::Throttled => "throttled",
            NeutralReason::Disabled => "disabled",
            NeutralReason::Unparsable => "unparsable",
            NeutralReason::Failed => "failed",
        }
    }
}

/// Where a score came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoreSource {
    Model { model: String },
    Neutral { reason: NeutralReason },
}

/// Four-criterion rubric result (each criterion 0-10, total 0-40)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub relevance: u8,
    pub clarity: u8,
    pub appropriateness: u8,
    pub quality: u8,
    pub reason: String,
    pub recommended: bool,
    pub source: ScoreSource,
}

impl ScoreResult {
    /// Model verdict; criteria above 10 are clamped
    pub fn from_model(
        model: impl Into<String>,
        relevance: u8,
        clarity: u8,
        appropriateness: u8,
        quality: u8,
        reason: impl Into<String>,
        recommended: bool,
    ) -> Self {
        Self {
            relevance: relevance.min(MAX_CRITERION),
            clarity: clarity.min(MAX_CRITERION),
            appropriateness: appropriateness.min(MAX_CRITERION),
            quality: quality.min(MAX_CRITERION),
            reason: reason.into(),
            recommended,
            source: ScoreSource::Model {
                model: model.into(),
            },
        }
    }

    /// Midpoint score used whenever the model cannot give a verdict
    pub fn neutral(reason: NeutralReason) -> Self {
        Self {
            relevance: NEUTRAL_CRITERION,
            clarity: NEUTRAL_CRITERION,
            appropriateness: NEUTRAL_CRITERION,
            quality: NEUTRAL_CRITERION,
            reason: format!("Neutral score ({})", reason.as_str()),
            recommended: false,
            source: ScoreSource::Neutral { reason },
        }
    }

    pub fn total(&self) -> u32 {
        self.relevance as u32 + self.clarity as u32 + self.appropriateness as u32 + self.quality as u32
    }

    /// Total on a 0.0-1.0 scale
    pub fn normalized(&self) -> f64 {
        self.total() as f64 / MAX_TOTAL as f64
    }

    pub fn is_model_scored(&self) -> bool {
        matches!(self.source, ScoreSource::Model { .. })
    }

    /// Model identifier, if a model produced this score
    pub fn model(&self) -> Option<&str> {
        match &self.source {
            ScoreSource::Model { model } => Some(model),
            ScoreSource::Neutral { .. } => None,
        }
    }
}

/// A candidate paired with its score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: ScoreResult,
}

impl ScoredCandidate {
    pub fn total(&self) -> u32 {
        self.score.total()
    }

    pub fn relevance(&self) -> u8 {
        self.score.relevance
    }

    /// Whether this candidate passes both selection gates
    pub fn qualifies(&self, min_total: u32, min_relevance: u8) -> bool {
        self.total() >= min_total && self.relevance() >= min_relevance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neutral_score_is_midpoint() {
        let score = ScoreResult::neutral(NeutralReason::Throttled);
        assert_eq!(score.total(), 20);
        assert!((score.normalized() - 0.5).abs() < f64::EPSILON);
        assert!(!score.is_model_scored());
        assert_eq!(score.model(), None);
    }

    #[test]
    fn test_model_score_clamps_criteria() {
        let score = ScoreResult::from_model("llava", 12, 9, 10, 8, "ok", true);
        assert_eq!(score.relevance, 10);
        assert_eq!(score.total(), 37);
        assert_eq!(score.model(), Some("llava"));
    }

    #[test]
    fn test_qualifies_requires_both_gates() {
        let high_total_low_relevance = ScoredCandidate {
            candidate: Candidate::new("a", "p", "http://a"),
            score: ScoreResult::from_model("m", 5, 10, 10, 7, "", false),
        };
        assert_eq!(high_total_low_relevance.total(), 32);
        assert!(!high_total_low_relevance.qualifies(28, 7));

        let balanced = ScoredCandidate {
            candidate: Candidate::new("b", "p", "http://b"),
            score: ScoreResult::from_model("m", 8, 7, 7, 7, "", true),
        };
        assert_eq!(balanced.total(), 29);
        assert!(balanced.qualifies(28, 7));
    }

    #[test]
    fn test_score_source_serialization() {
        let neutral = ScoreResult::neutral(NeutralReason::Disabled);
        let json = serde_json::to_value(&neutral).unwrap();
        assert_eq!(json["source"]["kind"], "neutral");
        assert_eq!(json["source"]["reason"], "disabled");
    }
}
