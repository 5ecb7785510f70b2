//! Candidate scoring with degraded-mode fallback
//!
//! Scoring is skipped for a word's whole candidate set when it is disabled or
//! the resource gate is engaged; every candidate then gets the neutral score.

use std::sync::Arc;
use std::time::Duration;

use crate::models::{Candidate, NeutralReason, ScoreResult, ScoredCandidate};
use crate::services::resource_gate::ResourceGate;
use crate::services::vision_client::VisionScorer;

const DEFAULT_SCORE_TIMEOUT: Duration = Duration::from_secs(180);

/// How a candidate set will be scored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringMode {
    Model,
    Neutral(NeutralReason),
}

#[derive(Clone)]
pub struct CandidateScorer {
    scorer: Arc<dyn VisionScorer>,
    gate: ResourceGate,
    score_timeout: Duration,
}

impl CandidateScorer {
    pub fn new(scorer: Arc<dyn VisionScorer>, gate: ResourceGate) -> Self {
        Self {
            scorer,
            gate,
            score_timeout: DEFAULT_SCORE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, score_timeout: Duration) -> Self {
        self.score_timeout = score_timeout;
        self
    }

    /// Same scorer behind a gate with a different throttle threshold
    pub fn with_gate_threshold(&self, threshold_percent: u8) -> Self {
        Self {
            scorer: Arc::clone(&self.scorer),
            gate: self.gate.with_threshold(threshold_percent),
            score_timeout: self.score_timeout,
        }
    }

    pub fn gate(&self) -> &ResourceGate {
        &self.gate
    }

    pub fn scorer(&self) -> &Arc<dyn VisionScorer> {
        &self.scorer
    }

    /// Decide the scoring mode for the next candidate set
    pub async fn mode(&self, enabled: bool) -> ScoringMode {
        if !enabled {
            return ScoringMode::Neutral(NeutralReason::Disabled);
        }
        if self.gate.is_throttled().await {
            tracing::info!(
                threshold = self.gate.threshold_percent(),
                "GPU throttled, using neutral scores"
            );
            return ScoringMode::Neutral(NeutralReason::Throttled);
        }
        ScoringMode::Model
    }

    /// Score one candidate; a timed-out call gets the neutral score
    pub async fn evaluate(
        &self,
        candidate: &Candidate,
        word: &str,
        translation: &str,
        context: Option<&str>,
    ) -> ScoreResult {
        let call = self.scorer.score(&candidate.url, word, translation, context);
        match tokio::time::timeout(self.score_timeout, call).await {
            Ok(score) => score,
            Err(_) => {
                tracing::warn!(
                    word,
                    candidate = %candidate.id,
                    timeout_secs = self.score_timeout.as_secs(),
                    "Scoring timed out"
                );
                ScoreResult::neutral(NeutralReason::Failed)
            }
        }
    }

    /// Score a word's candidates in search order
    pub async fn score_all(
        &self,
        candidates: Vec<Candidate>,
        word: &str,
        translation: &str,
        context: Option<&str>,
        enabled: bool,
    ) -> Vec<ScoredCandidate> {
        let mode = self.mode(enabled).await;
        let mut scored = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let score = match mode {
                ScoringMode::Model => self.evaluate(&candidate, word, translation, context).await,
                ScoringMode::Neutral(reason) => ScoreResult::neutral(reason),
            };
            tracing::debug!(
                word,
                candidate = %candidate.id,
                total = score.total(),
                relevance = score.relevance,
                "Candidate scored"
            );
            scored.push(ScoredCandidate { candidate, score });
        }

        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScoreSource;
    use crate::services::resource_gate::{GpuUnit, UtilizationProbe};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProbe(Option<u8>);

    #[async_trait]
    impl UtilizationProbe for FixedProbe {
        async fn sample(&self) -> Option<Vec<GpuUnit>> {
            self.0.map(|utilization| {
                vec![GpuUnit {
                    index: 0,
                    name: "gpu".to_string(),
                    utilization_percent: utilization,
                    memory_used_mb: 0,
                    memory_total_mb: 1,
                }]
            })
        }
    }

    struct CountingScorer {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl VisionScorer for CountingScorer {
        async fn model_name(&self) -> Option<String> {
            Some("fake".to_string())
        }

        async fn check_model(&self) -> Option<String> {
            Some("fake".to_string())
        }

        async fn set_model(&self, _model: Option<String>) {}

        async fn score(&self, _url: &str, _word: &str, _translation: &str, _context: Option<&str>) -> ScoreResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            ScoreResult::from_model("fake", 9, 9, 9, 9, "good", true)
        }
    }

    fn scorer(utilization: Option<u8>, delay: Duration) -> (CandidateScorer, Arc<CountingScorer>) {
        let vision = Arc::new(CountingScorer {
            calls: AtomicUsize::new(0),
            delay,
        });
        let gate = ResourceGate::new(Arc::new(FixedProbe(utilization)), 75);
        (CandidateScorer::new(vision.clone(), gate), vision)
    }

    fn candidates() -> Vec<Candidate> {
        (0..3)
            .map(|i| Candidate::new(format!("p_{}", i), "p", format!("https://p/{}", i)))
            .collect()
    }

    #[tokio::test]
    async fn test_model_scoring_when_gate_open() {
        let (scorer, vision) = scorer(Some(10), Duration::ZERO);
        let scored = scorer.score_all(candidates(), "três", "three", None, true).await;
        assert_eq!(scored.len(), 3);
        assert!(scored.iter().all(|s| s.total() == 36));
        assert_eq!(vision.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_throttled_gate_skips_model() {
        let (scorer, vision) = scorer(Some(95), Duration::ZERO);
        let scored = scorer.score_all(candidates(), "três", "three", None, true).await;
        assert!(scored.iter().all(|s| s.total() == 20));
        assert!(scored.iter().all(|s| s.score.source
            == ScoreSource::Neutral {
                reason: NeutralReason::Throttled
            }));
        assert_eq!(vision.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disabled_scoring_is_neutral() {
        let (scorer, vision) = scorer(None, Duration::ZERO);
        assert_eq!(scorer.mode(false).await, ScoringMode::Neutral(NeutralReason::Disabled));
        let scored = scorer.score_all(candidates(), "três", "three", None, false).await;
        assert!(scored.iter().all(|s| !s.score.is_model_scored()));
        assert_eq!(vision.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_falls_back_to_neutral() {
        let (scorer, _) = scorer(None, Duration::from_secs(600));
        let scorer = scorer.with_timeout(Duration::from_secs(5));
        let score = scorer
            .evaluate(&Candidate::new("p_0", "p", "https://p/0"), "três", "three", None)
            .await;
        assert_eq!(
            score.source,
            ScoreSource::Neutral {
                reason: NeutralReason::Failed
            }
        );
    }
}
