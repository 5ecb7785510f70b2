//! Vision-model scoring collaborator (Ollama)
//!
//! The scorer never fails: model errors and unparsable answers produce the
//! neutral score so the pipeline can keep going.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::VisionConfig;
use crate::models::{NeutralReason, ScoreResult};

/// Preferred models, best first
const MODEL_PREFERENCES: &[&str] = &[
    "llama3.2-vision:11b",
    "llama3.2-vision",
    "llava:13b",
    "llava:7b",
    "llava",
];

const IMAGE_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Totals at or above this are recommended when the model omits a verdict
const RECOMMEND_TOTAL: u32 = 28;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Model service error {0}: {1}")]
    Api(u16, String),

    #[error("No vision model available")]
    NoModel,
}

impl From<reqwest::Error> for VisionError {
    fn from(err: reqwest::Error) -> Self {
        VisionError::Network(err.to_string())
    }
}

/// Opaque scoring collaborator
#[async_trait]
pub trait VisionScorer: Send + Sync {
    /// Model in use, once known
    async fn model_name(&self) -> Option<String>;

    /// Confirm a model is available, auto-detecting one if none is configured
    async fn check_model(&self) -> Option<String>;

    /// Use a specific model; `None` returns to auto-detection
    async fn set_model(&self, model: Option<String>);

    /// Score one image for one word
    async fn score(
        &self,
        image_url: &str,
        word: &str,
        translation: &str,
        context: Option<&str>,
    ) -> ScoreResult;
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

/// Ollama HTTP client
pub struct OllamaVisionClient {
    http_client: reqwest::Client,
    download_client: reqwest::Client,
    host: String,
    num_gpu: Option<u32>,
    model: RwLock<Option<String>>,
}

impl OllamaVisionClient {
    pub fn new(config: &VisionConfig) -> Result<Self, VisionError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        let download_client = reqwest::Client::builder()
            .timeout(IMAGE_DOWNLOAD_TIMEOUT)
            .build()?;

        Ok(Self {
            http_client,
            download_client,
            host: config.host.trim_end_matches('/').to_string(),
            num_gpu: config.num_gpu,
            model: RwLock::new(config.model.clone().filter(|m| !m.trim().is_empty())),
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, VisionError> {
        let response = self
            .http_client
            .get(format!("{}/api/tags", self.host))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(VisionError::Api(response.status().as_u16(), "tags".to_string()));
        }
        let tags: TagsResponse = response.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn fetch_image_base64(&self, image_url: &str) -> Result<String, VisionError> {
        let response = self.download_client.get(image_url).send().await?;
        if !response.status().is_success() {
            return Err(VisionError::Api(response.status().as_u16(), image_url.to_string()));
        }
        let bytes = response.bytes().await?;
        Ok(base64::engine::general_purpose::STANDARD.encode(&bytes))
    }

    async fn chat(&self, model: &str, prompt: String, image: String) -> Result<String, VisionError> {
        let mut body = json!({
            "model": model,
            "messages": [{
                "role": "user",
                "content": prompt,
                "images": [image],
            }],
            "stream": false,
        });
        if let Some(num_gpu) = self.num_gpu {
            body["options"] = json!({ "num_gpu": num_gpu });
        }

        let response = self
            .http_client
            .post(format!("{}/api/chat", self.host))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(VisionError::Api(status, text.chars().take(200).collect()));
        }

        let chat: ChatResponse = response.json().await?;
        Ok(chat.message.content)
    }

    async fn try_score(
        &self,
        image_url: &str,
        word: &str,
        translation: &str,
        context: Option<&str>,
    ) -> Result<ScoreResult, VisionError> {
        let model = self.check_model().await.ok_or(VisionError::NoModel)?;
        let image = self.fetch_image_base64(image_url).await?;
        let answer = self
            .chat(&model, scoring_prompt(word, translation, context), image)
            .await?;
        Ok(parse_score_response(&model, &answer))
    }
}

#[async_trait]
impl VisionScorer for OllamaVisionClient {
    async fn model_name(&self) -> Option<String> {
        self.model.read().await.clone()
    }

    async fn check_model(&self) -> Option<String> {
        let configured = self.model.read().await.clone();

        let available = match self.list_models().await {
            Ok(models) => models,
            Err(e) => {
                tracing::warn!(host = %self.host, "Vision model service unreachable: {}", e);
                return None;
            }
        };

        if let Some(model) = configured {
            let found = available
                .iter()
                .any(|m| m == &model || m.split(':').next() == Some(model.as_str()));
            if !found {
                tracing::warn!(model = %model, "Configured vision model not installed");
                return None;
            }
            return Some(model);
        }

        let detected = detect_model(&available)?;
        tracing::info!(model = %detected, "Auto-detected vision model");
        *self.model.write().await = Some(detected.clone());
        Some(detected)
    }

    async fn set_model(&self, model: Option<String>) {
        *self.model.write().await = model.filter(|m| !m.trim().is_empty());
    }

    async fn score(
        &self,
        image_url: &str,
        word: &str,
        translation: &str,
        context: Option<&str>,
    ) -> ScoreResult {
        match self.try_score(image_url, word, translation, context).await {
            Ok(score) => score,
            Err(e) => {
                tracing::warn!(word, image_url, "Vision scoring failed: {}", e);
                ScoreResult::neutral(NeutralReason::Failed)
            }
        }
    }
}

/// Pick the best installed model from the preference list
pub fn detect_model(available: &[String]) -> Option<String> {
    for preferred in MODEL_PREFERENCES {
        if let Some(found) = available
            .iter()
            .find(|m| m.as_str() == *preferred || m.split(':').next() == Some(*preferred))
        {
            return Some(found.clone());
        }
    }

    available
        .iter()
        .find(|m| {
            let lower = m.to_lowercase();
            lower.contains("vision") || lower.contains("llava")
        })
        .cloned()
}

/// Four-criterion rubric prompt
pub fn scoring_prompt(word: &str, translation: &str, context: Option<&str>) -> String {
    let context_line = context
        .filter(|c| !c.trim().is_empty())
        .map(|c| format!("Context: {}\n", c))
        .unwrap_or_default();

    format!(
        "You are evaluating if this image is appropriate for teaching the Portuguese word \"{word}\" (meaning: \"{translation}\").\n\
         {context_line}\n\
         Score the image on these criteria (0-10 each):\n\
         1. RELEVANCE: Does the image clearly show/represent \"{translation}\"?\n\
         2. CLARITY: Is the main subject clear and unambiguous?\n\
         3. APPROPRIATENESS: Is it suitable for educational content (all ages)?\n\
         4. QUALITY: Is the image well-composed and professional-looking?\n\
         \n\
         Respond ONLY with valid JSON in this exact format:\n\
         {{\"relevance\": X, \"clarity\": X, \"appropriateness\": X, \"quality\": X, \"reason\": \"brief 1-2 sentence explanation\", \"recommended\": true/false}}\n\
         \n\
         Be strict: only recommend (true) if total score >= 28/40 AND relevance >= 7."
    )
}

#[derive(Debug, Deserialize)]
struct RubricAnswer {
    relevance: f64,
    clarity: f64,
    appropriateness: f64,
    quality: f64,
    #[serde(default)]
    reason: String,
    recommended: Option<bool>,
}

fn criterion(value: f64) -> u8 {
    value.clamp(0.0, 10.0).round() as u8
}

/// Parse the model's answer into a score
///
/// Tries the first flat `{...}` JSON object, then the first four standalone
/// integers 0-10, then gives up with the neutral score.
pub fn parse_score_response(model: &str, text: &str) -> ScoreResult {
    for object in flat_json_objects(text) {
        if let Ok(answer) = serde_json::from_str::<RubricAnswer>(object) {
            let (r, c, a, q) = (
                criterion(answer.relevance),
                criterion(answer.clarity),
                criterion(answer.appropriateness),
                criterion(answer.quality),
            );
            let total = r as u32 + c as u32 + a as u32 + q as u32;
            let recommended = answer.recommended.unwrap_or(total >= RECOMMEND_TOTAL);
            return ScoreResult::from_model(model, r, c, a, q, answer.reason, recommended);
        }
    }

    let numbers = standalone_integers(text);
    if numbers.len() >= 4 {
        let (r, c, a, q) = (numbers[0], numbers[1], numbers[2], numbers[3]);
        let total = r as u32 + c as u32 + a as u32 + q as u32;
        let reason: String = text.chars().take(200).collect();
        return ScoreResult::from_model(model, r, c, a, q, reason, total >= RECOMMEND_TOTAL);
    }

    tracing::debug!(model, "Unparsable scoring response");
    ScoreResult::neutral(NeutralReason::Unparsable)
}

/// `{...}` spans containing no nested braces
fn flat_json_objects(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || loop {
        let start = rest.find('{')?;
        let after = &rest[start + 1..];
        let end = after.find(['{', '}'])?;
        if after.as_bytes()[end] == b'{' {
            rest = &rest[start + 1 + end..];
            continue;
        }
        let object = &rest[start..start + 1 + end + 1];
        rest = &after[end + 1..];
        return Some(object);
    })
}

/// Integers 0-10 that stand alone (not part of a longer number)
fn standalone_integers(text: &str) -> Vec<u8> {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty() && s.len() <= 2)
        .filter_map(|s| s.parse::<u8>().ok())
        .filter(|n| *n <= 10)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScoreSource;

    #[test]
    fn test_parse_json_answer() {
        let text = r#"Sure! Here is my evaluation:
            {"relevance": 9, "clarity": 8, "appropriateness": 10, "quality": 7, "reason": "Three apples on a table.", "recommended": true}
            Hope this helps."#;
        let score = parse_score_response("llava", text);
        assert_eq!(score.total(), 34);
        assert_eq!(score.relevance, 9);
        assert!(score.recommended);
        assert_eq!(score.reason, "Three apples on a table.");
        assert_eq!(score.source, ScoreSource::Model { model: "llava".to_string() });
    }

    #[test]
    fn test_parse_clamps_out_of_range() {
        let score = parse_score_response(
            "m",
            r#"{"relevance": 12, "clarity": -1, "appropriateness": 7.6, "quality": 5, "reason": ""}"#,
        );
        assert_eq!((score.relevance, score.clarity, score.appropriateness), (10, 0, 8));
        assert!(!score.recommended, "23 is below the recommend total");
    }

    #[test]
    fn test_parse_number_fallback() {
        let score = parse_score_response("m", "Relevance 8, clarity 7, appropriateness 9 and quality 6 (2024 photo)");
        assert_eq!(score.total(), 30);
        assert!(score.recommended);
        assert!(score.is_model_scored());
    }

    #[test]
    fn test_parse_unparsable_is_neutral() {
        let score = parse_score_response("m", "I cannot evaluate this image.");
        assert_eq!(score.total(), 20);
        assert_eq!(
            score.source,
            ScoreSource::Neutral {
                reason: NeutralReason::Unparsable
            }
        );
    }

    #[test]
    fn test_flat_json_objects_skips_nested() {
        let found: Vec<_> = flat_json_objects(r#"{"a": {"b": 1}} {"c": 2}"#).collect();
        assert_eq!(found, vec![r#"{"b": 1}"#, r#"{"c": 2}"#]);
    }

    #[test]
    fn test_detect_model_preference() {
        let available = vec![
            "mistral:latest".to_string(),
            "llava:7b".to_string(),
            "llama3.2-vision:latest".to_string(),
        ];
        assert_eq!(detect_model(&available).as_deref(), Some("llama3.2-vision:latest"));

        let custom = vec!["my-vision-model".to_string()];
        assert_eq!(detect_model(&custom).as_deref(), Some("my-vision-model"));
        assert_eq!(detect_model(&["mistral".to_string()]), None);
    }

    #[test]
    fn test_prompt_mentions_word_and_context() {
        let prompt = scoring_prompt("três", "three", Some("numbers lesson"));
        assert!(prompt.contains("\"três\" (meaning: \"three\")"));
        assert!(prompt.contains("Context: numbers lesson"));
        assert!(prompt.contains("\"recommended\": true/false"));
    }
}
