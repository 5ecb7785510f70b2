//! Pixabay image search

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::{check_status, http_client, ProviderError, SearchProvider};
use crate::models::Candidate;

const PIXABAY_BASE_URL: &str = "https://pixabay.com/api/";

/// Pixabay rejects `per_page` below 3
const MIN_PER_PAGE: usize = 3;

#[derive(Debug, Deserialize)]
struct PixabayResponse {
    #[serde(default)]
    hits: Vec<PixabayHit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PixabayHit {
    id: u64,
    #[serde(rename = "webformatURL")]
    webformat_url: Option<String>,
    #[serde(rename = "previewURL")]
    preview_url: Option<String>,
    image_width: Option<u32>,
    image_height: Option<u32>,
    #[serde(default)]
    tags: String,
    user: Option<String>,
}

pub struct PixabayProvider {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl PixabayProvider {
    pub fn new(api_key: String, base_url: Option<String>, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            http_client: http_client(timeout)?,
            api_key,
            base_url: base_url.unwrap_or_else(|| PIXABAY_BASE_URL.to_string()),
        })
    }
}

#[async_trait]
impl SearchProvider for PixabayProvider {
    fn name(&self) -> &str {
        "pixabay"
    }

    async fn search(&self, query: &str, count: usize) -> Result<Vec<Candidate>, ProviderError> {
        let per_page = count.clamp(MIN_PER_PAGE, 200).to_string();
        let response = self
            .http_client
            .get(&self.base_url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("q", query),
                ("per_page", per_page.as_str()),
                ("image_type", "photo"),
                ("safesearch", "true"),
                ("orientation", "horizontal"),
            ])
            .send()
            .await?;

        let body: PixabayResponse = check_status(response).await?.json().await?;
        let mut candidates = parse_hits(body);
        candidates.truncate(count);

        tracing::debug!(query, results = candidates.len(), "Pixabay search complete");
        Ok(candidates)
    }
}

fn parse_hits(body: PixabayResponse) -> Vec<Candidate> {
    body.hits
        .into_iter()
        .filter_map(|hit| {
            let url = hit.webformat_url?;
            let user = hit.user.unwrap_or_else(|| "Unknown".to_string());

            let mut candidate = Candidate::new(format!("pixabay_{}", hit.id), "pixabay", url);
            candidate.thumbnail_url = hit.preview_url;
            candidate.width = hit.image_width;
            candidate.height = hit.image_height;
            candidate.tags = hit
                .tags
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
            candidate.alt_text = Some(hit.tags).filter(|t| !t.is_empty());
            candidate.attribution = Some(format!("Image by {} from Pixabay", user));
            candidate.photographer = Some(user);
            candidate.license = Some("Pixabay License".to_string());
            Some(candidate)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hits() {
        let body: PixabayResponse = serde_json::from_str(
            r#"{
                "total": 2,
                "hits": [
                    {"id": 7, "webformatURL": "https://px/7_640.jpg", "previewURL": "https://px/7_150.jpg",
                     "imageWidth": 4000, "imageHeight": 3000, "tags": "three, numbers, count", "user": "joao"},
                    {"id": 8, "tags": "no url"}
                ]
            }"#,
        )
        .unwrap();

        let candidates = parse_hits(body);
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.id, "pixabay_7");
        assert_eq!(c.tags, vec!["three", "numbers", "count"]);
        assert_eq!(c.attribution.as_deref(), Some("Image by joao from Pixabay"));
        assert_eq!(c.license.as_deref(), Some("Pixabay License"));
        assert_eq!(c.height, Some(3000));
    }
}
