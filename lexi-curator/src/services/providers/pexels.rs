//! Pexels photo search

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use super::{check_status, http_client, ProviderError, SearchProvider};
use crate::models::Candidate;

const PEXELS_BASE_URL: &str = "https://api.pexels.com/v1";

#[derive(Debug, Deserialize)]
struct PexelsResponse {
    #[serde(default)]
    photos: Vec<PexelsPhoto>,
}

#[derive(Debug, Deserialize)]
struct PexelsPhoto {
    id: u64,
    width: Option<u32>,
    height: Option<u32>,
    photographer: Option<String>,
    alt: Option<String>,
    #[serde(default)]
    src: HashMap<String, String>,
}

pub struct PexelsProvider {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
    /// Key into the `src` map used as the candidate url
    size: String,
}

impl PexelsProvider {
    pub fn new(api_key: String, base_url: Option<String>, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            http_client: http_client(timeout)?,
            api_key,
            base_url: base_url.unwrap_or_else(|| PEXELS_BASE_URL.to_string()),
            size: "medium".to_string(),
        })
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = size.into();
        self
    }
}

#[async_trait]
impl SearchProvider for PexelsProvider {
    fn name(&self) -> &str {
        "pexels"
    }

    async fn search(&self, query: &str, count: usize) -> Result<Vec<Candidate>, ProviderError> {
        let per_page = count.clamp(1, 80).to_string();
        let response = self
            .http_client
            .get(format!("{}/search", self.base_url))
            .header("Authorization", &self.api_key)
            .query(&[
                ("query", query),
                ("per_page", per_page.as_str()),
                ("orientation", "landscape"),
            ])
            .send()
            .await?;

        let body: PexelsResponse = check_status(response).await?.json().await?;
        let mut candidates = parse_photos(body, &self.size);
        candidates.truncate(count);

        tracing::debug!(query, results = candidates.len(), "Pexels search complete");
        Ok(candidates)
    }
}

fn parse_photos(body: PexelsResponse, size: &str) -> Vec<Candidate> {
    body.photos
        .into_iter()
        .filter_map(|photo| {
            let url = photo
                .src
                .get(size)
                .or_else(|| photo.src.get("medium"))
                .cloned()?;
            let photographer = photo.photographer.unwrap_or_else(|| "Unknown".to_string());

            let mut candidate = Candidate::new(format!("pexels_{}", photo.id), "pexels", url);
            candidate.thumbnail_url = photo
                .src
                .get("tiny")
                .or_else(|| photo.src.get("small"))
                .cloned();
            candidate.width = photo.width;
            candidate.height = photo.height;
            candidate.alt_text = photo.alt.filter(|a| !a.is_empty());
            candidate.attribution = Some(format!("Photo by {} on Pexels", photographer));
            candidate.photographer = Some(photographer);
            candidate.license = Some("Pexels License".to_string());
            Some(candidate)
        })
        .collect()
}
