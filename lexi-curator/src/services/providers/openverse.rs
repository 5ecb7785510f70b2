//! Openverse (openly licensed media) image search

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::{check_status, http_client, ProviderError, SearchProvider};
use crate::models::Candidate;

const OPENVERSE_BASE_URL: &str = "https://api.openverse.org/v1/images/";

#[derive(Debug, Deserialize)]
struct OpenverseResponse {
    #[serde(default)]
    results: Vec<OpenverseImage>,
}

#[derive(Debug, Deserialize)]
struct OpenverseImage {
    id: String,
    url: Option<String>,
    thumbnail: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    title: Option<String>,
    creator: Option<String>,
    license: Option<String>,
    attribution: Option<String>,
    source: Option<String>,
    #[serde(default)]
    tags: Vec<OpenverseTag>,
}

#[derive(Debug, Deserialize)]
struct OpenverseTag {
    name: String,
}

pub struct OpenverseProvider {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenverseProvider {
    pub fn new(api_key: String, base_url: Option<String>, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            http_client: http_client(timeout)?,
            api_key,
            base_url: base_url.unwrap_or_else(|| OPENVERSE_BASE_URL.to_string()),
        })
    }
}

#[async_trait]
impl SearchProvider for OpenverseProvider {
    fn name(&self) -> &str {
        "openverse"
    }

    async fn search(&self, query: &str, count: usize) -> Result<Vec<Candidate>, ProviderError> {
        let page_size = count.clamp(1, 500).to_string();
        let response = self
            .http_client
            .get(&self.base_url)
            .bearer_auth(&self.api_key)
            .query(&[
                ("q", query),
                ("page_size", page_size.as_str()),
                ("license_type", "commercial"),
                ("mature", "false"),
            ])
            .send()
            .await?;

        let body: OpenverseResponse = check_status(response).await?.json().await?;
        let mut candidates = parse_results(body);
        candidates.truncate(count);

        tracing::debug!(query, results = candidates.len(), "Openverse search complete");
        Ok(candidates)
    }
}

fn parse_results(body: OpenverseResponse) -> Vec<Candidate> {
    body.results
        .into_iter()
        .filter_map(|image| {
            let url = image.url?;
            let source = image.source.unwrap_or_else(|| "unknown".to_string());

            let mut candidate = Candidate::new(format!("openverse_{}", image.id), "openverse", url.clone());
            candidate.thumbnail_url = Some(image.thumbnail.unwrap_or(url));
            candidate.width = image.width;
            candidate.height = image.height;
            candidate.alt_text = image.title;
            candidate.photographer = image.creator;
            candidate.license = Some(image.license.unwrap_or_else(|| "CC".to_string()));
            candidate.attribution = Some(
                image
                    .attribution
                    .unwrap_or_else(|| format!("Via Openverse ({})", source)),
            );
            candidate.tags = image.tags.into_iter().map(|t| t.name).collect();
            Some(candidate)
        })
        .collect()
}
