//! Photo-search provider adapters
//!
//! Each adapter shapes one vendor's HTTP API into `Candidate`s. Adapters
//! never retry; failover and rate limiting live in `failover_search`.

pub mod openverse;
pub mod pexels;
pub mod pixabay;

use async_trait::async_trait;
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{resolve_provider_api_key, CuratorConfig, ProviderConfig, PROVIDER_NAMES};
use crate::models::Candidate;

pub use openverse::OpenverseProvider;
pub use pexels::PexelsProvider;
pub use pixabay::PixabayProvider;

const USER_AGENT: &str = concat!("lexi-curator/", env!("CARGO_PKG_VERSION"));

/// Provider call errors
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Parse(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

/// One photo-search backend
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Up to `count` candidates for `query`
    async fn search(&self, query: &str, count: usize) -> Result<Vec<Candidate>, ProviderError>;
}

/// Shared reqwest client construction
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::Network(e.to_string()))
}

/// Map a non-success response to `ProviderError::Api`
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(200).collect();
    Err(ProviderError::Api(status.as_u16(), snippet))
}

/// Enabled providers with a usable API key, paired with their settings
///
/// Providers without a key are skipped with a warning.
pub async fn configured_providers(
    db: &Pool<Sqlite>,
    config: &CuratorConfig,
) -> lexi_common::Result<Vec<(ProviderConfig, Arc<dyn SearchProvider>)>> {
    let mut providers: Vec<(ProviderConfig, Arc<dyn SearchProvider>)> = Vec::new();

    for name in PROVIDER_NAMES {
        let settings = config.provider(name);
        if !settings.enabled {
            tracing::info!(provider = name, "Provider disabled in configuration");
            continue;
        }

        let Some(api_key) = resolve_provider_api_key(db, name, config).await? else {
            continue;
        };

        let timeout = Duration::from_secs(settings.timeout_seconds);
        let base_url = settings.base_url.clone();
        let built: Result<Arc<dyn SearchProvider>, ProviderError> = match name {
            "pexels" => PexelsProvider::new(api_key, base_url, timeout).map(|p| Arc::new(p) as _),
            "pixabay" => PixabayProvider::new(api_key, base_url, timeout).map(|p| Arc::new(p) as _),
            _ => OpenverseProvider::new(api_key, base_url, timeout).map(|p| Arc::new(p) as _),
        };

        match built {
            Ok(provider) => providers.push((settings, provider)),
            Err(e) => tracing::warn!(provider = name, "Could not construct provider: {}", e),
        }
    }

    Ok(providers)
}
