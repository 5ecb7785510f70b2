//! Configuration for lexi-curator
//!
//! The TOML file supplies defaults for every subsystem. Provider API keys are
//! resolved with Database → ENV → TOML priority.

use lexi_common::config::LoggingConfig;
use lexi_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::models::BatchConfig;

/// Names of the built-in search providers
pub const PROVIDER_NAMES: [&str; 3] = ["pexels", "pixabay", "openverse"];

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CuratorConfig {
    #[serde(default)]
    pub root_folder: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub gpu: GpuConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    /// Per-provider overrides keyed by provider name
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl CuratorConfig {
    /// Provider settings, falling back to the built-in defaults for that provider
    pub fn provider(&self, name: &str) -> ProviderConfig {
        self.providers
            .get(name)
            .cloned()
            .unwrap_or_else(|| ProviderConfig::defaults_for(name))
    }
}

/// Vision model service (Ollama)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    #[serde(default = "default_vision_host")]
    pub host: String,
    /// Empty means auto-detect
    #[serde(default)]
    pub model: Option<String>,
    /// Number of GPU layers forwarded to the model runtime
    #[serde(default)]
    pub num_gpu: Option<u32>,
    #[serde(default = "default_vision_timeout")]
    pub timeout_seconds: u64,
}

fn default_vision_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_vision_timeout() -> u64 {
    120
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            host: default_vision_host(),
            model: None,
            num_gpu: None,
            timeout_seconds: default_vision_timeout(),
        }
    }
}

/// Resource gate settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuConfig {
    #[serde(default = "default_throttle_percent")]
    pub throttle_percent: u8,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_max_wait")]
    pub max_wait_seconds: u64,
}

fn default_throttle_percent() -> u8 {
    75
}

fn default_poll_interval() -> u64 {
    5
}

fn default_max_wait() -> u64 {
    60
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            throttle_percent: default_throttle_percent(),
            poll_interval_seconds: default_poll_interval(),
            max_wait_seconds: default_max_wait(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_max_age_hours() -> u64 {
    24
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            max_age_hours: default_max_age_hours(),
        }
    }
}

/// One search provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_enabled")]
    pub enabled: bool,
    /// Lower runs first
    #[serde(default = "default_provider_priority")]
    pub priority: u32,
    /// Requests admitted per window
    pub max_requests: usize,
    pub window_seconds: u64,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_provider_timeout")]
    pub timeout_seconds: u64,
    /// Override of the vendor endpoint
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_provider_enabled() -> bool {
    true
}

fn default_provider_priority() -> u32 {
    99
}

fn default_provider_timeout() -> u64 {
    30
}

impl ProviderConfig {
    /// Built-in priority and request budget for a known provider
    pub fn defaults_for(name: &str) -> Self {
        let (priority, max_requests, window_seconds) = match name {
            "pexels" => (1, 200, 3600),
            "pixabay" => (2, 100, 60),
            "openverse" => (3, 100, 86_400),
            _ => (default_provider_priority(), 60, 60),
        };

        Self {
            enabled: true,
            priority,
            max_requests,
            window_seconds,
            api_key: None,
            timeout_seconds: default_provider_timeout(),
            base_url: None,
        }
    }
}

/// Environment variable carrying a provider's API key
pub fn provider_env_var(provider: &str) -> String {
    format!("{}_API_KEY", provider.to_uppercase())
}

/// Resolve a provider API key from 3-tier configuration
///
/// **Priority:** Database → ENV → TOML. Returns `None` when no tier has a
/// usable key; the provider is then left unregistered.
pub async fn resolve_provider_api_key(
    db: &Pool<Sqlite>,
    provider: &str,
    config: &CuratorConfig,
) -> Result<Option<String>> {
    let db_key = crate::db::settings::get_provider_api_key(db, provider)
        .await?
        .filter(|k| is_valid_key(k));
    let env_key = std::env::var(provider_env_var(provider))
        .ok()
        .filter(|k| is_valid_key(k));
    let toml_key = config
        .providers
        .get(provider)
        .and_then(|p| p.api_key.clone())
        .filter(|k| is_valid_key(k));

    let mut sources = Vec::new();
    if db_key.is_some() {
        sources.push("database");
    }
    if env_key.is_some() {
        sources.push("environment");
    }
    if toml_key.is_some() {
        sources.push("TOML");
    }

    if sources.len() > 1 {
        warn!(
            provider,
            "API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    let resolved = db_key.or(env_key).or(toml_key);
    match (&resolved, sources.first()) {
        (Some(_), Some(source)) => info!(provider, "API key loaded from {}", source),
        _ => warn!(
            provider,
            "API key not configured (settings table, {} or TOML [providers.{}])",
            provider_env_var(provider),
            provider
        ),
    }

    Ok(resolved)
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Load the service TOML, or defaults when no file exists
pub fn load_curator_config() -> Result<CuratorConfig> {
    match lexi_common::config::config_file_path(crate::SERVICE_NAME) {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            lexi_common::config::load_toml_config(&path)
        }
        None => Ok(CuratorConfig::default()),
    }
}

/// Reject settings that would make the pipeline meaningless
pub fn validate(config: &CuratorConfig) -> Result<()> {
    if config.gpu.throttle_percent > 100 {
        return Err(Error::Config(format!(
            "gpu.throttle_percent must be 0-100, got {}",
            config.gpu.throttle_percent
        )));
    }
    for (name, provider) in &config.providers {
        if provider.max_requests == 0 || provider.window_seconds == 0 {
            return Err(Error::Config(format!(
                "providers.{}: max_requests and window_seconds must be positive",
                name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_defaults() {
        let config = CuratorConfig::default();
        let pexels = config.provider("pexels");
        assert_eq!(pexels.priority, 1);
        assert_eq!(pexels.max_requests, 200);
        assert_eq!(pexels.window_seconds, 3600);
        assert_eq!(config.provider("openverse").window_seconds, 86_400);
        assert_eq!(config.provider("unknown").priority, 99);
    }

    #[test]
    fn test_toml_sections() {
        let config: CuratorConfig = toml::from_str(
            r#"
            [gpu]
            throttle_percent = 90

            [batch]
            min_score = 30

            [providers.pixabay]
            priority = 1
            max_requests = 10
            window_seconds = 60
            api_key = "abc"
            "#,
        )
        .unwrap();

        assert_eq!(config.gpu.throttle_percent, 90);
        assert_eq!(config.gpu.poll_interval_seconds, 5);
        assert_eq!(config.batch.min_score, 30);
        assert_eq!(config.batch.min_relevance, 7);
        assert_eq!(config.vision.host, "http://localhost:11434");
        let pixabay = config.provider("pixabay");
        assert_eq!(pixabay.priority, 1);
        assert_eq!(pixabay.api_key.as_deref(), Some("abc"));
        assert!(pixabay.enabled);
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = CuratorConfig::default();
        let mut pexels = ProviderConfig::defaults_for("pexels");
        pexels.window_seconds = 0;
        config.providers.insert("pexels".to_string(), pexels);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_key_validation() {
        assert!(is_valid_key("abc"));
        assert!(!is_valid_key("   "));
        assert_eq!(provider_env_var("pexels"), "PEXELS_API_KEY");
    }
}
