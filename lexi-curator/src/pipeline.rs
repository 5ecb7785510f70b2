//! Assembly of the production pipeline from configuration

use lexi_common::events::EventBus;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::CuratorConfig;
use crate::db::settings;
use crate::error::CurationError;
use crate::services::{
    providers, CandidateScorer, CurationStateStore, FileResultCache, GateWait, HttpAssetFetcher,
    LocalAssetStore, OllamaVisionClient, PipelineServices, ProviderFailoverSearch, ResourceGate,
    ResultCache,
};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Filesystem locations the pipeline writes to
#[derive(Debug, Clone)]
pub struct PipelinePaths {
    pub cache_dir: PathBuf,
    pub library_dir: PathBuf,
}

impl PipelinePaths {
    pub fn from_root(root: &lexi_common::config::RootFolderInitializer) -> Self {
        Self {
            cache_dir: root.cache_dir(),
            library_dir: root.library_dir(),
        }
    }
}

/// Build every collaborator the orchestrator needs
///
/// Unreachable services are not detected here; `BatchOrchestrator::initialize`
/// checks them when a batch starts.
pub async fn build_pipeline(
    db: SqlitePool,
    event_bus: EventBus,
    config: &CuratorConfig,
    paths: &PipelinePaths,
) -> Result<PipelineServices, CurationError> {
    let store = CurationStateStore::from_pool(db.clone()).await?;

    let configured = providers::configured_providers(&db, config).await?;
    let search = ProviderFailoverSearch::from_configured(configured);
    tracing::info!(providers = ?search.provider_names(), "Search providers registered");

    let mut vision_config = config.vision.clone();
    if vision_config.model.is_none() {
        vision_config.model = settings::get_vision_model(&db).await?;
    }
    let vision = OllamaVisionClient::new(&vision_config)
        .map_err(|e| CurationError::InitializationFailure(format!("vision client: {}", e)))?;
    let gate = ResourceGate::nvidia(config.gpu.throttle_percent);
    let scorer = CandidateScorer::new(Arc::new(vision), gate);

    let cache: Option<Arc<dyn ResultCache>> = if config.cache.enabled {
        Some(Arc::new(FileResultCache::new(&paths.cache_dir)))
    } else {
        None
    };

    Ok(PipelineServices {
        store,
        search: Arc::new(search),
        scorer,
        cache,
        cache_max_age_hours: config.cache.max_age_hours,
        fetcher: Arc::new(HttpAssetFetcher::new(DOWNLOAD_TIMEOUT)?),
        assets: Arc::new(LocalAssetStore::new(&paths.library_dir)),
        event_bus,
        gate_wait: GateWait {
            poll_interval: Duration::from_secs(config.gpu.poll_interval_seconds),
            max_wait: Duration::from_secs(config.gpu.max_wait_seconds),
        },
    })
}
