//! Curation pipeline services
//!
//! Search (providers, rate limiting, failover, query building), scoring
//! (vision client, resource gate, candidate scorer), persistence (state
//! store, result cache, asset store) and the batch orchestrator tying
//! them together.

pub mod asset_store;
pub mod batch_orchestrator;
pub mod candidate_scorer;
pub mod failover_search;
pub mod providers;
pub mod query_builder;
pub mod rate_limiter;
pub mod resource_gate;
pub mod result_cache;
pub mod state_store;
pub mod vision_client;

pub use asset_store::{AssetFetcher, FetchedAsset, HttpAssetFetcher, LocalAssetStore, StorageStats, StoredAsset};
pub use batch_orchestrator::{
    BatchControl, BatchObserver, BatchOrchestrator, GateWait, ObserverError, PipelineServices,
    RepairSummary, SelectionPolicy,
};
pub use candidate_scorer::{CandidateScorer, ScoringMode};
pub use failover_search::{ProviderFailoverSearch, RankedProvider, SearchOutcome, WordSearch};
pub use providers::{ProviderError, SearchProvider};
pub use rate_limiter::SlidingWindowLimiter;
pub use resource_gate::{GateStatus, GpuUnit, NvidiaSmiProbe, ResourceGate, UtilizationProbe};
pub use result_cache::{FileResultCache, ResultCache};
pub use state_store::CurationStateStore;
pub use vision_client::{OllamaVisionClient, VisionError, VisionScorer};
