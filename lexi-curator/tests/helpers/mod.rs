//! Test Helper Utilities
//!
//! Temp databases and scripted collaborators for the curation pipeline.

#![allow(dead_code)]

use async_trait::async_trait;
use lexi_common::events::EventBus;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use lexi_curator::error::CurationError;
use lexi_curator::models::{BatchConfig, Candidate, ScoreResult, VocabularyItem};
use lexi_curator::services::{
    AssetFetcher, BatchOrchestrator, CandidateScorer, CurationStateStore, FetchedAsset,
    FileResultCache, GateWait, GpuUnit, LocalAssetStore, PipelineServices, ProviderError,
    ProviderFailoverSearch, RankedProvider, ResourceGate, ResultCache, SearchProvider,
    SlidingWindowLimiter, UtilizationProbe, VisionScorer,
};

pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

/// Create a temporary database with curator tables
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().unwrap();
    let pool = lexi_curator::db::init_database_pool(&temp_dir.path().join("test_lexi.db"))
        .await
        .unwrap();
    (temp_dir, pool)
}

pub async fn create_test_store() -> (TempDir, CurationStateStore) {
    let (dir, pool) = create_test_db().await;
    let store = CurationStateStore::from_pool(pool).await.unwrap();
    (dir, store)
}

pub fn item(word: &str, translation: &str, lesson_id: &str, category: Option<&str>) -> VocabularyItem {
    VocabularyItem {
        word_id: None,
        word: word.to_string(),
        translation: translation.to_string(),
        lesson_id: lesson_id.to_string(),
        category: category.map(str::to_string),
    }
}

pub fn candidate(provider: &str, n: usize) -> Candidate {
    let mut c = Candidate::new(
        format!("{}_{}", provider, n),
        provider,
        format!("https://{}.example/{}.jpg", provider, n),
    );
    c.photographer = Some(format!("Photographer {}", n));
    c.license = Some(format!("{} License", provider));
    c
}

/// Batch configuration without pacing, for fast tests
pub fn fast_config() -> BatchConfig {
    BatchConfig {
        word_delay_ms: 0,
        candidates_per_word: 6,
        ..BatchConfig::default()
    }
}

// ---- search providers ----

/// Provider answering every query with the same candidate list
pub struct FakeProvider {
    name: String,
    candidates: Vec<Candidate>,
    pub queries: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new(name: &str, count: usize) -> Arc<Self> {
        Self::with_candidates(name, (0..count).map(|n| candidate(name, n)).collect())
    }

    pub fn with_candidates(name: &str, candidates: Vec<Candidate>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            candidates,
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn empty(name: &str) -> Arc<Self> {
        Self::with_candidates(name, Vec::new())
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

#[async_trait]
impl SearchProvider for FakeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &str, count: usize) -> Result<Vec<Candidate>, ProviderError> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self.candidates.iter().take(count).cloned().collect())
    }
}

/// Provider whose every call fails
pub struct FailingProvider {
    name: String,
    pub calls: AtomicUsize,
}

impl FailingProvider {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SearchProvider for FailingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, _query: &str, _count: usize) -> Result<Vec<Candidate>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::Api(503, "service unavailable".to_string()))
    }
}

pub fn failover(providers: Vec<Arc<dyn SearchProvider>>) -> ProviderFailoverSearch {
    let ranked = providers
        .into_iter()
        .enumerate()
        .map(|(i, provider)| {
            let limiter = SlidingWindowLimiter::new(provider.name(), 1000, Duration::from_secs(60));
            RankedProvider::new(i as u32 + 1, provider, limiter)
        })
        .collect();
    ProviderFailoverSearch::new(ranked)
}

// ---- scoring ----

/// Scorer with per-URL scripted verdicts; unknown URLs get 5/5/5/5
pub struct FakeScorer {
    scores: Mutex<HashMap<String, [u8; 4]>>,
    available: bool,
    pub calls: AtomicUsize,
    pub model: Mutex<Option<String>>,
    check_delay: Mutex<Duration>,
}

impl FakeScorer {
    pub fn new() -> Arc<Self> {
        Self::build(true)
    }

    /// Model service unreachable
    pub fn unavailable() -> Arc<Self> {
        Self::build(false)
    }

    fn build(available: bool) -> Arc<Self> {
        Arc::new(Self {
            scores: Mutex::new(HashMap::new()),
            available,
            calls: AtomicUsize::new(0),
            model: Mutex::new(Some("fake-vision".to_string())),
            check_delay: Mutex::new(Duration::ZERO),
        })
    }

    pub fn set(&self, url: &str, criteria: [u8; 4]) {
        self.scores.lock().unwrap().insert(url.to_string(), criteria);
    }

    /// Criteria summing to `total` with relevance first
    pub fn set_total(&self, url: &str, total: u8) {
        let base = total / 4;
        let extra = total % 4;
        let criteria = [0, 1, 2, 3].map(|i| base + u8::from(i < extra));
        self.set(url, criteria);
    }

    /// Make `check_model` take this long
    pub fn set_check_delay(&self, delay: Duration) {
        *self.check_delay.lock().unwrap() = delay;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionScorer for FakeScorer {
    async fn model_name(&self) -> Option<String> {
        self.model.lock().unwrap().clone()
    }

    async fn check_model(&self) -> Option<String> {
        let delay = *self.check_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.available {
            self.model.lock().unwrap().clone()
        } else {
            None
        }
    }

    async fn set_model(&self, model: Option<String>) {
        *self.model.lock().unwrap() = model;
    }

    async fn score(&self, image_url: &str, _word: &str, _translation: &str, _context: Option<&str>) -> ScoreResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let [r, c, a, q] = self
            .scores
            .lock()
            .unwrap()
            .get(image_url)
            .copied()
            .unwrap_or([5, 5, 5, 5]);
        ScoreResult::from_model("fake-vision", r, c, a, q, "scripted", r + c + a + q >= 28)
    }
}

/// Utilization probe with a fixed reading (`None` = no GPU visible)
pub struct FixedProbe(pub Option<u8>);

#[async_trait]
impl UtilizationProbe for FixedProbe {
    async fn sample(&self) -> Option<Vec<GpuUnit>> {
        self.0.map(|utilization_percent| {
            vec![GpuUnit {
                index: 0,
                name: "Test GPU".to_string(),
                utilization_percent,
                memory_used_mb: 1024,
                memory_total_mb: 8192,
            }]
        })
    }
}

// ---- downloads ----

/// Fetcher returning PNG bytes, except for URLs marked as broken
#[derive(Default)]
pub struct FakeFetcher {
    broken: Mutex<HashSet<String>>,
    pub fetched: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn break_url(&self, url: &str) {
        self.broken.lock().unwrap().insert(url.to_string());
    }

    pub fn heal_all(&self) {
        self.broken.lock().unwrap().clear();
    }
}

#[async_trait]
impl AssetFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedAsset, CurationError> {
        self.fetched.lock().unwrap().push(url.to_string());
        if self.broken.lock().unwrap().contains(url) {
            return Err(CurationError::DownloadFailure(format!("{}: HTTP 404", url)));
        }
        Ok(FetchedAsset {
            bytes: PNG_BYTES.to_vec(),
            content_type: Some("image/png".to_string()),
        })
    }
}

// ---- assembled pipeline ----

pub struct TestPipeline {
    pub dir: TempDir,
    pub pool: SqlitePool,
    pub store: CurationStateStore,
    pub scorer: Arc<FakeScorer>,
    pub fetcher: Arc<FakeFetcher>,
    pub event_bus: EventBus,
    pub services: PipelineServices,
}

impl TestPipeline {
    pub fn orchestrator(&self) -> BatchOrchestrator {
        BatchOrchestrator::new(self.services.clone())
    }

    pub fn library_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("library")
    }
}

/// Pipeline over a temp database with fake collaborators
///
/// The GPU probe sees nothing, so the gate stays open.
pub async fn test_pipeline(providers: Vec<Arc<dyn SearchProvider>>) -> TestPipeline {
    test_pipeline_with_gpu(providers, None).await
}

pub async fn test_pipeline_with_gpu(providers: Vec<Arc<dyn SearchProvider>>, utilization: Option<u8>) -> TestPipeline {
    let (dir, pool) = create_test_db().await;
    let store = CurationStateStore::from_pool(pool.clone()).await.unwrap();
    let scorer = FakeScorer::new();
    let fetcher = FakeFetcher::new();
    let event_bus = EventBus::new(1000);

    let gate = ResourceGate::new(Arc::new(FixedProbe(utilization)), 75);
    let cache: Arc<dyn ResultCache> = Arc::new(FileResultCache::new(dir.path().join("cache")));

    let services = PipelineServices {
        store: store.clone(),
        search: Arc::new(failover(providers)),
        scorer: CandidateScorer::new(scorer.clone(), gate),
        cache: Some(cache),
        cache_max_age_hours: 24,
        fetcher: fetcher.clone(),
        assets: Arc::new(LocalAssetStore::new(dir.path().join("library"))),
        event_bus: event_bus.clone(),
        gate_wait: GateWait {
            poll_interval: Duration::from_millis(1),
            max_wait: Duration::ZERO,
        },
    };

    TestPipeline {
        dir,
        pool,
        store,
        scorer,
        fetcher,
        event_bus,
        services,
    }
}
