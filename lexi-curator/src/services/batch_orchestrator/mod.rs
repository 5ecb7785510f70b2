//! Batch orchestrator
//!
//! Drives search → score → select → persist → download over a word list.
//!
//! # State Progression
//! IDLE → RUNNING → (PAUSED ⇄ RUNNING) → COMPLETED | STOPPED
//!
//! Words are processed strictly one at a time. Stop and pause requests are
//! honoured only between words, so a word's records and audit rows are
//! always written completely. Per-word failures are recorded in the summary;
//! only initialization and store failures end a batch early.

mod observers;
mod selection;

pub use observers::{BatchObserver, ObserverError, ObserverSet};
pub use selection::SelectionPolicy;

use chrono::Utc;
use lexi_common::events::{CandidateSummary, CurationEvent, EventBus};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{CurationError, FailureKind, WordFailure};
use crate::models::{
    BatchConfig, BatchSession, BatchState, BatchSummary, NewCandidateRecord, ScoredCandidate,
    VocabularyItem,
};
use crate::services::asset_store::{AssetFetcher, LocalAssetStore};
use crate::services::candidate_scorer::CandidateScorer;
use crate::services::failover_search::ProviderFailoverSearch;
use crate::services::result_cache::ResultCache;
use crate::services::state_store::CurationStateStore;

/// Stop / pause / resume handle shared with the HTTP layer and signal handlers
#[derive(Clone)]
pub struct BatchControl {
    cancel: CancellationToken,
    paused: Arc<watch::Sender<bool>>,
}

impl Default for BatchControl {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchControl {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            cancel: CancellationToken::new(),
            paused: Arc::new(paused),
        }
    }

    /// Request a stop at the next word boundary
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    pub async fn stopped(&self) {
        self.cancel.cancelled().await
    }

    /// Block while paused; returns false if stopped in the meantime
    async fn wait_while_paused(&self) -> bool {
        let mut rx = self.paused.subscribe();
        loop {
            if self.is_stopped() {
                return false;
            }
            if !*rx.borrow_and_update() {
                return true;
            }
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return !self.is_stopped();
                    }
                }
                _ = self.cancel.cancelled() => return false,
            }
        }
    }
}

/// How long to wait for the GPU before scoring a word anyway
#[derive(Debug, Clone, Copy)]
pub struct GateWait {
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl Default for GateWait {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(60),
        }
    }
}

/// Collaborators a batch needs, constructed once per process
#[derive(Clone)]
pub struct PipelineServices {
    pub store: CurationStateStore,
    pub search: Arc<ProviderFailoverSearch>,
    pub scorer: CandidateScorer,
    pub cache: Option<Arc<dyn ResultCache>>,
    pub cache_max_age_hours: u64,
    pub fetcher: Arc<dyn AssetFetcher>,
    pub assets: Arc<LocalAssetStore>,
    pub event_bus: EventBus,
    pub gate_wait: GateWait,
}

/// Outcome of the asset repair pass
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct RepairSummary {
    pub examined: usize,
    pub repaired: usize,
    pub failures: Vec<WordFailure>,
}

/// What `persist_candidates` managed to write for the winner
#[derive(Debug, Clone, Copy)]
enum Persisted {
    Selected(i64),
    NoneQualified,
    /// The winner's record disappeared before it could be selected
    WinnerGone(i64),
}

/// Per-word result
#[derive(Debug)]
enum WordOutcome {
    /// Already had a selected record
    Skipped,
    Selected {
        /// Download problem after the selection was persisted
        download_failure: Option<WordFailure>,
    },
    Failed(WordFailure),
}

pub struct BatchOrchestrator {
    services: PipelineServices,
    observers: ObserverSet,
}

impl BatchOrchestrator {
    pub fn new(services: PipelineServices) -> Self {
        Self {
            services,
            observers: ObserverSet::new(),
        }
    }

    /// Register an observer; must be called inside a tokio runtime
    pub fn with_observer(mut self, observer: Arc<dyn BatchObserver>) -> Self {
        self.observers.register(observer);
        self
    }

    pub fn services(&self) -> &PipelineServices {
        &self.services
    }

    pub fn store(&self) -> &CurationStateStore {
        &self.services.store
    }

    /// Check collaborators before a batch may enter Running
    ///
    /// Returns the vision model in use (`None` when scoring is disabled).
    pub async fn initialize(&self, config: &BatchConfig) -> Result<Option<String>, CurationError> {
        if self.services.search.is_empty() {
            return Err(CurationError::InitializationFailure(
                "no search providers configured (set an API key for pexels, pixabay or openverse)"
                    .to_string(),
            ));
        }

        if !config.scoring_enabled {
            tracing::info!("Scoring disabled for this batch, candidates get neutral scores");
            return Ok(None);
        }

        let vision = self.services.scorer.scorer();
        if let Some(model) = &config.vision_model {
            vision.set_model(Some(model.clone())).await;
        }

        match vision.check_model().await {
            Some(model) => {
                tracing::info!(model = %model, "Vision model ready");
                Ok(Some(model))
            }
            None => Err(CurationError::InitializationFailure(
                "vision model unavailable (start the model service or disable scoring)".to_string(),
            )),
        }
    }

    /// Run one batch over a caller-ordered word list
    pub async fn run(
        &self,
        items: Vec<VocabularyItem>,
        config: BatchConfig,
        control: BatchControl,
    ) -> Result<BatchSummary, CurationError> {
        let session = Arc::new(RwLock::new(BatchSession::new(config)));
        self.run_session(items, session, control).await
    }

    /// Run a batch whose session is shared with a status reader
    pub async fn run_session(
        &self,
        items: Vec<VocabularyItem>,
        session: Arc<RwLock<BatchSession>>,
        control: BatchControl,
    ) -> Result<BatchSummary, CurationError> {
        let config = session.read().await.config.clone();
        self.initialize(&config).await?;

        let accepted: Vec<VocabularyItem> = items.into_iter().filter(|i| config.accepts(i)).collect();
        let total = accepted.len();

        let mut listed = VecDeque::with_capacity(total);
        for (index, item) in accepted.into_iter().enumerate() {
            let queue_id = if config.dry_run {
                None
            } else {
                let priority = (total - index) as i64;
                Some(self.services.store.enqueue(&item, priority).await?)
            };
            listed.push_back((item, queue_id));
        }

        self.drive(session, control, listed).await
    }

    /// Finish whatever the queue still holds, e.g. after a crash
    ///
    /// Entries stranded in `processing` are requeued first. Each pending entry
    /// gets one attempt per run. Filters in `config` are not applied to queued
    /// entries.
    pub async fn resume_pending(
        &self,
        config: BatchConfig,
        control: BatchControl,
    ) -> Result<BatchSummary, CurationError> {
        self.initialize(&config).await?;

        let requeued = self.services.store.requeue_stale().await?;
        let pending: VecDeque<_> = self
            .services
            .store
            .pending_entries()
            .await?
            .into_iter()
            .map(|e| {
                let item = VocabularyItem {
                    word_id: e.word_id,
                    word: e.word,
                    translation: e.translation,
                    lesson_id: e.lesson_id,
                    category: e.category,
                };
                (item, Some(e.id))
            })
            .collect();
        tracing::info!(requeued, pending = pending.len(), "Resuming queued words");

        let session = Arc::new(RwLock::new(BatchSession::new(BatchConfig {
            dry_run: false,
            ..config
        })));
        self.drive(session, control, pending).await
    }

    async fn drive(
        &self,
        session: Arc<RwLock<BatchSession>>,
        control: BatchControl,
        mut words: VecDeque<(VocabularyItem, Option<i64>)>,
    ) -> Result<BatchSummary, CurationError> {
        let total = words.len();
        let (batch_id, config) = {
            let mut s = session.write().await;
            s.progress.total = total;
            (s.batch_id, s.config.clone())
        };

        self.transition(&session, BatchState::Running).await;
        self.emit(CurationEvent::BatchStarted {
            batch_id,
            total_words: total,
            dry_run: config.dry_run,
            timestamp: Utc::now(),
        });
        tracing::info!(batch_id = %batch_id, total, dry_run = config.dry_run, "Batch started");

        let scorer = self
            .services
            .scorer
            .with_gate_threshold(config.gpu_throttle_percent);
        let policy = SelectionPolicy::from_config(&config);
        let delay = Duration::from_millis(config.word_delay_ms);
        let mut first = true;

        let result = async {
            loop {
                if words.is_empty() {
                    break;
                }
                if control.is_stopped() {
                    break;
                }
                if control.is_paused() {
                    self.transition(&session, BatchState::Paused).await;
                    let resumed = control.wait_while_paused().await;
                    if !resumed {
                        break;
                    }
                    self.transition(&session, BatchState::Running).await;
                }

                // Pace only between words actually processed
                if !first && !delay.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = control.stopped() => break,
                    }
                }

                let Some((item, queue_id)) = words.pop_front() else {
                    break;
                };
                first = false;

                {
                    let mut s = session.write().await;
                    s.progress.current_word = Some(item.word.clone());
                }

                let outcome = self
                    .process_word(&item, queue_id, &config, &scorer, policy, batch_id)
                    .await?;
                self.record_outcome(&session, &item, outcome).await;
            }
            Ok::<(), CurationError>(())
        }
        .await;

        let completed = result.is_ok() && words.is_empty();
        let final_state = if completed {
            BatchState::Completed
        } else {
            BatchState::Stopped
        };
        self.transition(&session, final_state).await;

        let summary = {
            let mut s = session.write().await;
            s.progress.current_word = None;
            s.update_elapsed();
            s.summary()
        };
        self.emit(CurationEvent::BatchCompleted {
            batch_id,
            progress: session.read().await.progress.clone(),
            completed,
            timestamp: Utc::now(),
        });

        match result {
            Ok(()) => {
                tracing::info!(
                    batch_id = %batch_id,
                    processed = summary.processed,
                    successful = summary.successful,
                    failed = summary.failed,
                    skipped = summary.skipped,
                    completed,
                    elapsed_secs = summary.elapsed_seconds,
                    "Batch finished"
                );
                Ok(summary)
            }
            Err(e) => {
                tracing::error!(batch_id = %batch_id, "Batch halted: {}", e);
                self.log(batch_id, "error", format!("Batch halted: {}", e));
                Err(e)
            }
        }
    }

    async fn transition(&self, session: &Arc<RwLock<BatchSession>>, new_state: BatchState) {
        let mut s = session.write().await;
        match s.transition_to(new_state) {
            Ok(transition) => {
                tracing::debug!(
                    batch_id = %transition.batch_id,
                    old_state = transition.old_state.as_str(),
                    new_state = transition.new_state.as_str(),
                    "Batch state changed"
                );
                self.emit(CurationEvent::BatchStateChanged {
                    batch_id: transition.batch_id,
                    old_state: transition.old_state.as_str().to_string(),
                    new_state: transition.new_state.as_str().to_string(),
                    timestamp: transition.transitioned_at,
                });
            }
            Err(e) => tracing::warn!(batch_id = %s.batch_id, "{}", e),
        }
    }

    async fn record_outcome(&self, session: &Arc<RwLock<BatchSession>>, item: &VocabularyItem, outcome: WordOutcome) {
        let progress = {
            let mut s = session.write().await;
            s.progress.processed += 1;
            match outcome {
                WordOutcome::Skipped => s.progress.skipped += 1,
                WordOutcome::Selected { download_failure } => {
                    s.progress.successful += 1;
                    if let Some(failure) = download_failure {
                        s.failures.push(failure);
                    }
                }
                WordOutcome::Failed(failure) => {
                    s.progress.failed += 1;
                    self.emit(CurationEvent::WordFailed {
                        batch_id: s.batch_id,
                        word: item.word.clone(),
                        reason: failure.message.clone(),
                        timestamp: Utc::now(),
                    });
                    s.failures.push(failure);
                }
            }
            s.update_elapsed();
            (s.batch_id, s.progress.clone())
        };

        self.emit(CurationEvent::BatchProgress {
            batch_id: progress.0,
            progress: progress.1,
            timestamp: Utc::now(),
        });
    }

    /// One word, start to finish
    ///
    /// Word-local problems come back as `WordOutcome::Failed`; only store
    /// failures are errors.
    async fn process_word(
        &self,
        item: &VocabularyItem,
        queue_id: Option<i64>,
        config: &BatchConfig,
        scorer: &CandidateScorer,
        policy: SelectionPolicy,
        batch_id: Uuid,
    ) -> Result<WordOutcome, CurationError> {
        let store = &self.services.store;
        let word = item.word.as_str();
        let actor = format!("batch:{}", batch_id);

        if let Some(id) = queue_id {
            store.claim(id).await?;
        }

        if let Some(existing) = store.get_selected(word).await? {
            tracing::debug!(word, record_id = existing.id, "Already selected, skipping");
            if let Some(id) = queue_id {
                store.complete_queue_entry(id, true, None).await?;
            }
            return Ok(WordOutcome::Skipped);
        }

        if config.scoring_enabled {
            scorer
                .gate()
                .wait_until_available(self.services.gate_wait.poll_interval, self.services.gate_wait.max_wait)
                .await;
        }

        let scored = match self.scored_candidates(item, config, scorer).await {
            Ok(scored) => scored,
            Err(e) => {
                let failure = WordFailure::from_error(word, &e);
                tracing::warn!(word, "{}", e);
                if let Some(id) = queue_id {
                    store.complete_queue_entry(id, false, Some(&failure.message)).await?;
                }
                return Ok(WordOutcome::Failed(failure));
            }
        };

        let ranked = SelectionPolicy::rank(scored);
        let choice = policy.choose(&ranked);
        self.emit(CurationEvent::WordCandidates {
            batch_id,
            word: word.to_string(),
            candidates: ranked.iter().map(summarize).collect(),
        });

        if config.dry_run {
            return Ok(match choice {
                Some(index) => {
                    let winner = &ranked[index];
                    self.log(
                        batch_id,
                        "info",
                        format!("[dry run] would select {} for '{}' ({}/40)", winner.candidate.url, word, winner.total()),
                    );
                    self.emit(CurationEvent::CandidateSelected {
                        batch_id,
                        word: word.to_string(),
                        record_id: None,
                        url: winner.candidate.url.clone(),
                        score_total: winner.total(),
                        timestamp: Utc::now(),
                    });
                    WordOutcome::Selected {
                        download_failure: None,
                    }
                }
                None => WordOutcome::Failed(WordFailure::new(word, FailureKind::BelowThreshold, policy.explain_rejection(&ranked))),
            });
        }

        let persisted = self
            .persist_candidates(item, &ranked, choice, policy, config.save_rejected, &actor)
            .await?;

        let record_id = match persisted {
            Persisted::Selected(id) => id,
            Persisted::NoneQualified => {
                let message = policy.explain_rejection(&ranked);
                tracing::info!(word, "{}", message);
                if let Some(id) = queue_id {
                    store.complete_queue_entry(id, false, Some(&message)).await?;
                }
                return Ok(WordOutcome::Failed(WordFailure::new(word, FailureKind::BelowThreshold, message)));
            }
            Persisted::WinnerGone(id) => {
                let message = format!("record {} was removed before it could be selected", id);
                tracing::warn!(word, record_id = id, "{}", message);
                if let Some(queue_id) = queue_id {
                    store.complete_queue_entry(queue_id, false, Some(&message)).await?;
                }
                return Ok(WordOutcome::Failed(WordFailure::new(word, FailureKind::Store, message)));
            }
        };

        let winner = choice.map(|i| &ranked[i]);
        if let Some(winner) = winner {
            tracing::info!(word, record_id, score = winner.total(), url = %winner.candidate.url, "Selected image");
            self.emit(CurationEvent::CandidateSelected {
                batch_id,
                word: word.to_string(),
                record_id: Some(record_id),
                url: winner.candidate.url.clone(),
                score_total: winner.total(),
                timestamp: Utc::now(),
            });
        }

        let download_failure = if config.download_images {
            match self.download_asset(record_id, &actor).await {
                Ok(()) => None,
                Err(CurationError::Store(e)) => return Err(CurationError::Store(e)),
                Err(e) => {
                    tracing::warn!(word, record_id, "{}", e);
                    self.log(batch_id, "warn", format!("Download failed for '{}': {}", word, e));
                    Some(WordFailure::from_error(word, &e))
                }
            }
        } else {
            None
        };

        if let Some(id) = queue_id {
            store.complete_queue_entry(id, true, None).await?;
        }

        Ok(WordOutcome::Selected { download_failure })
    }

    /// Cached results, or a fresh search + score
    async fn scored_candidates(
        &self,
        item: &VocabularyItem,
        config: &BatchConfig,
        scorer: &CandidateScorer,
    ) -> Result<Vec<ScoredCandidate>, CurationError> {
        let cache_key = format!("{}:{}", item.word, item.translation);
        let cache = self.services.cache.as_ref().filter(|_| config.use_cache);

        if let Some(cache) = cache {
            if let Some(cached) = cache.get(&cache_key, self.services.cache_max_age_hours).await {
                if !cached.is_empty() {
                    tracing::debug!(word = %item.word, results = cached.len(), "Using cached results");
                    return Ok(cached);
                }
            }
        }

        let found = self
            .services
            .search
            .search_for_word(
                &item.translation,
                item.category.as_deref(),
                config.candidates_per_word,
                None,
            )
            .await?;

        let candidates: Vec<_> = found
            .candidates
            .into_iter()
            .filter(|c| !c.url.trim().is_empty())
            .collect();
        if candidates.is_empty() {
            return Err(CurationError::ExhaustedSearch(item.translation.clone()));
        }

        let context = item.category.as_deref().map(|c| format!("Vocabulary category: {}", c));
        let scored = scorer
            .score_all(
                candidates,
                &item.word,
                &item.translation,
                context.as_deref(),
                config.scoring_enabled,
            )
            .await;

        // Neutral scores are a degraded answer; only model verdicts are cached
        if let Some(cache) = cache {
            if scored.iter().all(|s| s.score.is_model_scored()) {
                if let Err(e) = cache.set(&cache_key, &scored).await {
                    tracing::warn!(word = %item.word, "Could not write result cache: {}", e);
                }
            }
        }

        Ok(scored)
    }

    /// Persist the winner as selected and, if asked, the rest as rejected
    ///
    /// Losers sharing a URL with the winner or with each other are written
    /// once.
    async fn persist_candidates(
        &self,
        item: &VocabularyItem,
        ranked: &[ScoredCandidate],
        choice: Option<usize>,
        policy: SelectionPolicy,
        save_rejected: bool,
        actor: &str,
    ) -> Result<Persisted, CurationError> {
        let store = &self.services.store;
        let mut seen = HashSet::new();
        let mut persisted = Persisted::NoneQualified;

        if let Some(index) = choice {
            let winner = &ranked[index];
            let id = store.add_candidate(&record_for(item, winner), actor).await?;
            if !store.select(id, actor).await? {
                return Ok(Persisted::WinnerGone(id));
            }
            seen.insert(winner.candidate.url.as_str());
            persisted = Persisted::Selected(id);
        }

        if !save_rejected {
            return Ok(persisted);
        }

        let reason = match choice {
            Some(index) => format!("not selected (best total {})", ranked[index].total()),
            None => policy.explain_rejection(ranked),
        };
        for (index, loser) in ranked.iter().enumerate() {
            if Some(index) == choice || !seen.insert(loser.candidate.url.as_str()) {
                continue;
            }
            let id = store.add_candidate(&record_for(item, loser), actor).await?;
            store.reject(id, &reason, actor).await?;
        }

        Ok(persisted)
    }

    /// Fetch and store the asset of a selected record, then record its path
    ///
    /// Fetch and disk failures come back as `DownloadFailure`; the selection
    /// itself is left untouched.
    async fn download_asset(&self, record_id: i64, actor: &str) -> Result<(), CurationError> {
        let store = &self.services.store;
        let Some(record) = store.get(record_id).await? else {
            return Err(CurationError::DownloadFailure(format!("record {} vanished", record_id)));
        };

        let fetched = self.services.fetcher.fetch(&record.url).await?;
        let stored = self
            .services
            .assets
            .store(&fetched, &record)
            .await
            .map_err(|e| CurationError::DownloadFailure(format!("{}: {}", record.url, e)))?;

        store
            .update_asset(
                record_id,
                &stored.path.to_string_lossy(),
                Some(&stored.format),
                Some(stored.file_size as i64),
                actor,
            )
            .await?;
        Ok(())
    }

    /// Re-download assets for selected records that have no local path
    pub async fn repair_missing_assets(&self, control: BatchControl) -> Result<RepairSummary, CurationError> {
        let missing = self.services.store.missing_assets().await?;
        let mut summary = RepairSummary::default();
        tracing::info!(count = missing.len(), "Repairing missing assets");

        for record in missing {
            if control.is_stopped() {
                break;
            }
            summary.examined += 1;
            match self.download_asset(record.id, "repair").await {
                Ok(()) => summary.repaired += 1,
                Err(CurationError::Store(e)) => return Err(CurationError::Store(e)),
                Err(e) => {
                    tracing::warn!(word = %record.word, record_id = record.id, "{}", e);
                    summary.failures.push(WordFailure::from_error(&record.word, &e));
                }
            }
        }

        tracing::info!(
            examined = summary.examined,
            repaired = summary.repaired,
            failed = summary.failures.len(),
            "Asset repair finished"
        );
        Ok(summary)
    }

    fn emit(&self, event: CurationEvent) {
        self.observers.notify(&event);
        self.services.event_bus.emit_lossy(event);
    }

    fn log(&self, batch_id: Uuid, level: &str, message: String) {
        self.emit(CurationEvent::LogLine {
            batch_id,
            level: level.to_string(),
            message,
            timestamp: Utc::now(),
        });
    }
}

fn summarize(scored: &ScoredCandidate) -> CandidateSummary {
    CandidateSummary {
        provider: scored.candidate.provider.clone(),
        url: scored.candidate.url.clone(),
        score_total: scored.total(),
        relevance: scored.relevance(),
        model_scored: scored.score.is_model_scored(),
    }
}

fn record_for(item: &VocabularyItem, scored: &ScoredCandidate) -> NewCandidateRecord {
    NewCandidateRecord::from_scored(
        &item.word,
        item.word_id.as_deref(),
        Some(item.lesson_id.as_str()),
        item.category.as_deref(),
        &scored.candidate,
        &scored.score,
    )
}
