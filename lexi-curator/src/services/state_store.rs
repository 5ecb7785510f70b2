//! Curation state store
//!
//! Owns every write to curation records, their audit trail and the work
//! queue. Mutations are single transactions (see `db::records`) wrapped in
//! `retry_on_lock` so concurrent batches and operator overrides serialize
//! on SQLite instead of failing.

use lexi_common::Result;
use sqlx::SqlitePool;

use crate::db::{audit, queue, records, settings};
use crate::models::{
    ActivityEntry, AuditEntry, CurationRecord, LibraryStatistics, NewCandidateRecord, QueueEntry,
    QueueStats, RecordFilter, VocabularyItem,
};
use crate::utils::retry_on_lock;

#[derive(Clone)]
pub struct CurationStateStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl CurationStateStore {
    pub fn new(pool: SqlitePool, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            max_lock_wait_ms,
        }
    }

    /// Store with the lock-wait bound from the settings table
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let max_lock_wait_ms = settings::get_max_lock_wait_ms(&pool).await?;
        Ok(Self::new(pool, max_lock_wait_ms))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ---- records ----

    pub async fn add_candidate(&self, record: &NewCandidateRecord, actor: &str) -> Result<i64> {
        retry_on_lock("add_candidate", self.max_lock_wait_ms, || {
            records::add_candidate(&self.pool, record, actor)
        })
        .await
    }

    /// Promote a record, demoting the word's previous selection atomically
    pub async fn select(&self, id: i64, actor: &str) -> Result<bool> {
        retry_on_lock("select", self.max_lock_wait_ms, || {
            records::select(&self.pool, id, actor)
        })
        .await
    }

    pub async fn reject(&self, id: i64, reason: &str, actor: &str) -> Result<bool> {
        retry_on_lock("reject", self.max_lock_wait_ms, || {
            records::reject(&self.pool, id, reason, actor)
        })
        .await
    }

    pub async fn verify(&self, id: i64, verified_by: &str) -> Result<bool> {
        retry_on_lock("verify", self.max_lock_wait_ms, || {
            records::verify(&self.pool, id, verified_by)
        })
        .await
    }

    pub async fn delete(&self, id: i64, actor: &str) -> Result<bool> {
        retry_on_lock("delete", self.max_lock_wait_ms, || {
            records::delete(&self.pool, id, actor)
        })
        .await
    }

    pub async fn update_asset(
        &self,
        id: i64,
        local_path: &str,
        format: Option<&str>,
        file_size: Option<i64>,
        actor: &str,
    ) -> Result<bool> {
        retry_on_lock("update_asset", self.max_lock_wait_ms, || {
            records::update_asset(&self.pool, id, local_path, format, file_size, actor)
        })
        .await
    }

    pub async fn get(&self, id: i64) -> Result<Option<CurationRecord>> {
        records::get(&self.pool, id).await
    }

    pub async fn get_selected(&self, word: &str) -> Result<Option<CurationRecord>> {
        records::get_selected(&self.pool, word).await
    }

    pub async fn records_for_word(&self, word: &str) -> Result<Vec<CurationRecord>> {
        records::records_for_word(&self.pool, word).await
    }

    pub async fn search(
        &self,
        filter: &RecordFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<CurationRecord>, i64)> {
        records::search(&self.pool, filter, limit, offset).await
    }

    pub async fn statistics(&self) -> Result<LibraryStatistics> {
        records::statistics(&self.pool).await
    }

    pub async fn missing_assets(&self) -> Result<Vec<CurationRecord>> {
        records::missing_assets(&self.pool).await
    }

    pub async fn words_without_selection(&self, lesson_id: Option<&str>) -> Result<Vec<String>> {
        records::words_without_selection(&self.pool, lesson_id).await
    }

    // ---- audit ----

    pub async fn history(&self, record_id: i64) -> Result<Vec<AuditEntry>> {
        audit::history(&self.pool, record_id).await
    }

    pub async fn recent_activity(&self, limit: i64) -> Result<Vec<ActivityEntry>> {
        audit::recent_activity(&self.pool, limit).await
    }

    // ---- queue ----

    pub async fn enqueue(&self, item: &VocabularyItem, priority: i64) -> Result<i64> {
        retry_on_lock("enqueue", self.max_lock_wait_ms, || {
            queue::enqueue(&self.pool, item, priority)
        })
        .await
    }

    pub async fn dequeue_next(&self) -> Result<Option<QueueEntry>> {
        retry_on_lock("dequeue_next", self.max_lock_wait_ms, || {
            queue::dequeue_next(&self.pool)
        })
        .await
    }

    pub async fn claim(&self, id: i64) -> Result<bool> {
        retry_on_lock("claim", self.max_lock_wait_ms, || queue::claim(&self.pool, id)).await
    }

    pub async fn complete_queue_entry(&self, id: i64, success: bool, error: Option<&str>) -> Result<bool> {
        retry_on_lock("complete_queue_entry", self.max_lock_wait_ms, || {
            queue::complete(&self.pool, id, success, error)
        })
        .await
    }

    pub async fn requeue_stale(&self) -> Result<u64> {
        retry_on_lock("requeue_stale", self.max_lock_wait_ms, || {
            queue::requeue_stale(&self.pool)
        })
        .await
    }

    pub async fn queue_entry(&self, id: i64) -> Result<Option<QueueEntry>> {
        queue::get(&self.pool, id).await
    }

    pub async fn pending_entries(&self) -> Result<Vec<QueueEntry>> {
        queue::pending(&self.pool).await
    }

    pub async fn queue_stats(&self) -> Result<QueueStats> {
        queue::queue_stats(&self.pool).await
    }
}
