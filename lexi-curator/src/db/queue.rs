//! Work queue database operations
//!
//! Entries move pending → processing → completed. A failed attempt goes back
//! to pending with its attempt counter incremented, so an interrupted batch can
//! resume without reprocessing completed words.

use lexi_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{now_text, parse_timestamp};
use crate::models::{QueueEntry, QueueStats, VocabularyItem};

/// Queue a vocabulary item; idempotent on (word, lesson)
///
/// Returns the id of the new or already-queued entry. Re-queuing an existing
/// entry refreshes its translation, category and priority but not its status.
pub async fn enqueue(pool: &SqlitePool, item: &VocabularyItem, priority: i64) -> Result<i64> {
    let now = now_text();

    sqlx::query(
        r#"
        INSERT INTO curation_queue (word, translation, lesson_id, category, word_id, priority, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, 'pending', ?, ?)
        ON CONFLICT (word, lesson_id) DO UPDATE SET
            translation = excluded.translation,
            category = COALESCE(excluded.category, category),
            word_id = COALESCE(excluded.word_id, word_id),
            priority = excluded.priority
        "#,
    )
    .bind(&item.word)
    .bind(&item.translation)
    .bind(&item.lesson_id)
    .bind(&item.category)
    .bind(&item.word_id)
    .bind(priority)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    let id: i64 = sqlx::query_scalar("SELECT id FROM curation_queue WHERE word = ? AND lesson_id = ?")
        .bind(&item.word)
        .bind(&item.lesson_id)
        .fetch_one(pool)
        .await?;

    Ok(id)
}

/// Atomically claim the highest-priority pending entry
///
/// Ties are broken by insertion order.
pub async fn dequeue_next(pool: &SqlitePool) -> Result<Option<QueueEntry>> {
    let row = sqlx::query(
        r#"
        UPDATE curation_queue SET status = 'processing', updated_at = ?
        WHERE id = (
            SELECT id FROM curation_queue WHERE status = 'pending'
            ORDER BY priority DESC, created_at ASC, id ASC
            LIMIT 1
        )
        RETURNING *
        "#,
    )
    .bind(now_text())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(entry_from_row).transpose()
}

/// Mark a specific entry `processing`; false if it does not exist
pub async fn claim(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("UPDATE curation_queue SET status = 'processing', updated_at = ? WHERE id = ?")
        .bind(now_text())
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Finish an attempt
///
/// Success marks the entry `completed`. Failure returns it to `pending`,
/// increments `attempts` and records the error.
pub async fn complete(pool: &SqlitePool, id: i64, success: bool, error: Option<&str>) -> Result<bool> {
    let result = if success {
        sqlx::query(
            "UPDATE curation_queue SET status = 'completed', last_error = NULL, updated_at = ? WHERE id = ?",
        )
        .bind(now_text())
        .bind(id)
        .execute(pool)
        .await?
    } else {
        sqlx::query(
            "UPDATE curation_queue
             SET status = 'pending', attempts = attempts + 1, last_error = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(error)
        .bind(now_text())
        .bind(id)
        .execute(pool)
        .await?
    };

    Ok(result.rows_affected() > 0)
}

/// Return entries stranded in `processing` (e.g. by a crash) to `pending`
pub async fn requeue_stale(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE curation_queue
         SET status = 'pending', attempts = attempts + 1,
             last_error = COALESCE(last_error, 'interrupted while processing'), updated_at = ?
         WHERE status = 'processing'",
    )
    .bind(now_text())
    .execute(pool)
    .await?;

    let count = result.rows_affected();
    if count > 0 {
        tracing::warn!(count, "Requeued queue entries left in processing state");
    }

    Ok(count)
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<QueueEntry>> {
    let row = sqlx::query("SELECT * FROM curation_queue WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(entry_from_row).transpose()
}

/// Pending entries in processing order
pub async fn pending(pool: &SqlitePool) -> Result<Vec<QueueEntry>> {
    let rows = sqlx::query(
        "SELECT * FROM curation_queue WHERE status = 'pending'
         ORDER BY priority DESC, created_at ASC, id ASC",
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(entry_from_row).collect()
}

pub async fn queue_stats(pool: &SqlitePool) -> Result<QueueStats> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM curation_queue GROUP BY status")
            .fetch_all(pool)
            .await?;

    let mut stats = QueueStats::default();
    for (status, count) in rows {
        match status.as_str() {
            "pending" => stats.pending = count,
            "processing" => stats.processing = count,
            "completed" => stats.completed = count,
            _ => {}
        }
    }

    Ok(stats)
}

fn entry_from_row(row: &SqliteRow) -> Result<QueueEntry> {
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(QueueEntry {
        id: row.try_get("id")?,
        word: row.try_get("word")?,
        translation: row.try_get("translation")?,
        lesson_id: row.try_get("lesson_id")?,
        category: row.try_get("category")?,
        word_id: row.try_get("word_id")?,
        priority: row.try_get("priority")?,
        status: status.parse().map_err(Error::Internal)?,
        attempts: row.try_get("attempts")?,
        last_error: row.try_get("last_error")?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}
