//! Audit trail database operations
//!
//! Rows are append-only and written on the same connection (transaction) as
//! the state change they describe.

use lexi_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use super::{now_text, parse_timestamp};
use crate::models::{ActivityEntry, AuditAction, AuditEntry};

/// Append an audit row inside the caller's transaction
pub async fn append(
    conn: &mut SqliteConnection,
    record_id: i64,
    action: AuditAction,
    actor: &str,
    details: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO curation_audit (record_id, action, actor, details, created_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(record_id)
    .bind(action.as_str())
    .bind(actor)
    .bind(details)
    .bind(now_text())
    .execute(conn)
    .await?;

    Ok(())
}

/// Full history of one record, oldest first
pub async fn history(pool: &SqlitePool, record_id: i64) -> Result<Vec<AuditEntry>> {
    let rows = sqlx::query(
        "SELECT id, record_id, action, actor, details, created_at
         FROM curation_audit WHERE record_id = ? ORDER BY id ASC",
    )
    .bind(record_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(entry_from_row).collect()
}

/// Most recent audit rows across all records, newest first
pub async fn recent_activity(pool: &SqlitePool, limit: i64) -> Result<Vec<ActivityEntry>> {
    let rows = sqlx::query(
        "SELECT a.id, a.record_id, a.action, a.actor, a.details, a.created_at,
                r.word AS word, r.url AS url
         FROM curation_audit a
         LEFT JOIN curation_records r ON r.id = a.record_id
         ORDER BY a.id DESC
         LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(ActivityEntry {
                entry: entry_from_row(row)?,
                word: row.try_get("word")?,
                url: row.try_get("url")?,
            })
        })
        .collect()
}

fn entry_from_row(row: &SqliteRow) -> Result<AuditEntry> {
    let action: String = row.try_get("action")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(AuditEntry {
        id: row.try_get("id")?,
        record_id: row.try_get("record_id")?,
        action: action.parse().map_err(Error::Internal)?,
        actor: row.try_get("actor")?,
        details: row.try_get("details")?,
        created_at: parse_timestamp(&created_at)?,
    })
}
