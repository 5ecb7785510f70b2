//! Database access for lexi-curator
//!
//! Curation records, their audit trail and the work queue live in the
//! shared SQLite database created by `lexi_common::db::init_database`.

pub mod audit;
pub mod queue;
pub mod records;
pub mod settings;

use chrono::{DateTime, SecondsFormat, Utc};
use lexi_common::{Error, Result};
use sqlx::SqlitePool;
use std::path::Path;

/// Open the shared database and create curator tables
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    let pool = lexi_common::db::init_database(db_path).await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create curator tables and indexes if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS curation_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            word TEXT NOT NULL,
            word_id TEXT,
            lesson_id TEXT,
            category TEXT,
            provider TEXT NOT NULL,
            source_id TEXT,
            url TEXT NOT NULL,
            thumbnail_url TEXT,
            local_path TEXT,
            format TEXT,
            file_size INTEGER,
            width INTEGER,
            height INTEGER,
            photographer TEXT,
            attribution TEXT,
            license TEXT,
            alt_text TEXT,
            tags TEXT NOT NULL DEFAULT '[]',
            score_relevance INTEGER,
            score_clarity INTEGER,
            score_appropriateness INTEGER,
            score_quality INTEGER,
            score_total INTEGER,
            score_reason TEXT,
            scoring_model TEXT,
            scored_at TEXT,
            status TEXT NOT NULL DEFAULT 'candidate'
                CHECK (status IN ('candidate', 'selected', 'rejected')),
            manually_verified INTEGER NOT NULL DEFAULT 0,
            verified_by TEXT,
            verified_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (word, url)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Store-enforced: at most one selected record per word
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_records_one_selected
         ON curation_records(word) WHERE status = 'selected'",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_word ON curation_records(word)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_status ON curation_records(status)")
        .execute(pool)
        .await?;

    // No foreign key: audit rows outlive deleted records
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS curation_audit (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            record_id INTEGER NOT NULL,
            action TEXT NOT NULL,
            actor TEXT NOT NULL,
            details TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_record ON curation_audit(record_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS curation_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            word TEXT NOT NULL,
            translation TEXT NOT NULL DEFAULT '',
            lesson_id TEXT NOT NULL DEFAULT '',
            category TEXT,
            word_id TEXT,
            priority INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'processing', 'completed')),
            attempts INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (word, lesson_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (curation_records, curation_audit, curation_queue)");

    Ok(())
}

/// Current time in the text format every curator table uses
pub(crate) fn now_text() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid timestamp '{}': {}", value, e)))
}

pub(crate) fn parse_optional_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_timestamp).transpose()
}
