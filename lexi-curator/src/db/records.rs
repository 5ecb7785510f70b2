//! Curation record database operations
//!
//! Every mutation runs in a single transaction together with its audit row.
//! The (word, url) pair is unique; re-adding a known pair updates the row
//! in place and keeps its id and lifecycle status.

use lexi_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::BTreeMap;

use super::{audit, now_text, parse_optional_timestamp, parse_timestamp};
use crate::models::{
    AuditAction, CurationRecord, CurationStatus, LibraryStatistics, NewCandidateRecord,
    RecordFilter,
};
use crate::utils::begin_monitored;

/// Insert a candidate, or update the existing row for the same (word, url)
///
/// Returns the record id. New rows start as `candidate`; an existing row keeps
/// its status, local asset and verification state.
pub async fn add_candidate(pool: &SqlitePool, record: &NewCandidateRecord, actor: &str) -> Result<i64> {
    if record.word.trim().is_empty() || record.url.trim().is_empty() {
        return Err(Error::InvalidInput("word and url are required".to_string()));
    }

    let tags = serde_json::to_string(&record.tags)?;
    let now = now_text();
    let scored_at = record.score_total.map(|_| now.clone());

    let mut tx = begin_monitored(pool, "records::add_candidate").await?;

    let existing: Option<i64> =
        sqlx::query_scalar("SELECT id FROM curation_records WHERE word = ? AND url = ?")
            .bind(&record.word)
            .bind(&record.url)
            .fetch_optional(tx.conn()?)
            .await?;

    let (id, action) = match existing {
        Some(id) => {
            sqlx::query(
                r#"
                UPDATE curation_records SET
                    word_id = COALESCE(?, word_id),
                    lesson_id = COALESCE(?, lesson_id),
                    category = COALESCE(?, category),
                    provider = ?, source_id = ?, thumbnail_url = ?,
                    width = ?, height = ?, photographer = ?, attribution = ?,
                    license = ?, alt_text = ?, tags = ?,
                    score_relevance = ?, score_clarity = ?, score_appropriateness = ?,
                    score_quality = ?, score_total = ?, score_reason = ?,
                    scoring_model = ?, scored_at = COALESCE(?, scored_at),
                    updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&record.word_id)
            .bind(&record.lesson_id)
            .bind(&record.category)
            .bind(&record.provider)
            .bind(&record.source_id)
            .bind(&record.thumbnail_url)
            .bind(record.width)
            .bind(record.height)
            .bind(&record.photographer)
            .bind(&record.attribution)
            .bind(&record.license)
            .bind(&record.alt_text)
            .bind(&tags)
            .bind(record.score_relevance)
            .bind(record.score_clarity)
            .bind(record.score_appropriateness)
            .bind(record.score_quality)
            .bind(record.score_total)
            .bind(&record.score_reason)
            .bind(&record.scoring_model)
            .bind(&scored_at)
            .bind(&now)
            .bind(id)
            .execute(tx.conn()?)
            .await?;

            (id, AuditAction::Updated)
        }
        None => {
            let result = sqlx::query(
                r#"
                INSERT INTO curation_records (
                    word, word_id, lesson_id, category, provider, source_id, url,
                    thumbnail_url, width, height, photographer, attribution, license,
                    alt_text, tags, score_relevance, score_clarity, score_appropriateness,
                    score_quality, score_total, score_reason, scoring_model, scored_at,
                    status, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'candidate', ?, ?)
                "#,
            )
            .bind(&record.word)
            .bind(&record.word_id)
            .bind(&record.lesson_id)
            .bind(&record.category)
            .bind(&record.provider)
            .bind(&record.source_id)
            .bind(&record.url)
            .bind(&record.thumbnail_url)
            .bind(record.width)
            .bind(record.height)
            .bind(&record.photographer)
            .bind(&record.attribution)
            .bind(&record.license)
            .bind(&record.alt_text)
            .bind(&tags)
            .bind(record.score_relevance)
            .bind(record.score_clarity)
            .bind(record.score_appropriateness)
            .bind(record.score_quality)
            .bind(record.score_total)
            .bind(&record.score_reason)
            .bind(&record.scoring_model)
            .bind(&scored_at)
            .bind(&now)
            .bind(&now)
            .execute(tx.conn()?)
            .await?;

            (result.last_insert_rowid(), AuditAction::Created)
        }
    };

    let details = format!(
        "provider={}, score={}",
        record.provider,
        record
            .score_total
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    audit::append(tx.conn()?, id, action, actor, Some(&details)).await?;

    tx.commit().await?;

    tracing::debug!(record_id = id, word = %record.word, action = action.as_str(), "Candidate stored");

    Ok(id)
}

/// Make `id` the selected record for its word
///
/// Demotes any previously selected record for the same word back to
/// `candidate` in the same transaction. Returns false if `id` does not exist.
pub async fn select(pool: &SqlitePool, id: i64, actor: &str) -> Result<bool> {
    let mut tx = begin_monitored(pool, "records::select").await?;

    let word: Option<String> = sqlx::query_scalar("SELECT word FROM curation_records WHERE id = ?")
        .bind(id)
        .fetch_optional(tx.conn()?)
        .await?;

    let Some(word) = word else {
        tx.rollback().await?;
        return Ok(false);
    };

    let now = now_text();

    let demoted: Vec<i64> = sqlx::query_scalar(
        "SELECT id FROM curation_records WHERE word = ? AND status = 'selected' AND id != ?",
    )
    .bind(&word)
    .bind(id)
    .fetch_all(tx.conn()?)
    .await?;

    for previous in &demoted {
        sqlx::query("UPDATE curation_records SET status = 'candidate', updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(previous)
            .execute(tx.conn()?)
            .await?;

        let details = format!("demoted in favour of record {}", id);
        audit::append(tx.conn()?, *previous, AuditAction::Updated, actor, Some(&details)).await?;
    }

    sqlx::query("UPDATE curation_records SET status = 'selected', updated_at = ? WHERE id = ?")
        .bind(&now)
        .bind(id)
        .execute(tx.conn()?)
        .await?;

    let details = match demoted.first() {
        Some(previous) => format!("replaced record {}", previous),
        None => "selected".to_string(),
    };
    audit::append(tx.conn()?, id, AuditAction::Selected, actor, Some(&details)).await?;

    tx.commit().await?;

    tracing::info!(record_id = id, word = %word, actor = actor, "Record selected");

    Ok(true)
}

/// Mark a record `rejected`, recording the reason in the audit trail
pub async fn reject(pool: &SqlitePool, id: i64, reason: &str, actor: &str) -> Result<bool> {
    let mut tx = begin_monitored(pool, "records::reject").await?;

    let result = sqlx::query("UPDATE curation_records SET status = 'rejected', updated_at = ? WHERE id = ?")
        .bind(now_text())
        .bind(id)
        .execute(tx.conn()?)
        .await?;

    if result.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    audit::append(tx.conn()?, id, AuditAction::Rejected, actor, Some(reason)).await?;
    tx.commit().await?;

    Ok(true)
}

/// Set the manual-verification flag
pub async fn verify(pool: &SqlitePool, id: i64, verified_by: &str) -> Result<bool> {
    let actor = format!("admin:{}", verified_by);
    let now = now_text();

    let mut tx = begin_monitored(pool, "records::verify").await?;

    let result = sqlx::query(
        "UPDATE curation_records
         SET manually_verified = 1, verified_by = ?, verified_at = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(verified_by)
    .bind(&now)
    .bind(&now)
    .bind(id)
    .execute(tx.conn()?)
    .await?;

    if result.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    audit::append(tx.conn()?, id, AuditAction::Verified, &actor, None).await?;
    tx.commit().await?;

    Ok(true)
}

/// Delete a record; the `deleted` audit row is written first and survives
pub async fn delete(pool: &SqlitePool, id: i64, actor: &str) -> Result<bool> {
    let mut tx = begin_monitored(pool, "records::delete").await?;

    let row: Option<(String, String, String)> =
        sqlx::query_as("SELECT word, url, status FROM curation_records WHERE id = ?")
            .bind(id)
            .fetch_optional(tx.conn()?)
            .await?;

    let Some((word, url, status)) = row else {
        tx.rollback().await?;
        return Ok(false);
    };

    let details = format!("word={}, url={}, status={}", word, url, status);
    audit::append(tx.conn()?, id, AuditAction::Deleted, actor, Some(&details)).await?;

    sqlx::query("DELETE FROM curation_records WHERE id = ?")
        .bind(id)
        .execute(tx.conn()?)
        .await?;

    tx.commit().await?;

    tracing::info!(record_id = id, word = %word, actor = actor, "Record deleted");

    Ok(true)
}

/// Record the outcome of an asset download
pub async fn update_asset(
    pool: &SqlitePool,
    id: i64,
    local_path: &str,
    format: Option<&str>,
    file_size: Option<i64>,
    actor: &str,
) -> Result<bool> {
    let mut tx = begin_monitored(pool, "records::update_asset").await?;

    let result = sqlx::query(
        "UPDATE curation_records
         SET local_path = ?, format = COALESCE(?, format), file_size = COALESCE(?, file_size), updated_at = ?
         WHERE id = ?",
    )
    .bind(local_path)
    .bind(format)
    .bind(file_size)
    .bind(now_text())
    .bind(id)
    .execute(tx.conn()?)
    .await?;

    if result.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    let details = format!("local_path={}", local_path);
    audit::append(tx.conn()?, id, AuditAction::Updated, actor, Some(&details)).await?;
    tx.commit().await?;

    Ok(true)
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<CurationRecord>> {
    let row = sqlx::query("SELECT * FROM curation_records WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(record_from_row).transpose()
}

/// The single selected record for a word, if any
pub async fn get_selected(pool: &SqlitePool, word: &str) -> Result<Option<CurationRecord>> {
    let row = sqlx::query("SELECT * FROM curation_records WHERE word = ? AND status = 'selected'")
        .bind(word)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(record_from_row).transpose()
}

/// All records for a word, best score first
pub async fn records_for_word(pool: &SqlitePool, word: &str) -> Result<Vec<CurationRecord>> {
    let rows = sqlx::query(
        "SELECT * FROM curation_records WHERE word = ?
         ORDER BY score_total DESC, created_at DESC, id DESC",
    )
    .bind(word)
    .fetch_all(pool)
    .await?;

    rows.iter().map(record_from_row).collect()
}

/// Filtered, paginated listing ordered by score then recency
///
/// Returns the page and the total number of matching records.
pub async fn search(
    pool: &SqlitePool,
    filter: &RecordFilter,
    limit: i64,
    offset: i64,
) -> Result<(Vec<CurationRecord>, i64)> {
    let mut count_query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM curation_records WHERE 1 = 1");
    push_filters(&mut count_query, filter);
    let total: i64 = count_query.build_query_scalar::<i64>().fetch_one(pool).await?;

    let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM curation_records WHERE 1 = 1");
    push_filters(&mut query, filter);
    query
        .push(" ORDER BY score_total DESC, created_at DESC, id DESC LIMIT ")
        .push_bind(limit.max(0))
        .push(" OFFSET ")
        .push_bind(offset.max(0));

    let rows = query.build().fetch_all(pool).await?;
    let records = rows.iter().map(record_from_row).collect::<Result<Vec<_>>>()?;

    Ok((records, total))
}

fn push_filters<'a>(query: &mut QueryBuilder<'a, Sqlite>, filter: &'a RecordFilter) {
    if let Some(word) = &filter.word {
        query
            .push(" AND word LIKE ")
            .push_bind(format!("%{}%", escape_like(word)))
            .push(" ESCAPE '\\'");
    }
    if let Some(lesson_id) = &filter.lesson_id {
        query.push(" AND lesson_id = ").push_bind(lesson_id.as_str());
    }
    if let Some(category) = &filter.category {
        query.push(" AND category = ").push_bind(category.as_str());
    }
    if let Some(status) = filter.status {
        query.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(provider) = &filter.provider {
        query.push(" AND provider = ").push_bind(provider.as_str());
    }
    if let Some(min_score) = filter.min_score {
        query.push(" AND score_total >= ").push_bind(min_score);
    }
    if let Some(verified) = filter.verified {
        query.push(" AND manually_verified = ").push_bind(verified as i64);
    }
}

/// Make `%` and `_` match literally in a LIKE pattern (escape char `\`)
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Aggregate counts by status, provider and category
pub async fn statistics(pool: &SqlitePool) -> Result<LibraryStatistics> {
    let total_records: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM curation_records")
        .fetch_one(pool)
        .await?;

    let by_status = grouped_counts(pool, "SELECT status, COUNT(*) FROM curation_records GROUP BY status").await?;
    let by_provider =
        grouped_counts(pool, "SELECT provider, COUNT(*) FROM curation_records GROUP BY provider").await?;
    let by_category = grouped_counts(
        pool,
        "SELECT COALESCE(category, 'uncategorized'), COUNT(*) FROM curation_records
         GROUP BY COALESCE(category, 'uncategorized')",
    )
    .await?;

    let words_with_selection: i64 = sqlx::query_scalar(
        "SELECT COUNT(DISTINCT word) FROM curation_records WHERE status = 'selected'",
    )
    .fetch_one(pool)
    .await?;

    let average_score: Option<f64> = sqlx::query_scalar(
        "SELECT AVG(CAST(score_total AS REAL)) FROM curation_records WHERE score_total IS NOT NULL",
    )
    .fetch_one(pool)
    .await?;

    let verified_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM curation_records WHERE manually_verified = 1")
            .fetch_one(pool)
            .await?;

    Ok(LibraryStatistics {
        total_records,
        by_status,
        by_provider,
        by_category,
        words_with_selection,
        average_score,
        verified_count,
    })
}

async fn grouped_counts(pool: &SqlitePool, sql: &str) -> Result<BTreeMap<String, i64>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(sql).fetch_all(pool).await?;
    Ok(rows.into_iter().collect())
}

/// Selected records that have no downloaded asset yet
pub async fn missing_assets(pool: &SqlitePool) -> Result<Vec<CurationRecord>> {
    let rows = sqlx::query(
        "SELECT * FROM curation_records
         WHERE status = 'selected' AND (local_path IS NULL OR local_path = '')
         ORDER BY word, id",
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(record_from_row).collect()
}

/// Known words (from records or the queue) that have no selected record
pub async fn words_without_selection(pool: &SqlitePool, lesson_id: Option<&str>) -> Result<Vec<String>> {
    let words: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT word FROM (
            SELECT word, COALESCE(lesson_id, '') AS lesson_id FROM curation_records
            UNION
            SELECT word, lesson_id FROM curation_queue
        )
        WHERE (? IS NULL OR lesson_id = ?)
          AND word NOT IN (SELECT word FROM curation_records WHERE status = 'selected')
        GROUP BY word
        ORDER BY word
        "#,
    )
    .bind(lesson_id)
    .bind(lesson_id)
    .fetch_all(pool)
    .await?;

    Ok(words)
}

fn record_from_row(row: &SqliteRow) -> Result<CurationRecord> {
    let tags: String = row.try_get("tags")?;
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let verified: i64 = row.try_get("manually_verified")?;

    Ok(CurationRecord {
        id: row.try_get("id")?,
        word: row.try_get("word")?,
        word_id: row.try_get("word_id")?,
        lesson_id: row.try_get("lesson_id")?,
        category: row.try_get("category")?,
        provider: row.try_get("provider")?,
        source_id: row.try_get("source_id")?,
        url: row.try_get("url")?,
        thumbnail_url: row.try_get("thumbnail_url")?,
        local_path: row.try_get("local_path")?,
        format: row.try_get("format")?,
        file_size: row.try_get("file_size")?,
        width: row.try_get("width")?,
        height: row.try_get("height")?,
        photographer: row.try_get("photographer")?,
        attribution: row.try_get("attribution")?,
        license: row.try_get("license")?,
        alt_text: row.try_get("alt_text")?,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        score_relevance: row.try_get("score_relevance")?,
        score_clarity: row.try_get("score_clarity")?,
        score_appropriateness: row.try_get("score_appropriateness")?,
        score_quality: row.try_get("score_quality")?,
        score_total: row.try_get("score_total")?,
        score_reason: row.try_get("score_reason")?,
        scoring_model: row.try_get("scoring_model")?,
        scored_at: parse_optional_timestamp(row.try_get("scored_at")?)?,
        status: status.parse::<CurationStatus>().map_err(Error::Internal)?,
        manually_verified: verified != 0,
        verified_by: row.try_get("verified_by")?,
        verified_at: parse_optional_timestamp(row.try_get("verified_at")?)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}
