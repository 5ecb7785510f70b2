//! Settings database operations
//!
//! Get/set accessors over the shared `settings` key-value table.

use lexi_common::Result;
use sqlx::{Pool, Sqlite};

/// Default bound for `retry_on_lock`
pub const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

/// API key stored for a search provider (`<provider>_api_key`)
pub async fn get_provider_api_key(db: &Pool<Sqlite>, provider: &str) -> Result<Option<String>> {
    get_setting::<String>(db, &format!("{}_api_key", provider)).await
}

pub async fn set_provider_api_key(db: &Pool<Sqlite>, provider: &str, key: &str) -> Result<()> {
    set_setting(db, &format!("{}_api_key", provider), key).await
}

/// Total time a write may spend retrying on "database is locked"
pub async fn get_max_lock_wait_ms(db: &Pool<Sqlite>) -> Result<u64> {
    get_setting(db, "max_lock_wait_ms")
        .await
        .map(|opt| opt.unwrap_or(DEFAULT_MAX_LOCK_WAIT_MS))
}

/// Vision model chosen by an operator, overriding auto-detection
pub async fn get_vision_model(db: &Pool<Sqlite>) -> Result<Option<String>> {
    get_setting::<String>(db, "vision_model").await
}

/// Generic setting getter
pub async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(Option<String>,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    match row {
        Some((Some(value),)) => {
            let parsed = value.parse::<T>().map_err(|e| {
                lexi_common::Error::Config(format!("Parse setting '{}' failed: {}", key, e))
            })?;
            Ok(Some(parsed))
        }
        _ => Ok(None),
    }
}

/// Generic setting setter
pub async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await?;

    Ok(())
}
