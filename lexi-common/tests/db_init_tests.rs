//! Unit tests for database initialization

use lexi_common::db::init::init_database;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let temp = tempfile::tempdir().unwrap();
    let db_path = temp.path().join("sub").join("lexi.db");

    let result = init_database(&db_path).await;
    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let temp = tempfile::tempdir().unwrap();
    let db_path = temp.path().join("lexi.db");

    let pool1 = init_database(&db_path).await.unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());
}

#[tokio::test]
async fn test_default_settings_initialized() {
    let temp = tempfile::tempdir().unwrap();
    let pool = init_database(&temp.path().join("lexi.db")).await.unwrap();

    let value: Option<String> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = 'max_lock_wait_ms'")
            .fetch_optional(&pool)
            .await
            .unwrap();
    assert_eq!(value.as_deref(), Some("5000"));
}

#[tokio::test]
async fn test_existing_setting_not_overwritten() {
    let temp = tempfile::tempdir().unwrap();
    let db_path = temp.path().join("lexi.db");

    let pool = init_database(&db_path).await.unwrap();
    sqlx::query("UPDATE settings SET value = '250' WHERE key = 'max_lock_wait_ms'")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    let value: String =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = 'max_lock_wait_ms'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(value, "250");
}

#[tokio::test]
async fn test_pragmas_applied() {
    let temp = tempfile::tempdir().unwrap();
    let pool = init_database(&temp.path().join("lexi.db")).await.unwrap();

    let journal_mode: String = sqlx::query_scalar("PRAGMA journal_mode")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(journal_mode.to_lowercase(), "wal");

    let foreign_keys: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(foreign_keys, 1);
}
