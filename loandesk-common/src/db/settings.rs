//! Settings table accessors
//!
//! Generic typed get/set over the key-value settings table, plus named
//! wrappers for the keys the service reads at runtime.

use crate::{Error, Result};
use sqlx::{Pool, Sqlite};

/// Get a setting parsed to the requested type
pub async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(Option<String>,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    match row {
        Some((Some(value),)) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting '{}' failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        _ => Ok(None),
    }
}

/// Get a setting, falling back to a default when absent
pub async fn get_setting_or<T>(db: &Pool<Sqlite>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    Ok(get_setting(db, key).await?.unwrap_or(default))
}

/// Set a setting (upsert)
pub async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

/// Get the analysis API endpoint; empty string when not configured
pub async fn get_analysis_api_url(db: &Pool<Sqlite>) -> Result<String> {
    get_setting_or(db, "analysis_api_url", String::new()).await
}

/// Get the analysis API key; empty string disables analysis
pub async fn get_analysis_api_key(db: &Pool<Sqlite>) -> Result<String> {
    get_setting_or(db, "analysis_api_key", String::new()).await
}

/// Get the per-call analysis timeout in seconds
pub async fn get_analysis_timeout_seconds(db: &Pool<Sqlite>) -> Result<u64> {
    get_setting_or(db, "analysis_timeout_seconds", 30).await
}

/// Get the attempt cap before a task is marked failed
pub async fn get_analysis_max_attempts(db: &Pool<Sqlite>) -> Result<i64> {
    get_setting_or(db, "analysis_max_attempts", 5).await
}

/// Get the retry backoff base in milliseconds
pub async fn get_analysis_retry_base_ms(db: &Pool<Sqlite>) -> Result<u64> {
    get_setting_or(db, "analysis_retry_base_ms", 1000).await
}

/// Get the worker poll interval in seconds
pub async fn get_analysis_poll_interval_seconds(db: &Pool<Sqlite>) -> Result<u64> {
    get_setting_or(db, "analysis_poll_interval_seconds", 10).await
}

/// Get the session lifetime in seconds
pub async fn get_session_timeout_seconds(db: &Pool<Sqlite>) -> Result<i64> {
    get_setting_or(db, "session_timeout_seconds", 604_800).await
}

/// Get the presigned URL lifetime in seconds
pub async fn get_presign_ttl_seconds(db: &Pool<Sqlite>) -> Result<i64> {
    get_setting_or(db, "presign_ttl_seconds", 3600).await
}

/// Get the presign secret; generated at init, so absent only on a database
/// that skipped initialization
pub async fn get_presign_secret(db: &Pool<Sqlite>) -> Result<String> {
    get_setting(db, "presign_secret")
        .await?
        .ok_or_else(|| Error::Config("presign_secret is not initialized".to_string()))
}

/// Get the public base URL used to build object URLs
pub async fn get_public_base_url(db: &Pool<Sqlite>) -> Result<String> {
    get_setting_or(db, "public_base_url", "http://127.0.0.1:5780".to_string()).await
}

/// Get the lock contention wait budget in milliseconds
pub async fn get_db_max_lock_wait_ms(db: &Pool<Sqlite>) -> Result<u64> {
    get_setting_or(db, "db_max_lock_wait_ms", 5000).await
}

// ============================================================================
// Tests
// ============================================================================
