//! Session store.
//!
//! Rows are written at login and read on every authenticated request. Expiry
//! is enforced by the caller: `find_session` returns whatever row matches the
//! hash, expired or not.

use chrono::{DateTime, Utc};
use loandesk_common::models::Session;
use loandesk_common::Result;
use sqlx::{Row, SqlitePool};

use super::parse_timestamp;

/// Insert a session row at login
pub async fn insert_session(pool: &SqlitePool, session: &Session) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sessions (token_hash, user_guid, user_email, company_code, created_at, expires_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&session.token_hash)
    .bind(&session.user_guid)
    .bind(&session.user_email)
    .bind(&session.company_code)
    .bind(session.created_at.to_rfc3339())
    .bind(session.expires_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Look up a session by token digest
pub async fn find_session(pool: &SqlitePool, token_hash: &str) -> Result<Option<Session>> {
    let row = sqlx::query(
        r#"
        SELECT token_hash, user_guid, user_email, company_code, created_at, expires_at
        FROM sessions WHERE token_hash = ?
        "#,
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let created_at: String = row.try_get("created_at")?;
    let expires_at: String = row.try_get("expires_at")?;

    Ok(Some(Session {
        token_hash: row.try_get("token_hash")?,
        user_guid: row.try_get("user_guid")?,
        user_email: row.try_get("user_email")?,
        company_code: row.try_get("company_code")?,
        created_at: parse_timestamp(&created_at)?,
        expires_at: parse_timestamp(&expires_at)?,
    }))
}

/// Delete a session by token digest (logout, expired-session cleanup)
pub async fn delete_session(pool: &SqlitePool, token_hash: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
        .bind(token_hash)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Sweep every session that expired at or before `now`
pub async fn delete_expired(pool: &SqlitePool, now: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(now.to_rfc3339())
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
