//! Credential store.
//!
//! Passwords never leave this module in clear form; rows carry only the
//! salted SHA-256 digest.

use loandesk_common::Result;
use sqlx::{Row, SqlitePool};

/// A login credential row
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub guid: String,
    pub email: String,
    pub password_hash: String,
    pub password_salt: String,
}

/// Look up credentials by email
pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<UserRecord>> {
    let row = sqlx::query(
        "SELECT guid, email, password_hash, password_salt FROM users WHERE email = ?",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| UserRecord {
        guid: row.get("guid"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        password_salt: row.get("password_salt"),
    }))
}

/// Insert a credential row (operator provisioning)
pub async fn insert_user(pool: &SqlitePool, user: &UserRecord) -> Result<()> {
    sqlx::query(
        "INSERT INTO users (guid, email, password_hash, password_salt) VALUES (?, ?, ?, ?)",
    )
    .bind(&user.guid)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.password_salt)
    .execute(pool)
    .await?;

    Ok(())
}
