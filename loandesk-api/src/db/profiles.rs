//! Broker profile store

use loandesk_common::models::UserProfile;
use loandesk_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::parse_timestamp;

const PROFILE_COLUMNS: &str = "guid, user_email, first_name, last_name, full_name, phone, \
     company_code, company_name, role, is_active, timezone, created_at, updated_at";

/// Fetch the profile for an email address; at most one row exists
pub async fn find_by_email(pool: &SqlitePool, user_email: &str) -> Result<Option<UserProfile>> {
    let query = format!(
        "SELECT {} FROM user_profiles WHERE user_email = ?",
        PROFILE_COLUMNS
    );
    let row = sqlx::query(&query)
        .bind(user_email)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(profile_from_row).transpose()
}

/// Insert a new profile (operator provisioning and tests)
pub async fn insert_profile(pool: &SqlitePool, profile: &UserProfile) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO user_profiles (
            guid, user_email, first_name, last_name, full_name, phone,
            company_code, company_name, role, is_active, timezone, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&profile.guid)
    .bind(&profile.user_email)
    .bind(&profile.first_name)
    .bind(&profile.last_name)
    .bind(&profile.full_name)
    .bind(&profile.phone)
    .bind(&profile.company_code)
    .bind(&profile.company_name)
    .bind(&profile.role)
    .bind(profile.is_active)
    .bind(&profile.timezone)
    .bind(profile.created_at.to_rfc3339())
    .bind(profile.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Write back a profile's mutable columns, keyed by email.
///
/// `company_code` is deliberately not in the SET list.
pub async fn update_profile(pool: &SqlitePool, profile: &UserProfile) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE user_profiles SET
            first_name = ?, last_name = ?, full_name = ?, phone = ?,
            company_name = ?, role = ?, is_active = ?, timezone = ?, updated_at = ?
        WHERE user_email = ?
        "#,
    )
    .bind(&profile.first_name)
    .bind(&profile.last_name)
    .bind(&profile.full_name)
    .bind(&profile.phone)
    .bind(&profile.company_name)
    .bind(&profile.role)
    .bind(profile.is_active)
    .bind(&profile.timezone)
    .bind(profile.updated_at.to_rfc3339())
    .bind(&profile.user_email)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

fn profile_from_row(row: &SqliteRow) -> Result<UserProfile> {
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(UserProfile {
        guid: row.try_get("guid")?,
        user_email: row.try_get("user_email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        full_name: row.try_get("full_name")?,
        phone: row.try_get("phone")?,
        company_code: row.try_get("company_code")?,
        company_name: row.try_get("company_name")?,
        role: row.try_get("role")?,
        is_active: row.try_get("is_active")?,
        timezone: row.try_get("timezone")?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}
