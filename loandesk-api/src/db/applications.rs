//! Application store and the conversion transaction

use loandesk_common::models::Application;
use loandesk_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::parse_timestamp;

const APPLICATION_COLUMNS: &str = "guid, application_code, lead_guid, company_code, user_email, \
     application_status, loan_amount, notes, created_at, updated_at";

/// List a tenant's applications, newest first
pub async fn list_applications(
    pool: &SqlitePool,
    company_code: &str,
    user_email: &str,
) -> Result<Vec<Application>> {
    let query = format!(
        "SELECT {} FROM applications WHERE company_code = ? AND user_email = ? ORDER BY created_at DESC",
        APPLICATION_COLUMNS
    );
    let rows = sqlx::query(&query)
        .bind(company_code)
        .bind(user_email)
        .fetch_all(pool)
        .await?;

    rows.iter().map(application_from_row).collect()
}

/// Convert a lead: insert the application and flip the lead, atomically.
///
/// The `UNIQUE(lead_guid)` constraint rejects a second conversion inside the
/// transaction; callers map that unique violation to a conflict. A lead
/// update touching zero rows means the lead is not visible to this tenant,
/// the transaction rolls back and `NotFound` is returned.
pub async fn convert_lead(pool: &SqlitePool, app: &Application) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO applications (
            guid, application_code, lead_guid, company_code, user_email,
            application_status, loan_amount, notes, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&app.guid)
    .bind(&app.application_code)
    .bind(&app.lead_guid)
    .bind(&app.company_code)
    .bind(&app.user_email)
    .bind(&app.application_status)
    .bind(app.loan_amount)
    .bind(&app.notes)
    .bind(app.created_at.to_rfc3339())
    .bind(app.updated_at.to_rfc3339())
    .execute(&mut *tx)
    .await?;

    let stamp = app.created_at.to_rfc3339();
    let updated = sqlx::query(
        r#"
        UPDATE leads SET
            lead_status = 'converted',
            conversion_status = 'converted',
            converted_to_application_date = ?,
            updated_at = ?,
            updated_by = ?
        WHERE guid = ? AND company_code = ? AND user_email = ?
        "#,
    )
    .bind(&stamp)
    .bind(&stamp)
    .bind(&app.user_email)
    .bind(&app.lead_guid)
    .bind(&app.company_code)
    .bind(&app.user_email)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if updated == 0 {
        tx.rollback().await?;
        return Err(Error::NotFound("Lead not found".to_string()));
    }

    tx.commit().await?;
    Ok(())
}

/// Fetch one application by guid within the tenant pair
pub async fn get_application(
    pool: &SqlitePool,
    guid: &str,
    company_code: &str,
    user_email: &str,
) -> Result<Option<Application>> {
    let query = format!(
        "SELECT {} FROM applications WHERE guid = ? AND company_code = ? AND user_email = ?",
        APPLICATION_COLUMNS
    );
    let row = sqlx::query(&query)
        .bind(guid)
        .bind(company_code)
        .bind(user_email)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(application_from_row).transpose()
}

/// Write back an application's mutable columns; returns the affected row count
pub async fn update_application(pool: &SqlitePool, app: &Application) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE applications SET application_status = ?, loan_amount = ?, notes = ?, updated_at = ?
        WHERE guid = ? AND company_code = ? AND user_email = ?
        "#,
    )
    .bind(&app.application_status)
    .bind(app.loan_amount)
    .bind(&app.notes)
    .bind(app.updated_at.to_rfc3339())
    .bind(&app.guid)
    .bind(&app.company_code)
    .bind(&app.user_email)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Delete an application within the tenant pair; returns the affected row count
pub async fn delete_application(
    pool: &SqlitePool,
    guid: &str,
    company_code: &str,
    user_email: &str,
) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM applications WHERE guid = ? AND company_code = ? AND user_email = ?",
    )
    .bind(guid)
    .bind(company_code)
    .bind(user_email)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

fn application_from_row(row: &SqliteRow) -> Result<Application> {
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Application {
        guid: row.try_get("guid")?,
        application_code: row.try_get("application_code")?,
        lead_guid: row.try_get("lead_guid")?,
        company_code: row.try_get("company_code")?,
        user_email: row.try_get("user_email")?,
        application_status: row.try_get("application_status")?,
        loan_amount: row.try_get("loan_amount")?,
        notes: row.try_get("notes")?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

// ============================================================================
// Tests
// ============================================================================
