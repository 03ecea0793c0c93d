//! Lead store
//!
//! Every read is scoped by the tenant pair; point lookups included, so one
//! tenant can neither read nor probe another tenant's guids.

use loandesk_common::models::Lead;
use loandesk_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::parse_timestamp;

const LEAD_COLUMNS: &str = "guid, company_code, user_email, lead_number, lead_source, \
     referrer_name, first_name, last_name, email, mobile_phone, preferred_contact_method, \
     loan_purpose, property_type, estimated_loan_amount, estimated_property_value, \
     is_first_home_buyer, urgency_level, pre_approval_needed, notes, assigned_broker, \
     lead_status, conversion_status, converted_to_application_date, created_at, updated_at, \
     created_by, updated_by";

/// List a tenant's leads, newest first
pub async fn list_leads(
    pool: &SqlitePool,
    company_code: &str,
    user_email: &str,
) -> Result<Vec<Lead>> {
    let query = format!(
        "SELECT {} FROM leads WHERE company_code = ? AND user_email = ? ORDER BY created_at DESC",
        LEAD_COLUMNS
    );
    let rows = sqlx::query(&query)
        .bind(company_code)
        .bind(user_email)
        .fetch_all(pool)
        .await?;

    rows.iter().map(lead_from_row).collect()
}

/// Insert a fully populated lead row
pub async fn insert_lead(pool: &SqlitePool, lead: &Lead) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO leads (
            guid, company_code, user_email, lead_number, lead_source, referrer_name,
            first_name, last_name, email, mobile_phone, preferred_contact_method,
            loan_purpose, property_type, estimated_loan_amount, estimated_property_value,
            is_first_home_buyer, urgency_level, pre_approval_needed, notes, assigned_broker,
            lead_status, conversion_status, converted_to_application_date,
            created_at, updated_at, created_by, updated_by
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&lead.guid)
    .bind(&lead.company_code)
    .bind(&lead.user_email)
    .bind(&lead.lead_number)
    .bind(&lead.lead_source)
    .bind(&lead.referrer_name)
    .bind(&lead.first_name)
    .bind(&lead.last_name)
    .bind(&lead.email)
    .bind(&lead.mobile_phone)
    .bind(&lead.preferred_contact_method)
    .bind(&lead.loan_purpose)
    .bind(&lead.property_type)
    .bind(lead.estimated_loan_amount)
    .bind(lead.estimated_property_value)
    .bind(lead.is_first_home_buyer)
    .bind(&lead.urgency_level)
    .bind(lead.pre_approval_needed)
    .bind(&lead.notes)
    .bind(&lead.assigned_broker)
    .bind(lead.lead_status.as_str())
    .bind(&lead.conversion_status)
    .bind(lead.converted_to_application_date.map(|d| d.to_rfc3339()))
    .bind(lead.created_at.to_rfc3339())
    .bind(lead.updated_at.to_rfc3339())
    .bind(&lead.created_by)
    .bind(&lead.updated_by)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch one lead by guid within the tenant pair
pub async fn get_lead(
    pool: &SqlitePool,
    guid: &str,
    company_code: &str,
    user_email: &str,
) -> Result<Option<Lead>> {
    let query = format!(
        "SELECT {} FROM leads WHERE guid = ? AND company_code = ? AND user_email = ?",
        LEAD_COLUMNS
    );
    let row = sqlx::query(&query)
        .bind(guid)
        .bind(company_code)
        .bind(user_email)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(lead_from_row).transpose()
}

/// Write back a lead's mutable columns, scoped by guid and tenant pair.
///
/// Returns the affected row count; 0 means the lead is not visible to this
/// tenant.
pub async fn update_lead(pool: &SqlitePool, lead: &Lead) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE leads SET
            lead_source = ?, referrer_name = ?, first_name = ?, last_name = ?, email = ?,
            mobile_phone = ?, preferred_contact_method = ?, loan_purpose = ?, property_type = ?,
            estimated_loan_amount = ?, estimated_property_value = ?, is_first_home_buyer = ?,
            urgency_level = ?, pre_approval_needed = ?, notes = ?, assigned_broker = ?,
            lead_status = ?, updated_at = ?, updated_by = ?
        WHERE guid = ? AND company_code = ? AND user_email = ?
        "#,
    )
    .bind(&lead.lead_source)
    .bind(&lead.referrer_name)
    .bind(&lead.first_name)
    .bind(&lead.last_name)
    .bind(&lead.email)
    .bind(&lead.mobile_phone)
    .bind(&lead.preferred_contact_method)
    .bind(&lead.loan_purpose)
    .bind(&lead.property_type)
    .bind(lead.estimated_loan_amount)
    .bind(lead.estimated_property_value)
    .bind(lead.is_first_home_buyer)
    .bind(&lead.urgency_level)
    .bind(lead.pre_approval_needed)
    .bind(&lead.notes)
    .bind(&lead.assigned_broker)
    .bind(lead.lead_status.as_str())
    .bind(lead.updated_at.to_rfc3339())
    .bind(&lead.updated_by)
    .bind(&lead.guid)
    .bind(&lead.company_code)
    .bind(&lead.user_email)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Delete a lead within the tenant pair; returns the affected row count
pub async fn delete_lead(
    pool: &SqlitePool,
    guid: &str,
    company_code: &str,
    user_email: &str,
) -> Result<u64> {
    let result =
        sqlx::query("DELETE FROM leads WHERE guid = ? AND company_code = ? AND user_email = ?")
            .bind(guid)
            .bind(company_code)
            .bind(user_email)
            .execute(pool)
            .await?;

    Ok(result.rows_affected())
}

pub(crate) fn lead_from_row(row: &SqliteRow) -> Result<Lead> {
    let status: String = row.try_get("lead_status")?;
    let converted_date: Option<String> = row.try_get("converted_to_application_date")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Lead {
        guid: row.try_get("guid")?,
        company_code: row.try_get("company_code")?,
        user_email: row.try_get("user_email")?,
        lead_number: row.try_get("lead_number")?,
        lead_source: row.try_get("lead_source")?,
        referrer_name: row.try_get("referrer_name")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        mobile_phone: row.try_get("mobile_phone")?,
        preferred_contact_method: row.try_get("preferred_contact_method")?,
        loan_purpose: row.try_get("loan_purpose")?,
        property_type: row.try_get("property_type")?,
        estimated_loan_amount: row.try_get("estimated_loan_amount")?,
        estimated_property_value: row.try_get("estimated_property_value")?,
        is_first_home_buyer: row.try_get("is_first_home_buyer")?,
        urgency_level: row.try_get("urgency_level")?,
        pre_approval_needed: row.try_get("pre_approval_needed")?,
        notes: row.try_get("notes")?,
        assigned_broker: row.try_get("assigned_broker")?,
        lead_status: status.parse()?,
        conversion_status: row.try_get("conversion_status")?,
        converted_to_application_date: converted_date
            .map(|d| parse_timestamp(&d))
            .transpose()?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        created_by: row.try_get("created_by")?,
        updated_by: row.try_get("updated_by")?,
    })
}

// ============================================================================
// Tests
// ============================================================================
