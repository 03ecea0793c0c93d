//! Document store

use loandesk_common::models::{AnalysisTask, DocStatus, Document};
use loandesk_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::parse_timestamp;

const DOCUMENT_COLUMNS: &str = "guid, company_code, user_email, application_guid, document_type, \
     document_name, storage_url, file_size, mime_type, adhoc, doc_status, result_ai, upload_date";

/// List a tenant's documents, newest upload first
pub async fn list_documents(
    pool: &SqlitePool,
    company_code: &str,
    user_email: &str,
) -> Result<Vec<Document>> {
    let query = format!(
        "SELECT {} FROM documents WHERE company_code = ? AND user_email = ? ORDER BY upload_date DESC",
        DOCUMENT_COLUMNS
    );
    let rows = sqlx::query(&query)
        .bind(company_code)
        .bind(user_email)
        .fetch_all(pool)
        .await?;

    rows.iter().map(document_from_row).collect()
}

/// Insert a document row with no analysis task (analysis not configured)
pub async fn insert_document(pool: &SqlitePool, doc: &Document) -> Result<()> {
    insert_document_stmt(doc).execute(pool).await?;
    Ok(())
}

/// Insert a document row and its queued analysis task in one transaction.
///
/// Either both rows land or neither does; a task can never reference a
/// missing document.
pub async fn insert_document_with_task(
    pool: &SqlitePool,
    doc: &Document,
    task: &AnalysisTask,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    insert_document_stmt(doc).execute(&mut *tx).await?;

    sqlx::query(
        r#"
        INSERT INTO analysis_tasks (
            guid, document_guid, state, attempts, last_error, run_after, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&task.guid)
    .bind(&task.document_guid)
    .bind(task.state.as_str())
    .bind(task.attempts)
    .bind(&task.last_error)
    .bind(task.run_after.to_rfc3339())
    .bind(task.created_at.to_rfc3339())
    .bind(task.updated_at.to_rfc3339())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

fn insert_document_stmt(
    doc: &Document,
) -> sqlx::query::Query<'_, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'_>> {
    sqlx::query(
        r#"
        INSERT INTO documents (
            guid, company_code, user_email, application_guid, document_type, document_name,
            storage_url, file_size, mime_type, adhoc, doc_status, result_ai, upload_date
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?)
        "#,
    )
    .bind(&doc.guid)
    .bind(&doc.company_code)
    .bind(&doc.user_email)
    .bind(&doc.application_guid)
    .bind(&doc.document_type)
    .bind(&doc.document_name)
    .bind(&doc.storage_url)
    .bind(doc.file_size)
    .bind(&doc.mime_type)
    .bind(&doc.adhoc)
    .bind(doc.doc_status.map(|s| s.as_str()))
    .bind(doc.upload_date.to_rfc3339())
}

/// Fetch one document by guid, unscoped.
///
/// Used by the analysis worker, which acts with service credentials rather
/// than a tenant session.
pub async fn get_document(pool: &SqlitePool, guid: &str) -> Result<Option<Document>> {
    let query = format!("SELECT {} FROM documents WHERE guid = ?", DOCUMENT_COLUMNS);
    let row = sqlx::query(&query).bind(guid).fetch_optional(pool).await?;

    row.as_ref().map(document_from_row).transpose()
}

/// Overwrite a document's analysis result and mark it processed.
///
/// Idempotent; last write wins. Returns the affected row count, 0 when the
/// document no longer exists.
pub async fn store_analysis_result(
    pool: &SqlitePool,
    guid: &str,
    result: &serde_json::Value,
) -> Result<u64> {
    let payload = serde_json::to_string(result)
        .map_err(|e| Error::Internal(format!("Serialize analysis result failed: {}", e)))?;

    let result = sqlx::query(
        "UPDATE documents SET result_ai = ?, doc_status = 'processed' WHERE guid = ?",
    )
    .bind(payload)
    .bind(guid)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Set a document's analysis status
pub async fn set_doc_status(pool: &SqlitePool, guid: &str, status: DocStatus) -> Result<()> {
    sqlx::query("UPDATE documents SET doc_status = ? WHERE guid = ?")
        .bind(status.as_str())
        .bind(guid)
        .execute(pool)
        .await?;

    Ok(())
}

fn document_from_row(row: &SqliteRow) -> Result<Document> {
    let doc_status: Option<String> = row.try_get("doc_status")?;
    let result_ai: Option<String> = row.try_get("result_ai")?;
    let upload_date: String = row.try_get("upload_date")?;

    Ok(Document {
        guid: row.try_get("guid")?,
        company_code: row.try_get("company_code")?,
        user_email: row.try_get("user_email")?,
        application_guid: row.try_get("application_guid")?,
        document_type: row.try_get("document_type")?,
        document_name: row.try_get("document_name")?,
        storage_url: row.try_get("storage_url")?,
        file_size: row.try_get("file_size")?,
        mime_type: row.try_get("mime_type")?,
        adhoc: row.try_get("adhoc")?,
        doc_status: doc_status.map(|s| s.parse()).transpose()?,
        result_ai: result_ai
            .map(|s| {
                serde_json::from_str(&s)
                    .map_err(|e| Error::Internal(format!("Invalid result_ai JSON: {}", e)))
            })
            .transpose()?,
        upload_date: parse_timestamp(&upload_date)?,
    })
}

// ============================================================================
// Tests
// ============================================================================
