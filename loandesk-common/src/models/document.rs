//! Document metadata entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Analysis lifecycle of a document.
///
/// NULL in the database means analysis was never requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocStatus {
    Queued,
    Processing,
    Processed,
    Failed,
}

impl DocStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocStatus::Queued => "queued",
            DocStatus::Processing => "processing",
            DocStatus::Processed => "processed",
            DocStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for DocStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(DocStatus::Queued),
            "processing" => Ok(DocStatus::Processing),
            "processed" => Ok(DocStatus::Processed),
            "failed" => Ok(DocStatus::Failed),
            other => Err(crate::Error::Internal(format!(
                "Unknown document status: {}",
                other
            ))),
        }
    }
}

/// Metadata record for an uploaded document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub guid: String,
    pub company_code: String,
    pub user_email: String,
    /// NULL plus `adhoc = "yes"` marks a document not tied to an application
    pub application_guid: Option<String>,
    pub document_type: String,
    pub document_name: String,
    /// Public URL returned by the object store at upload time
    pub storage_url: String,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub adhoc: Option<String>,
    pub doc_status: Option<DocStatus>,
    /// Opaque analysis payload; overwritten whole on merge
    pub result_ai: Option<serde_json::Value>,
    pub upload_date: DateTime<Utc>,
}

/// Body of `POST /docload`; the three required fields are checked in the
/// handler so the failure is a single 400 with a stable message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewDocument {
    pub document_type: Option<String>,
    pub document_name: Option<String>,
    pub s3_document_url: Option<String>,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub adhoc: Option<String>,
    pub application_id: Option<String>,
}

impl Document {
    /// Build a document row from a validated ingestion body.
    ///
    /// `document_type`, `document_name`, and `storage_url` must already be
    /// known present.
    pub fn create(
        document_type: String,
        document_name: String,
        storage_url: String,
        body: NewDocument,
        company_code: &str,
        user_email: &str,
    ) -> Self {
        Self {
            guid: Uuid::new_v4().to_string(),
            company_code: company_code.to_string(),
            user_email: user_email.to_string(),
            application_guid: body.application_id,
            document_type,
            document_name,
            storage_url,
            file_size: body.file_size,
            mime_type: body.mime_type,
            adhoc: body.adhoc,
            doc_status: None,
            result_ai: None,
            upload_date: Utc::now(),
        }
    }
}
