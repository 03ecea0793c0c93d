//! Document routes: ingestion, listing, synchronous analysis, previews

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

use loandesk_common::db::settings;
use loandesk_common::models::{AnalysisTask, DocStatus, Document, NewDocument};

use crate::api::auth::Principal;
use crate::api::require_profile;
use crate::db;
use crate::services::AnalysisError;
use crate::storage::extract_object_key;
use crate::{ApiError, ApiResult, AppState};

/// Upload acknowledgement sent to brokers; analysis lands asynchronously
const UPLOAD_MESSAGE: &str =
    "Document uploaded successfully. AI analysis will be available in less than 3 minutes.";

/// Build document routes
pub fn document_routes() -> Router<AppState> {
    Router::new()
        .route("/docload", get(list_documents).post(ingest_document))
        .route("/process-document", post(process_document))
        .route("/document-preview", post(document_preview))
}

/// GET /docload
pub async fn list_documents(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Value>> {
    require_profile(&state, &principal).await?;

    let docs =
        db::documents::list_documents(&state.db, &principal.company_code, &principal.user_email)
            .await?;
    Ok(Json(json!({ "success": true, "data": docs })))
}

/// POST /docload
///
/// Records document metadata and, when the analysis API is configured,
/// enqueues an analysis task in the same transaction and nudges the worker.
/// The response does not wait for analysis.
pub async fn ingest_document(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<NewDocument>,
) -> ApiResult<Json<Value>> {
    require_profile(&state, &principal).await?;

    let (document_type, document_name, storage_url) = match (
        body.document_type.as_deref().filter(|s| !s.is_empty()),
        body.document_name.as_deref().filter(|s| !s.is_empty()),
        body.s3_document_url.as_deref().filter(|s| !s.is_empty()),
    ) {
        (Some(t), Some(n), Some(u)) => (t.to_string(), n.to_string(), u.to_string()),
        _ => {
            return Err(ApiError::BadRequest("Missing required fields".to_string()));
        }
    };

    let mut doc = Document::create(
        document_type,
        document_name,
        storage_url,
        body,
        &principal.company_code,
        &principal.user_email,
    );

    let api_url = settings::get_analysis_api_url(&state.db).await?;
    let api_key = settings::get_analysis_api_key(&state.db).await?;
    let analysis_configured = !api_url.is_empty() && !api_key.is_empty();

    if analysis_configured {
        doc.doc_status = Some(DocStatus::Queued);
        let task = AnalysisTask::queued(&doc.guid);
        db::documents::insert_document_with_task(&state.db, &doc, &task).await?;
        state.worker_nudge.notify_one();
    } else {
        db::documents::insert_document(&state.db, &doc).await?;
    }

    info!(
        document = %doc.guid,
        document_type = %doc.document_type,
        analysis_queued = analysis_configured,
        "Ingested document"
    );
    Ok(Json(json!({
        "success": true,
        "data": doc,
        "message": UPLOAD_MESSAGE,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ProcessDocumentRequest {
    pub document_id: Option<String>,
}

/// POST /process-document
///
/// Synchronous variant of the analysis call: invokes the analysis API inline
/// and merges the result before responding. Upstream status codes pass
/// through; a non-JSON upstream response is a 502.
pub async fn process_document(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<ProcessDocumentRequest>,
) -> ApiResult<Json<Value>> {
    require_profile(&state, &principal).await?;

    let document_id = body
        .document_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("document_id is required".to_string()))?;

    let api_url = settings::get_analysis_api_url(&state.db).await?;
    let api_key = settings::get_analysis_api_key(&state.db).await?;
    if api_url.is_empty() || api_key.is_empty() {
        return Err(ApiError::Internal("Server configuration error".to_string()));
    }

    let timeout = Duration::from_secs(settings::get_analysis_timeout_seconds(&state.db).await?);

    let payload = state
        .analysis
        .process_document(&api_url, &api_key, timeout, document_id)
        .await
        .map_err(map_analysis_error)?;

    let stored = db::documents::store_analysis_result(&state.db, document_id, &payload)
        .await
        .map_err(|e| {
            tracing::error!(document = %document_id, "Failed to store analysis result: {}", e);
            ApiError::Internal("Document processed but failed to store result".to_string())
        })?;
    if stored == 0 {
        warn!(document = %document_id, "Analysis result stored for unknown document guid");
    }

    info!(document = %document_id, "Processed document synchronously");
    Ok(Json(json!({ "success": true, "data": payload })))
}

#[derive(Debug, Deserialize)]
pub struct DocumentPreviewRequest {
    pub s3_url: Option<String>,
}

/// POST /document-preview
///
/// Exchanges a stored object URL for a fresh presigned URL. The object store
/// is never touched; a URL for a missing object simply 404s when followed.
pub async fn document_preview(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<DocumentPreviewRequest>,
) -> ApiResult<Json<Value>> {
    require_profile(&state, &principal).await?;

    let s3_url = body
        .s3_url
        .as_deref()
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::BadRequest("S3 URL is required".to_string()))?;

    let key = extract_object_key(s3_url)
        .ok_or_else(|| ApiError::BadRequest("Invalid S3 URL format".to_string()))?;

    let ttl = settings::get_presign_ttl_seconds(&state.db).await?;
    let presigned = state.signer.presign(&key, ttl, chrono::Utc::now())?;

    Ok(Json(json!({
        "success": true,
        "presignedUrl": presigned,
        "key": key,
    })))
}

fn map_analysis_error(err: AnalysisError) -> ApiError {
    match err {
        AnalysisError::ProtocolViolation { status, snippet } => ApiError::UpstreamProtocol(
            format!("Analysis API returned non-JSON (status {}): {}", status, snippet),
        ),
        AnalysisError::Api { status, body } => ApiError::Upstream {
            status,
            message: body,
        },
        AnalysisError::Network(msg) => ApiError::Internal(format!("Analysis request failed: {}", msg)),
        AnalysisError::Parse(msg) => {
            ApiError::Internal(format!("Analysis response unreadable: {}", msg))
        }
    }
}
