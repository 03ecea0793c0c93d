//! Binary upload and signed object reads
//!
//! `POST /fileupload` is the first step of document ingestion: it stores the
//! raw bytes and hands back the URL that `POST /docload` later records. The
//! signed `GET /objects/{key}` route is the only read path; the signature in
//! the query string is the whole credential.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::storage::make_key;
use crate::{ApiError, ApiResult, AppState};

/// Build upload and object-read routes
pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/fileupload", post(file_upload))
        .route("/objects/*key", get(serve_object))
}

/// POST /fileupload (multipart)
///
/// Fields: `file` (required), `path` (optional key prefix).
pub async fn file_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut path_hint: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::Internal("Error uploading file.".to_string()))?
    {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|_| ApiError::Internal("Error uploading file.".to_string()))?;
                file = Some((filename, bytes.to_vec()));
            }
            Some("path") => {
                path_hint = field.text().await.ok().filter(|s| !s.is_empty());
            }
            _ => {}
        }
    }

    let (filename, bytes) =
        file.ok_or_else(|| ApiError::BadRequest("File is required.".to_string()))?;

    let key = make_key(path_hint.as_deref(), &filename, Utc::now().timestamp_millis());

    if let Err(e) = state.objects.put(&key, &bytes).await {
        error!(key = %key, "Object store write failed: {}", e);
        return Err(ApiError::Internal("Error uploading file.".to_string()));
    }

    let url = state.signer.public_url(&key);
    info!(key = %key, size = bytes.len(), "Stored uploaded file");
    Ok(Json(json!({
        "success": true,
        "url": url,
        "fileName": filename,
        "key": key,
    })))
}

#[derive(Debug, Deserialize)]
pub struct SignedReadQuery {
    pub expires: Option<i64>,
    pub signature: Option<String>,
}

/// GET /objects/*key
///
/// Serves object bytes when the presigned query checks out. Expiry is
/// checked against the clock; the signature covers both key and expiry, so
/// neither can be tampered with.
pub async fn serve_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<SignedReadQuery>,
) -> ApiResult<Response> {
    let expires = query
        .expires
        .ok_or_else(|| ApiError::Unauthorized("Missing signature".to_string()))?;
    let signature = query
        .signature
        .as_deref()
        .ok_or_else(|| ApiError::Unauthorized("Missing signature".to_string()))?;

    if expires < Utc::now().timestamp() {
        return Err(ApiError::Unauthorized("URL has expired".to_string()));
    }
    if !state.signer.verify(&key, expires, signature) {
        return Err(ApiError::Unauthorized("Invalid signature".to_string()));
    }

    let bytes = state
        .objects
        .read(&key)
        .await?
        .ok_or_else(|| ApiError::NotFound("Object not found".to_string()))?;

    let mime = infer::get(&bytes)
        .map(|t| t.mime_type())
        .unwrap_or("application/octet-stream");

    Ok(([(header::CONTENT_TYPE, mime)], bytes).into_response())
}
