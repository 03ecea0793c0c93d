//! Lead CRUD routes
//!
//! Every route resolves the caller's profile first and scopes queries by the
//! session's tenant pair; identity fields sent in request bodies are ignored.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde_json::{json, Value};
use tracing::info;

use loandesk_common::models::{Lead, LeadUpdate, NewLead};

use crate::api::auth::Principal;
use crate::api::require_profile;
use crate::db;
use crate::{ApiError, ApiResult, AppState};

/// Build lead routes
pub fn lead_routes() -> Router<AppState> {
    Router::new()
        .route("/leads", get(list_leads).post(create_lead))
        .route(
            "/leads/:id",
            get(get_lead)
                .put(update_lead)
                .patch(update_lead)
                .delete(delete_lead),
        )
}

/// GET /leads
pub async fn list_leads(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Value>> {
    require_profile(&state, &principal).await?;

    let leads =
        db::leads::list_leads(&state.db, &principal.company_code, &principal.user_email).await?;
    Ok(Json(json!({ "data": leads })))
}

/// POST /leads
pub async fn create_lead(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<NewLead>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    require_profile(&state, &principal).await?;

    let lead = Lead::create(body, &principal.company_code, &principal.user_email);
    db::leads::insert_lead(&state.db, &lead).await?;

    info!(lead = %lead.guid, lead_number = %lead.lead_number, "Created lead");
    Ok((StatusCode::CREATED, Json(json!({ "data": lead }))))
}

/// GET /leads/:id
pub async fn get_lead(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    require_profile(&state, &principal).await?;

    let lead = db::leads::get_lead(&state.db, &id, &principal.company_code, &principal.user_email)
        .await?
        .ok_or_else(|| ApiError::NotFound("Lead not found".to_string()))?;
    Ok(Json(json!({ "data": lead })))
}

/// PUT/PATCH /leads/:id
pub async fn update_lead(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(update): Json<LeadUpdate>,
) -> ApiResult<Json<Value>> {
    require_profile(&state, &principal).await?;

    let mut lead =
        db::leads::get_lead(&state.db, &id, &principal.company_code, &principal.user_email)
            .await?
            .ok_or_else(|| ApiError::NotFound("Lead not found".to_string()))?;

    lead.apply_update(update, &principal.user_email);

    let updated = db::leads::update_lead(&state.db, &lead).await?;
    if updated == 0 {
        return Err(ApiError::NotFound("Lead not found".to_string()));
    }

    Ok(Json(json!({ "data": lead })))
}

/// DELETE /leads/:id
pub async fn delete_lead(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    require_profile(&state, &principal).await?;

    let deleted =
        db::leads::delete_lead(&state.db, &id, &principal.company_code, &principal.user_email)
            .await?;
    if deleted == 0 {
        return Err(ApiError::NotFound("Lead not found".to_string()));
    }

    info!(lead = %id, "Deleted lead");
    Ok(Json(
        json!({ "success": true, "message": "Lead deleted successfully" }),
    ))
}
