//! Application routes, including the lead conversion workflow

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde_json::{json, Value};
use tracing::info;

use loandesk_common::models::{Application, ApplicationUpdate, NewApplication};
use loandesk_common::Error;

use crate::api::auth::Principal;
use crate::api::require_profile;
use crate::db;
use crate::{ApiError, ApiResult, AppState};

/// Build application routes
pub fn application_routes() -> Router<AppState> {
    Router::new()
        .route("/application", get(list_applications).post(convert_lead))
        .route(
            "/application/:id",
            get(get_application)
                .put(update_application)
                .delete(delete_application),
        )
}

/// GET /application
pub async fn list_applications(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Value>> {
    require_profile(&state, &principal).await?;

    let apps =
        db::applications::list_applications(&state.db, &principal.company_code, &principal.user_email)
            .await?;
    Ok(Json(json!({ "data": apps })))
}

/// POST /application
///
/// Converts a lead into an application. The insert and the lead status flip
/// happen in one transaction; a second conversion of the same lead hits the
/// UNIQUE constraint and maps to 409.
pub async fn convert_lead(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<NewApplication>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    require_profile(&state, &principal).await?;

    let lead_id = body
        .lead_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("lead_id is required".to_string()))?;

    let app = Application::create(
        lead_id,
        &principal.company_code,
        &principal.user_email,
        body.loan_amount,
        body.notes,
    );

    match db::applications::convert_lead(&state.db, &app).await {
        Ok(()) => {}
        Err(err) if is_unique_violation(&err) => {
            return Err(ApiError::Conflict(
                "Lead has already been converted".to_string(),
            ));
        }
        Err(err) => return Err(err.into()),
    }

    info!(
        application = %app.guid,
        lead = %app.lead_guid,
        code = %app.application_code,
        "Converted lead to application"
    );
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": app })),
    ))
}

/// GET /application/:id
pub async fn get_application(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    require_profile(&state, &principal).await?;

    let app = db::applications::get_application(
        &state.db,
        &id,
        &principal.company_code,
        &principal.user_email,
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Application not found".to_string()))?;
    Ok(Json(json!({ "success": true, "data": app })))
}

/// PUT /application/:id
pub async fn update_application(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(update): Json<ApplicationUpdate>,
) -> ApiResult<Json<Value>> {
    require_profile(&state, &principal).await?;

    let mut app = db::applications::get_application(
        &state.db,
        &id,
        &principal.company_code,
        &principal.user_email,
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Application not found".to_string()))?;

    app.apply_update(update);

    let updated = db::applications::update_application(&state.db, &app).await?;
    if updated == 0 {
        return Err(ApiError::NotFound("Application not found".to_string()));
    }

    Ok(Json(json!({ "success": true, "data": app })))
}

/// DELETE /application/:id
pub async fn delete_application(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    require_profile(&state, &principal).await?;

    let deleted = db::applications::delete_application(
        &state.db,
        &id,
        &principal.company_code,
        &principal.user_email,
    )
    .await?;
    if deleted == 0 {
        return Err(ApiError::NotFound("Application not found".to_string()));
    }

    info!(application = %id, "Deleted application");
    Ok(Json(
        json!({ "success": true, "message": "Application deleted successfully" }),
    ))
}

/// One application per lead; a duplicate conversion surfaces as a UNIQUE hit
fn is_unique_violation(err: &Error) -> bool {
    match err {
        Error::Database(sqlx::Error::Database(dbe)) => dbe.is_unique_violation(),
        _ => false,
    }
}
