//! Broker profile routes
//!
//! Responses here are the bare profile JSON with no envelope; clients bind
//! form fields to it directly.

use axum::extract::State;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde_json::{json, Value};
use tracing::info;

use loandesk_common::models::ProfileUpdate;

use crate::api::auth::Principal;
use crate::api::require_profile;
use crate::db;
use crate::{ApiError, ApiResult, AppState};

/// Build profile routes
pub fn profile_routes() -> Router<AppState> {
    Router::new().route("/user-profile", get(get_profile).put(update_profile))
}

/// GET /user-profile
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Value>> {
    let profile = require_profile(&state, &principal).await?;
    Ok(Json(json!(profile)))
}

/// PUT /user-profile
///
/// `user_email` and `company_code` are not mutable through this route; the
/// update type does not carry them.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult<Json<Value>> {
    let mut profile = require_profile(&state, &principal).await?;

    profile.apply_update(update);

    let updated = db::profiles::update_profile(&state.db, &profile).await?;
    if updated == 0 {
        return Err(ApiError::NotFound("User profile not found".to_string()));
    }

    info!(user = %profile.user_email, "Updated profile");
    Ok(Json(json!(profile)))
}
