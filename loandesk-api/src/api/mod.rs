//! HTTP API handlers

pub mod applications;
pub mod auth;
pub mod documents;
pub mod health;
pub mod leads;
pub mod profile;
pub mod uploads;

pub use applications::application_routes;
pub use documents::document_routes;
pub use health::health_routes;
pub use leads::lead_routes;
pub use profile::profile_routes;
pub use uploads::upload_routes;

use loandesk_common::models::UserProfile;

use crate::api::auth::Principal;
use crate::db;
use crate::{ApiError, ApiResult, AppState};

/// Resolve the caller's profile row, the gate for tenant-scoped routes.
///
/// A credential without a profile cannot touch tenant data; a session whose
/// tenant no longer matches the profile (operator moved the broker) is
/// rejected outright.
pub(crate) async fn require_profile(
    state: &AppState,
    principal: &Principal,
) -> ApiResult<UserProfile> {
    let profile = db::profiles::find_by_email(&state.db, &principal.user_email)
        .await?
        .ok_or_else(|| ApiError::NotFound("User profile not found".to_string()))?;

    if profile.company_code != principal.company_code {
        return Err(ApiError::Unauthorized(
            "Session tenant no longer matches profile".to_string(),
        ));
    }

    Ok(profile)
}
