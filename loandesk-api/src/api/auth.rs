//! Session authentication
//!
//! `POST /auth/login` exchanges credentials for a bearer token, also set as
//! an HttpOnly cookie for browser clients. Every protected route passes
//! through [`require_session`], which resolves the token to the claims copied
//! at login and attaches them as a request extension.

use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use loandesk_common::auth::{generate_session_token, hash_token, verify_password};
use loandesk_common::db::settings;
use loandesk_common::models::Session;

use crate::db;
use crate::{ApiError, ApiResult, AppState};

/// Cookie carrying the session token for browser clients
pub const SESSION_COOKIE: &str = "loandesk_session";

/// Authenticated caller identity, attached as a request extension.
///
/// Claims come from the session row, never from request data.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_guid: String,
    pub user_email: String,
    pub company_code: String,
    pub token_hash: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Middleware guarding session-protected routes.
///
/// Accepts the token from `Authorization: Bearer` first, then the session
/// cookie. An expired session is deleted on sight and rejected.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(request.headers())
        .ok_or_else(|| ApiError::Unauthorized("Missing session token".to_string()))?;
    let token_hash = hash_token(&token);

    let session = db::sessions::find_session(&state.db, &token_hash)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid session token".to_string()))?;

    if session.is_expired(Utc::now()) {
        db::sessions::delete_session(&state.db, &token_hash).await?;
        debug!(user = %session.user_email, "Rejected expired session");
        return Err(ApiError::Unauthorized("Session expired".to_string()));
    }

    request.extensions_mut().insert(Principal {
        user_guid: session.user_guid,
        user_email: session.user_email,
        company_code: session.company_code,
        token_hash,
    });

    Ok(next.run(request).await)
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<Response> {
    let user = db::users::find_by_email(&state.db, &body.email)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid email or password".to_string()))?;

    if !verify_password(&user.password_salt, &body.password, &user.password_hash) {
        return Err(ApiError::Unauthorized(
            "Invalid email or password".to_string(),
        ));
    }

    // A credential without a profile cannot produce a usable session
    let profile = db::profiles::find_by_email(&state.db, &user.email)
        .await?
        .ok_or_else(|| ApiError::NotFound("User profile not found".to_string()))?;

    let timeout_seconds = settings::get_session_timeout_seconds(&state.db).await?;
    let token = generate_session_token();
    let now = Utc::now();
    let session = Session {
        token_hash: hash_token(&token),
        user_guid: user.guid,
        user_email: user.email,
        company_code: profile.company_code,
        created_at: now,
        expires_at: now + Duration::seconds(timeout_seconds),
    };
    db::sessions::insert_session(&state.db, &session).await?;

    info!(user = %session.user_email, "Login");

    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, timeout_seconds
    );
    let mut response = Json(LoginResponse {
        token,
        expires_at: session.expires_at,
    })
    .into_response();
    response.headers_mut().insert(
        SET_COOKIE,
        HeaderValue::from_str(&cookie)
            .map_err(|e| ApiError::Internal(format!("Set-Cookie build failed: {}", e)))?,
    );
    Ok(response)
}

/// POST /auth/logout
pub async fn logout(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Response> {
    db::sessions::delete_session(&state.db, &principal.token_hash).await?;
    info!(user = %principal.user_email, "Logout");

    let clear = format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE);
    let mut response = Json(json!({ "success": true })).into_response();
    response.headers_mut().insert(
        SET_COOKIE,
        HeaderValue::from_str(&clear)
            .map_err(|e| ApiError::Internal(format!("Set-Cookie build failed: {}", e)))?,
    );
    Ok(response)
}

/// Pull the session token from the request: bearer header first, cookie second
fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    let cookies = headers.get(COOKIE).and_then(|v| v.to_str().ok())?;
    let prefix = format!("{}=", SESSION_COOKIE);
    for pair in cookies.split(';') {
        if let Some(token) = pair.trim().strip_prefix(&prefix) {
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }
    None
}
