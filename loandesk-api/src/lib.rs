//! loandesk-api library interface
//!
//! Exposes the application state and router builder for integration testing.

pub mod api;
pub mod db;
pub mod error;
pub mod services;
pub mod storage;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use axum::{middleware, Router};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::services::AnalysisClient;
use crate::storage::{ObjectStore, UrlSigner};

/// Request body cap applied when the setting is absent
pub const DEFAULT_UPLOAD_LIMIT_BYTES: usize = 25 * 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Local object store holding uploaded document bytes
    pub objects: ObjectStore,
    /// Signer for presigned object URLs
    pub signer: UrlSigner,
    /// Client for the external analysis API
    pub analysis: AnalysisClient,
    /// Wakes the analysis worker when a task is enqueued
    pub worker_nudge: Arc<Notify>,
    /// Request body cap in bytes
    pub upload_limit_bytes: usize,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last worker error for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        objects: ObjectStore,
        signer: UrlSigner,
        analysis: AnalysisClient,
    ) -> Self {
        Self {
            db,
            objects,
            signer,
            analysis,
            worker_nudge: Arc::new(Notify::new()),
            upload_limit_bytes: DEFAULT_UPLOAD_LIMIT_BYTES,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_upload_limit(mut self, bytes: usize) -> Self {
        self.upload_limit_bytes = bytes;
        self
    }
}

/// Build the application router.
///
/// Session-protected routes sit behind the identity-resolver middleware;
/// login, upload, signed object GETs, and health stay public.
pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.upload_limit_bytes;

    let protected = Router::new()
        .merge(api::lead_routes())
        .merge(api::application_routes())
        .merge(api::document_routes())
        .merge(api::profile_routes())
        .route("/auth/logout", post(api::auth::logout))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth::require_session,
        ));

    let public = Router::new()
        .route("/auth/login", post(api::auth::login))
        .merge(api::upload_routes())
        .merge(api::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
