//! Integration tests for the LoanDesk HTTP API
//!
//! Tests the complete API surface including:
//! - Login, logout, and session expiry
//! - Tenant scoping across leads, applications, and documents
//! - Lead conversion and the duplicate-conversion guard
//! - Document ingestion and queue wiring
//! - Uploads, presigned URLs, and signed object reads

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tower::ServiceExt;
use uuid::Uuid;

use loandesk_api::db;
use loandesk_api::db::users::UserRecord;
use loandesk_api::services::AnalysisClient;
use loandesk_api::storage::{ObjectStore, UrlSigner};
use loandesk_api::{build_router, AppState};
use loandesk_common::auth::{generate_salt, hash_password, hash_token};
use loandesk_common::db::init::{init_default_settings, init_schema};
use loandesk_common::db::settings;
use loandesk_common::models::{Session, TaskState, UserProfile};

const TEST_PASSWORD: &str = "hunter2-test-password";

struct TestApp {
    router: Router,
    pool: SqlitePool,
    state: AppState,
    _objects_root: tempfile::TempDir,
}

/// Test helper to create a full application over an in-memory database.
///
/// A single pooled connection keeps the in-memory database and its pragmas
/// visible to every query.
async fn setup_test_app() -> TestApp {
    let objects_root = tempfile::tempdir().expect("Failed to create temp dir");

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .unwrap();
    init_schema(&pool).await.expect("Failed to apply schema");
    init_default_settings(&pool)
        .await
        .expect("Failed to seed settings");

    let secret = settings::get_presign_secret(&pool).await.unwrap();
    let base_url = settings::get_public_base_url(&pool).await.unwrap();

    let state = AppState::new(
        pool.clone(),
        ObjectStore::new(objects_root.path()),
        UrlSigner::new(secret, base_url),
        AnalysisClient::new().expect("Failed to build analysis client"),
    );
    let router = build_router(state.clone());

    TestApp {
        router,
        pool,
        state,
        _objects_root: objects_root,
    }
}

/// Provision a broker account directly, returning the credential guid
async fn seed_account(pool: &SqlitePool, email: &str, company_code: &str) -> String {
    let salt = generate_salt();
    let user = UserRecord {
        guid: Uuid::new_v4().to_string(),
        email: email.to_string(),
        password_hash: hash_password(&salt, TEST_PASSWORD),
        password_salt: salt,
    };
    db::users::insert_user(pool, &user).await.unwrap();

    let profile = UserProfile::create(email, company_code, Some("Test Broker".to_string()));
    db::profiles::insert_profile(pool, &profile).await.unwrap();

    user.guid
}

/// Log in through the API and return the session token
async fn login(app: &TestApp, email: &str) -> String {
    let (status, body) = request(
        &app.router,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "email": email, "password": TEST_PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    body["token"].as_str().unwrap().to_string()
}

/// Helper function to make JSON requests to the test router
async fn request(
    router: &Router,
    method: Method,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }

    let request = match body {
        Some(json_body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json_body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };

    (status, body)
}

/// GET a path returning the raw body and content type
async fn raw_get(router: &Router, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    (status, content_type, bytes.to_vec())
}

/// POST a multipart upload with an optional path hint field
async fn upload_file(
    router: &Router,
    filename: Option<&str>,
    bytes: &[u8],
    path_hint: Option<&str>,
) -> (StatusCode, Value) {
    let boundary = "loandesk-test-boundary";
    let mut body = Vec::new();

    if let Some(filename) = filename {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    if let Some(hint) = path_hint {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"path\"\r\n\r\n");
        body.extend_from_slice(hint.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/fileupload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

    (status, body)
}

/// Reduce an absolute URL to the path-and-query form the router matches on
fn path_and_query(absolute: &str) -> String {
    let parsed = url::Url::parse(absolute).unwrap();
    match parsed.query() {
        Some(query) => format!("{}?{}", parsed.path(), query),
        None => parsed.path().to_string(),
    }
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_reports_service_identity() {
    let app = setup_test_app().await;

    let (status, body) = request(&app.router, Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "loandesk-api");
    assert!(body["version"].is_string());
    assert!(body["uptime_seconds"].is_number());
    assert!(body.get("last_error").is_none());
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_login_rejects_wrong_password() {
    let app = setup_test_app().await;
    seed_account(&app.pool, "broker@acme.test", "ACME").await;

    let (status, body) = request(
        &app.router,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "email": "broker@acme.test", "password": "wrong" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "Invalid email or password");
}

#[tokio::test]
async fn test_login_unknown_email_gets_same_rejection() {
    let app = setup_test_app().await;
    seed_account(&app.pool, "broker@acme.test", "ACME").await;

    let (status, body) = request(
        &app.router,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "email": "nobody@acme.test", "password": TEST_PASSWORD })),
    )
    .await;

    // Unknown email and wrong password must be indistinguishable
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "Invalid email or password");
}

#[tokio::test]
async fn test_login_issues_token_accepted_by_protected_routes() {
    let app = setup_test_app().await;
    seed_account(&app.pool, "broker@acme.test", "ACME").await;
    let token = login(&app, "broker@acme.test").await;

    let (status, body) = request(&app.router, Method::GET, "/leads", Some(&token), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = setup_test_app().await;

    for path in ["/leads", "/application", "/docload", "/user-profile"] {
        let (status, body) = request(&app.router, Method::GET, path, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "GET {} without token", path);
        assert_eq!(body["error"]["message"], "Missing session token");
    }
}

#[tokio::test]
async fn test_session_cookie_authenticates() {
    let app = setup_test_app().await;
    seed_account(&app.pool, "broker@acme.test", "ACME").await;

    let login_request = Request::builder()
        .method(Method::POST)
        .uri("/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "email": "broker@acme.test", "password": TEST_PASSWORD }).to_string(),
        ))
        .unwrap();
    let response = app.router.clone().oneshot(login_request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("login should set a session cookie")
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.starts_with("loandesk_session="));
    assert!(set_cookie.contains("HttpOnly"));
    let cookie_pair = set_cookie.split(';').next().unwrap().to_string();

    let leads_request = Request::builder()
        .method(Method::GET)
        .uri("/leads")
        .header(header::COOKIE, cookie_pair)
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(leads_request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_logout_invalidates_session() {
    let app = setup_test_app().await;
    seed_account(&app.pool, "broker@acme.test", "ACME").await;
    let token = login(&app, "broker@acme.test").await;

    let (status, body) =
        request(&app.router, Method::POST, "/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, body) = request(&app.router, Method::GET, "/leads", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "Invalid session token");
}

#[tokio::test]
async fn test_expired_session_rejected_and_removed() {
    let app = setup_test_app().await;
    let user_guid = seed_account(&app.pool, "broker@acme.test", "ACME").await;

    let token = "stale-token-0000000000000000000000000000";
    let session = Session {
        token_hash: hash_token(token),
        user_guid,
        user_email: "broker@acme.test".to_string(),
        company_code: "ACME".to_string(),
        created_at: Utc::now() - Duration::days(8),
        expires_at: Utc::now() - Duration::days(1),
    };
    db::sessions::insert_session(&app.pool, &session)
        .await
        .unwrap();

    let (status, body) = request(&app.router, Method::GET, "/leads", Some(token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "Session expired");

    // The expired row is deleted on first sight
    let remaining = db::sessions::find_session(&app.pool, &session.token_hash)
        .await
        .unwrap();
    assert!(remaining.is_none());
}

#[tokio::test]
async fn test_session_without_profile_cannot_reach_tenant_routes() {
    let app = setup_test_app().await;
    seed_account(&app.pool, "broker@acme.test", "ACME").await;
    let token = login(&app, "broker@acme.test").await;

    sqlx::query("DELETE FROM user_profiles WHERE user_email = ?")
        .bind("broker@acme.test")
        .execute(&app.pool)
        .await
        .unwrap();

    let (status, body) = request(&app.router, Method::GET, "/leads", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "User profile not found");
}

// ============================================================================
// Leads
// ============================================================================

#[tokio::test]
async fn test_lead_create_stamps_identity_from_session() {
    let app = setup_test_app().await;
    seed_account(&app.pool, "broker@acme.test", "ACME").await;
    let token = login(&app, "broker@acme.test").await;

    let (status, body) = request(
        &app.router,
        Method::POST,
        "/leads",
        Some(&token),
        Some(json!({
            "first_name": "Ada",
            "last_name": "Lovelace",
            "email": "ada@example.com",
            "loan_purpose": "purchase",
            "estimated_loan_amount": 750000.0
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let lead = &body["data"];
    assert_eq!(lead["company_code"], "ACME");
    assert_eq!(lead["user_email"], "broker@acme.test");
    assert_eq!(lead["created_by"], "broker@acme.test");
    assert_eq!(lead["lead_status"], "new");
    assert_eq!(lead["first_name"], "Ada");
    assert!(lead["lead_number"].as_str().unwrap().starts_with("LEAD-"));
}

#[tokio::test]
async fn test_lead_update_and_delete_round_trip() {
    let app = setup_test_app().await;
    seed_account(&app.pool, "broker@acme.test", "ACME").await;
    let token = login(&app, "broker@acme.test").await;

    let (_, body) = request(
        &app.router,
        Method::POST,
        "/leads",
        Some(&token),
        Some(json!({ "first_name": "Ada" })),
    )
    .await;
    let guid = body["data"]["guid"].as_str().unwrap().to_string();

    let (status, body) = request(
        &app.router,
        Method::PUT,
        &format!("/leads/{}", guid),
        Some(&token),
        Some(json!({ "first_name": "Grace", "lead_status": "contacted" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["first_name"], "Grace");
    assert_eq!(body["data"]["lead_status"], "contacted");
    assert_eq!(body["data"]["updated_by"], "broker@acme.test");

    let (status, body) = request(
        &app.router,
        Method::GET,
        &format!("/leads/{}", guid),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["first_name"], "Grace");

    let (status, body) = request(
        &app.router,
        Method::DELETE,
        &format!("/leads/{}", guid),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Lead deleted successfully");

    let (status, _) = request(
        &app.router,
        Method::GET,
        &format!("/leads/{}", guid),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_leads_invisible_across_tenants_and_brokers() {
    let app = setup_test_app().await;
    seed_account(&app.pool, "a@acme.test", "ACME").await;
    seed_account(&app.pool, "b@acme.test", "ACME").await;
    seed_account(&app.pool, "c@rival.test", "RIVAL").await;
    let token_a = login(&app, "a@acme.test").await;
    let token_b = login(&app, "b@acme.test").await;
    let token_c = login(&app, "c@rival.test").await;

    let (_, body) = request(
        &app.router,
        Method::POST,
        "/leads",
        Some(&token_a),
        Some(json!({ "first_name": "Ada" })),
    )
    .await;
    let guid = body["data"]["guid"].as_str().unwrap().to_string();

    // Another broker in the same company sees nothing
    let (_, body) = request(&app.router, Method::GET, "/leads", Some(&token_b), None).await;
    assert_eq!(body["data"], json!([]));

    // A different company sees nothing either
    let (_, body) = request(&app.router, Method::GET, "/leads", Some(&token_c), None).await;
    assert_eq!(body["data"], json!([]));

    let (status, _) = request(
        &app.router,
        Method::GET,
        &format!("/leads/{}", guid),
        Some(&token_b),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = request(
        &app.router,
        Method::PUT,
        &format!("/leads/{}", guid),
        Some(&token_c),
        Some(json!({ "first_name": "Hijack" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = request(
        &app.router,
        Method::DELETE,
        &format!("/leads/{}", guid),
        Some(&token_c),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The owner still sees the lead untouched
    let (status, body) = request(
        &app.router,
        Method::GET,
        &format!("/leads/{}", guid),
        Some(&token_a),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["first_name"], "Ada");
}

// ============================================================================
// Lead conversion and applications
// ============================================================================

async fn create_lead(app: &TestApp, token: &str) -> String {
    let (status, body) = request(
        &app.router,
        Method::POST,
        "/leads",
        Some(token),
        Some(json!({ "first_name": "Ada", "estimated_loan_amount": 640000.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["data"]["guid"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_conversion_creates_application_and_flips_lead() {
    let app = setup_test_app().await;
    seed_account(&app.pool, "broker@acme.test", "ACME").await;
    let token = login(&app, "broker@acme.test").await;
    let lead_guid = create_lead(&app, &token).await;

    let (status, body) = request(
        &app.router,
        Method::POST,
        "/application",
        Some(&token),
        Some(json!({ "lead_id": lead_guid, "loan_amount": 640000.0 })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    let application = &body["data"];
    assert_eq!(application["lead_guid"], lead_guid.as_str());
    assert_eq!(application["application_status"], "created");
    assert_eq!(application["company_code"], "ACME");
    assert_eq!(application["user_email"], "broker@acme.test");
    assert!(application["application_code"]
        .as_str()
        .unwrap()
        .starts_with("APP-"));

    let (_, body) = request(
        &app.router,
        Method::GET,
        &format!("/leads/{}", lead_guid),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(body["data"]["lead_status"], "converted");
    assert!(body["data"]["converted_to_application_date"].is_string());
}

#[tokio::test]
async fn test_second_conversion_conflicts() {
    let app = setup_test_app().await;
    seed_account(&app.pool, "broker@acme.test", "ACME").await;
    let token = login(&app, "broker@acme.test").await;
    let lead_guid = create_lead(&app, &token).await;

    let (status, _) = request(
        &app.router,
        Method::POST,
        "/application",
        Some(&token),
        Some(json!({ "lead_id": lead_guid })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = request(
        &app.router,
        Method::POST,
        "/application",
        Some(&token),
        Some(json!({ "lead_id": lead_guid })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["message"], "Lead has already been converted");

    // Exactly one application exists for the lead
    let (_, body) = request(&app.router, Method::GET, "/application", Some(&token), None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_conversion_requires_lead_id() {
    let app = setup_test_app().await;
    seed_account(&app.pool, "broker@acme.test", "ACME").await;
    let token = login(&app, "broker@acme.test").await;

    for body_json in [json!({}), json!({ "lead_id": "" })] {
        let (status, body) = request(
            &app.router,
            Method::POST,
            "/application",
            Some(&token),
            Some(body_json),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "lead_id is required");
    }
}

#[tokio::test]
async fn test_conversion_of_unknown_or_foreign_lead_is_404() {
    let app = setup_test_app().await;
    seed_account(&app.pool, "a@acme.test", "ACME").await;
    seed_account(&app.pool, "c@rival.test", "RIVAL").await;
    let token_a = login(&app, "a@acme.test").await;
    let token_c = login(&app, "c@rival.test").await;
    let lead_guid = create_lead(&app, &token_a).await;

    let (status, _) = request(
        &app.router,
        Method::POST,
        "/application",
        Some(&token_a),
        Some(json!({ "lead_id": "no-such-lead" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Another tenant cannot convert the lead
    let (status, _) = request(
        &app.router,
        Method::POST,
        "/application",
        Some(&token_c),
        Some(json!({ "lead_id": lead_guid })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The lead is untouched by the failed conversion
    let (_, body) = request(
        &app.router,
        Method::GET,
        &format!("/leads/{}", lead_guid),
        Some(&token_a),
        None,
    )
    .await;
    assert_eq!(body["data"]["lead_status"], "new");
}

#[tokio::test]
async fn test_application_update_and_delete() {
    let app = setup_test_app().await;
    seed_account(&app.pool, "broker@acme.test", "ACME").await;
    let token = login(&app, "broker@acme.test").await;
    let lead_guid = create_lead(&app, &token).await;

    let (_, body) = request(
        &app.router,
        Method::POST,
        "/application",
        Some(&token),
        Some(json!({ "lead_id": lead_guid })),
    )
    .await;
    let app_guid = body["data"]["guid"].as_str().unwrap().to_string();

    let (status, body) = request(
        &app.router,
        Method::PUT,
        &format!("/application/{}", app_guid),
        Some(&token),
        Some(json!({ "application_status": "submitted", "loan_amount": 700000.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["application_status"], "submitted");
    assert_eq!(body["data"]["loan_amount"], 700000.0);

    let (status, body) = request(
        &app.router,
        Method::DELETE,
        &format!("/application/{}", app_guid),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Application deleted successfully");

    let (status, _) = request(
        &app.router,
        Method::GET,
        &format!("/application/{}", app_guid),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Documents
// ============================================================================

#[tokio::test]
async fn test_docload_requires_core_fields() {
    let app = setup_test_app().await;
    seed_account(&app.pool, "broker@acme.test", "ACME").await;
    let token = login(&app, "broker@acme.test").await;

    let bodies = [
        json!({}),
        json!({ "document_name": "statement.pdf" }),
        json!({
            "document_type": "bank_statement",
            "document_name": "statement.pdf",
            "s3_document_url": ""
        }),
    ];
    for body_json in bodies {
        let (status, body) = request(
            &app.router,
            Method::POST,
            "/docload",
            Some(&token),
            Some(body_json),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "Missing required fields");
    }

    // None of the rejected requests left a row behind
    let (_, body) = request(&app.router, Method::GET, "/docload", Some(&token), None).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_docload_without_analysis_config_stores_without_queueing() {
    let app = setup_test_app().await;
    seed_account(&app.pool, "broker@acme.test", "ACME").await;
    let token = login(&app, "broker@acme.test").await;

    let (status, body) = request(
        &app.router,
        Method::POST,
        "/docload",
        Some(&token),
        Some(json!({
            "document_type": "bank_statement",
            "document_name": "statement.pdf",
            "s3_document_url": "http://127.0.0.1:5780/objects/statements/jan.pdf",
            "file_size": 1024,
            "mime_type": "application/pdf",
            "adhoc": "yes"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Document uploaded successfully"));
    let doc = &body["data"];
    assert_eq!(doc["company_code"], "ACME");
    assert_eq!(doc["user_email"], "broker@acme.test");
    assert!(doc["doc_status"].is_null());

    // Analysis is not configured, so no task may be queued
    let guid = doc["guid"].as_str().unwrap();
    let task = db::analysis_tasks::get_by_document(&app.pool, guid)
        .await
        .unwrap();
    assert!(task.is_none());
}

#[tokio::test]
async fn test_docload_with_analysis_config_queues_task() {
    let app = setup_test_app().await;
    seed_account(&app.pool, "broker@acme.test", "ACME").await;
    let token = login(&app, "broker@acme.test").await;

    settings::set_setting(&app.pool, "analysis_api_url", "http://127.0.0.1:1/analyze")
        .await
        .unwrap();
    settings::set_setting(&app.pool, "analysis_api_key", "test-key")
        .await
        .unwrap();

    let (status, body) = request(
        &app.router,
        Method::POST,
        "/docload",
        Some(&token),
        Some(json!({
            "document_type": "payslip",
            "document_name": "payslip.pdf",
            "s3_document_url": "http://127.0.0.1:5780/objects/payslips/jan.pdf"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let doc = &body["data"];
    assert_eq!(doc["doc_status"], "queued");

    let guid = doc["guid"].as_str().unwrap();
    let task = db::analysis_tasks::get_by_document(&app.pool, guid)
        .await
        .unwrap()
        .expect("ingestion should queue an analysis task");
    assert_eq!(task.state, TaskState::Queued);
    assert_eq!(task.attempts, 0);
}

#[tokio::test]
async fn test_documents_scoped_to_owning_broker() {
    let app = setup_test_app().await;
    seed_account(&app.pool, "a@acme.test", "ACME").await;
    seed_account(&app.pool, "b@acme.test", "ACME").await;
    let token_a = login(&app, "a@acme.test").await;
    let token_b = login(&app, "b@acme.test").await;

    request(
        &app.router,
        Method::POST,
        "/docload",
        Some(&token_a),
        Some(json!({
            "document_type": "bank_statement",
            "document_name": "statement.pdf",
            "s3_document_url": "http://127.0.0.1:5780/objects/statements/jan.pdf"
        })),
    )
    .await;

    let (_, body) = request(&app.router, Method::GET, "/docload", Some(&token_a), None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (_, body) = request(&app.router, Method::GET, "/docload", Some(&token_b), None).await;
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_process_document_validation_and_config_errors() {
    let app = setup_test_app().await;
    seed_account(&app.pool, "broker@acme.test", "ACME").await;
    let token = login(&app, "broker@acme.test").await;

    let (status, body) = request(
        &app.router,
        Method::POST,
        "/process-document",
        Some(&token),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "document_id is required");

    // Analysis settings are empty by default
    let (status, body) = request(
        &app.router,
        Method::POST,
        "/process-document",
        Some(&token),
        Some(json!({ "document_id": "some-doc" })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["message"], "Server configuration error");
}

#[tokio::test]
async fn test_document_preview_requires_valid_object_url() {
    let app = setup_test_app().await;
    seed_account(&app.pool, "broker@acme.test", "ACME").await;
    let token = login(&app, "broker@acme.test").await;

    let (status, body) = request(
        &app.router,
        Method::POST,
        "/document-preview",
        Some(&token),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "S3 URL is required");

    let (status, body) = request(
        &app.router,
        Method::POST,
        "/document-preview",
        Some(&token),
        Some(json!({ "s3_url": "http://127.0.0.1:5780/downloads/statement.pdf" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Invalid S3 URL format");
}

// ============================================================================
// Uploads and signed object reads
// ============================================================================

#[tokio::test]
async fn test_upload_requires_file_part() {
    let app = setup_test_app().await;

    let (status, body) = upload_file(&app.router, None, b"", Some("statements")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "File is required.");
}

#[tokio::test]
async fn test_upload_sanitizes_generated_keys() {
    let app = setup_test_app().await;

    let (status, body) = upload_file(
        &app.router,
        Some("quarterly report 2025.pdf"),
        b"fake pdf bytes",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["fileName"], "quarterly report 2025.pdf");

    let key = body["key"].as_str().unwrap();
    let (prefix, rest) = key.split_once('-').unwrap();
    assert!(prefix.chars().all(|c| c.is_ascii_digit()));
    assert_eq!(rest, "quarterly_report_2025.pdf");
    assert!(body["url"].as_str().unwrap().contains("/objects/"));
}

#[tokio::test]
async fn test_upload_honors_path_hint() {
    let app = setup_test_app().await;

    let (status, body) = upload_file(
        &app.router,
        Some("jan.pdf"),
        b"fake pdf bytes",
        Some("statements"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["key"], "statements/jan.pdf");
}

#[tokio::test]
async fn test_signed_object_read_round_trip() {
    let app = setup_test_app().await;
    seed_account(&app.pool, "broker@acme.test", "ACME").await;
    let token = login(&app, "broker@acme.test").await;

    let payload = b"%PDF-1.7 test payload";
    let (_, body) = upload_file(&app.router, Some("contract.pdf"), payload, None).await;
    let stored_url = body["url"].as_str().unwrap().to_string();

    // Exchange the stored URL for a presigned one
    let (status, body) = request(
        &app.router,
        Method::POST,
        "/document-preview",
        Some(&token),
        Some(json!({ "s3_url": stored_url })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let presigned = body["presignedUrl"].as_str().unwrap().to_string();
    assert!(presigned.contains("expires="));
    assert!(presigned.contains("signature="));

    let (status, content_type, bytes) = raw_get(&app.router, &path_and_query(&presigned)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/pdf"));
    assert_eq!(bytes, payload);
}

#[tokio::test]
async fn test_signed_object_read_rejects_tampering() {
    let app = setup_test_app().await;

    let payload = b"secret document bytes";
    let (_, body) = upload_file(&app.router, Some("secret.pdf"), payload, None).await;
    let key = body["key"].as_str().unwrap().to_string();

    // No signature at all
    let (status, _, _) = raw_get(&app.router, &format!("/objects/{}", key)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let presigned = app.state.signer.presign(&key, 3600, Utc::now()).unwrap();
    let valid = path_and_query(&presigned);

    // Tampered signature
    let tampered = format!("{}ff", valid);
    let (status, _, _) = raw_get(&app.router, &tampered).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Expired signature, otherwise valid
    let expired = app
        .state
        .signer
        .presign(&key, 60, Utc::now() - Duration::hours(1))
        .unwrap();
    let (status, _, _) = raw_get(&app.router, &path_and_query(&expired)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // The untampered URL still works
    let (status, _, bytes) = raw_get(&app.router, &valid).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, payload);
}

#[tokio::test]
async fn test_signed_read_of_missing_object_is_404() {
    let app = setup_test_app().await;

    let presigned = app
        .state
        .signer
        .presign("ghost/none.pdf", 3600, Utc::now())
        .unwrap();

    let (status, _, _) = raw_get(&app.router, &path_and_query(&presigned)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Profile
// ============================================================================

#[tokio::test]
async fn test_profile_round_trip_without_envelope() {
    let app = setup_test_app().await;
    seed_account(&app.pool, "broker@acme.test", "ACME").await;
    let token = login(&app, "broker@acme.test").await;

    let (status, body) =
        request(&app.router, Method::GET, "/user-profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    // The profile endpoints return the bare object
    assert!(body.get("data").is_none());
    assert_eq!(body["user_email"], "broker@acme.test");
    assert_eq!(body["company_code"], "ACME");
    assert_eq!(body["role"], "broker");
    assert_eq!(body["is_active"], true);

    let (status, body) = request(
        &app.router,
        Method::PUT,
        "/user-profile",
        Some(&token),
        Some(json!({
            "first_name": "Jo",
            "phone": "0400 000 000",
            "company_name": "Acme Home Loans",
            "company_code": "EVIL"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["first_name"], "Jo");
    assert_eq!(body["phone"], "0400 000 000");
    assert_eq!(body["company_name"], "Acme Home Loans");
    // Tenancy cannot be changed through the API
    assert_eq!(body["company_code"], "ACME");

    let (_, body) = request(&app.router, Method::GET, "/user-profile", Some(&token), None).await;
    assert_eq!(body["first_name"], "Jo");
    assert_eq!(body["company_code"], "ACME");
}
