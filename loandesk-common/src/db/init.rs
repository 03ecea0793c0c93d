//! Database initialization
//!
//! Creates the SQLite database on first run, applies the schema idempotently,
//! and seeds default settings. Entity timestamps are stored as RFC 3339 TEXT
//! stamped by the application; storage-side audit columns use
//! `CURRENT_TIMESTAMP` defaults.

use crate::Result;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::{info, warn};

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Pool sized for concurrent request handlers plus the analysis worker
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    // WAL allows concurrent readers while the worker writes
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    init_schema(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes (idempotent, safe to call repeatedly).
///
/// Public so tests can apply the schema to in-memory pools.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_users_table(pool).await?;
    create_sessions_table(pool).await?;
    create_user_profiles_table(pool).await?;
    create_leads_table(pool).await?;
    create_applications_table(pool).await?;
    create_documents_table(pool).await?;
    create_analysis_tasks_table(pool).await?;

    Ok(())
}

/// Create the settings table
///
/// Stores service configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the users table
///
/// Credentials only. Accounts are provisioned by the operator via the
/// `create-user` subcommand, never through the HTTP surface.
pub async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            guid TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            password_salt TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the sessions table
///
/// The token itself is never stored; `token_hash` is its SHA-256 digest.
/// Claims are copied at login and stay fixed for the session's lifetime.
pub async fn create_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            token_hash TEXT PRIMARY KEY,
            user_guid TEXT NOT NULL REFERENCES users(guid) ON DELETE CASCADE,
            user_email TEXT NOT NULL,
            company_code TEXT NOT NULL,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_guid)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the user_profiles table
///
/// One row per broker; the `(company_code, user_email)` pair scopes every
/// other entity.
pub async fn create_user_profiles_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_profiles (
            guid TEXT PRIMARY KEY,
            user_email TEXT NOT NULL UNIQUE,
            first_name TEXT,
            last_name TEXT,
            full_name TEXT,
            phone TEXT,
            company_code TEXT NOT NULL,
            company_name TEXT,
            role TEXT NOT NULL DEFAULT 'broker',
            is_active INTEGER NOT NULL DEFAULT 1,
            timezone TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_profiles_company ON user_profiles(company_code)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the leads table
pub async fn create_leads_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS leads (
            guid TEXT PRIMARY KEY,
            company_code TEXT NOT NULL,
            user_email TEXT NOT NULL,
            lead_number TEXT NOT NULL,
            lead_source TEXT,
            referrer_name TEXT,
            first_name TEXT,
            last_name TEXT,
            email TEXT,
            mobile_phone TEXT,
            preferred_contact_method TEXT,
            loan_purpose TEXT,
            property_type TEXT,
            estimated_loan_amount REAL,
            estimated_property_value REAL,
            is_first_home_buyer INTEGER,
            urgency_level TEXT,
            pre_approval_needed INTEGER,
            notes TEXT,
            assigned_broker TEXT,
            lead_status TEXT NOT NULL DEFAULT 'new'
                CHECK (lead_status IN ('new', 'contacted', 'qualified', 'converted', 'lost')),
            conversion_status TEXT,
            converted_to_application_date TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            created_by TEXT,
            updated_by TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_leads_tenant ON leads(company_code, user_email)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_leads_status ON leads(lead_status)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the applications table
///
/// `UNIQUE(lead_guid)` is the duplicate-conversion guard: the second insert
/// for the same lead fails inside the conversion transaction. No foreign key
/// to `leads`, converted leads stay deletable.
pub async fn create_applications_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS applications (
            guid TEXT PRIMARY KEY,
            application_code TEXT NOT NULL,
            lead_guid TEXT NOT NULL UNIQUE,
            company_code TEXT NOT NULL,
            user_email TEXT NOT NULL,
            application_status TEXT NOT NULL DEFAULT 'created',
            loan_amount REAL,
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_applications_tenant ON applications(company_code, user_email)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the documents table
pub async fn create_documents_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            guid TEXT PRIMARY KEY,
            company_code TEXT NOT NULL,
            user_email TEXT NOT NULL,
            application_guid TEXT,
            document_type TEXT NOT NULL,
            document_name TEXT NOT NULL,
            storage_url TEXT NOT NULL,
            file_size INTEGER,
            mime_type TEXT,
            adhoc TEXT,
            doc_status TEXT
                CHECK (doc_status IS NULL OR doc_status IN ('queued', 'processing', 'processed', 'failed')),
            result_ai TEXT,
            upload_date TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_tenant ON documents(company_code, user_email)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_application ON documents(application_guid)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the analysis_tasks table
///
/// One task per document (`UNIQUE`); `run_after` gates retry eligibility.
pub async fn create_analysis_tasks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_tasks (
            guid TEXT PRIMARY KEY,
            document_guid TEXT NOT NULL UNIQUE REFERENCES documents(guid) ON DELETE CASCADE,
            state TEXT NOT NULL DEFAULT 'queued'
                CHECK (state IN ('queued', 'running', 'done', 'failed')),
            attempts INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            run_after TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_analysis_tasks_state ON analysis_tasks(state, run_after)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize or repair default settings.
///
/// Ensures all required settings exist; NULL values are reset to defaults.
/// Public so tests can seed in-memory databases the same way.
pub async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    // HTTP server settings
    ensure_setting(pool, "http_host", "127.0.0.1").await?;
    ensure_setting(pool, "http_port", "5780").await?;
    ensure_setting(pool, "public_base_url", "http://127.0.0.1:5780").await?;
    ensure_setting(pool, "upload_max_bytes", "26214400").await?; // 25 MiB

    // Session settings
    ensure_setting(pool, "session_timeout_seconds", "604800").await?; // 7 days

    // Presigned URL settings
    ensure_setting(pool, "presign_ttl_seconds", "3600").await?;
    ensure_generated_secret(pool, "presign_secret").await?;

    // Analysis settings; empty url/key leaves analysis disabled
    ensure_setting(pool, "analysis_api_url", "").await?;
    ensure_setting(pool, "analysis_api_key", "").await?;
    ensure_setting(pool, "analysis_timeout_seconds", "30").await?;
    ensure_setting(pool, "analysis_max_attempts", "5").await?;
    ensure_setting(pool, "analysis_retry_base_ms", "1000").await?;
    ensure_setting(pool, "analysis_poll_interval_seconds", "10").await?;

    // Database contention settings
    ensure_setting(pool, "db_max_lock_wait_ms", "5000").await?;

    info!("Default settings initialized");
    Ok(())
}

/// Ensure a setting exists with the specified default value.
///
/// If the setting doesn't exist, it is created with the default. If it exists
/// with a NULL value, it is reset to the default.
async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM settings WHERE key = ?)")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if !exists {
        // INSERT OR IGNORE handles concurrent initialization racing past the
        // exists check
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(default_value)
            .execute(pool)
            .await?;

        info!(
            "Initialized setting '{}' with default value: {}",
            key, default_value
        );
        return Ok(());
    }

    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if value.is_none() {
        sqlx::query("UPDATE settings SET value = ? WHERE key = ?")
            .bind(default_value)
            .bind(key)
            .execute(pool)
            .await?;

        warn!(
            "Setting '{}' was NULL, reset to default: {}",
            key, default_value
        );
    }

    Ok(())
}

/// Ensure a secret setting exists, generating a random value on first run.
///
/// Unlike `ensure_setting`, the default is per-deployment: a fresh random
/// string rather than a compiled-in constant. Empty and NULL values are both
/// replaced.
async fn ensure_generated_secret(pool: &SqlitePool, key: &str) -> Result<()> {
    let current: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    let needs_value = match current {
        None => true,
        Some(None) => true,
        Some(Some(ref v)) => v.is_empty(),
    };

    if needs_value {
        let secret: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(64)
            .map(char::from)
            .collect();

        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(&secret)
        .execute(pool)
        .await?;

        info!("Generated secret for setting '{}'", key);
    }

    Ok(())
}
