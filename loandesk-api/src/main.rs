//! LoanDesk API - Main entry point
//!
//! Single-binary HTTP backend for the brokerage: leads, applications,
//! documents, and the background document analysis worker.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use loandesk_api::db;
use loandesk_api::db::users::UserRecord;
use loandesk_api::services::{AnalysisClient, AnalysisWorker};
use loandesk_api::storage::{ObjectStore, UrlSigner};
use loandesk_api::{build_router, AppState, DEFAULT_UPLOAD_LIMIT_BYTES};
use loandesk_common::auth::{generate_salt, hash_password};
use loandesk_common::config::{resolve_root_folder, RootLayout};
use loandesk_common::db::{init_database, settings};
use loandesk_common::models::UserProfile;

/// Command-line arguments for loandesk-api
#[derive(Parser, Debug)]
#[command(name = "loandesk-api")]
#[command(about = "LoanDesk brokerage backend service")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the http_port setting)
    #[arg(short, long, env = "LOANDESK_PORT")]
    port: Option<u16>,

    /// Host to bind (overrides the http_host setting)
    #[arg(long, env = "LOANDESK_HOST")]
    host: Option<String>,

    /// Root folder holding the database and object store
    #[arg(short, long, env = "LOANDESK_ROOT_FOLDER")]
    root_folder: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Provision a broker account (credentials plus profile)
    CreateUser {
        /// Login email
        #[arg(long)]
        email: String,

        /// Initial password
        #[arg(long)]
        password: String,

        /// Tenant the broker belongs to
        #[arg(long)]
        company_code: String,

        /// Display name for the profile
        #[arg(long)]
        full_name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loandesk_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command-line arguments
    let args = Args::parse();

    info!("Starting LoanDesk API v{}", env!("CARGO_PKG_VERSION"));

    let root = resolve_root_folder(args.root_folder.as_deref())
        .context("Failed to resolve root folder")?;
    info!("Root folder: {}", root.display());

    let layout = RootLayout::new(root);
    layout
        .ensure_directories()
        .context("Failed to create root folder layout")?;

    let pool = init_database(&layout.database_path())
        .await
        .context("Failed to initialize database")?;
    info!("Database connection established");

    if let Some(Commands::CreateUser {
        email,
        password,
        company_code,
        full_name,
    }) = args.command
    {
        create_user(&pool, &email, &password, &company_code, full_name).await?;
        return Ok(());
    }

    // Recover state left behind by an unclean shutdown
    let now = Utc::now();
    let requeued = db::analysis_tasks::requeue_interrupted(&pool, now)
        .await
        .context("Failed to requeue interrupted analysis tasks")?;
    if requeued > 0 {
        info!("Requeued {} interrupted analysis tasks", requeued);
    }
    let swept = db::sessions::delete_expired(&pool, now)
        .await
        .context("Failed to sweep expired sessions")?;
    if swept > 0 {
        info!("Removed {} expired sessions", swept);
    }

    // CLI and environment override the stored settings
    let host = match args.host {
        Some(host) => host,
        None => settings::get_setting_or(&pool, "http_host", "127.0.0.1".to_string()).await?,
    };
    let port = match args.port {
        Some(port) => port,
        None => settings::get_setting_or(&pool, "http_port", 5780u16).await?,
    };

    let public_base_url = settings::get_public_base_url(&pool).await?;
    let presign_secret = settings::get_presign_secret(&pool).await?;
    let upload_limit: usize =
        settings::get_setting_or(&pool, "upload_max_bytes", DEFAULT_UPLOAD_LIMIT_BYTES).await?;

    let objects = ObjectStore::new(layout.objects_dir());
    let signer = UrlSigner::new(presign_secret, public_base_url);
    let analysis = AnalysisClient::new().context("Failed to build analysis HTTP client")?;

    let state = AppState::new(pool.clone(), objects, signer, analysis.clone())
        .with_upload_limit(upload_limit);

    let worker = AnalysisWorker::new(
        pool,
        analysis,
        state.worker_nudge.clone(),
        state.last_error.clone(),
    );
    tokio::spawn(worker.run());

    let app = build_router(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Provision a broker: a credential row plus the profile that anchors
/// tenant scoping. Accounts are never created through the HTTP surface.
async fn create_user(
    pool: &SqlitePool,
    email: &str,
    password: &str,
    company_code: &str,
    full_name: Option<String>,
) -> Result<()> {
    if db::users::find_by_email(pool, email).await?.is_some() {
        anyhow::bail!("User already exists: {}", email);
    }

    let salt = generate_salt();
    let record = UserRecord {
        guid: Uuid::new_v4().to_string(),
        email: email.to_string(),
        password_hash: hash_password(&salt, password),
        password_salt: salt,
    };
    db::users::insert_user(pool, &record).await?;

    let profile = UserProfile::create(email, company_code, full_name);
    db::profiles::insert_profile(pool, &profile).await?;

    info!("Created user {} in company {}", email, company_code);
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
