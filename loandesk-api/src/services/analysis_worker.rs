//! Background analysis worker
//!
//! A single tokio task drains the `analysis_tasks` queue: woken by a nudge
//! whenever a handler enqueues work, and by a poll tick so retries scheduled
//! in the future are picked up on time. Delivery is at-least-once; the result
//! merge is idempotent, so a redelivered task is harmless.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use loandesk_common::db::settings;
use loandesk_common::models::{AnalysisTask, DocStatus};
use loandesk_common::Result;
use sqlx::SqlitePool;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, error, info, warn};

use crate::db::{analysis_tasks, documents};
use crate::services::AnalysisClient;
use crate::utils::retry_on_lock;

const MAX_BACKOFF_MS: u64 = 60_000;

/// Owns the queue-draining loop; one instance runs per process
pub struct AnalysisWorker {
    db: SqlitePool,
    client: AnalysisClient,
    nudge: Arc<Notify>,
    last_error: Arc<RwLock<Option<String>>>,
}

impl AnalysisWorker {
    pub fn new(
        db: SqlitePool,
        client: AnalysisClient,
        nudge: Arc<Notify>,
        last_error: Arc<RwLock<Option<String>>>,
    ) -> Self {
        Self {
            db,
            client,
            nudge,
            last_error,
        }
    }

    /// Run forever, draining the queue after each nudge or poll tick
    pub async fn run(self) {
        info!("Analysis worker started");
        loop {
            let poll_seconds = settings::get_analysis_poll_interval_seconds(&self.db)
                .await
                .unwrap_or(10);

            tokio::select! {
                _ = self.nudge.notified() => {
                    debug!("Analysis worker nudged");
                }
                _ = tokio::time::sleep(Duration::from_secs(poll_seconds)) => {}
            }

            self.drain().await;
        }
    }

    /// Process eligible tasks until the queue runs dry
    pub async fn drain(&self) {
        loop {
            match self.process_next().await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    error!("Analysis worker iteration failed: {}", e);
                    break;
                }
            }
        }
    }

    /// Claim and execute one task. `false` means nothing was eligible.
    pub async fn process_next(&self) -> Result<bool> {
        let Some(task) = analysis_tasks::claim_next(&self.db, Utc::now()).await? else {
            return Ok(false);
        };
        self.execute(task).await?;
        Ok(true)
    }

    async fn execute(&self, task: AnalysisTask) -> Result<()> {
        let api_url = settings::get_analysis_api_url(&self.db).await?;
        let api_key = settings::get_analysis_api_key(&self.db).await?;

        if api_url.is_empty() || api_key.is_empty() {
            warn!(task = %task.guid, "Analysis API not configured, failing task");
            self.fail_task(&task, task.attempts + 1, "analysis API not configured")
                .await?;
            return Ok(());
        }

        let timeout =
            Duration::from_secs(settings::get_analysis_timeout_seconds(&self.db).await?);

        documents::set_doc_status(&self.db, &task.document_guid, DocStatus::Processing).await?;

        match self
            .client
            .process_document(&api_url, &api_key, timeout, &task.document_guid)
            .await
        {
            Ok(payload) => self.complete(&task, &payload).await,
            Err(e) => self.handle_failure(&task, &e.to_string()).await,
        }
    }

    async fn complete(&self, task: &AnalysisTask, payload: &serde_json::Value) -> Result<()> {
        let max_wait = settings::get_db_max_lock_wait_ms(&self.db).await?;

        let stored = retry_on_lock("store analysis result", max_wait, || {
            documents::store_analysis_result(&self.db, &task.document_guid, payload)
        })
        .await?;

        if stored == 0 {
            warn!(
                document = %task.document_guid,
                "Analysis result arrived for a document that no longer exists"
            );
        }

        analysis_tasks::mark_done(&self.db, &task.guid, Utc::now()).await?;
        info!(document = %task.document_guid, attempts = task.attempts, "Analysis complete");
        Ok(())
    }

    async fn handle_failure(&self, task: &AnalysisTask, message: &str) -> Result<()> {
        let attempts = task.attempts + 1;
        let max_attempts = settings::get_analysis_max_attempts(&self.db).await?;

        if attempts >= max_attempts {
            error!(
                document = %task.document_guid,
                attempts,
                "Analysis failed permanently: {}",
                message
            );
            self.fail_task(task, attempts, message).await?;
            return Ok(());
        }

        let base_ms = settings::get_analysis_retry_base_ms(&self.db).await?;
        let delay_ms = backoff_delay_ms(attempts, base_ms);
        let run_after = Utc::now() + chrono::Duration::milliseconds(delay_ms as i64);

        warn!(
            document = %task.document_guid,
            attempts,
            delay_ms,
            "Analysis failed, will retry: {}",
            message
        );
        analysis_tasks::mark_retry(&self.db, &task.guid, attempts, message, run_after, Utc::now())
            .await?;
        Ok(())
    }

    /// Terminal failure: both the task row and the document record it
    async fn fail_task(&self, task: &AnalysisTask, attempts: i64, message: &str) -> Result<()> {
        analysis_tasks::mark_failed(&self.db, &task.guid, attempts, message, Utc::now()).await?;
        documents::set_doc_status(&self.db, &task.document_guid, DocStatus::Failed).await?;
        *self.last_error.write().await = Some(message.to_string());
        Ok(())
    }
}

/// Retry delay for the given attempt number: `base_ms * 2^(attempts-1)`,
/// capped at one minute
pub fn backoff_delay_ms(attempts: i64, base_ms: u64) -> u64 {
    let exponent = attempts.saturating_sub(1).clamp(0, 20) as u32;
    base_ms
        .saturating_mul(1u64 << exponent)
        .min(MAX_BACKOFF_MS)
}
