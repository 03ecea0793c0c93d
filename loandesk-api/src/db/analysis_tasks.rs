//! Analysis task queue store.
//!
//! Claiming uses a state-guarded UPDATE so two pollers draining the same
//! queue can never both run one task.

use chrono::{DateTime, Utc};
use loandesk_common::models::{AnalysisTask, TaskState};
use loandesk_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::parse_timestamp;

const TASK_COLUMNS: &str =
    "guid, document_guid, state, attempts, last_error, run_after, created_at, updated_at";

/// Claim the oldest eligible queued task, flipping it to `running`.
///
/// Returns `None` when nothing is eligible at `now`. A task lost to a
/// concurrent claimer is skipped and the next candidate is tried.
pub async fn claim_next(pool: &SqlitePool, now: DateTime<Utc>) -> Result<Option<AnalysisTask>> {
    loop {
        let query = format!(
            "SELECT {} FROM analysis_tasks \
             WHERE state = 'queued' AND run_after <= ? \
             ORDER BY run_after, created_at LIMIT 1",
            TASK_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(now.to_rfc3339())
            .fetch_optional(pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut task = task_from_row(&row)?;

        let claimed = sqlx::query(
            "UPDATE analysis_tasks SET state = 'running', updated_at = ? \
             WHERE guid = ? AND state = 'queued'",
        )
        .bind(now.to_rfc3339())
        .bind(&task.guid)
        .execute(pool)
        .await?;

        if claimed.rows_affected() == 1 {
            task.state = TaskState::Running;
            task.updated_at = now;
            return Ok(Some(task));
        }
        // Someone else claimed this row between the SELECT and the UPDATE
    }
}

/// Mark a task finished, clearing any stale error
pub async fn mark_done(pool: &SqlitePool, guid: &str, now: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        "UPDATE analysis_tasks SET state = 'done', last_error = NULL, updated_at = ? \
         WHERE guid = ?",
    )
    .bind(now.to_rfc3339())
    .bind(guid)
    .execute(pool)
    .await?;

    Ok(())
}

/// Return a failed attempt to the queue, delayed until `run_after`
pub async fn mark_retry(
    pool: &SqlitePool,
    guid: &str,
    attempts: i64,
    error: &str,
    run_after: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "UPDATE analysis_tasks SET state = 'queued', attempts = ?, last_error = ?, \
         run_after = ?, updated_at = ? WHERE guid = ?",
    )
    .bind(attempts)
    .bind(error)
    .bind(run_after.to_rfc3339())
    .bind(now.to_rfc3339())
    .bind(guid)
    .execute(pool)
    .await?;

    Ok(())
}

/// Mark a task permanently failed
pub async fn mark_failed(
    pool: &SqlitePool,
    guid: &str,
    attempts: i64,
    error: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "UPDATE analysis_tasks SET state = 'failed', attempts = ?, last_error = ?, \
         updated_at = ? WHERE guid = ?",
    )
    .bind(attempts)
    .bind(error)
    .bind(now.to_rfc3339())
    .bind(guid)
    .execute(pool)
    .await?;

    Ok(())
}

/// Return every `running` task to the queue.
///
/// Called once at startup: a task still marked running was interrupted by a
/// crash or shutdown mid-attempt.
pub async fn requeue_interrupted(pool: &SqlitePool, now: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE analysis_tasks SET state = 'queued', updated_at = ? WHERE state = 'running'",
    )
    .bind(now.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Fetch the task attached to a document, if any
pub async fn get_by_document(
    pool: &SqlitePool,
    document_guid: &str,
) -> Result<Option<AnalysisTask>> {
    let query = format!(
        "SELECT {} FROM analysis_tasks WHERE document_guid = ?",
        TASK_COLUMNS
    );
    let row = sqlx::query(&query)
        .bind(document_guid)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(task_from_row).transpose()
}

fn task_from_row(row: &SqliteRow) -> Result<AnalysisTask> {
    let state: String = row.try_get("state")?;
    let run_after: String = row.try_get("run_after")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(AnalysisTask {
        guid: row.try_get("guid")?,
        document_guid: row.try_get("document_guid")?,
        state: state.parse()?,
        attempts: row.try_get("attempts")?,
        last_error: row.try_get("last_error")?,
        run_after: parse_timestamp(&run_after)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}
