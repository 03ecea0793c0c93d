//! Analysis task queue entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Queue states of an analysis task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Running,
    Done,
    Failed,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Queued => "queued",
            TaskState::Running => "running",
            TaskState::Done => "done",
            TaskState::Failed => "failed",
        }
    }
}

impl std::str::FromStr for TaskState {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(TaskState::Queued),
            "running" => Ok(TaskState::Running),
            "done" => Ok(TaskState::Done),
            "failed" => Ok(TaskState::Failed),
            other => Err(crate::Error::Internal(format!(
                "Unknown task state: {}",
                other
            ))),
        }
    }
}

/// One pending or finished analysis call for a document.
///
/// `run_after` implements retry backoff: a queued task is not eligible until
/// that instant has passed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisTask {
    pub guid: String,
    pub document_guid: String,
    pub state: TaskState,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub run_after: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisTask {
    /// Build a freshly queued task for a document, eligible immediately
    pub fn queued(document_guid: &str) -> Self {
        let now = Utc::now();
        Self {
            guid: Uuid::new_v4().to_string(),
            document_guid: document_guid.to_string(),
            state: TaskState::Queued,
            attempts: 0,
            last_error: None,
            run_after: now,
            created_at: now,
            updated_at: now,
        }
    }
}
