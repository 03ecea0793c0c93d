//! Store functions over the LoanDesk schema
//!
//! Thin async functions taking `&SqlitePool`, one module per table. Rows are
//! mapped by hand; timestamps are RFC 3339 TEXT.

pub mod analysis_tasks;
pub mod applications;
pub mod documents;
pub mod leads;
pub mod profiles;
pub mod sessions;
pub mod users;

use chrono::{DateTime, Utc};
use loandesk_common::{Error, Result};

/// Parse an RFC 3339 column value; corruption maps to an internal error
pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid timestamp in database: {}", e)))
}
