//! Session entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A login session.
///
/// Only the SHA-256 digest of the client token is stored. The claims
/// (`user_guid`, `user_email`, `company_code`) are copied from the profile at
/// login and never re-read from request data afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token_hash: String,
    pub user_guid: String,
    pub user_email: String,
    pub company_code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
