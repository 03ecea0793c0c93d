//! Broker profile entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-broker profile; the scoping anchor for all tenant-owned entities.
///
/// `user_email` and `company_code` are immutable through the API. Changing a
/// broker's tenant is an operator action directly on the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub guid: String,
    pub user_email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub company_code: String,
    pub company_name: Option<String>,
    pub role: String,
    pub is_active: bool,
    pub timezone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Mutable fields for `PUT /user-profile`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
    pub timezone: Option<String>,
}

impl UserProfile {
    /// Build a new profile for operator provisioning
    pub fn create(user_email: &str, company_code: &str, full_name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            guid: Uuid::new_v4().to_string(),
            user_email: user_email.to_string(),
            first_name: None,
            last_name: None,
            full_name,
            phone: None,
            company_code: company_code.to_string(),
            company_name: None,
            role: "broker".to_string(),
            is_active: true,
            timezone: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge an update, stamping `updated_at`
    pub fn apply_update(&mut self, update: ProfileUpdate) {
        if let Some(v) = update.first_name {
            self.first_name = Some(v);
        }
        if let Some(v) = update.last_name {
            self.last_name = Some(v);
        }
        if let Some(v) = update.full_name {
            self.full_name = Some(v);
        }
        if let Some(v) = update.phone {
            self.phone = Some(v);
        }
        if let Some(v) = update.company_name {
            self.company_name = Some(v);
        }
        if let Some(v) = update.role {
            self.role = v;
        }
        if let Some(v) = update.is_active {
            self.is_active = v;
        }
        if let Some(v) = update.timezone {
            self.timezone = Some(v);
        }
        self.updated_at = Utc::now();
    }
}
