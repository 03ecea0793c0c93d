//! Application entity and its request payloads

use chrono::{DateTime, Datelike, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A loan application created by converting a lead
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub guid: String,
    /// Human-facing code, `APP-{DD}{MM}-{NNNN}`; not guaranteed unique
    pub application_code: String,
    /// Originating lead; one application per lead
    pub lead_guid: String,
    pub company_code: String,
    pub user_email: String,
    pub application_status: String,
    pub loan_amount: Option<f64>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /application`.
///
/// `lead_id` is validated in the handler so its absence maps to a 400 rather
/// than a deserialization rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewApplication {
    pub lead_id: Option<String>,
    pub loan_amount: Option<f64>,
    pub notes: Option<String>,
}

/// Mutable fields for `PUT /application/{id}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApplicationUpdate {
    pub application_status: Option<String>,
    pub loan_amount: Option<f64>,
    pub notes: Option<String>,
}

impl Application {
    /// Build the application row for a conversion
    pub fn create(
        lead_guid: &str,
        company_code: &str,
        user_email: &str,
        loan_amount: Option<f64>,
        notes: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            guid: Uuid::new_v4().to_string(),
            application_code: generate_application_code(now),
            lead_guid: lead_guid.to_string(),
            company_code: company_code.to_string(),
            user_email: user_email.to_string(),
            application_status: "created".to_string(),
            loan_amount,
            notes,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge an update, stamping `updated_at`
    pub fn apply_update(&mut self, update: ApplicationUpdate) {
        if let Some(v) = update.application_status {
            self.application_status = v;
        }
        if let Some(v) = update.loan_amount {
            self.loan_amount = Some(v);
        }
        if let Some(v) = update.notes {
            self.notes = Some(v);
        }
        self.updated_at = Utc::now();
    }
}

/// Generate an application code: `APP-{DD}{MM}-{NNNN}`.
///
/// Day and month are UTC and zero-padded; the suffix is uniform in
/// [1000, 9999]. Codes are human-facing labels, not identifiers.
pub fn generate_application_code(now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(1000..=9999);
    format!("APP-{:02}{:02}-{}", now.day(), now.month(), suffix)
}

// ============================================================================
// Tests
// ============================================================================
