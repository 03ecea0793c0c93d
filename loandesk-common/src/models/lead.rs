//! Lead entity and its request payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle states of a lead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Converted,
    Lost,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Converted => "converted",
            LeadStatus::Lost => "lost",
        }
    }
}

impl std::str::FromStr for LeadStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(LeadStatus::New),
            "contacted" => Ok(LeadStatus::Contacted),
            "qualified" => Ok(LeadStatus::Qualified),
            "converted" => Ok(LeadStatus::Converted),
            "lost" => Ok(LeadStatus::Lost),
            other => Err(crate::Error::Internal(format!(
                "Unknown lead status: {}",
                other
            ))),
        }
    }
}

/// A prospective borrower enquiry, owned by one tenant pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub guid: String,
    pub company_code: String,
    pub user_email: String,
    /// Human-facing code, `LEAD-{unix_millis}` when generated
    pub lead_number: String,
    pub lead_source: Option<String>,
    pub referrer_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub mobile_phone: Option<String>,
    pub preferred_contact_method: Option<String>,
    pub loan_purpose: Option<String>,
    pub property_type: Option<String>,
    pub estimated_loan_amount: Option<f64>,
    pub estimated_property_value: Option<f64>,
    pub is_first_home_buyer: Option<bool>,
    pub urgency_level: Option<String>,
    pub pre_approval_needed: Option<bool>,
    pub notes: Option<String>,
    pub assigned_broker: Option<String>,
    pub lead_status: LeadStatus,
    /// Set to `converted` by the conversion workflow, never by updates
    pub conversion_status: Option<String>,
    pub converted_to_application_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
}

/// Client-supplied fields for `POST /leads`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewLead {
    pub lead_number: Option<String>,
    pub lead_source: Option<String>,
    pub referrer_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub mobile_phone: Option<String>,
    pub preferred_contact_method: Option<String>,
    pub loan_purpose: Option<String>,
    pub property_type: Option<String>,
    pub estimated_loan_amount: Option<f64>,
    pub estimated_property_value: Option<f64>,
    pub is_first_home_buyer: Option<bool>,
    pub urgency_level: Option<String>,
    pub pre_approval_needed: Option<bool>,
    pub notes: Option<String>,
    pub assigned_broker: Option<String>,
    pub lead_status: Option<LeadStatus>,
}

/// Mutable fields for `PUT`/`PATCH /leads/{id}`.
///
/// Identity, tenancy, and audit-origin fields are deliberately absent, so
/// request bodies cannot change them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadUpdate {
    pub lead_source: Option<String>,
    pub referrer_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub mobile_phone: Option<String>,
    pub preferred_contact_method: Option<String>,
    pub loan_purpose: Option<String>,
    pub property_type: Option<String>,
    pub estimated_loan_amount: Option<f64>,
    pub estimated_property_value: Option<f64>,
    pub is_first_home_buyer: Option<bool>,
    pub urgency_level: Option<String>,
    pub pre_approval_needed: Option<bool>,
    pub notes: Option<String>,
    pub assigned_broker: Option<String>,
    pub lead_status: Option<LeadStatus>,
}

impl Lead {
    /// Build a fresh lead owned by the given tenant pair.
    ///
    /// Tenancy and audit fields always come from the session, never from the
    /// request body.
    pub fn create(body: NewLead, company_code: &str, user_email: &str) -> Self {
        let now = Utc::now();
        Self {
            guid: Uuid::new_v4().to_string(),
            company_code: company_code.to_string(),
            user_email: user_email.to_string(),
            lead_number: body
                .lead_number
                .unwrap_or_else(|| generate_lead_number(now)),
            lead_source: body.lead_source,
            referrer_name: body.referrer_name,
            first_name: body.first_name,
            last_name: body.last_name,
            email: body.email,
            mobile_phone: body.mobile_phone,
            preferred_contact_method: body.preferred_contact_method,
            loan_purpose: body.loan_purpose,
            property_type: body.property_type,
            estimated_loan_amount: body.estimated_loan_amount,
            estimated_property_value: body.estimated_property_value,
            is_first_home_buyer: body.is_first_home_buyer,
            urgency_level: body.urgency_level,
            pre_approval_needed: body.pre_approval_needed,
            notes: body.notes,
            assigned_broker: body.assigned_broker,
            lead_status: body.lead_status.unwrap_or(LeadStatus::New),
            conversion_status: None,
            converted_to_application_date: None,
            created_at: now,
            updated_at: now,
            created_by: Some(user_email.to_string()),
            updated_by: None,
        }
    }

    /// Merge an update into this lead, stamping the audit fields
    pub fn apply_update(&mut self, update: LeadUpdate, updated_by: &str) {
        if let Some(v) = update.lead_source {
            self.lead_source = Some(v);
        }
        if let Some(v) = update.referrer_name {
            self.referrer_name = Some(v);
        }
        if let Some(v) = update.first_name {
            self.first_name = Some(v);
        }
        if let Some(v) = update.last_name {
            self.last_name = Some(v);
        }
        if let Some(v) = update.email {
            self.email = Some(v);
        }
        if let Some(v) = update.mobile_phone {
            self.mobile_phone = Some(v);
        }
        if let Some(v) = update.preferred_contact_method {
            self.preferred_contact_method = Some(v);
        }
        if let Some(v) = update.loan_purpose {
            self.loan_purpose = Some(v);
        }
        if let Some(v) = update.property_type {
            self.property_type = Some(v);
        }
        if let Some(v) = update.estimated_loan_amount {
            self.estimated_loan_amount = Some(v);
        }
        if let Some(v) = update.estimated_property_value {
            self.estimated_property_value = Some(v);
        }
        if let Some(v) = update.is_first_home_buyer {
            self.is_first_home_buyer = Some(v);
        }
        if let Some(v) = update.urgency_level {
            self.urgency_level = Some(v);
        }
        if let Some(v) = update.pre_approval_needed {
            self.pre_approval_needed = Some(v);
        }
        if let Some(v) = update.notes {
            self.notes = Some(v);
        }
        if let Some(v) = update.assigned_broker {
            self.assigned_broker = Some(v);
        }
        if let Some(v) = update.lead_status {
            self.lead_status = v;
        }
        self.updated_at = Utc::now();
        self.updated_by = Some(updated_by.to_string());
    }
}

/// Generate a human-facing lead number from the creation instant
pub fn generate_lead_number(now: DateTime<Utc>) -> String {
    format!("LEAD-{}", now.timestamp_millis())
}

// ============================================================================
// Tests
// ============================================================================
