//! Domain models shared across the LoanDesk backend

pub mod application;
pub mod document;
pub mod lead;
pub mod profile;
pub mod session;
pub mod task;

pub use application::{generate_application_code, Application, ApplicationUpdate, NewApplication};
pub use document::{DocStatus, Document, NewDocument};
pub use lead::{generate_lead_number, Lead, LeadStatus, LeadUpdate, NewLead};
pub use profile::{ProfileUpdate, UserProfile};
pub use session::Session;
pub use task::{AnalysisTask, TaskState};
