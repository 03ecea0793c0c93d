//! Background services and external API clients

pub mod analysis_client;
pub mod analysis_worker;

pub use analysis_client::{AnalysisClient, AnalysisError};
pub use analysis_worker::AnalysisWorker;
