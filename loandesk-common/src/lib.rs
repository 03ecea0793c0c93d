//! # LoanDesk Common Library
//!
//! Shared code for the LoanDesk brokerage backend:
//! - Error types
//! - Root folder resolution and filesystem layout
//! - Database initialization, schema, and settings access
//! - Domain models (leads, applications, documents, profiles, analysis tasks)
//! - Credential and token hashing

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use error::{Error, Result};
