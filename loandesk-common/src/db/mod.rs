//! Database access for LoanDesk

pub mod init;
pub mod settings;

pub use init::init_database;
