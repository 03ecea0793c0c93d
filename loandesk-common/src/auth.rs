//! Credential and session token hashing
//!
//! Passwords are stored as SHA-256 over salt + password. Session tokens are
//! random strings handed to the client; only their SHA-256 digest is stored,
//! so a leaked database does not expose live sessions.

use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Length of generated password salts
const SALT_LEN: usize = 32;

/// Length of generated session tokens
const TOKEN_LEN: usize = 48;

/// Generate a random alphanumeric password salt
pub fn generate_salt() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LEN)
        .map(char::from)
        .collect()
}

/// Hash a password with its salt, returning 64 hex characters
pub fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Check a candidate password against the stored hash
pub fn verify_password(salt: &str, password: &str, expected_hash: &str) -> bool {
    hash_password(salt, password) == expected_hash
}

/// Generate a random session token for the client
pub fn generate_session_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Hash a session token for storage and lookup, returning 64 hex characters
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// Tests
// ============================================================================
