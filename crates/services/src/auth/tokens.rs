//! Session token generation and hashing.
//!
//! Tokens are handed to clients once; only their SHA-256 hex digest is stored.

use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const SESSION_TOKEN_PREFIX: &str = "sess_";

/// `sess_` followed by 32 hex characters
pub fn generate_session_token() -> String {
    format!("{SESSION_TOKEN_PREFIX}{}", Uuid::new_v4().simple())
}

pub fn hash_session_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
