use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::SessionId;

/// Authenticated session bound to an external identity
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: SessionId,
    pub identity: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Unhashed token; only set by the issuer, never on retrieval
    pub token: Option<String>,
}

/// Read side of the session store. Sessions are issued by the external
/// sign-in service that shares the `sessions` table; this API only verifies them.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Retrieve a session by token hash
    async fn get_session_by_token_hash(&self, token_hash: &str)
        -> anyhow::Result<Option<Session>>;
}
