use async_trait::async_trait;

use crate::account::Account;

/// Decision made by the gate, together with the account it was made on
#[derive(Debug, Clone, PartialEq)]
pub struct Entitlement {
    pub allowed: bool,
    pub account: Account,
}

#[derive(Debug, thiserror::Error)]
pub enum EntitlementError {
    #[error("Missing or empty identity")]
    Unauthenticated,
    #[error("Database error: {0}")]
    Database(String),
}

#[async_trait]
pub trait EntitlementGate: Send + Sync {
    /// Resolve the identity's account (creating it on first touch) and report
    /// whether it may consume one unit of work.
    async fn check_entitlement(&self, identity: &str) -> Result<Entitlement, EntitlementError>;
}
