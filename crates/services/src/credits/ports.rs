use async_trait::async_trait;

use crate::types::AccountId;
use crate::usage::{NewUsageRecord, UsageRecord, UsageValidationError};

pub const MAX_USAGE_PAGE_SIZE: i64 = 100;

/// Result of one attempt at the debit-and-append unit of work
#[derive(Debug, Clone, PartialEq)]
pub enum ConsumeOutcome {
    /// Balance decremented by one and the record appended
    Consumed {
        record: UsageRecord,
        remaining_credits: i64,
    },
    /// Account exists but holds no credits; nothing was written
    InsufficientCredits,
    /// No account with that id; nothing was written
    AccountNotFound,
}

#[derive(Debug, thiserror::Error)]
pub enum ConsumeError {
    #[error("Insufficient credits")]
    InsufficientCredits,
    #[error("Account not found")]
    NotFound,
    #[error("Invalid usage record: {0}")]
    Validation(#[from] UsageValidationError),
    #[error("Database error: {0}")]
    Database(String),
}

/// Ledger storage. `consume_credit` must debit and append atomically:
/// either both happen or neither does.
#[async_trait]
pub trait CreditLedgerRepository: Send + Sync {
    async fn consume_credit(
        &self,
        account_id: AccountId,
        usage: &NewUsageRecord,
    ) -> anyhow::Result<ConsumeOutcome>;

    /// Records for an account, newest first
    async fn list_usage(
        &self,
        account_id: AccountId,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<UsageRecord>>;
}

#[async_trait]
pub trait CreditsService: Send + Sync {
    /// Debit one credit and record the completed work as a single unit
    async fn consume(
        &self,
        account_id: AccountId,
        usage: NewUsageRecord,
    ) -> Result<UsageRecord, ConsumeError>;

    async fn list_usage(
        &self,
        account_id: AccountId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<UsageRecord>, ConsumeError>;
}
