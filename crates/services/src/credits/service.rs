use async_trait::async_trait;
use std::sync::Arc;

use super::ports::{
    ConsumeError, ConsumeOutcome, CreditLedgerRepository, CreditsService, MAX_USAGE_PAGE_SIZE,
};
use crate::types::AccountId;
use crate::usage::{NewUsageRecord, UsageRecord};

pub struct CreditsServiceImpl {
    ledger_repo: Arc<dyn CreditLedgerRepository>,
}

impl CreditsServiceImpl {
    pub fn new(ledger_repo: Arc<dyn CreditLedgerRepository>) -> Self {
        Self { ledger_repo }
    }
}

#[async_trait]
impl CreditsService for CreditsServiceImpl {
    async fn consume(
        &self,
        account_id: AccountId,
        usage: NewUsageRecord,
    ) -> Result<UsageRecord, ConsumeError> {
        let outcome = self
            .ledger_repo
            .consume_credit(account_id, &usage)
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, "Consumption transaction failed: account_id={}", account_id);
                ConsumeError::Database(e.to_string())
            })?;

        match outcome {
            ConsumeOutcome::Consumed {
                record,
                remaining_credits,
            } => {
                tracing::info!(
                    "Credit consumed: account_id={}, usage_id={}, remaining_credits={}",
                    account_id,
                    record.id,
                    remaining_credits
                );
                Ok(record)
            }
            ConsumeOutcome::InsufficientCredits => {
                tracing::info!("Consumption refused, no credits left: account_id={}", account_id);
                Err(ConsumeError::InsufficientCredits)
            }
            ConsumeOutcome::AccountNotFound => {
                tracing::warn!("Consumption refused, account missing: account_id={}", account_id);
                Err(ConsumeError::NotFound)
            }
        }
    }

    async fn list_usage(
        &self,
        account_id: AccountId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<UsageRecord>, ConsumeError> {
        let limit = limit.clamp(1, MAX_USAGE_PAGE_SIZE);
        let offset = offset.max(0);

        self.ledger_repo
            .list_usage(account_id, limit, offset)
            .await
            .map_err(|e| ConsumeError::Database(e.to_string()))
    }
}
