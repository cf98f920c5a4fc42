use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AccountId, UsageRecordId};

/// One completed improvement, appended by the consumption transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: UsageRecordId,
    pub account_id: AccountId,
    pub original_prompt: String,
    pub improved_prompt: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageValidationError {
    #[error("original prompt must not be empty")]
    EmptyOriginal,
    #[error("improved prompt must not be empty")]
    EmptyImproved,
}

/// Validated content of a usage record that has not been persisted yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUsageRecord {
    original_prompt: String,
    improved_prompt: String,
    model: String,
}

impl NewUsageRecord {
    pub fn new(
        original_prompt: impl Into<String>,
        improved_prompt: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, UsageValidationError> {
        let original_prompt = original_prompt.into();
        let improved_prompt = improved_prompt.into();

        if original_prompt.trim().is_empty() {
            return Err(UsageValidationError::EmptyOriginal);
        }
        if improved_prompt.trim().is_empty() {
            return Err(UsageValidationError::EmptyImproved);
        }

        Ok(Self {
            original_prompt,
            improved_prompt,
            model: model.into(),
        })
    }

    pub fn original_prompt(&self) -> &str {
        &self.original_prompt
    }

    pub fn improved_prompt(&self) -> &str {
        &self.improved_prompt
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Materialize the record with a fresh id and timestamp
    pub fn into_record(self, account_id: AccountId, created_at: DateTime<Utc>) -> UsageRecord {
        UsageRecord {
            id: UsageRecordId::new(),
            account_id,
            original_prompt: self.original_prompt,
            improved_prompt: self.improved_prompt,
            model: self.model,
            created_at,
        }
    }
}
