use serde::{Deserialize, Serialize};
use services::account::Plan;
use services::entitlement::Entitlement;
use services::usage::UsageRecord;
use services::{AccountId, UsageRecordId};
use utoipa::ToSchema;

/// Account view as seen by the entitlement gate
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AccountResponse {
    pub id: AccountId,
    pub identity: String,
    pub plan: Plan,
    pub credits: i64,
    pub billing_customer_ref: Option<String>,
    pub billing_subscription_ref: Option<String>,
    pub period_end: Option<String>,
    /// Whether the account may consume one more improvement
    pub allowed: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// One completed improvement
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UsageRecordResponse {
    pub id: UsageRecordId,
    pub original_prompt: String,
    pub improved_prompt: String,
    pub model: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UsageListResponse {
    pub records: Vec<UsageRecordResponse>,
    pub limit: i64,
    pub offset: i64,
}

impl From<Entitlement> for AccountResponse {
    fn from(entitlement: Entitlement) -> Self {
        let account = entitlement.account;
        Self {
            id: account.id,
            identity: account.identity,
            plan: account.plan,
            credits: account.credits,
            billing_customer_ref: account.billing_customer_ref,
            billing_subscription_ref: account.billing_subscription_ref,
            period_end: account.period_end.map(|t| t.to_rfc3339()),
            allowed: entitlement.allowed,
            created_at: account.created_at.to_rfc3339(),
            updated_at: account.updated_at.to_rfc3339(),
        }
    }
}

impl From<UsageRecord> for UsageRecordResponse {
    fn from(record: UsageRecord) -> Self {
        Self {
            id: record.id,
            original_prompt: record.original_prompt,
            improved_prompt: record.improved_prompt,
            model: record.model,
            created_at: record.created_at.to_rfc3339(),
        }
    }
}
