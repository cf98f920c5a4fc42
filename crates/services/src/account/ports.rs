use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::AccountId;

/// Subscription tier of an account
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Pro,
    Enterprise,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Pro => "pro",
            Plan::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Plan::Free),
            "pro" => Ok(Plan::Pro),
            "enterprise" => Ok(Plan::Enterprise),
            other => Err(anyhow::anyhow!("Unknown plan: {other}")),
        }
    }
}

/// Credits granted when an account enters (or renews) a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanAllotments {
    pub free: i64,
    pub pro: i64,
    pub enterprise: i64,
}

impl PlanAllotments {
    pub fn for_plan(&self, plan: Plan) -> i64 {
        match plan {
            Plan::Free => self.free,
            Plan::Pro => self.pro,
            Plan::Enterprise => self.enterprise,
        }
    }
}

impl Default for PlanAllotments {
    fn default() -> Self {
        Self {
            free: 5,
            pro: 200,
            enterprise: 1000,
        }
    }
}

/// Durable per-identity plan and credit state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub identity: String,
    pub plan: Plan,
    pub credits: i64,
    pub billing_customer_ref: Option<String>,
    pub billing_subscription_ref: Option<String>,
    pub period_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Absolute plan state written by a billing transition.
///
/// `plan` and `credits` always overwrite. The optional refs and `period_end`
/// only overwrite when present, so an event that omits them leaves the stored
/// values untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanAssignment {
    pub plan: Plan,
    pub credits: i64,
    pub customer_ref: Option<String>,
    pub subscription_ref: Option<String>,
    pub period_end: Option<DateTime<Utc>>,
}

/// Repository trait for account records
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Create a free account for `identity` unless one exists, then return the stored row.
    /// Safe under concurrent first touches.
    async fn ensure_account(&self, identity: &str, initial_credits: i64)
        -> anyhow::Result<Account>;

    /// Link a billing customer to an account
    async fn set_customer_ref(&self, account_id: AccountId, customer_ref: &str)
        -> anyhow::Result<()>;
}
