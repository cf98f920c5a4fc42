use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::account::{Account, Plan, PlanAllotments, PlanAssignment};
use crate::types::{AccountId, BillingEventId};

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("Webhook signature verification failed: {0}")]
    SignatureInvalid(String),
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),
    #[error("Missing or empty identity")]
    Unauthenticated,
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Billing is not configured")]
    NotConfigured,
    #[error("Billing provider error: {0}")]
    Provider(String),
    #[error("Database error: {0}")]
    Database(String),
}

/// Something that went wrong while applying a verified event. Logged, never
/// surfaced to the sender: the event is still acknowledged.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReconciliationWarning {
    #[error("event carries neither an identity nor a customer ref")]
    MissingIdentityAndCustomer,
    #[error("event carries no subscription ref")]
    MissingSubscriptionRef,
    #[error("period end lookup failed for {subscription_ref}: {error}")]
    PeriodEndLookupFailed {
        subscription_ref: String,
        error: String,
    },
    #[error("failed to apply transition: {0}")]
    MutationFailed(String),
}

/// State change applied for one event
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Upgraded { account_id: AccountId, plan: Plan },
    Renewed { accounts: u64 },
    Downgraded { accounts: u64 },
    /// Event id already recorded; nothing applied
    Duplicate,
    /// Event type or variant with no effect on accounts
    Ignored,
    /// Event was relevant but could not be applied (see warnings)
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    pub event_id: Option<String>,
    pub event_type: String,
    pub transition: Transition,
    pub warnings: Vec<ReconciliationWarning>,
}

/// Billing event as persisted in the event log
#[derive(Debug, Clone)]
pub struct StoredBillingEvent {
    pub id: BillingEventId,
    pub provider: String,
    pub event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Verified event to append to the log together with its account change
#[derive(Debug, Clone)]
pub struct NewBillingEvent {
    pub provider: String,
    pub event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
}

/// Account mutation carried by one billing event. Every write is absolute.
#[derive(Debug, Clone, PartialEq)]
pub enum AccountChange {
    /// Upsert keyed by identity
    AssignByIdentity {
        identity: String,
        assignment: PlanAssignment,
    },
    /// Upsert keyed by billing customer ref. A created row gets `placeholder_identity`.
    AssignByCustomerRef {
        customer_ref: String,
        placeholder_identity: String,
        assignment: PlanAssignment,
    },
    /// Every holder of the subscription moves to `plan`/`credits` and loses the ref
    DowngradeBySubscription {
        subscription_ref: String,
        plan: Plan,
        credits: i64,
    },
    /// Every holder of the subscription is reset to its plan allotment.
    /// `period_end` is only written when present.
    RenewBySubscription {
        subscription_ref: String,
        allotments: PlanAllotments,
        period_end: Option<DateTime<Utc>>,
    },
    /// Log the event, touch no account
    RecordOnly,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppliedChange {
    /// Event id already in the log; nothing applied
    Duplicate,
    Account(Account),
    /// Rows updated by a subscription fan-out
    Accounts(u64),
    Recorded,
}

/// Repository trait for the append-only billing event log
#[async_trait]
pub trait BillingEventRepository: Send + Sync {
    /// Whether `event_id` is already logged. Read-only fast path; `apply_event`
    /// makes the authoritative check.
    async fn is_recorded(&self, provider: &str, event_id: &str) -> anyhow::Result<bool>;

    /// Append `event` and apply `change` as one unit of work, idempotent via
    /// UNIQUE (provider, event_id). A logged event id applies nothing. A failed
    /// change leaves no log row, so a redelivery applies it. Without an event
    /// the change is applied on its own.
    async fn apply_event(
        &self,
        event: Option<&NewBillingEvent>,
        change: &AccountChange,
    ) -> anyhow::Result<AppliedChange>;
}

/// Checks that a webhook payload was signed by the billing provider
pub trait WebhookVerifier: Send + Sync {
    fn verify(&self, payload: &str, signature: &str) -> Result<(), BillingError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub identity: String,
    pub customer_ref: String,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// Outbound calls to the billing provider
#[async_trait]
pub trait BillingProvider: Send + Sync {
    fn is_configured(&self) -> bool;

    /// End of the subscription's current billing period, if the provider reports one
    async fn subscription_period_end(
        &self,
        subscription_ref: &str,
    ) -> anyhow::Result<Option<DateTime<Utc>>>;

    /// Create a customer tagged with `identity`; returns the customer ref
    async fn create_customer(&self, identity: &str) -> anyhow::Result<String>;

    /// Create a subscription checkout session; returns its URL
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> anyhow::Result<String>;
}

#[async_trait]
pub trait BillingService: Send + Sync {
    /// Verify, record and apply one webhook delivery.
    /// Errors only for signature or payload problems; everything after
    /// verification is acknowledged and reported through the outcome.
    async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<ReconcileOutcome, BillingError>;

    /// Create a checkout session for `identity` and return its URL
    async fn create_checkout(
        &self,
        identity: &str,
        price_id: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<String, BillingError>;
}
