//! In-memory doubles for the repository and collaborator ports.
//!
//! Used by unit tests here and by the HTTP tests in the `api` crate, which run
//! without a database.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::account::{Account, AccountRepository, Plan, PlanAllotments, PlanAssignment};
use crate::auth::{generate_session_token, hash_session_token, Session, SessionRepository};
use crate::billing::{
    AccountChange, AppliedChange, BillingEventRepository, BillingProvider, CheckoutRequest,
    NewBillingEvent, StoredBillingEvent,
};
use crate::credits::{ConsumeOutcome, CreditLedgerRepository};
use crate::prompt::{CompletionRequest, TextTransformer, TransformError, Transformation};
use crate::types::{AccountId, BillingEventId, SessionId};
use crate::usage::{NewUsageRecord, UsageRecord};

/// Build a `Stripe-Signature` header value for `payload`, timestamped now
pub fn sign_webhook_payload(payload: &str, secret: &str) -> String {
    let timestamp = Utc::now().timestamp();
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(format!("{timestamp}.{payload}").as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());
    format!("t={timestamp},v1={signature}")
}

#[derive(Default)]
struct StoreState {
    accounts: Vec<Account>,
    usage: Vec<UsageRecord>,
    events: HashMap<(String, String), StoredBillingEvent>,
    sessions: HashMap<String, Session>,
}

impl StoreState {
    fn account_mut_by_identity(&mut self, identity: &str) -> Option<&mut Account> {
        self.accounts.iter_mut().find(|a| a.identity == identity)
    }

    fn customer_ref_taken(&self, customer_ref: &str, except: Option<AccountId>) -> bool {
        self.accounts.iter().any(|a| {
            a.billing_customer_ref.as_deref() == Some(customer_ref) && Some(a.id) != except
        })
    }

    fn insert_account(&mut self, identity: &str, plan: Plan, credits: i64) -> Account {
        let now = Utc::now();
        let account = Account {
            id: AccountId::new(),
            identity: identity.to_string(),
            plan,
            credits,
            billing_customer_ref: None,
            billing_subscription_ref: None,
            period_end: None,
            created_at: now,
            updated_at: now,
        };
        self.accounts.push(account.clone());
        account
    }

    fn assign_by_identity(
        &mut self,
        identity: &str,
        assignment: &PlanAssignment,
    ) -> anyhow::Result<Account> {
        let existing = self
            .accounts
            .iter()
            .find(|a| a.identity == identity)
            .map(|a| a.id);
        if let Some(customer_ref) = &assignment.customer_ref {
            if self.customer_ref_taken(customer_ref, existing) {
                anyhow::bail!("billing customer ref {customer_ref} already linked");
            }
        }

        if existing.is_none() {
            self.insert_account(identity, assignment.plan, assignment.credits);
        }
        let account = self
            .account_mut_by_identity(identity)
            .ok_or_else(|| anyhow::anyhow!("account vanished"))?;
        apply_assignment(account, assignment);
        Ok(account.clone())
    }

    fn assign_by_customer_ref(
        &mut self,
        customer_ref: &str,
        placeholder_identity: &str,
        assignment: &PlanAssignment,
    ) -> anyhow::Result<Account> {
        let position = self
            .accounts
            .iter()
            .position(|a| a.billing_customer_ref.as_deref() == Some(customer_ref));
        let index = match position {
            Some(index) => index,
            None => {
                if self.accounts.iter().any(|a| a.identity == placeholder_identity) {
                    anyhow::bail!("identity {placeholder_identity} already exists");
                }
                self.insert_account(placeholder_identity, assignment.plan, assignment.credits);
                let index = self.accounts.len() - 1;
                self.accounts[index].billing_customer_ref = Some(customer_ref.to_string());
                index
            }
        };

        let account = &mut self.accounts[index];
        apply_assignment(account, assignment);
        Ok(account.clone())
    }

    fn downgrade(&mut self, subscription_ref: &str, plan: Plan, credits: i64) -> u64 {
        let mut updated = 0;
        for account in self
            .accounts
            .iter_mut()
            .filter(|a| a.billing_subscription_ref.as_deref() == Some(subscription_ref))
        {
            account.plan = plan;
            account.credits = credits;
            account.billing_subscription_ref = None;
            account.updated_at = Utc::now();
            updated += 1;
        }
        updated
    }

    fn renew(
        &mut self,
        subscription_ref: &str,
        allotments: &PlanAllotments,
        period_end: Option<DateTime<Utc>>,
    ) -> u64 {
        let mut updated = 0;
        for account in self
            .accounts
            .iter_mut()
            .filter(|a| a.billing_subscription_ref.as_deref() == Some(subscription_ref))
        {
            account.credits = allotments.for_plan(account.plan);
            if period_end.is_some() {
                account.period_end = period_end;
            }
            account.updated_at = Utc::now();
            updated += 1;
        }
        updated
    }

    fn apply_change(&mut self, change: &AccountChange) -> anyhow::Result<AppliedChange> {
        Ok(match change {
            AccountChange::AssignByIdentity {
                identity,
                assignment,
            } => AppliedChange::Account(self.assign_by_identity(identity, assignment)?),
            AccountChange::AssignByCustomerRef {
                customer_ref,
                placeholder_identity,
                assignment,
            } => AppliedChange::Account(self.assign_by_customer_ref(
                customer_ref,
                placeholder_identity,
                assignment,
            )?),
            AccountChange::DowngradeBySubscription {
                subscription_ref,
                plan,
                credits,
            } => AppliedChange::Accounts(self.downgrade(subscription_ref, *plan, *credits)),
            AccountChange::RenewBySubscription {
                subscription_ref,
                allotments,
                period_end,
            } => AppliedChange::Accounts(self.renew(subscription_ref, allotments, *period_end)),
            AccountChange::RecordOnly => AppliedChange::Recorded,
        })
    }
}

fn apply_assignment(account: &mut Account, assignment: &PlanAssignment) {
    account.plan = assignment.plan;
    account.credits = assignment.credits;
    if let Some(customer_ref) = &assignment.customer_ref {
        account.billing_customer_ref = Some(customer_ref.clone());
    }
    if let Some(subscription_ref) = &assignment.subscription_ref {
        account.billing_subscription_ref = Some(subscription_ref.clone());
    }
    if let Some(period_end) = assignment.period_end {
        account.period_end = Some(period_end);
    }
    account.updated_at = Utc::now();
}

/// One lock over every table, so each repository call is atomic the way a
/// single statement or transaction is in Postgres.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
    mutations: AtomicUsize,
    failing_event_writes: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutated(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of write operations performed so far
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub async fn seed_account(&self, identity: &str, plan: Plan, credits: i64) -> Account {
        self.state
            .lock()
            .await
            .insert_account(identity, plan, credits)
    }

    pub async fn account_count(&self) -> usize {
        self.state.lock().await.accounts.len()
    }

    pub async fn account_by_identity(&self, identity: &str) -> Option<Account> {
        self.state
            .lock()
            .await
            .accounts
            .iter()
            .find(|a| a.identity == identity)
            .cloned()
    }

    pub async fn credits_of(&self, identity: &str) -> Option<i64> {
        self.account_by_identity(identity).await.map(|a| a.credits)
    }

    pub async fn set_credits(&self, identity: &str, credits: i64) {
        if let Some(account) = self.state.lock().await.account_mut_by_identity(identity) {
            account.credits = credits;
        }
    }

    pub async fn usage_for(&self, account_id: AccountId) -> Vec<UsageRecord> {
        self.state
            .lock()
            .await
            .usage
            .iter()
            .filter(|r| r.account_id == account_id)
            .cloned()
            .collect()
    }

    pub async fn event_count(&self) -> usize {
        self.state.lock().await.events.len()
    }

    /// The next `n` calls to `apply_event` fail as a dropped connection would,
    /// after the duplicate check and before anything is written
    pub fn fail_next_event_writes(&self, n: usize) {
        self.failing_event_writes.store(n, Ordering::SeqCst);
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_event_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Issue a 30-day session for `identity`, as the sign-in service would.
    /// The returned session carries the unhashed token.
    pub async fn create_session(&self, identity: &str) -> anyhow::Result<Session> {
        let mut state = self.state.lock().await;
        self.mutated();

        let token = generate_session_token();
        let now = Utc::now();
        let session = Session {
            session_id: SessionId::new(),
            identity: identity.to_string(),
            created_at: now,
            expires_at: now + chrono::Duration::days(30),
            token: None,
        };
        state
            .sessions
            .insert(hash_session_token(&token), session.clone());

        Ok(Session {
            token: Some(token),
            ..session
        })
    }
}

#[async_trait]
impl AccountRepository for InMemoryStore {
    async fn ensure_account(
        &self,
        identity: &str,
        initial_credits: i64,
    ) -> anyhow::Result<Account> {
        let mut state = self.state.lock().await;
        if let Some(account) = state.accounts.iter().find(|a| a.identity == identity) {
            return Ok(account.clone());
        }
        self.mutated();
        Ok(state.insert_account(identity, Plan::Free, initial_credits))
    }

    async fn set_customer_ref(
        &self,
        account_id: AccountId,
        customer_ref: &str,
    ) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        self.mutated();

        if state.customer_ref_taken(customer_ref, Some(account_id)) {
            anyhow::bail!("billing customer ref {customer_ref} already linked");
        }
        let account = state
            .accounts
            .iter_mut()
            .find(|a| a.id == account_id)
            .ok_or_else(|| anyhow::anyhow!("account {account_id} not found"))?;
        account.billing_customer_ref = Some(customer_ref.to_string());
        account.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl CreditLedgerRepository for InMemoryStore {
    async fn consume_credit(
        &self,
        account_id: AccountId,
        usage: &NewUsageRecord,
    ) -> anyhow::Result<ConsumeOutcome> {
        let mut state = self.state.lock().await;

        let Some(account) = state.accounts.iter_mut().find(|a| a.id == account_id) else {
            return Ok(ConsumeOutcome::AccountNotFound);
        };
        if account.credits < 1 {
            return Ok(ConsumeOutcome::InsufficientCredits);
        }

        self.mutated();
        account.credits -= 1;
        account.updated_at = Utc::now();
        let remaining_credits = account.credits;

        let record = usage.clone().into_record(account_id, Utc::now());
        state.usage.push(record.clone());

        Ok(ConsumeOutcome::Consumed {
            record,
            remaining_credits,
        })
    }

    async fn list_usage(
        &self,
        account_id: AccountId,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<UsageRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .usage
            .iter()
            .rev()
            .filter(|r| r.account_id == account_id)
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BillingEventRepository for InMemoryStore {
    async fn is_recorded(&self, provider: &str, event_id: &str) -> anyhow::Result<bool> {
        let state = self.state.lock().await;
        Ok(state
            .events
            .contains_key(&(provider.to_string(), event_id.to_string())))
    }

    async fn apply_event(
        &self,
        event: Option<&NewBillingEvent>,
        change: &AccountChange,
    ) -> anyhow::Result<AppliedChange> {
        let mut state = self.state.lock().await;

        let key = event.map(|e| (e.provider.clone(), e.event_id.clone()));
        if let Some(key) = &key {
            if state.events.contains_key(key) {
                return Ok(AppliedChange::Duplicate);
            }
        }

        if self.take_injected_failure() {
            anyhow::bail!("connection reset");
        }

        // Every StoreState write checks before it mutates, so an error leaves nothing behind
        let applied = state.apply_change(change)?;
        if event.is_some() || !matches!(change, AccountChange::RecordOnly) {
            self.mutated();
        }

        if let (Some(key), Some(event)) = (key, event) {
            state.events.insert(
                key,
                StoredBillingEvent {
                    id: BillingEventId::new(),
                    provider: event.provider.clone(),
                    event_id: event.event_id.clone(),
                    event_type: event.event_type.clone(),
                    payload: event.payload.clone(),
                    created_at: Utc::now(),
                },
            );
        }
        Ok(applied)
    }
}

#[async_trait]
impl SessionRepository for InMemoryStore {
    async fn get_session_by_token_hash(
        &self,
        token_hash: &str,
    ) -> anyhow::Result<Option<Session>> {
        let state = self.state.lock().await;
        Ok(state
            .sessions
            .get(token_hash)
            .filter(|s| s.expires_at > Utc::now())
            .cloned())
    }
}

/// Text transformer returning a canned reply, or failing every call
pub struct MockTextTransformer {
    reply: Option<String>,
    delay: Option<Duration>,
    requests: StdMutex<Vec<CompletionRequest>>,
}

impl MockTextTransformer {
    pub const MODEL: &'static str = "mock-model";

    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
            delay: None,
            requests: StdMutex::new(Vec::new()),
        }
    }

    /// Replies only after `delay`, so concurrent callers overlap in the upstream call
    pub fn replying_after(reply: impl Into<String>, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::replying(reply)
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            delay: None,
            requests: StdMutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests
            .lock()
            .ok()
            .and_then(|r| r.last().cloned())
    }
}

#[async_trait]
impl TextTransformer for MockTextTransformer {
    async fn complete(&self, request: CompletionRequest) -> Result<Transformation, TransformError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.reply {
            Some(text) => Ok(Transformation {
                text: text.clone(),
                model: Self::MODEL.to_string(),
            }),
            None => Err(TransformError::Status { status: 503 }),
        }
    }
}

/// Billing provider that never leaves the process
pub struct MockBillingProvider {
    configured: bool,
    fail_lookups: bool,
    customers: AtomicUsize,
    checkouts: StdMutex<Vec<CheckoutRequest>>,
}

impl MockBillingProvider {
    pub fn new() -> Self {
        Self {
            configured: true,
            fail_lookups: false,
            customers: AtomicUsize::new(0),
            checkouts: StdMutex::new(Vec::new()),
        }
    }

    /// Period-end lookups fail; everything else works
    pub fn failing_lookups() -> Self {
        Self {
            fail_lookups: true,
            ..Self::new()
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }

    /// Period end reported for every subscription
    pub fn period_end(&self) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_default()
    }

    pub fn customers_created(&self) -> usize {
        self.customers.load(Ordering::SeqCst)
    }

    pub fn checkout_requests(&self) -> Vec<CheckoutRequest> {
        self.checkouts
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

impl Default for MockBillingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BillingProvider for MockBillingProvider {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn subscription_period_end(
        &self,
        subscription_ref: &str,
    ) -> anyhow::Result<Option<DateTime<Utc>>> {
        if self.fail_lookups {
            anyhow::bail!("lookup of {subscription_ref} failed");
        }
        Ok(Some(self.period_end()))
    }

    async fn create_customer(&self, _identity: &str) -> anyhow::Result<String> {
        let n = self.customers.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("cus_mock_{n}"))
    }

    async fn create_checkout_session(&self, request: &CheckoutRequest) -> anyhow::Result<String> {
        let mut checkouts = self
            .checkouts
            .lock()
            .map_err(|_| anyhow::anyhow!("checkout log poisoned"))?;
        checkouts.push(request.clone());
        Ok(format!("https://checkout.test/session/{}", checkouts.len()))
    }
}
