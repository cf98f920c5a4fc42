use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::events::{parse_event, BillingEvent, BILLING_REASON_SUBSCRIPTION_CYCLE};
use super::ports::{
    AccountChange, AppliedChange, BillingError, BillingEventRepository, BillingProvider,
    BillingService, CheckoutRequest, NewBillingEvent, ReconcileOutcome, ReconciliationWarning,
    Transition, WebhookVerifier,
};
use crate::account::{AccountRepository, Plan, PlanAllotments, PlanAssignment};

pub const BILLING_PROVIDER: &str = "stripe";

/// Identity given to accounts created from a billing event that names no identity
pub fn unlinked_identity(customer_ref: &str) -> String {
    format!("unlinked:{customer_ref}")
}

/// Configuration for BillingServiceImpl
pub struct BillingServiceConfig {
    pub account_repo: Arc<dyn AccountRepository>,
    pub event_repo: Arc<dyn BillingEventRepository>,
    pub provider: Arc<dyn BillingProvider>,
    pub verifier: Arc<dyn WebhookVerifier>,
    pub allotments: PlanAllotments,
}

pub struct BillingServiceImpl {
    account_repo: Arc<dyn AccountRepository>,
    event_repo: Arc<dyn BillingEventRepository>,
    provider: Arc<dyn BillingProvider>,
    verifier: Arc<dyn WebhookVerifier>,
    allotments: PlanAllotments,
}

impl BillingServiceImpl {
    pub fn new(config: BillingServiceConfig) -> Self {
        Self {
            account_repo: config.account_repo,
            event_repo: config.event_repo,
            provider: config.provider,
            verifier: config.verifier,
            allotments: config.allotments,
        }
    }

    /// Best-effort enrichment; a failed lookup leaves `period_end` unchanged.
    async fn lookup_period_end(
        &self,
        subscription_ref: &str,
        warnings: &mut Vec<ReconciliationWarning>,
    ) -> Option<DateTime<Utc>> {
        if !self.provider.is_configured() {
            tracing::debug!(
                "Billing provider not configured, skipping period end lookup: subscription_id={}",
                subscription_ref
            );
            return None;
        }

        match self.provider.subscription_period_end(subscription_ref).await {
            Ok(period_end) => period_end,
            Err(e) => {
                warnings.push(ReconciliationWarning::PeriodEndLookupFailed {
                    subscription_ref: subscription_ref.to_string(),
                    error: e.to_string(),
                });
                None
            }
        }
    }

    async fn plan_checkout_completed(
        &self,
        identity: Option<String>,
        customer_ref: Option<String>,
        subscription_ref: Option<String>,
        warnings: &mut Vec<ReconciliationWarning>,
    ) -> Planned {
        if identity.is_none() && customer_ref.is_none() {
            warnings.push(ReconciliationWarning::MissingIdentityAndCustomer);
            return Planned::NoEffect(Transition::Skipped);
        }

        let period_end = match subscription_ref.as_deref() {
            Some(subscription_ref) => self.lookup_period_end(subscription_ref, warnings).await,
            None => None,
        };

        let assignment = PlanAssignment {
            plan: Plan::Pro,
            credits: self.allotments.pro,
            customer_ref: customer_ref.clone(),
            subscription_ref,
            period_end,
        };

        match (identity, customer_ref) {
            (Some(identity), _) => Planned::Apply(AccountChange::AssignByIdentity {
                identity,
                assignment,
            }),
            (None, Some(customer_ref)) => {
                tracing::info!(
                    "Checkout without identity, resolving by customer: customer_id={}",
                    customer_ref
                );
                Planned::Apply(AccountChange::AssignByCustomerRef {
                    placeholder_identity: unlinked_identity(&customer_ref),
                    customer_ref,
                    assignment,
                })
            }
            (None, None) => Planned::NoEffect(Transition::Skipped),
        }
    }

    /// Turn a parsed event into the account change it calls for. Provider
    /// lookups happen here, outside the unit of work.
    async fn plan(&self, event: BillingEvent, warnings: &mut Vec<ReconciliationWarning>) -> Planned {
        match event {
            BillingEvent::CheckoutCompleted {
                identity,
                customer_ref,
                subscription_ref,
            } => {
                self.plan_checkout_completed(identity, customer_ref, subscription_ref, warnings)
                    .await
            }
            BillingEvent::InvoicePaid {
                subscription_ref,
                billing_reason,
            } => {
                if billing_reason.as_deref() != Some(BILLING_REASON_SUBSCRIPTION_CYCLE) {
                    tracing::debug!(
                        "Invoice paid outside a renewal cycle, nothing to do: billing_reason={:?}",
                        billing_reason
                    );
                    return Planned::NoEffect(Transition::Ignored);
                }
                let Some(subscription_ref) = subscription_ref else {
                    warnings.push(ReconciliationWarning::MissingSubscriptionRef);
                    return Planned::NoEffect(Transition::Skipped);
                };
                let period_end = self.lookup_period_end(&subscription_ref, warnings).await;
                Planned::Apply(AccountChange::RenewBySubscription {
                    subscription_ref,
                    allotments: self.allotments,
                    period_end,
                })
            }
            BillingEvent::SubscriptionDeleted { subscription_ref } => {
                let Some(subscription_ref) = subscription_ref else {
                    warnings.push(ReconciliationWarning::MissingSubscriptionRef);
                    return Planned::NoEffect(Transition::Skipped);
                };
                Planned::Apply(AccountChange::DowngradeBySubscription {
                    subscription_ref,
                    plan: Plan::Free,
                    credits: self.allotments.free,
                })
            }
            BillingEvent::Other => Planned::NoEffect(Transition::Ignored),
        }
    }
}

/// What an event calls for before anything is written
enum Planned {
    Apply(AccountChange),
    /// Nothing to change on any account; the event is still logged
    NoEffect(Transition),
}

fn transition_for(change: &AccountChange, applied: AppliedChange) -> Transition {
    match (change, applied) {
        (_, AppliedChange::Duplicate) => Transition::Duplicate,
        (_, AppliedChange::Account(account)) => {
            tracing::info!(
                "Account upgraded: account_id={}, plan={}, credits={}",
                account.id,
                account.plan,
                account.credits
            );
            Transition::Upgraded {
                account_id: account.id,
                plan: account.plan,
            }
        }
        (
            AccountChange::RenewBySubscription {
                subscription_ref, ..
            },
            AppliedChange::Accounts(accounts),
        ) => {
            tracing::info!(
                "Subscription renewed: subscription_id={}, accounts={}",
                subscription_ref,
                accounts
            );
            Transition::Renewed { accounts }
        }
        (
            AccountChange::DowngradeBySubscription {
                subscription_ref, ..
            },
            AppliedChange::Accounts(accounts),
        ) => {
            if accounts == 0 {
                tracing::info!(
                    "No account holds cancelled subscription: subscription_id={}",
                    subscription_ref
                );
            } else {
                tracing::info!(
                    "Subscription cancelled, accounts downgraded: subscription_id={}, accounts={}",
                    subscription_ref,
                    accounts
                );
            }
            Transition::Downgraded { accounts }
        }
        _ => Transition::Ignored,
    }
}

#[async_trait]
impl BillingService for BillingServiceImpl {
    async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<ReconcileOutcome, BillingError> {
        tracing::info!("Processing billing webhook");

        let payload_str = std::str::from_utf8(payload)
            .map_err(|e| BillingError::SignatureInvalid(format!("Invalid UTF-8: {e}")))?;

        // Nothing below runs for an unverified payload
        self.verifier.verify(payload_str, signature)?;

        let parsed = parse_event(payload)?;
        let event_id = parsed.id.clone();
        let event_type = parsed.event_type.clone();

        tracing::info!(
            "Processing verified webhook: event_id={}, type={}",
            event_id.as_deref().unwrap_or("unknown"),
            event_type
        );

        let mut warnings = Vec::new();

        // Skip provider lookups for a known redelivery
        if let Some(id) = event_id.as_deref() {
            match self.event_repo.is_recorded(BILLING_PROVIDER, id).await {
                Ok(true) => {
                    tracing::info!(
                        "Webhook already processed (duplicate): event_id={}, type={}",
                        id,
                        event_type
                    );
                    return Ok(ReconcileOutcome {
                        event_id,
                        event_type,
                        transition: Transition::Duplicate,
                        warnings,
                    });
                }
                Ok(false) => {}
                Err(e) => tracing::debug!("Event log lookup failed, continuing: {}", e),
            }
        }

        let (change, no_effect) = match self.plan(parsed.event, &mut warnings).await {
            Planned::Apply(change) => (change, None),
            Planned::NoEffect(transition) => (AccountChange::RecordOnly, Some(transition)),
        };

        let log_entry = event_id.as_ref().map(|id| NewBillingEvent {
            provider: BILLING_PROVIDER.to_string(),
            event_id: id.clone(),
            event_type: event_type.clone(),
            payload: parsed.payload.clone(),
        });

        let transition = match self.event_repo.apply_event(log_entry.as_ref(), &change).await {
            Ok(AppliedChange::Duplicate) => {
                tracing::info!(
                    "Webhook applied concurrently elsewhere (duplicate): event_id={}",
                    event_id.as_deref().unwrap_or("unknown")
                );
                Transition::Duplicate
            }
            Ok(applied) => no_effect.unwrap_or_else(|| transition_for(&change, applied)),
            Err(e) => {
                warnings.push(ReconciliationWarning::MutationFailed(e.to_string()));
                Transition::Skipped
            }
        };

        for warning in &warnings {
            tracing::warn!(
                event_id = event_id.as_deref().unwrap_or("unknown"),
                event_type = %event_type,
                "Reconciliation warning: {}",
                warning
            );
        }

        Ok(ReconcileOutcome {
            event_id,
            event_type,
            transition,
            warnings,
        })
    }

    async fn create_checkout(
        &self,
        identity: &str,
        price_id: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<String, BillingError> {
        if !self.provider.is_configured() {
            return Err(BillingError::NotConfigured);
        }

        let identity = identity.trim();
        if identity.is_empty() {
            return Err(BillingError::Unauthenticated);
        }
        let price_id = price_id.trim();
        if price_id.is_empty() {
            return Err(BillingError::Validation("price_id is required".into()));
        }
        if success_url.trim().is_empty() || cancel_url.trim().is_empty() {
            return Err(BillingError::Validation(
                "success_url and cancel_url are required".into(),
            ));
        }

        let account = self
            .account_repo
            .ensure_account(identity, self.allotments.free)
            .await
            .map_err(|e| BillingError::Database(e.to_string()))?;

        let customer_ref = match account.billing_customer_ref {
            Some(customer_ref) => {
                tracing::debug!(
                    "Reusing billing customer: account_id={}, customer_id={}",
                    account.id,
                    customer_ref
                );
                customer_ref
            }
            None => {
                let customer_ref = self
                    .provider
                    .create_customer(identity)
                    .await
                    .map_err(|e| BillingError::Provider(e.to_string()))?;
                self.account_repo
                    .set_customer_ref(account.id, &customer_ref)
                    .await
                    .map_err(|e| BillingError::Database(e.to_string()))?;
                tracing::info!(
                    "Billing customer linked: account_id={}, customer_id={}",
                    account.id,
                    customer_ref
                );
                customer_ref
            }
        };

        let request = CheckoutRequest {
            identity: identity.to_string(),
            customer_ref,
            price_id: price_id.to_string(),
            success_url: success_url.to_string(),
            cancel_url: cancel_url.to_string(),
        };

        self.provider
            .create_checkout_session(&request)
            .await
            .map_err(|e| BillingError::Provider(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{sign_webhook_payload, InMemoryStore, MockBillingProvider};
    use crate::billing::StripeWebhookVerifier;
    use serde_json::json;

    const SECRET: &str = "whsec_test";

    fn service(store: &Arc<InMemoryStore>, provider: Arc<MockBillingProvider>) -> BillingServiceImpl {
        BillingServiceImpl::new(BillingServiceConfig {
            account_repo: store.clone(),
            event_repo: store.clone(),
            provider,
            verifier: Arc::new(StripeWebhookVerifier::new(SECRET.to_string())),
            allotments: PlanAllotments::default(),
        })
    }

    async fn deliver(
        service: &BillingServiceImpl,
        event: serde_json::Value,
    ) -> Result<ReconcileOutcome, BillingError> {
        let payload = event.to_string();
        let signature = sign_webhook_payload(&payload, SECRET);
        service.handle_webhook(payload.as_bytes(), &signature).await
    }

    fn checkout_event(id: &str) -> serde_json::Value {
        json!({
            "id": id,
            "type": "checkout.session.completed",
            "data": { "object": {
                "metadata": { "identity": "u1" },
                "customer": "cus_1",
                "subscription": "sub_1"
            }}
        })
    }

    fn deleted_event(id: &str, subscription: &str) -> serde_json::Value {
        json!({
            "id": id,
            "type": "customer.subscription.deleted",
            "data": { "object": { "id": subscription } }
        })
    }

    #[tokio::test]
    async fn test_checkout_upgrades_identity() {
        let store = Arc::new(InMemoryStore::new());
        let provider = Arc::new(MockBillingProvider::new());
        let period_end = provider.period_end();
        let service = service(&store, provider);

        let outcome = deliver(&service, checkout_event("evt_1")).await.unwrap();

        assert!(matches!(outcome.transition, Transition::Upgraded { plan: Plan::Pro, .. }));
        assert!(outcome.warnings.is_empty());

        let account = store.account_by_identity("u1").await.unwrap();
        assert_eq!(account.plan, Plan::Pro);
        assert_eq!(account.credits, 200);
        assert_eq!(account.billing_customer_ref.as_deref(), Some("cus_1"));
        assert_eq!(account.billing_subscription_ref.as_deref(), Some("sub_1"));
        assert_eq!(account.period_end, Some(period_end));
    }

    #[tokio::test]
    async fn test_replayed_checkout_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store, Arc::new(MockBillingProvider::new()));

        deliver(&service, checkout_event("evt_1")).await.unwrap();
        let first = store.account_by_identity("u1").await.unwrap();

        let replay = deliver(&service, checkout_event("evt_1")).await.unwrap();
        assert_eq!(replay.transition, Transition::Duplicate);

        // Same content under a fresh event id still lands on the same absolute state
        deliver(&service, checkout_event("evt_2")).await.unwrap();
        let after = store.account_by_identity("u1").await.unwrap();

        assert_eq!(after.id, first.id);
        assert_eq!(after.plan, first.plan);
        assert_eq!(after.credits, first.credits);
        assert_eq!(after.billing_customer_ref, first.billing_customer_ref);
        assert_eq!(after.billing_subscription_ref, first.billing_subscription_ref);
        assert_eq!(store.account_count().await, 1);
    }

    #[tokio::test]
    async fn test_failed_apply_is_retried_on_redelivery() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store, Arc::new(MockBillingProvider::new()));
        store.fail_next_event_writes(1);

        let first = deliver(&service, checkout_event("evt_1")).await.unwrap();
        assert_eq!(first.transition, Transition::Skipped);
        assert!(matches!(
            first.warnings.as_slice(),
            [ReconciliationWarning::MutationFailed(_)]
        ));
        assert!(store.account_by_identity("u1").await.is_none());
        assert_eq!(store.event_count().await, 0);

        let redelivery = deliver(&service, checkout_event("evt_1")).await.unwrap();
        assert!(matches!(
            redelivery.transition,
            Transition::Upgraded { plan: Plan::Pro, .. }
        ));
        let account = store.account_by_identity("u1").await.unwrap();
        assert_eq!(account.plan, Plan::Pro);
        assert_eq!(account.credits, 200);
        assert_eq!(store.event_count().await, 1);

        let third = deliver(&service, checkout_event("evt_1")).await.unwrap();
        assert_eq!(third.transition, Transition::Duplicate);
    }

    #[tokio::test]
    async fn test_failed_cancellation_is_not_marked_processed() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store, Arc::new(MockBillingProvider::new()));
        deliver(&service, checkout_event("evt_1")).await.unwrap();
        store.fail_next_event_writes(1);

        let first = deliver(&service, deleted_event("evt_2", "sub_1")).await.unwrap();
        assert_eq!(first.transition, Transition::Skipped);
        assert_eq!(store.account_by_identity("u1").await.unwrap().plan, Plan::Pro);

        let redelivery = deliver(&service, deleted_event("evt_2", "sub_1")).await.unwrap();
        assert_eq!(redelivery.transition, Transition::Downgraded { accounts: 1 });
        assert_eq!(store.account_by_identity("u1").await.unwrap().plan, Plan::Free);
    }

    #[tokio::test]
    async fn test_checkout_replay_restores_spent_credits_to_allotment() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store, Arc::new(MockBillingProvider::new()));

        deliver(&service, checkout_event("evt_1")).await.unwrap();
        store.set_credits("u1", 150).await;
        deliver(&service, checkout_event("evt_2")).await.unwrap();

        assert_eq!(store.credits_of("u1").await, Some(200));
    }

    #[tokio::test]
    async fn test_checkout_without_identity_creates_unlinked_account() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store, Arc::new(MockBillingProvider::new()));

        let event = json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": { "customer": "cus_7", "subscription": "sub_7" } }
        });
        deliver(&service, event).await.unwrap();

        let account = store.account_by_identity("unlinked:cus_7").await.unwrap();
        assert_eq!(account.plan, Plan::Pro);
        assert_eq!(account.billing_customer_ref.as_deref(), Some("cus_7"));
    }

    #[tokio::test]
    async fn test_checkout_without_identity_resolves_known_customer() {
        let store = Arc::new(InMemoryStore::new());
        let account = store.seed_account("u1", Plan::Free, 2).await;
        store.set_customer_ref(account.id, "cus_1").await.unwrap();
        let service = service(&store, Arc::new(MockBillingProvider::new()));

        let event = json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": { "customer": "cus_1", "subscription": "sub_1" } }
        });
        deliver(&service, event).await.unwrap();

        let updated = store.account_by_identity("u1").await.unwrap();
        assert_eq!(updated.id, account.id);
        assert_eq!(updated.plan, Plan::Pro);
        assert_eq!(updated.billing_subscription_ref.as_deref(), Some("sub_1"));
        assert_eq!(store.account_count().await, 1);
    }

    #[tokio::test]
    async fn test_checkout_with_nothing_to_resolve_is_acknowledged() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store, Arc::new(MockBillingProvider::new()));

        let event = json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": {} }
        });
        let outcome = deliver(&service, event).await.unwrap();

        assert_eq!(outcome.transition, Transition::Skipped);
        assert_eq!(
            outcome.warnings,
            vec![ReconciliationWarning::MissingIdentityAndCustomer]
        );
        assert_eq!(store.account_count().await, 0);
    }

    #[tokio::test]
    async fn test_period_end_lookup_failure_still_applies() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store, Arc::new(MockBillingProvider::failing_lookups()));

        let outcome = deliver(&service, checkout_event("evt_1")).await.unwrap();

        assert!(matches!(outcome.transition, Transition::Upgraded { .. }));
        assert!(matches!(
            outcome.warnings.as_slice(),
            [ReconciliationWarning::PeriodEndLookupFailed { .. }]
        ));
        let account = store.account_by_identity("u1").await.unwrap();
        assert_eq!(account.plan, Plan::Pro);
        assert!(account.period_end.is_none());
    }

    #[tokio::test]
    async fn test_missing_optional_fields_keep_stored_values() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store, Arc::new(MockBillingProvider::new()));
        deliver(&service, checkout_event("evt_1")).await.unwrap();

        let event = json!({
            "id": "evt_2",
            "type": "checkout.session.completed",
            "data": { "object": { "metadata": { "identity": "u1" } } }
        });
        deliver(&service, event).await.unwrap();

        let account = store.account_by_identity("u1").await.unwrap();
        assert_eq!(account.billing_customer_ref.as_deref(), Some("cus_1"));
        assert_eq!(account.billing_subscription_ref.as_deref(), Some("sub_1"));
        assert!(account.period_end.is_some());
    }

    #[tokio::test]
    async fn test_subscription_deleted_downgrades_holders() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store, Arc::new(MockBillingProvider::new()));
        deliver(&service, checkout_event("evt_1")).await.unwrap();

        let outcome = deliver(&service, deleted_event("evt_2", "sub_1")).await.unwrap();

        assert_eq!(outcome.transition, Transition::Downgraded { accounts: 1 });
        let account = store.account_by_identity("u1").await.unwrap();
        assert_eq!(account.plan, Plan::Free);
        assert_eq!(account.credits, 5);
        assert!(account.billing_subscription_ref.is_none());
        assert_eq!(account.billing_customer_ref.as_deref(), Some("cus_1"));
    }

    #[tokio::test]
    async fn test_unknown_subscription_cancellation_is_noop() {
        let store = Arc::new(InMemoryStore::new());
        let account = store.seed_account("u1", Plan::Free, 3).await;
        let service = service(&store, Arc::new(MockBillingProvider::new()));

        let outcome = deliver(&service, deleted_event("evt_1", "sub_unknown"))
            .await
            .unwrap();

        assert_eq!(outcome.transition, Transition::Downgraded { accounts: 0 });
        assert!(outcome.warnings.is_empty());
        let unchanged = store.account_by_identity("u1").await.unwrap();
        assert_eq!(unchanged, account);
    }

    #[tokio::test]
    async fn test_renewal_invoice_resets_to_allotment() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store, Arc::new(MockBillingProvider::new()));
        deliver(&service, checkout_event("evt_1")).await.unwrap();
        store.set_credits("u1", 3).await;

        let renewal = json!({
            "id": "evt_2",
            "type": "invoice.payment_succeeded",
            "data": { "object": { "subscription": "sub_1", "billing_reason": "subscription_cycle" } }
        });
        let outcome = deliver(&service, renewal).await.unwrap();

        assert_eq!(outcome.transition, Transition::Renewed { accounts: 1 });
        assert_eq!(store.credits_of("u1").await, Some(200));
    }

    #[tokio::test]
    async fn test_first_invoice_is_ignored() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store, Arc::new(MockBillingProvider::new()));
        deliver(&service, checkout_event("evt_1")).await.unwrap();
        store.set_credits("u1", 3).await;

        let invoice = json!({
            "id": "evt_2",
            "type": "invoice.payment_succeeded",
            "data": { "object": { "subscription": "sub_1", "billing_reason": "subscription_create" } }
        });
        let outcome = deliver(&service, invoice).await.unwrap();

        assert_eq!(outcome.transition, Transition::Ignored);
        assert_eq!(store.credits_of("u1").await, Some(3));
    }

    #[tokio::test]
    async fn test_unhandled_event_type_acknowledged() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store, Arc::new(MockBillingProvider::new()));

        let outcome = deliver(&service, json!({ "id": "evt_1", "type": "customer.created" }))
            .await
            .unwrap();

        assert_eq!(outcome.transition, Transition::Ignored);
        assert_eq!(store.account_count().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_signature_touches_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store, Arc::new(MockBillingProvider::new()));

        let payload = checkout_event("evt_1").to_string();
        let signature = sign_webhook_payload(&payload, "whsec_wrong");
        let err = service
            .handle_webhook(payload.as_bytes(), &signature)
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::SignatureInvalid(_)));
        assert_eq!(store.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_unparsable_payload_rejected_before_store() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store, Arc::new(MockBillingProvider::new()));

        let payload = "{\"not\":\"an event\"}";
        let signature = sign_webhook_payload(payload, SECRET);
        let err = service
            .handle_webhook(payload.as_bytes(), &signature)
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::InvalidPayload(_)));
        assert_eq!(store.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_create_checkout_creates_and_reuses_customer() {
        let store = Arc::new(InMemoryStore::new());
        let provider = Arc::new(MockBillingProvider::new());
        let service = service(&store, provider.clone());

        let url = service
            .create_checkout("u1", "price_pro", "https://app/ok", "https://app/cancel")
            .await
            .unwrap();
        assert!(url.starts_with("https://checkout.test/"));

        service
            .create_checkout("u1", "price_pro", "https://app/ok", "https://app/cancel")
            .await
            .unwrap();

        assert_eq!(provider.customers_created(), 1);
        let account = store.account_by_identity("u1").await.unwrap();
        let requests = provider.checkout_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            account.billing_customer_ref.as_deref(),
            Some(requests[1].customer_ref.as_str())
        );
    }

    #[tokio::test]
    async fn test_create_checkout_requires_price() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store, Arc::new(MockBillingProvider::new()));

        let err = service
            .create_checkout("u1", " ", "https://app/ok", "https://app/cancel")
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_checkout_not_configured() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store, Arc::new(MockBillingProvider::unconfigured()));

        let err = service
            .create_checkout("u1", "price_pro", "https://app/ok", "https://app/cancel")
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::NotConfigured));
    }
}
