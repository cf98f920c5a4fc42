use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stripe::{
    CheckoutSession, CheckoutSessionMode, Client, CreateCheckoutSession,
    CreateCheckoutSessionLineItems, CreateCustomer, Customer, CustomerId, Metadata,
    RequestStrategy, Subscription, SubscriptionId, Webhook, WebhookError,
};

use super::ports::{BillingError, BillingProvider, CheckoutRequest, WebhookVerifier};

/// Metadata key carrying the external identity on customers and checkout sessions
pub const IDENTITY_METADATA_KEY: &str = "identity";

fn identity_metadata(identity: &str) -> Metadata {
    [(IDENTITY_METADATA_KEY.to_string(), identity.to_string())]
        .into_iter()
        .collect()
}

/// Retries of the same checkout within this many seconds share one idempotency key
const CHECKOUT_IDEMPOTENCY_WINDOW_SECS: i64 = 3600;

fn checkout_time_window(at: DateTime<Utc>) -> i64 {
    at.timestamp() / CHECKOUT_IDEMPOTENCY_WINDOW_SECS
}

/// Idempotency key for checkout creation.
/// Format: SHA-256(identity:price_id:time_window).
fn checkout_idempotency_key(identity: &str, price_id: &str, time_window: i64) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(format!("{identity}:{price_id}:{time_window}").as_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct StripeBillingProvider {
    secret_key: String,
}

impl StripeBillingProvider {
    pub fn new(secret_key: String) -> Self {
        Self { secret_key }
    }

    fn client(&self) -> Client {
        Client::new(&self.secret_key)
    }
}

#[async_trait]
impl BillingProvider for StripeBillingProvider {
    fn is_configured(&self) -> bool {
        !self.secret_key.is_empty()
    }

    async fn subscription_period_end(
        &self,
        subscription_ref: &str,
    ) -> anyhow::Result<Option<DateTime<Utc>>> {
        let subscription_id: SubscriptionId = subscription_ref
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid subscription id: {subscription_ref}"))?;

        let subscription = Subscription::retrieve(&self.client(), &subscription_id, &[]).await?;

        tracing::debug!(
            "Fetched subscription period end: subscription_id={}, current_period_end={}",
            subscription_ref,
            subscription.current_period_end
        );

        Ok(DateTime::from_timestamp(subscription.current_period_end, 0))
    }

    async fn create_customer(&self, identity: &str) -> anyhow::Result<String> {
        tracing::info!("Creating Stripe customer");

        let customer = Customer::create(
            &self.client(),
            CreateCustomer {
                metadata: Some(identity_metadata(identity)),
                ..Default::default()
            },
        )
        .await?;

        Ok(customer.id.to_string())
    }

    async fn create_checkout_session(&self, request: &CheckoutRequest) -> anyhow::Result<String> {
        let idempotency_key = checkout_idempotency_key(
            &request.identity,
            &request.price_id,
            checkout_time_window(Utc::now()),
        );
        let client = self
            .client()
            .with_strategy(RequestStrategy::Idempotent(idempotency_key));

        let customer_id: CustomerId = request
            .customer_ref
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid customer id: {}", request.customer_ref))?;

        let mut params = CreateCheckoutSession::new();
        params.mode = Some(CheckoutSessionMode::Subscription);
        params.customer = Some(customer_id);
        params.client_reference_id = Some(&request.identity);
        params.success_url = Some(&request.success_url);
        params.cancel_url = Some(&request.cancel_url);
        params.metadata = Some(identity_metadata(&request.identity));
        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(request.price_id.clone()),
            quantity: Some(1),
            ..Default::default()
        }]);

        let session = CheckoutSession::create(&client, params).await?;

        tracing::info!(
            "Checkout session created: session_id={}, customer_id={}",
            session.id,
            request.customer_ref
        );

        session
            .url
            .ok_or_else(|| anyhow::anyhow!("No checkout URL returned"))
    }
}

/// Verifies the `Stripe-Signature` header against the endpoint secret
pub struct StripeWebhookVerifier {
    webhook_secret: String,
}

impl StripeWebhookVerifier {
    pub fn new(webhook_secret: String) -> Self {
        Self { webhook_secret }
    }
}

impl WebhookVerifier for StripeWebhookVerifier {
    fn verify(&self, payload: &str, signature: &str) -> Result<(), BillingError> {
        if self.webhook_secret.is_empty() {
            return Err(BillingError::NotConfigured);
        }

        // construct_event verifies first, then parses into Stripe's own event model.
        // Only the verification half matters here.
        match Webhook::construct_event(payload, signature, &self.webhook_secret) {
            Ok(_) => Ok(()),
            Err(e) => match e {
                WebhookError::BadKey
                | WebhookError::BadSignature
                | WebhookError::BadTimestamp(_)
                | WebhookError::BadHeader(_) => {
                    tracing::error!("Webhook signature verification failed: error={}", e);
                    Err(BillingError::SignatureInvalid(e.to_string()))
                }
                WebhookError::BadParse(_) => {
                    tracing::debug!("Webhook event parsing failed (signature OK): error={}", e);
                    Ok(())
                }
            },
        }
    }
}
