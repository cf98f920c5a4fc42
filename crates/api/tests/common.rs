#![allow(dead_code)]

use api::{create_router, AppState};
use axum_test::{TestResponse, TestServer};
use serde_json::Value;
use services::account::PlanAllotments;
use services::billing::{BillingServiceConfig, BillingServiceImpl, StripeWebhookVerifier};
use services::credits::CreditsServiceImpl;
use services::entitlement::EntitlementGateImpl;
use services::prompt::PromptServiceImpl;
use services::test_helpers::{
    sign_webhook_payload, InMemoryStore, MockBillingProvider, MockTextTransformer,
};
use std::sync::Arc;

pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const WEBHOOK_PATH: &str = "/v1/billing/stripe/webhook";
pub const IMPROVED_TEXT: &str = "You are an expert editor. Rewrite the following text clearly.";

/// Test server plus handles on every double behind it
pub struct TestContext {
    pub server: TestServer,
    pub store: Arc<InMemoryStore>,
    pub transformer: Arc<MockTextTransformer>,
    pub provider: Arc<MockBillingProvider>,
}

/// Configuration for the test server's collaborators
pub struct TestServerConfig {
    pub transformer: MockTextTransformer,
    pub provider: MockBillingProvider,
    pub webhook_secret: String,
}

impl Default for TestServerConfig {
    fn default() -> Self {
        Self {
            transformer: MockTextTransformer::replying(IMPROVED_TEXT),
            provider: MockBillingProvider::new(),
            webhook_secret: TEST_WEBHOOK_SECRET.to_string(),
        }
    }
}

/// Create a test server with default doubles
pub fn create_test_server() -> TestContext {
    create_test_server_with_config(TestServerConfig::default())
}

/// Create a test server wired exactly like `main`, minus Postgres and the network
pub fn create_test_server_with_config(test_config: TestServerConfig) -> TestContext {
    let store = Arc::new(InMemoryStore::new());
    let transformer = Arc::new(test_config.transformer);
    let provider = Arc::new(test_config.provider);
    let allotments = PlanAllotments::default();

    let entitlement_gate = Arc::new(EntitlementGateImpl::new(store.clone(), allotments));
    let credits_service = Arc::new(CreditsServiceImpl::new(store.clone()));
    let prompt_service = Arc::new(PromptServiceImpl::new(
        entitlement_gate.clone(),
        credits_service.clone(),
        transformer.clone(),
    ));
    let billing_service = Arc::new(BillingServiceImpl::new(BillingServiceConfig {
        account_repo: store.clone(),
        event_repo: store.clone(),
        provider: provider.clone(),
        verifier: Arc::new(StripeWebhookVerifier::new(test_config.webhook_secret)),
        allotments,
    }));

    let app_state = AppState {
        entitlement_gate,
        credits_service,
        prompt_service,
        billing_service,
        session_repository: store.clone(),
    };

    let cors = config::CorsConfig {
        exact_matches: vec!["http://localhost:3000".to_string()],
        wildcard_suffixes: vec![],
    };
    let server =
        TestServer::new(create_router(app_state, cors)).expect("Failed to create test server");

    TestContext {
        server,
        store,
        transformer,
        provider,
    }
}

/// Issue a session for `identity` and return its bearer token
pub async fn login(ctx: &TestContext, identity: &str) -> String {
    ctx.store
        .create_session(identity)
        .await
        .expect("Failed to create session")
        .token
        .expect("New sessions carry their token")
}

fn auth_header(token: &str) -> (http::HeaderName, http::HeaderValue) {
    (
        http::HeaderName::from_static("authorization"),
        http::HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    )
}

pub async fn get_authed(ctx: &TestContext, path: &str, token: &str) -> TestResponse {
    let (name, value) = auth_header(token);
    ctx.server.get(path).add_header(name, value).await
}

pub async fn post_authed(
    ctx: &TestContext,
    path: &str,
    token: &str,
    body: &Value,
) -> TestResponse {
    let (name, value) = auth_header(token);
    ctx.server.post(path).add_header(name, value).json(body).await
}

/// Post a webhook payload signed with the test secret
pub async fn post_signed_webhook(ctx: &TestContext, payload: &Value) -> TestResponse {
    let body = payload.to_string();
    let signature = sign_webhook_payload(&body, TEST_WEBHOOK_SECRET);
    post_webhook(ctx, body, &signature).await
}

pub async fn post_webhook(ctx: &TestContext, body: String, signature: &str) -> TestResponse {
    ctx.server
        .post(WEBHOOK_PATH)
        .add_header(
            http::HeaderName::from_static("stripe-signature"),
            http::HeaderValue::from_str(signature).unwrap(),
        )
        .text(body)
        .await
}

pub fn checkout_completed_event(
    event_id: &str,
    identity: Option<&str>,
    customer: &str,
    subscription: &str,
) -> Value {
    let metadata = match identity {
        Some(identity) => serde_json::json!({ "identity": identity }),
        None => serde_json::json!({}),
    };
    serde_json::json!({
        "id": event_id,
        "object": "event",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_test_1",
                "object": "checkout.session",
                "mode": "subscription",
                "customer": customer,
                "subscription": subscription,
                "metadata": metadata
            }
        }
    })
}

pub fn subscription_deleted_event(event_id: &str, subscription: &str) -> Value {
    serde_json::json!({
        "id": event_id,
        "object": "event",
        "type": "customer.subscription.deleted",
        "data": {
            "object": {
                "id": subscription,
                "object": "subscription",
                "status": "canceled"
            }
        }
    })
}

pub fn invoice_payment_succeeded_event(
    event_id: &str,
    subscription: &str,
    billing_reason: &str,
) -> Value {
    serde_json::json!({
        "id": event_id,
        "object": "event",
        "type": "invoice.payment_succeeded",
        "data": {
            "object": {
                "id": "in_test_1",
                "object": "invoice",
                "subscription": subscription,
                "billing_reason": billing_reason
            }
        }
    })
}
