mod common;

use common::{
    checkout_completed_event, create_test_server, create_test_server_with_config, get_authed,
    invoice_payment_succeeded_event, login, post_authed, post_signed_webhook, post_webhook,
    subscription_deleted_event, TestServerConfig, TEST_WEBHOOK_SECRET,
};
use serde_json::json;
use services::test_helpers::{sign_webhook_payload, MockBillingProvider};

const PROMPT: &str = "write a blog post about rust ownership";

async fn account_json(ctx: &common::TestContext, token: &str) -> serde_json::Value {
    let response = get_authed(ctx, "/v1/account", token).await;
    assert_eq!(response.status_code(), 200);
    response.json()
}

#[tokio::test]
async fn test_checkout_event_upgrades_to_pro() {
    let ctx = create_test_server();
    let token = login(&ctx, "u1").await;

    let before = account_json(&ctx, &token).await;
    assert_eq!(before["plan"], "free");
    assert_eq!(before["credits"], 5);

    let response = post_signed_webhook(
        &ctx,
        &checkout_completed_event("evt_checkout_1", Some("u1"), "cus_1", "sub_1"),
    )
    .await;
    assert_eq!(response.status_code(), 200);
    let ack: serde_json::Value = response.json();
    assert_eq!(ack, json!({ "received": true }));

    let after = account_json(&ctx, &token).await;
    assert_eq!(after["id"], before["id"]);
    assert_eq!(after["plan"], "pro");
    assert_eq!(after["credits"], 200);
    assert_eq!(after["billing_customer_ref"], "cus_1");
    assert_eq!(after["billing_subscription_ref"], "sub_1");
    assert!(after["period_end"].as_str().unwrap().starts_with("2030-01-01"));
}

#[tokio::test]
async fn test_redelivery_applies_checkout_after_failed_write() {
    let ctx = create_test_server();
    let token = login(&ctx, "u1").await;
    let event = checkout_completed_event("evt_checkout_1", Some("u1"), "cus_1", "sub_1");

    // Acknowledged even though the write failed
    ctx.store.fail_next_event_writes(1);
    assert_eq!(post_signed_webhook(&ctx, &event).await.status_code(), 200);
    assert_eq!(account_json(&ctx, &token).await["plan"], "free");
    assert_eq!(ctx.store.event_count().await, 0);

    assert_eq!(post_signed_webhook(&ctx, &event).await.status_code(), 200);
    let account = account_json(&ctx, &token).await;
    assert_eq!(account["plan"], "pro");
    assert_eq!(account["credits"], 200);
    assert_eq!(ctx.store.event_count().await, 1);
}

#[tokio::test]
async fn test_replayed_checkout_leaves_identical_state() {
    let ctx = create_test_server();
    let token = login(&ctx, "u1").await;
    let event = checkout_completed_event("evt_checkout_1", Some("u1"), "cus_1", "sub_1");

    assert_eq!(post_signed_webhook(&ctx, &event).await.status_code(), 200);
    let first = account_json(&ctx, &token).await;

    // Same delivery again is acknowledged and recorded once
    assert_eq!(post_signed_webhook(&ctx, &event).await.status_code(), 200);
    assert_eq!(ctx.store.event_count().await, 1);

    // A fresh event id with the same content assigns the same absolute values
    let redelivered = checkout_completed_event("evt_checkout_2", Some("u1"), "cus_1", "sub_1");
    assert_eq!(post_signed_webhook(&ctx, &redelivered).await.status_code(), 200);

    let second = account_json(&ctx, &token).await;
    for field in [
        "id",
        "plan",
        "credits",
        "billing_customer_ref",
        "billing_subscription_ref",
    ] {
        assert_eq!(first[field], second[field], "{field} changed on replay");
    }
    assert_eq!(ctx.store.account_count().await, 1);
}

#[tokio::test]
async fn test_checkout_before_first_login_creates_account() {
    let ctx = create_test_server();

    let response = post_signed_webhook(
        &ctx,
        &checkout_completed_event("evt_1", Some("u2"), "cus_2", "sub_2"),
    )
    .await;
    assert_eq!(response.status_code(), 200);

    let token = login(&ctx, "u2").await;
    let account = account_json(&ctx, &token).await;
    assert_eq!(account["plan"], "pro");
    assert_eq!(account["credits"], 200);
}

#[tokio::test]
async fn test_checkout_without_identity_resolves_by_customer() {
    let ctx = create_test_server();

    let response = post_signed_webhook(
        &ctx,
        &checkout_completed_event("evt_1", None, "cus_9", "sub_9"),
    )
    .await;
    assert_eq!(response.status_code(), 200);

    let account = ctx
        .store
        .account_by_identity("unlinked:cus_9")
        .await
        .expect("placeholder account should exist");
    assert_eq!(account.credits, 200);
    assert_eq!(account.billing_customer_ref.as_deref(), Some("cus_9"));
}

#[tokio::test]
async fn test_subscription_deleted_downgrades_to_free() {
    let ctx = create_test_server();
    let token = login(&ctx, "u1").await;

    post_signed_webhook(
        &ctx,
        &checkout_completed_event("evt_1", Some("u1"), "cus_1", "sub_1"),
    )
    .await;

    let response =
        post_signed_webhook(&ctx, &subscription_deleted_event("evt_2", "sub_1")).await;
    assert_eq!(response.status_code(), 200);

    let account = account_json(&ctx, &token).await;
    assert_eq!(account["plan"], "free");
    assert_eq!(account["credits"], 5);
    assert!(account["billing_subscription_ref"].is_null());
}

#[tokio::test]
async fn test_deleting_unknown_subscription_is_acknowledged() {
    let ctx = create_test_server();
    let token = login(&ctx, "u1").await;
    let before = account_json(&ctx, &token).await;

    let response =
        post_signed_webhook(&ctx, &subscription_deleted_event("evt_1", "sub_unknown")).await;
    assert_eq!(response.status_code(), 200);

    let after = account_json(&ctx, &token).await;
    assert_eq!(after["plan"], before["plan"]);
    assert_eq!(after["credits"], before["credits"]);
}

#[tokio::test]
async fn test_renewal_invoice_restores_allotment() {
    let ctx = create_test_server();
    let token = login(&ctx, "u1").await;

    post_signed_webhook(
        &ctx,
        &checkout_completed_event("evt_1", Some("u1"), "cus_1", "sub_1"),
    )
    .await;
    for _ in 0..3 {
        let response = post_authed(
            &ctx,
            "/v1/prompts/improve",
            &token,
            &json!({ "prompt": PROMPT }),
        )
        .await;
        assert_eq!(response.status_code(), 200);
    }
    assert_eq!(ctx.store.credits_of("u1").await, Some(197));

    // First invoice of a subscription is not a renewal
    post_signed_webhook(
        &ctx,
        &invoice_payment_succeeded_event("evt_2", "sub_1", "subscription_create"),
    )
    .await;
    assert_eq!(ctx.store.credits_of("u1").await, Some(197));

    let response = post_signed_webhook(
        &ctx,
        &invoice_payment_succeeded_event("evt_3", "sub_1", "subscription_cycle"),
    )
    .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(ctx.store.credits_of("u1").await, Some(200));
}

#[tokio::test]
async fn test_unhandled_event_type_is_acknowledged() {
    let ctx = create_test_server();

    let response = post_signed_webhook(
        &ctx,
        &json!({
            "id": "evt_other",
            "object": "event",
            "type": "customer.created",
            "data": { "object": { "id": "cus_1", "object": "customer" } }
        }),
    )
    .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(ctx.store.account_count().await, 0);
}

#[tokio::test]
async fn test_invalid_signature_is_rejected_without_mutation() {
    let ctx = create_test_server();
    let token = login(&ctx, "u1").await;
    account_json(&ctx, &token).await;
    let mutations_before = ctx.store.mutation_count();

    let event = checkout_completed_event("evt_1", Some("u1"), "cus_1", "sub_1").to_string();

    // Signed with the wrong secret
    let forged = sign_webhook_payload(&event, "whsec_someone_else");
    let response = post_webhook(&ctx, event.clone(), &forged).await;
    assert_eq!(response.status_code(), 400);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "signature_invalid");

    // Valid signature over a different payload
    let signed_other = sign_webhook_payload("{}", TEST_WEBHOOK_SECRET);
    let response = post_webhook(&ctx, event.clone(), &signed_other).await;
    assert_eq!(response.status_code(), 400);

    // Garbage header
    let response = post_webhook(&ctx, event, "not-a-signature").await;
    assert_eq!(response.status_code(), 400);

    assert_eq!(ctx.store.mutation_count(), mutations_before);
    assert_eq!(ctx.store.event_count().await, 0);
    let account = account_json(&ctx, &token).await;
    assert_eq!(account["plan"], "free");
}

#[tokio::test]
async fn test_missing_signature_header_is_rejected() {
    let ctx = create_test_server();

    let response = ctx
        .server
        .post(common::WEBHOOK_PATH)
        .text(checkout_completed_event("evt_1", Some("u1"), "cus_1", "sub_1").to_string())
        .await;
    assert_eq!(response.status_code(), 400);
    assert_eq!(ctx.store.mutation_count(), 0);
}

#[tokio::test]
async fn test_signed_but_unparsable_payload_is_rejected() {
    let ctx = create_test_server();

    let body = "this is not json".to_string();
    let signature = sign_webhook_payload(&body, TEST_WEBHOOK_SECRET);
    let response = post_webhook(&ctx, body, &signature).await;

    assert_eq!(response.status_code(), 400);
    assert_eq!(ctx.store.mutation_count(), 0);
}

#[tokio::test]
async fn test_webhook_without_secret_is_unavailable() {
    let ctx = create_test_server_with_config(TestServerConfig {
        webhook_secret: String::new(),
        ..Default::default()
    });

    let response = post_signed_webhook(
        &ctx,
        &checkout_completed_event("evt_1", Some("u1"), "cus_1", "sub_1"),
    )
    .await;
    assert_eq!(response.status_code(), 503);
    assert_eq!(ctx.store.mutation_count(), 0);
}

#[tokio::test]
async fn test_create_checkout_reuses_customer() {
    let ctx = create_test_server();
    let token = login(&ctx, "u1").await;
    let request = json!({
        "price_id": "price_pro_monthly",
        "success_url": "http://localhost:3000/?checkout=success",
        "cancel_url": "http://localhost:3000/?checkout=cancelled"
    });

    let response = post_authed(&ctx, "/v1/billing/checkout", &token, &request).await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["url"], "https://checkout.test/session/1");

    let response = post_authed(&ctx, "/v1/billing/checkout", &token, &request).await;
    assert_eq!(response.status_code(), 200);

    assert_eq!(ctx.provider.customers_created(), 1);
    let requests = ctx.provider.checkout_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].identity, "u1");
    assert_eq!(requests[0].customer_ref, "cus_mock_1");
    assert_eq!(requests[1].customer_ref, "cus_mock_1");
    assert_eq!(requests[0].price_id, "price_pro_monthly");

    let account = account_json(&ctx, &token).await;
    assert_eq!(account["billing_customer_ref"], "cus_mock_1");
    assert_eq!(account["plan"], "free");
}

#[tokio::test]
async fn test_create_checkout_accepts_camel_case_price() {
    let ctx = create_test_server();
    let token = login(&ctx, "u1").await;

    let response = post_authed(
        &ctx,
        "/v1/billing/checkout",
        &token,
        &json!({
            "priceId": "price_pro_monthly",
            "success_url": "https://app.example.com/done",
            "cancel_url": "https://app.example.com/cancel"
        }),
    )
    .await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn test_create_checkout_validation() {
    let ctx = create_test_server();
    let token = login(&ctx, "u1").await;

    let response = post_authed(
        &ctx,
        "/v1/billing/checkout",
        &token,
        &json!({
            "price_id": "  ",
            "success_url": "https://app.example.com/done",
            "cancel_url": "https://app.example.com/cancel"
        }),
    )
    .await;
    assert_eq!(response.status_code(), 400);

    let response = post_authed(
        &ctx,
        "/v1/billing/checkout",
        &token,
        &json!({
            "price_id": "price_pro_monthly",
            "success_url": "http://evil.example.com/done",
            "cancel_url": "https://app.example.com/cancel"
        }),
    )
    .await;
    assert_eq!(response.status_code(), 400);

    assert!(ctx.provider.checkout_requests().is_empty());
}

#[tokio::test]
async fn test_create_checkout_requires_configured_billing() {
    let ctx = create_test_server_with_config(TestServerConfig {
        provider: MockBillingProvider::unconfigured(),
        ..Default::default()
    });
    let token = login(&ctx, "u1").await;

    let response = post_authed(
        &ctx,
        "/v1/billing/checkout",
        &token,
        &json!({
            "price_id": "price_pro_monthly",
            "success_url": "https://app.example.com/done",
            "cancel_url": "https://app.example.com/cancel"
        }),
    )
    .await;
    assert_eq!(response.status_code(), 503);
}

#[tokio::test]
async fn test_checkout_requires_session() {
    let ctx = create_test_server();

    let response = ctx
        .server
        .post("/v1/billing/checkout")
        .json(&json!({
            "price_id": "price_pro_monthly",
            "success_url": "https://app.example.com/done",
            "cancel_url": "https://app.example.com/cancel"
        }))
        .await;
    assert_eq!(response.status_code(), 401);
}
