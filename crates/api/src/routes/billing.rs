use crate::{error::ApiError, middleware::AuthenticatedUser, state::AppState};
use axum::{body::Bytes, extract::State, http::HeaderMap, routing::post, Extension, Json, Router};
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

/// Request to start a subscription checkout
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateCheckoutRequest {
    /// Stripe price to subscribe to
    #[serde(alias = "priceId")]
    pub price_id: String,
    /// URL to redirect after successful checkout
    pub success_url: String,
    /// URL to redirect after cancelled checkout
    pub cancel_url: String,
}

/// Response containing checkout URL
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateCheckoutResponse {
    pub url: String,
}

/// Acknowledgement returned for every verified webhook delivery
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
}

/// Validates that a redirect URL is https, or http on localhost/127.0.0.1 for development.
fn validate_redirect_url(url_str: &str, field_name: &str) -> Result<(), ApiError> {
    let url = Url::parse(url_str).map_err(|_| {
        ApiError::bad_request(format!(
            "Invalid {field_name}: must be a valid URL (e.g., https://example.com/success)"
        ))
    })?;
    match url.scheme() {
        "https" => Ok(()),
        "http" => {
            let host_ok = url
                .host_str()
                .map(|h| h == "localhost" || h == "127.0.0.1")
                .unwrap_or(false);
            if host_ok {
                Ok(())
            } else {
                Err(ApiError::bad_request(format!(
                    "Invalid {field_name}: URL must use https for non-localhost addresses"
                )))
            }
        }
        _ => Err(ApiError::bad_request(format!(
            "Invalid {field_name}: URL scheme must be https (or http for localhost/127.0.0.1 only)"
        ))),
    }
}

/// Create a subscription checkout session
#[utoipa::path(
    post,
    path = "/v1/billing/checkout",
    tag = "Billing",
    request_body = CreateCheckoutRequest,
    responses(
        (status = 200, description = "Checkout session created", body = CreateCheckoutResponse),
        (status = 400, description = "Invalid request", body = crate::error::ApiErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiErrorResponse),
        (status = 500, description = "Internal server error", body = crate::error::ApiErrorResponse),
        (status = 503, description = "Stripe not configured", body = crate::error::ApiErrorResponse)
    ),
    security(
        ("session_token" = [])
    )
)]
pub async fn create_checkout(
    State(app_state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<CreateCheckoutRequest>,
) -> Result<Json<CreateCheckoutResponse>, ApiError> {
    tracing::info!(
        "Creating checkout for identity={}, price_id={}",
        user.identity,
        req.price_id
    );

    if req.price_id.trim().is_empty() {
        return Err(ApiError::bad_request("Missing price_id"));
    }
    validate_redirect_url(&req.success_url, "success_url")?;
    validate_redirect_url(&req.cancel_url, "cancel_url")?;

    let url = app_state
        .billing_service
        .create_checkout(
            &user.identity,
            req.price_id.trim(),
            &req.success_url,
            &req.cancel_url,
        )
        .await?;

    Ok(Json(CreateCheckoutResponse { url }))
}

/// Handle Stripe webhook events (public endpoint - authenticated by signature)
#[utoipa::path(
    post,
    path = "/v1/billing/stripe/webhook",
    tag = "Billing",
    request_body(content = String, description = "Raw Stripe event payload"),
    params(
        ("Stripe-Signature" = String, Header, description = "Stripe webhook signature")
    ),
    responses(
        (status = 200, description = "Event acknowledged", body = WebhookAck),
        (status = 400, description = "Invalid signature or payload", body = crate::error::ApiErrorResponse),
        (status = 503, description = "Webhook secret not configured", body = crate::error::ApiErrorResponse)
    )
)]
pub async fn handle_stripe_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    tracing::info!("Received Stripe webhook");

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::bad_request("Missing Stripe-Signature header"))?;

    let outcome = app_state
        .billing_service
        .handle_webhook(&body, signature)
        .await?;

    tracing::info!(
        event_id = ?outcome.event_id,
        event_type = %outcome.event_type,
        transition = ?outcome.transition,
        warnings = outcome.warnings.len(),
        "Webhook processed"
    );

    Ok(Json(WebhookAck { received: true }))
}

pub fn create_billing_router() -> Router<AppState> {
    Router::new().route("/v1/billing/checkout", post(create_checkout))
}

/// Webhook route; no session auth
pub fn create_public_billing_router() -> Router<AppState> {
    Router::new().route("/v1/billing/stripe/webhook", post(handle_stripe_webhook))
}
