pub mod account;
pub mod billing;
pub mod prompts;

use axum::{middleware::from_fn_with_state, routing::get, Json, Router};
use http::HeaderValue;
use serde::Serialize;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use utoipa::ToSchema;

use crate::{consts::MAX_REQUEST_BODY_SIZE, middleware::AuthState, state::AppState};

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,
    /// API version
    pub version: &'static str,
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn is_origin_allowed(origin_str: &str, cors_config: &config::CorsConfig) -> bool {
    if cors_config.exact_matches.iter().any(|o| o == origin_str) {
        return true;
    }

    for local in ["http://localhost", "http://127.0.0.1"] {
        if let Some(remainder) = origin_str.strip_prefix(local) {
            if remainder.is_empty() || remainder.starts_with(':') {
                return true;
            }
        }
    }

    origin_str.starts_with("https://")
        && cors_config
            .wildcard_suffixes
            .iter()
            .any(|suffix| origin_str.ends_with(suffix))
}

/// Create the main API router with CORS configuration
pub fn create_router(app_state: AppState, cors_config: config::CorsConfig) -> Router {
    let auth_state = AuthState {
        session_repository: app_state.session_repository.clone(),
    };

    // Session-authenticated routes
    let protected_routes = Router::new()
        .merge(account::create_account_router())
        .merge(prompts::create_prompts_router())
        .merge(billing::create_billing_router())
        .layer(from_fn_with_state(
            auth_state,
            crate::middleware::auth_middleware,
        ));

    let router = Router::new()
        .route("/health", get(health_check))
        .merge(billing::create_public_billing_router()) // Stripe signature is the auth
        .merge(protected_routes)
        .with_state(app_state);

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _request_parts: &http::request::Parts| {
                origin
                    .to_str()
                    .map(|s| is_origin_allowed(s, &cors_config))
                    .unwrap_or(false)
            },
        ))
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    router
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_SIZE))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
