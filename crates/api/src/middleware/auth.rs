use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use services::auth::{hash_session_token, SessionRepository, SESSION_TOKEN_PREFIX};
use services::SessionId;
use std::sync::Arc;

use crate::error::ApiError;

const SESSION_TOKEN_LEN: usize = 37;

/// Authenticated caller inserted into request extensions by the auth middleware.
/// Extract in route handlers using `Extension<AuthenticatedUser>`
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// Stable external identity the account is keyed by
    pub identity: String,
    pub session_id: SessionId,
}

/// State for authentication middleware
#[derive(Clone)]
pub struct AuthState {
    pub session_repository: Arc<dyn SessionRepository>,
}

/// Extract and validate token from Authorization header
fn extract_token_from_request(request: &Request) -> Result<String, ApiError> {
    let auth_value = request
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("No authorization header found");
            ApiError::missing_auth_header()
        })?;

    let token = auth_value.strip_prefix("Bearer ").ok_or_else(|| {
        tracing::warn!("Authorization header does not start with 'Bearer '");
        ApiError::invalid_auth_header()
    })?;

    if !token.starts_with(SESSION_TOKEN_PREFIX) {
        tracing::warn!("Invalid session token format: missing prefix");
        return Err(ApiError::invalid_token());
    }

    if token.len() != SESSION_TOKEN_LEN {
        tracing::warn!(
            "Invalid session token format: expected length {}, got {}",
            SESSION_TOKEN_LEN,
            token.len()
        );
        return Err(ApiError::invalid_token());
    }

    Ok(token.to_string())
}

/// Resolve a session token to the caller it belongs to
async fn authenticate_token(
    state: &AuthState,
    token: &str,
) -> Result<AuthenticatedUser, ApiError> {
    let token_hash = hash_session_token(token);
    let hash_prefix = token_hash.chars().take(16).collect::<String>();

    let session = state
        .session_repository
        .get_session_by_token_hash(&token_hash)
        .await
        .map_err(|e| {
            tracing::error!(
                "Failed to get session from repository for token_hash {}...: {}",
                hash_prefix,
                e
            );
            ApiError::internal_server_error("Failed to authenticate session")
        })?
        .ok_or_else(|| {
            tracing::warn!("Session not found for token_hash: {}...", hash_prefix);
            ApiError::session_not_found()
        })?;

    if session.expires_at < Utc::now() {
        tracing::warn!("Session expired: session_id={}", session.session_id);
        return Err(ApiError::session_expired());
    }

    if session.identity.trim().is_empty() {
        tracing::warn!(
            "Session carries no identity: session_id={}",
            session.session_id
        );
        return Err(ApiError::unauthorized("Missing identity"));
    }

    tracing::debug!(
        "Authenticated session: session_id={}, identity={}",
        session.session_id,
        session.identity
    );

    Ok(AuthenticatedUser {
        identity: session.identity,
        session_id: session.session_id,
    })
}

/// Authentication middleware that validates session tokens
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    let path = request.uri().path().to_string();
    let method = request.method().clone();

    tracing::debug!("Auth middleware invoked for {} {}", method, path);

    let token = extract_token_from_request(&request).map_err(|e| e.into_response())?;
    let user = authenticate_token(&state, &token)
        .await
        .map_err(|e| e.into_response())?;

    tracing::info!(
        "Authentication successful for identity={}, session_id={} on {} {}",
        user.identity,
        user.session_id,
        method,
        path
    );
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}
