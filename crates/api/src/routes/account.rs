use crate::{
    consts::DEFAULT_USAGE_PAGE_SIZE,
    error::ApiError,
    middleware::AuthenticatedUser,
    models::{AccountResponse, UsageListResponse},
    state::AppState,
};
use axum::{
    extract::{Query, State},
    routing::get,
    Extension, Json, Router,
};
use serde::Deserialize;
use services::credits::MAX_USAGE_PAGE_SIZE;

/// Query parameters for listing usage
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListUsageParams {
    /// Page size, 1 to 100
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    DEFAULT_USAGE_PAGE_SIZE
}

/// Get the caller's account
///
/// Creates the account with the free allotment on first access.
#[utoipa::path(
    get,
    path = "/v1/account",
    tag = "Account",
    responses(
        (status = 200, description = "Account and entitlement", body = AccountResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiErrorResponse),
        (status = 500, description = "Internal server error", body = crate::error::ApiErrorResponse)
    ),
    security(
        ("session_token" = [])
    )
)]
pub async fn get_account(
    State(app_state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<AccountResponse>, ApiError> {
    tracing::debug!("Getting account for identity={}", user.identity);

    let entitlement = app_state
        .entitlement_gate
        .check_entitlement(&user.identity)
        .await?;

    Ok(Json(entitlement.into()))
}

/// List the caller's completed improvements, newest first
#[utoipa::path(
    get,
    path = "/v1/usage",
    tag = "Account",
    params(ListUsageParams),
    responses(
        (status = 200, description = "Usage history", body = UsageListResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiErrorResponse),
        (status = 500, description = "Internal server error", body = crate::error::ApiErrorResponse)
    ),
    security(
        ("session_token" = [])
    )
)]
pub async fn list_usage(
    State(app_state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(params): Query<ListUsageParams>,
) -> Result<Json<UsageListResponse>, ApiError> {
    let entitlement = app_state
        .entitlement_gate
        .check_entitlement(&user.identity)
        .await?;

    let limit = params.limit.clamp(1, MAX_USAGE_PAGE_SIZE);
    let offset = params.offset.max(0);

    let records = app_state
        .credits_service
        .list_usage(entitlement.account.id, limit, offset)
        .await?;

    Ok(Json(UsageListResponse {
        records: records.into_iter().map(Into::into).collect(),
        limit,
        offset,
    }))
}

pub fn create_account_router() -> Router<AppState> {
    Router::new()
        .route("/v1/account", get(get_account))
        .route("/v1/usage", get(list_usage))
}
