use crate::{error::ApiError, middleware::AuthenticatedUser, state::AppState};
use axum::{extract::State, routing::post, Extension, Json, Router};
use serde::{Deserialize, Serialize};
use services::prompt::{ImprovedPrompt, PromptAnalysis, PromptVariations};
use utoipa::ToSchema;

/// Request to improve a prompt
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ImprovePromptRequest {
    /// Prompt to improve (at least 10 characters)
    pub prompt: String,
    /// Optional background the improvement should take into account
    #[serde(default)]
    pub context: Option<String>,
}

/// Request to score a prompt
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AnalyzePromptRequest {
    pub prompt: String,
}

/// Request for alternative phrasings of a prompt
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PromptVariationsRequest {
    pub prompt: String,
    /// Number of variations, 1 to 10 (default 3)
    #[serde(default)]
    pub count: Option<u32>,
}

/// Improve a prompt
///
/// Metered: one credit is debited only after the improvement succeeds.
#[utoipa::path(
    post,
    path = "/v1/prompts/improve",
    tag = "Prompts",
    request_body = ImprovePromptRequest,
    responses(
        (status = 200, description = "Improved prompt", body = ImprovedPrompt),
        (status = 400, description = "Invalid prompt", body = crate::error::ApiErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiErrorResponse),
        (status = 402, description = "No credits left", body = crate::error::ApiErrorResponse),
        (status = 500, description = "Transformation failed", body = crate::error::ApiErrorResponse)
    ),
    security(
        ("session_token" = [])
    )
)]
pub async fn improve_prompt(
    State(app_state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<ImprovePromptRequest>,
) -> Result<Json<ImprovedPrompt>, ApiError> {
    tracing::info!("Improving prompt for identity={}", user.identity);

    let improved = app_state
        .prompt_service
        .improve(&user.identity, &req.prompt, req.context.as_deref())
        .await?;

    Ok(Json(improved))
}

/// Analyze a prompt
///
/// Scores clarity, specificity and context completeness. Not metered.
#[utoipa::path(
    post,
    path = "/v1/prompts/analyze",
    tag = "Prompts",
    request_body = AnalyzePromptRequest,
    responses(
        (status = 200, description = "Prompt analysis", body = PromptAnalysis),
        (status = 400, description = "Invalid prompt", body = crate::error::ApiErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiErrorResponse),
        (status = 500, description = "Transformation failed", body = crate::error::ApiErrorResponse)
    ),
    security(
        ("session_token" = [])
    )
)]
pub async fn analyze_prompt(
    State(app_state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<AnalyzePromptRequest>,
) -> Result<Json<PromptAnalysis>, ApiError> {
    tracing::debug!("Analyzing prompt for identity={}", user.identity);

    let analysis = app_state.prompt_service.analyze(&req.prompt).await?;
    Ok(Json(analysis))
}

/// Generate prompt variations. Not metered.
#[utoipa::path(
    post,
    path = "/v1/prompts/variations",
    tag = "Prompts",
    request_body = PromptVariationsRequest,
    responses(
        (status = 200, description = "Prompt variations", body = PromptVariations),
        (status = 400, description = "Invalid prompt or count", body = crate::error::ApiErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiErrorResponse),
        (status = 500, description = "Transformation failed", body = crate::error::ApiErrorResponse)
    ),
    security(
        ("session_token" = [])
    )
)]
pub async fn prompt_variations(
    State(app_state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<PromptVariationsRequest>,
) -> Result<Json<PromptVariations>, ApiError> {
    tracing::debug!(
        "Generating prompt variations for identity={}, count={:?}",
        user.identity,
        req.count
    );

    let variations = app_state
        .prompt_service
        .variations(&req.prompt, req.count)
        .await?;
    Ok(Json(variations))
}

pub fn create_prompts_router() -> Router<AppState> {
    Router::new()
        .route("/v1/prompts/improve", post(improve_prompt))
        .route("/v1/prompts/analyze", post(analyze_prompt))
        .route("/v1/prompts/variations", post(prompt_variations))
}
