use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::OpenApi;

/// OpenAPI documentation configuration
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Prompt Improver API",
        description = "Metered prompt improvement with a credit ledger and Stripe billing.",
        version = "1.0.0",
        license(name = "MIT",)
    ),
    paths(
        crate::routes::health_check,
        // Account endpoints
        crate::routes::account::get_account,
        crate::routes::account::list_usage,
        // Prompt endpoints
        crate::routes::prompts::improve_prompt,
        crate::routes::prompts::analyze_prompt,
        crate::routes::prompts::prompt_variations,
        // Billing endpoints
        crate::routes::billing::create_checkout,
        crate::routes::billing::handle_stripe_webhook,
    ),
    components(schemas(
        crate::error::ApiErrorResponse,
        crate::routes::HealthResponse,
        crate::models::AccountResponse,
        crate::models::UsageRecordResponse,
        crate::models::UsageListResponse,
        crate::routes::prompts::ImprovePromptRequest,
        crate::routes::prompts::AnalyzePromptRequest,
        crate::routes::prompts::PromptVariationsRequest,
        crate::routes::billing::CreateCheckoutRequest,
        crate::routes::billing::CreateCheckoutResponse,
        crate::routes::billing::WebhookAck,
        services::account::Plan,
        services::prompt::ImprovedPrompt,
        services::prompt::PromptAnalysis,
        services::prompt::PromptVariations,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Service liveness"),
        (name = "Account", description = "Plan, credit balance and usage history"),
        (name = "Prompts", description = "Prompt improvement, analysis and variations"),
        (name = "Billing", description = "Stripe checkout and webhook reconciliation")
    )
)]
pub struct ApiDoc;

/// Security scheme addon for Bearer token authentication
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "session_token",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("session_token")
                        .description(Some("Session token issued by the identity provider"))
                        .build(),
                ),
            )
        }
    }
}
