use api::{create_router, ApiDoc, AppState};
use services::{
    account::PlanAllotments,
    billing::{
        BillingServiceConfig, BillingServiceImpl, StripeBillingProvider, StripeWebhookVerifier,
    },
    credits::CreditsServiceImpl,
    entitlement::EntitlementGateImpl,
    prompt::{
        openai::DEFAULT_OPENAI_BASE_URL, OpenAiTransformer, OpenAiTransformerConfig,
        PromptServiceImpl,
    },
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

fn init_tracing(logging: &config::LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.filter_directives()));
    let registry = tracing_subscriber::registry().with(filter);

    if logging.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Warning: Could not load .env file: {}", e);
        eprintln!("Continuing with environment variables...");
    }

    let config = config::Config::from_env();
    init_tracing(&config.logging);

    tracing::info!("Starting API server...");
    tracing::info!(
        "Database: {}:{}/{}",
        config.database.host.as_deref().unwrap_or("localhost"),
        config.database.port,
        config.database.database
    );
    tracing::info!("Server: {}:{}", config.server.host, config.server.port);

    // Create database and run migrations
    tracing::info!("Connecting to database...");
    let db = database::Database::from_config(&config.database).await?;

    tracing::info!("Running migrations...");
    db.run_migrations().await?;

    let account_repo = db.account_repository();
    let ledger_repo = db.credit_ledger_repository();
    let event_repo = db.billing_event_repository();
    let session_repo = db.session_repository();

    tracing::info!("Initializing services...");
    let allotments = PlanAllotments {
        free: config.credits.free_allotment,
        pro: config.credits.pro_allotment,
        enterprise: config.credits.enterprise_allotment,
    };

    let entitlement_gate = Arc::new(EntitlementGateImpl::new(account_repo.clone(), allotments));
    let credits_service = Arc::new(CreditsServiceImpl::new(ledger_repo));

    if config.openai.api_key.is_empty() {
        tracing::warn!("OPENAI_API_KEY is not set; prompt endpoints will fail upstream");
    }
    let transformer = Arc::new(OpenAiTransformer::new(OpenAiTransformerConfig {
        api_key: config.openai.api_key.clone(),
        base_url: config
            .openai
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
        model: config.openai.model.clone(),
        max_tokens: config.openai.max_tokens,
        timeout: Duration::from_secs(config.openai.timeout_secs),
    }));
    let prompt_service = Arc::new(PromptServiceImpl::new(
        entitlement_gate.clone(),
        credits_service.clone(),
        transformer,
    ));

    if !config.stripe.is_configured() {
        tracing::warn!("Stripe is not configured; checkout and webhooks will return 503");
    }
    let billing_service = Arc::new(BillingServiceImpl::new(BillingServiceConfig {
        account_repo,
        event_repo,
        provider: Arc::new(StripeBillingProvider::new(config.stripe.secret_key.clone())),
        verifier: Arc::new(StripeWebhookVerifier::new(
            config.stripe.webhook_secret.clone(),
        )),
        allotments,
    }));

    let app_state = AppState {
        entitlement_gate,
        credits_service,
        prompt_service,
        billing_service,
        session_repository: session_repo,
    };

    let app = create_router(app_state, config.cors.clone())
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/docs", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
