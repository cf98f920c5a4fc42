use std::sync::Arc;

use services::auth::SessionRepository;
use services::billing::BillingService;
use services::credits::CreditsService;
use services::entitlement::EntitlementGate;
use services::prompt::PromptService;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub entitlement_gate: Arc<dyn EntitlementGate>,
    pub credits_service: Arc<dyn CreditsService>,
    pub prompt_service: Arc<dyn PromptService>,
    pub billing_service: Arc<dyn BillingService>,
    pub session_repository: Arc<dyn SessionRepository>,
}
