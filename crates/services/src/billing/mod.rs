pub mod events;
pub mod ports;
pub mod service;
pub mod stripe;

pub use events::{parse_event, BillingEvent, ParsedEvent};
pub use ports::{
    AccountChange, AppliedChange, BillingError, BillingEventRepository, BillingProvider,
    BillingService, CheckoutRequest, NewBillingEvent, ReconcileOutcome, ReconciliationWarning,
    StoredBillingEvent, Transition, WebhookVerifier,
};
pub use service::{BillingServiceConfig, BillingServiceImpl, BILLING_PROVIDER};
pub use stripe::{StripeBillingProvider, StripeWebhookVerifier};
