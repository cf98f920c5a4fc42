pub mod account;
pub mod auth;
pub mod billing;
pub mod credits;
pub mod entitlement;
pub mod prompt;
pub mod test_helpers;
pub mod types;
pub mod usage;

pub use types::{AccountId, BillingEventId, SessionId, UsageRecordId};
