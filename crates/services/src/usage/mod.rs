pub mod ports;

pub use ports::{NewUsageRecord, UsageRecord, UsageValidationError};
