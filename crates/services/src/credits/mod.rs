pub mod ports;
pub mod service;

pub use ports::{
    ConsumeError, ConsumeOutcome, CreditLedgerRepository, CreditsService, MAX_USAGE_PAGE_SIZE,
};
pub use service::CreditsServiceImpl;
