pub mod account_repository;
pub mod billing_event_repository;
pub mod credit_ledger_repository;
pub mod session_repository;

pub use account_repository::PostgresAccountRepository;
pub use billing_event_repository::PostgresBillingEventRepository;
pub use credit_ledger_repository::PostgresCreditLedgerRepository;
pub use session_repository::PostgresSessionRepository;
