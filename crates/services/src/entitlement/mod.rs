pub mod ports;
pub mod service;

pub use ports::{Entitlement, EntitlementError, EntitlementGate};
pub use service::EntitlementGateImpl;
