pub mod ports;

pub use ports::{Account, AccountRepository, Plan, PlanAllotments, PlanAssignment};
