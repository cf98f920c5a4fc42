use async_trait::async_trait;
use std::sync::Arc;

use super::ports::{Entitlement, EntitlementError, EntitlementGate};
use crate::account::{AccountRepository, PlanAllotments};

pub struct EntitlementGateImpl {
    account_repo: Arc<dyn AccountRepository>,
    allotments: PlanAllotments,
}

impl EntitlementGateImpl {
    pub fn new(account_repo: Arc<dyn AccountRepository>, allotments: PlanAllotments) -> Self {
        Self {
            account_repo,
            allotments,
        }
    }
}

#[async_trait]
impl EntitlementGate for EntitlementGateImpl {
    async fn check_entitlement(&self, identity: &str) -> Result<Entitlement, EntitlementError> {
        let identity = identity.trim();
        if identity.is_empty() {
            return Err(EntitlementError::Unauthenticated);
        }

        let account = self
            .account_repo
            .ensure_account(identity, self.allotments.free)
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, "Failed to resolve account for entitlement check");
                EntitlementError::Database(e.to_string())
            })?;

        let allowed = account.credits >= 1;
        tracing::debug!(
            "Entitlement checked: account_id={}, plan={}, credits={}, allowed={}",
            account.id,
            account.plan,
            account.credits,
            allowed
        );

        Ok(Entitlement { allowed, account })
    }
}
