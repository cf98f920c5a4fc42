use crate::pool::DbPool;
use crate::repositories::account_repository;
use async_trait::async_trait;
use services::billing::{AccountChange, AppliedChange, BillingEventRepository, NewBillingEvent};
use services::BillingEventId;

pub struct PostgresBillingEventRepository {
    pool: DbPool,
}

impl PostgresBillingEventRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BillingEventRepository for PostgresBillingEventRepository {
    async fn is_recorded(&self, provider: &str, event_id: &str) -> anyhow::Result<bool> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT 1 FROM billing_events WHERE provider = $1 AND event_id = $2",
                &[&provider, &event_id],
            )
            .await?;
        Ok(row.is_some())
    }

    async fn apply_event(
        &self,
        event: Option<&NewBillingEvent>,
        change: &AccountChange,
    ) -> anyhow::Result<AppliedChange> {
        let mut client = self.pool.get().await?;
        let txn = client.transaction().await?;

        if let Some(event) = event {
            tracing::info!(
                "Repository: Recording billing event - provider={}, event_id={}",
                event.provider,
                event.event_id
            );

            // A concurrent delivery of the same id blocks here until the first commits
            let inserted = txn
                .query_opt(
                    "INSERT INTO billing_events (id, provider, event_id, event_type, payload)
                     VALUES ($1, $2, $3, $4, $5)
                     ON CONFLICT (provider, event_id) DO NOTHING
                     RETURNING id",
                    &[
                        &BillingEventId::new(),
                        &event.provider,
                        &event.event_id,
                        &event.event_type,
                        &event.payload,
                    ],
                )
                .await?;

            if inserted.is_none() {
                txn.rollback().await?;
                tracing::debug!(
                    "Repository: Billing event already recorded - provider={}, event_id={}",
                    event.provider,
                    event.event_id
                );
                return Ok(AppliedChange::Duplicate);
            }
        }

        // Any error below drops the transaction, which rolls back the event row too
        let applied = match change {
            AccountChange::AssignByIdentity {
                identity,
                assignment,
            } => AppliedChange::Account(
                account_repository::assign_plan_by_identity(&txn, identity, assignment).await?,
            ),
            AccountChange::AssignByCustomerRef {
                customer_ref,
                placeholder_identity,
                assignment,
            } => AppliedChange::Account(
                account_repository::assign_plan_by_customer_ref(
                    &txn,
                    customer_ref,
                    placeholder_identity,
                    assignment,
                )
                .await?,
            ),
            AccountChange::DowngradeBySubscription {
                subscription_ref,
                plan,
                credits,
            } => AppliedChange::Accounts(
                account_repository::downgrade_by_subscription_ref(
                    &txn,
                    subscription_ref,
                    *plan,
                    *credits,
                )
                .await?,
            ),
            AccountChange::RenewBySubscription {
                subscription_ref,
                allotments,
                period_end,
            } => AppliedChange::Accounts(
                account_repository::renew_by_subscription_ref(
                    &txn,
                    subscription_ref,
                    allotments,
                    *period_end,
                )
                .await?,
            ),
            AccountChange::RecordOnly => AppliedChange::Recorded,
        };

        txn.commit().await?;
        Ok(applied)
    }
}
