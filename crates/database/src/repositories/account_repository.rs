use crate::pool::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use services::account::{Account, AccountRepository, Plan, PlanAllotments, PlanAssignment};
use services::AccountId;
use tokio_postgres::{Row, Transaction};

const ACCOUNT_COLUMNS: &str = "id, identity, plan, credits, billing_customer_ref, \
     billing_subscription_ref, period_end, created_at, updated_at";

pub struct PostgresAccountRepository {
    pool: DbPool,
}

impl PostgresAccountRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn account_from_row(row: &Row) -> anyhow::Result<Account> {
    let plan: String = row.get("plan");
    Ok(Account {
        id: row.get("id"),
        identity: row.get("identity"),
        plan: plan.parse()?,
        credits: row.get("credits"),
        billing_customer_ref: row.get("billing_customer_ref"),
        billing_subscription_ref: row.get("billing_subscription_ref"),
        period_end: row.get("period_end"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl AccountRepository for PostgresAccountRepository {
    async fn ensure_account(
        &self,
        identity: &str,
        initial_credits: i64,
    ) -> anyhow::Result<Account> {
        let client = self.pool.get().await?;

        // Idempotent under concurrent first touches via UNIQUE(identity)
        let inserted = client
            .query_opt(
                &format!(
                    "INSERT INTO accounts (id, identity, plan, credits)
                     VALUES ($1, $2, 'free', $3)
                     ON CONFLICT (identity) DO NOTHING
                     RETURNING {ACCOUNT_COLUMNS}"
                ),
                &[&AccountId::new(), &identity, &initial_credits],
            )
            .await?;

        if let Some(row) = inserted {
            let account = account_from_row(&row)?;
            tracing::info!("Account created on first touch: account_id={}", account.id);
            return Ok(account);
        }

        let row = client
            .query_one(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE identity = $1"),
                &[&identity],
            )
            .await?;
        account_from_row(&row)
    }

    async fn set_customer_ref(
        &self,
        account_id: AccountId,
        customer_ref: &str,
    ) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE accounts SET billing_customer_ref = $2, updated_at = NOW() WHERE id = $1",
                &[&account_id, &customer_ref],
            )
            .await?;
        if updated == 0 {
            anyhow::bail!("Account not found: {account_id}");
        }
        Ok(())
    }
}

/// Account writes driven by billing events. They run inside the event-log
/// transaction so the change and its event id commit together.
pub(crate) async fn assign_plan_by_identity(
    txn: &Transaction<'_>,
    identity: &str,
    assignment: &PlanAssignment,
) -> anyhow::Result<Account> {
    tracing::debug!(
        "Assigning plan by identity: plan={}, credits={}",
        assignment.plan,
        assignment.credits
    );
    let row = txn
        .query_one(
            &format!(
                "INSERT INTO accounts (id, identity, plan, credits, billing_customer_ref,
                                       billing_subscription_ref, period_end)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (identity) DO UPDATE SET
                    plan = EXCLUDED.plan,
                    credits = EXCLUDED.credits,
                    billing_customer_ref = COALESCE(EXCLUDED.billing_customer_ref, accounts.billing_customer_ref),
                    billing_subscription_ref = COALESCE(EXCLUDED.billing_subscription_ref, accounts.billing_subscription_ref),
                    period_end = COALESCE(EXCLUDED.period_end, accounts.period_end),
                    updated_at = NOW()
                 RETURNING {ACCOUNT_COLUMNS}"
            ),
            &[
                &AccountId::new(),
                &identity,
                &assignment.plan.as_str(),
                &assignment.credits,
                &assignment.customer_ref,
                &assignment.subscription_ref,
                &assignment.period_end,
            ],
        )
        .await?;

    account_from_row(&row)
}

pub(crate) async fn assign_plan_by_customer_ref(
    txn: &Transaction<'_>,
    customer_ref: &str,
    placeholder_identity: &str,
    assignment: &PlanAssignment,
) -> anyhow::Result<Account> {
    tracing::debug!(
        "Assigning plan by customer: customer_id={}, plan={}",
        customer_ref,
        assignment.plan
    );
    let row = txn
        .query_one(
            &format!(
                "INSERT INTO accounts (id, identity, plan, credits, billing_customer_ref,
                                       billing_subscription_ref, period_end)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (billing_customer_ref) DO UPDATE SET
                    plan = EXCLUDED.plan,
                    credits = EXCLUDED.credits,
                    billing_subscription_ref = COALESCE(EXCLUDED.billing_subscription_ref, accounts.billing_subscription_ref),
                    period_end = COALESCE(EXCLUDED.period_end, accounts.period_end),
                    updated_at = NOW()
                 RETURNING {ACCOUNT_COLUMNS}"
            ),
            &[
                &AccountId::new(),
                &placeholder_identity,
                &assignment.plan.as_str(),
                &assignment.credits,
                &customer_ref,
                &assignment.subscription_ref,
                &assignment.period_end,
            ],
        )
        .await?;

    account_from_row(&row)
}

pub(crate) async fn downgrade_by_subscription_ref(
    txn: &Transaction<'_>,
    subscription_ref: &str,
    plan: Plan,
    credits: i64,
) -> anyhow::Result<u64> {
    let updated = txn
        .execute(
            "UPDATE accounts
             SET plan = $2, credits = $3, billing_subscription_ref = NULL, updated_at = NOW()
             WHERE billing_subscription_ref = $1",
            &[&subscription_ref, &plan.as_str(), &credits],
        )
        .await?;
    Ok(updated)
}

pub(crate) async fn renew_by_subscription_ref(
    txn: &Transaction<'_>,
    subscription_ref: &str,
    allotments: &PlanAllotments,
    period_end: Option<DateTime<Utc>>,
) -> anyhow::Result<u64> {
    let updated = txn
        .execute(
            "UPDATE accounts
             SET credits = CASE plan
                    WHEN 'free' THEN $2
                    WHEN 'pro' THEN $3
                    ELSE $4
                 END,
                 period_end = COALESCE($5, period_end),
                 updated_at = NOW()
             WHERE billing_subscription_ref = $1",
            &[
                &subscription_ref,
                &allotments.free,
                &allotments.pro,
                &allotments.enterprise,
                &period_end,
            ],
        )
        .await?;
    Ok(updated)
}
