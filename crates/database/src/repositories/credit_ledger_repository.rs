use crate::pool::DbPool;
use async_trait::async_trait;
use chrono::Utc;
use services::credits::{ConsumeOutcome, CreditLedgerRepository};
use services::usage::{NewUsageRecord, UsageRecord};
use services::AccountId;

pub struct PostgresCreditLedgerRepository {
    pool: DbPool,
}

impl PostgresCreditLedgerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CreditLedgerRepository for PostgresCreditLedgerRepository {
    async fn consume_credit(
        &self,
        account_id: AccountId,
        usage: &NewUsageRecord,
    ) -> anyhow::Result<ConsumeOutcome> {
        let mut client = self.pool.get().await?;
        let txn = client.transaction().await?;

        // Row lock serializes concurrent debits; the guard keeps the balance non-negative
        let debited = txn
            .query_opt(
                "UPDATE accounts
                 SET credits = credits - 1, updated_at = NOW()
                 WHERE id = $1 AND credits >= 1
                 RETURNING credits",
                &[&account_id],
            )
            .await?;

        let Some(row) = debited else {
            let exists = txn
                .query_opt("SELECT 1 FROM accounts WHERE id = $1", &[&account_id])
                .await?
                .is_some();
            txn.rollback().await?;
            return Ok(if exists {
                ConsumeOutcome::InsufficientCredits
            } else {
                ConsumeOutcome::AccountNotFound
            });
        };
        let remaining_credits: i64 = row.get("credits");

        let record = usage.clone().into_record(account_id, Utc::now());
        txn.execute(
            "INSERT INTO usage_records (id, account_id, original_prompt, improved_prompt, model, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
            &[
                &record.id,
                &record.account_id,
                &record.original_prompt,
                &record.improved_prompt,
                &record.model,
                &record.created_at,
            ],
        )
        .await?;

        txn.commit().await?;

        tracing::debug!(
            "Ledger committed: account_id={}, usage_id={}, remaining_credits={}",
            account_id,
            record.id,
            remaining_credits
        );

        Ok(ConsumeOutcome::Consumed {
            record,
            remaining_credits,
        })
    }

    async fn list_usage(
        &self,
        account_id: AccountId,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<UsageRecord>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT id, account_id, original_prompt, improved_prompt, model, created_at
                 FROM usage_records
                 WHERE account_id = $1
                 ORDER BY created_at DESC, id DESC
                 LIMIT $2 OFFSET $3",
                &[&account_id, &limit, &offset],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| UsageRecord {
                id: row.get("id"),
                account_id: row.get("account_id"),
                original_prompt: row.get("original_prompt"),
                improved_prompt: row.get("improved_prompt"),
                model: row.get("model"),
                created_at: row.get("created_at"),
            })
            .collect())
    }
}
