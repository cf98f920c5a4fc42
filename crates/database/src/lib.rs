pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, DbPool};
pub use repositories::{
    PostgresAccountRepository, PostgresBillingEventRepository, PostgresCreditLedgerRepository,
    PostgresSessionRepository,
};

use anyhow::Result;
use std::sync::Arc;

/// Database service combining all repositories
pub struct Database {
    pool: DbPool,
    account_repository: Arc<PostgresAccountRepository>,
    credit_ledger_repository: Arc<PostgresCreditLedgerRepository>,
    billing_event_repository: Arc<PostgresBillingEventRepository>,
    session_repository: Arc<PostgresSessionRepository>,
}

impl Database {
    /// Create a new database service from a connection pool
    pub fn new(pool: DbPool) -> Self {
        Self {
            account_repository: Arc::new(PostgresAccountRepository::new(pool.clone())),
            credit_ledger_repository: Arc::new(PostgresCreditLedgerRepository::new(pool.clone())),
            billing_event_repository: Arc::new(PostgresBillingEventRepository::new(pool.clone())),
            session_repository: Arc::new(PostgresSessionRepository::new(pool.clone())),
            pool,
        }
    }

    /// Create a new database service from configuration
    pub async fn from_config(config: &config::DatabaseConfig) -> Result<Self> {
        let pool = create_pool(config).await?;
        Ok(Self::new(pool))
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        migrations::run(&self.pool).await
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn account_repository(&self) -> Arc<PostgresAccountRepository> {
        self.account_repository.clone()
    }

    pub fn credit_ledger_repository(&self) -> Arc<PostgresCreditLedgerRepository> {
        self.credit_ledger_repository.clone()
    }

    pub fn billing_event_repository(&self) -> Arc<PostgresBillingEventRepository> {
        self.billing_event_repository.clone()
    }

    pub fn session_repository(&self) -> Arc<PostgresSessionRepository> {
        self.session_repository.clone()
    }
}
