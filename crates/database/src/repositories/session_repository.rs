use crate::pool::DbPool;
use async_trait::async_trait;
use services::auth::{Session, SessionRepository};

pub struct PostgresSessionRepository {
    pool: DbPool,
}

impl PostgresSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PostgresSessionRepository {
    async fn get_session_by_token_hash(
        &self,
        token_hash: &str,
    ) -> anyhow::Result<Option<Session>> {
        tracing::debug!(
            "Looking up session by token_hash: {}...",
            &token_hash.chars().take(16).collect::<String>()
        );

        let client = self.pool.get().await?;

        let row = client
            .query_opt(
                "SELECT id, identity, created_at, expires_at
                 FROM sessions
                 WHERE token_hash = $1 AND expires_at > NOW()",
                &[&token_hash],
            )
            .await?;

        Ok(row.map(|r| Session {
            session_id: r.get(0),
            identity: r.get(1),
            created_at: r.get(2),
            expires_at: r.get(3),
            token: None, // Never return the token on retrieval
        }))
    }
}
