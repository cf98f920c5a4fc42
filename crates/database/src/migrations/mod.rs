use crate::pool::DbPool;

refinery::embed_migrations!("src/migrations/sql");

/// Apply pending embedded migrations
pub async fn run(pool: &DbPool) -> anyhow::Result<()> {
    let mut client = pool.get().await?;
    let report = migrations::runner().run_async(&mut **client).await?;

    for migration in report.applied_migrations() {
        tracing::info!(
            "Applied migration: version={}, name={}",
            migration.version(),
            migration.name()
        );
    }
    tracing::info!("Database migrations complete");

    Ok(())
}
