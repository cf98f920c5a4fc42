use anyhow::Context;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use std::fs::File;
use std::io::BufReader;
use tokio_postgres::NoTls;
use tracing::{debug, info};

/// Connection pool type alias
pub type DbPool = Pool;

fn pool_config(config: &config::DatabaseConfig) -> Config {
    let mut cfg = Config::new();
    cfg.host = Some(
        config
            .host
            .clone()
            .unwrap_or_else(|| "localhost".to_string()),
    );
    cfg.port = Some(config.port);
    cfg.dbname = Some(config.database.clone());
    cfg.user = Some(config.username.clone());
    cfg.password = Some(config.password.clone());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(PoolConfig::new(config.max_connections as usize));
    cfg
}

/// Create the connection pool, with TLS when `tls_enabled` is set
pub async fn create_pool(config: &config::DatabaseConfig) -> anyhow::Result<DbPool> {
    info!(
        "Creating database pool: host={}, port={}, database={}, max_connections={}, tls={}",
        config.host.as_deref().unwrap_or("localhost"),
        config.port,
        config.database,
        config.max_connections,
        config.tls_enabled
    );

    let cfg = pool_config(config);
    let pool = if config.tls_enabled {
        create_pool_with_rustls(cfg, config.tls_ca_cert_path.as_deref())?
    } else {
        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .context("Failed to create pool")?
    };

    // Fail at startup rather than on the first request
    let client = pool
        .get()
        .await
        .context("Failed to connect to database")?;
    client.simple_query("SELECT 1").await?;
    debug!("Database connectivity check passed");

    Ok(pool)
}

/// Root store holding every PEM certificate in `cert_path`
fn load_ca_roots(cert_path: &str) -> anyhow::Result<rustls::RootCertStore> {
    let cert_file = File::open(cert_path)
        .with_context(|| format!("Failed to open certificate file {cert_path}"))?;

    let certs = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to parse certificates in {cert_path}"))?;
    if certs.is_empty() {
        anyhow::bail!("No certificates found in {cert_path}");
    }

    let mut root_store = rustls::RootCertStore::empty();
    let (added, ignored) = root_store.add_parsable_certificates(certs);
    if added == 0 {
        anyhow::bail!("None of the {ignored} certificate(s) in {cert_path} could be used");
    }
    info!("Loaded {} CA certificate(s) from {}", added, cert_path);
    Ok(root_store)
}

/// Custom CA when a path is given, otherwise the OS trust store
fn tls_client_config(cert_path: Option<&str>) -> anyhow::Result<rustls::ClientConfig> {
    // Install the default crypto provider (ring) if not already installed
    let _ = rustls::crypto::ring::default_provider().install_default();

    match cert_path {
        Some(cert_path) => Ok(rustls::ClientConfig::builder()
            .with_root_certificates(load_ca_roots(cert_path)?)
            .with_no_client_auth()),
        None => {
            use rustls_platform_verifier::ConfigVerifierExt;

            info!("Using rustls with platform verifier (OS certificate store)");
            rustls::ClientConfig::with_platform_verifier()
                .context("Failed to create platform verifier")
        }
    }
}

fn create_pool_with_rustls(cfg: Config, cert_path: Option<&str>) -> anyhow::Result<Pool> {
    let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_client_config(cert_path)?);

    cfg.create_pool(Some(Runtime::Tokio1), tls)
        .context("Failed to create TLS pool")
}
