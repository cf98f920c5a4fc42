use serde::Deserialize;
use std::collections::HashMap;

/// Read a secret from `<name>_FILE` when set, otherwise from `<name>`.
/// Panics if the file variable points at an unreadable file.
fn secret_from_env(name: &str) -> String {
    let file_var = format!("{name}_FILE");
    if let Ok(path) = std::env::var(&file_var) {
        std::fs::read_to_string(&path)
            .map(|p| p.trim().to_string())
            .unwrap_or_else(|e| panic!("Failed to read {} at {}: {}", file_var, path, e))
    } else {
        std::env::var(name).unwrap_or_default()
    }
}

fn parsed_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}

#[derive(Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: Option<String>,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub max_connections: u32,
    pub tls_enabled: bool,
    pub tls_ca_cert_path: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let password = secret_from_env("DATABASE_PASSWORD");
        Self {
            host: std::env::var("DATABASE_HOST").ok(),
            port: parsed_env("DATABASE_PORT", 5432),
            database: std::env::var("DATABASE_NAME")
                .unwrap_or_else(|_| "prompt_improver".to_string()),
            username: std::env::var("DATABASE_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: if password.is_empty() {
                "postgres".to_string()
            } else {
                password
            },
            max_connections: parsed_env("DATABASE_MAX_CONNECTIONS", 10),
            tls_enabled: parsed_env("DATABASE_TLS_ENABLED", false),
            tls_ca_cert_path: std::env::var("DATABASE_TLS_CA_CERT_PATH").ok(),
        }
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("max_connections", &self.max_connections)
            .field("tls_enabled", &self.tls_enabled)
            .field("tls_ca_cert_path", &self.tls_ca_cert_path)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parsed_env("SERVER_PORT", 8080),
        }
    }
}

/// Text-transformation upstream (any OpenAI-compatible chat completions endpoint)
#[derive(Clone, Deserialize)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: secret_from_env("OPENAI_API_KEY"),
            base_url: std::env::var("OPENAI_BASE_URL").ok(),
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            max_tokens: parsed_env("OPENAI_MAX_TOKENS", 2048),
            timeout_secs: parsed_env("OPENAI_TIMEOUT_SECS", 60),
        }
    }
}

impl std::fmt::Debug for OpenAIConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Stripe payment configuration
#[derive(Clone, Deserialize)]
pub struct StripeConfig {
    /// Stripe secret key for API authentication
    pub secret_key: String,
    /// Stripe webhook secret for verifying webhook signatures
    pub webhook_secret: String,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            secret_key: secret_from_env("STRIPE_SECRET_KEY"),
            webhook_secret: secret_from_env("STRIPE_WEBHOOK_SECRET"),
        }
    }
}

impl StripeConfig {
    pub fn is_configured(&self) -> bool {
        !self.secret_key.is_empty() && !self.webhook_secret.is_empty()
    }
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &redact(&self.secret_key))
            .field("webhook_secret", &redact(&self.webhook_secret))
            .finish()
    }
}

/// Credits granted per plan on signup, upgrade and renewal
#[derive(Debug, Clone, Deserialize)]
pub struct CreditsConfig {
    pub free_allotment: i64,
    pub pro_allotment: i64,
    pub enterprise_allotment: i64,
}

impl Default for CreditsConfig {
    fn default() -> Self {
        Self {
            free_allotment: parsed_env("CREDITS_FREE_ALLOTMENT", 5),
            pro_allotment: parsed_env("CREDITS_PRO_ALLOTMENT", 200),
            enterprise_allotment: parsed_env("CREDITS_ENTERPRISE_ALLOTMENT", 1000),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub exact_matches: Vec<String>,
    pub wildcard_suffixes: Vec<String>,
}

impl CorsConfig {
    /// Split a comma-separated origin list. `*` entries become suffix
    /// matches anchored on `.` or `-`, so `*prompts.dev` cannot match
    /// `evilprompts.dev`.
    pub fn parse(raw: &str) -> Self {
        let (wildcards, exact): (Vec<&str>, Vec<&str>) = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .partition(|s| s.starts_with('*'));

        let wildcard_suffixes = wildcards
            .into_iter()
            .map(|s| {
                let suffix = &s[1..];
                if suffix.starts_with(['.', '-']) {
                    suffix.to_string()
                } else {
                    format!(".{suffix}")
                }
            })
            .collect();

        Self {
            exact_matches: exact.into_iter().map(str::to_string).collect(),
            wildcard_suffixes,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self::parse(
            &std::env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `LOG_LEVEL`, default "info"
    pub level: String,
    /// "json" for structured output, anything else is pretty-printed
    pub format: String,
    /// Crate name to level, from `LOG_MODULE_<CRATE>`
    pub modules: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let modules = ["api", "services", "database"]
            .into_iter()
            .filter_map(|module| {
                let var = format!("LOG_MODULE_{}", module.to_uppercase());
                std::env::var(var).ok().map(|level| (module.to_string(), level))
            })
            .collect();

        Self {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
            modules,
        }
    }
}

impl LoggingConfig {
    /// EnvFilter directive string: global level plus per-module overrides
    pub fn filter_directives(&self) -> String {
        let mut modules: Vec<_> = self.modules.iter().collect();
        modules.sort();

        let mut directives = self.level.clone();
        for (module, level) in modules {
            directives.push_str(&format!(",{module}={level}"));
        }
        directives
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub openai: OpenAIConfig,
    /// Stripe payment configuration
    pub stripe: StripeConfig,
    pub credits: CreditsConfig,
    pub cors: CorsConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database: DatabaseConfig::default(),
            server: ServerConfig::default(),
            openai: OpenAIConfig::default(),
            stripe: StripeConfig::default(),
            credits: CreditsConfig::default(),
            cors: CorsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
