use anyhow::{bail, Context, Result};

const MAX_READ_RETRY_ATTEMPTS: u32 = 10;
const MAX_READ_RETRY_BASE_MS: u64 = 60_000;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub rust_log: String,
    /// Optional JSON catalog file. The built-in catalog is used when unset.
    pub catalog_path: Option<String>,
    pub entitlement_term_days: i64,
    pub read_retry_attempts: u32,
    pub read_retry_base_ms: u64,
    /// Enables gateway re-verification of payment tokens when set.
    pub payment_verify_url: Option<String>,
    pub payment_api_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let config = Config {
            database_url: require_env("DATABASE_URL")?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            catalog_path: optional_env("CATALOG_PATH"),
            entitlement_term_days: parse_env("ENTITLEMENT_TERM_DAYS", 90)?,
            read_retry_attempts: parse_env("READ_RETRY_ATTEMPTS", 3)?,
            read_retry_base_ms: parse_env("READ_RETRY_BASE_MS", 100)?,
            payment_verify_url: optional_env("PAYMENT_VERIFY_URL"),
            payment_api_key: optional_env("PAYMENT_API_KEY"),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.entitlement_term_days <= 0 {
            bail!("ENTITLEMENT_TERM_DAYS must be positive");
        }
        if !(1..=MAX_READ_RETRY_ATTEMPTS).contains(&self.read_retry_attempts) {
            bail!("READ_RETRY_ATTEMPTS must be between 1 and {MAX_READ_RETRY_ATTEMPTS}");
        }
        if self.read_retry_base_ms > MAX_READ_RETRY_BASE_MS {
            bail!("READ_RETRY_BASE_MS must not exceed {MAX_READ_RETRY_BASE_MS}");
        }
        if self.payment_verify_url.is_some() && self.payment_api_key.is_none() {
            bail!("PAYMENT_API_KEY is required when PAYMENT_VERIFY_URL is set");
        }
        Ok(())
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: '{raw}'")),
        Err(_) => Ok(default),
    }
}
