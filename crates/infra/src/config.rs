//! Process configuration from environment variables (and `.env`).

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::warn;

use agencyhub_core::CurrencyCode;

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Clone)]
pub struct Config {
    /// `None` runs every store in memory.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    /// Base64 of a 32-byte AES-256 key. `None` derives a development key.
    pub encryption_key: Option<String>,
    pub base_currency: CurrencyCode,
    pub cache_ttl: Duration,
    pub query_row_limit: usize,
    pub query_timeout_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = match var("JWT_SECRET") {
            Some(secret) => secret,
            None => {
                warn!("JWT_SECRET not set; using the insecure development secret");
                DEV_JWT_SECRET.to_string()
            }
        };
        let encryption_key = var("ENCRYPTION_KEY");
        if encryption_key.is_none() {
            warn!("ENCRYPTION_KEY not set; two-factor secrets use a derived development key");
        }

        Ok(Self {
            database_url: var("DATABASE_URL"),
            database_max_connections: parse_or(&var, "DATABASE_MAX_CONNECTIONS", 10)?,
            port: parse_or(&var, "PORT", 8080)?,
            jwt_secret,
            jwt_issuer: var("JWT_ISSUER").unwrap_or_else(|| "agencyhub".to_string()),
            encryption_key,
            base_currency: match var("BASE_CURRENCY") {
                Some(code) => CurrencyCode::parse(code.trim())
                    .with_context(|| format!("BASE_CURRENCY '{code}' is not a currency code"))?,
                None => CurrencyCode::INR,
            },
            cache_ttl: Duration::from_secs(parse_or(&var, "CACHE_TTL_SECS", 300)?),
            query_row_limit: parse_or(&var, "QUERY_ROW_LIMIT", 1000)?,
            query_timeout_ms: parse_or(&var, "QUERY_TIMEOUT_MS", 5000)?,
        })
    }

    pub fn uses_dev_jwt_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a valid number (got '{raw}')")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let cfg = config(&[]).unwrap();
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.database_max_connections, 10);
        assert_eq!(cfg.base_currency, CurrencyCode::INR);
        assert_eq!(cfg.cache_ttl, Duration::from_secs(300));
        assert_eq!(cfg.query_row_limit, 1000);
        assert!(cfg.uses_dev_jwt_secret());
    }

    #[test]
    fn reads_overrides() {
        let cfg = config(&[
            ("DATABASE_URL", "postgres://localhost/agencyhub"),
            ("PORT", "9000"),
            ("JWT_SECRET", "s3cret"),
            ("BASE_CURRENCY", "USD"),
            ("QUERY_ROW_LIMIT", "50"),
        ])
        .unwrap();
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/agencyhub"));
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.base_currency, CurrencyCode::USD);
        assert_eq!(cfg.query_row_limit, 50);
        assert!(!cfg.uses_dev_jwt_secret());
    }

    #[test]
    fn invalid_numbers_are_errors() {
        let err = config(&[("PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("PORT"));
        assert!(config(&[("BASE_CURRENCY", "rupee")]).is_err());
    }
}
