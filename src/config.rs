use crate::chains::ChainRegistry;
use alloy_primitives::U256;
use anyhow::{Context, Result};
use std::str::FromStr;
use std::time::Duration;

/// 10^18, the default cutoff above which an allowance counts as unlimited.
pub const DEFAULT_UNLIMITED_THRESHOLD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "sqlite" => Ok(StorageBackend::Sqlite),
            other => Err(anyhow::anyhow!("Unknown STORAGE_BACKEND: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub storage_backend: StorageBackend,
    pub database_url: String,
    pub request_timeout: Duration,
    pub max_retries: usize,
    pub lookup_concurrency: usize,
    pub unlimited_threshold: U256,
    pub chains: ChainRegistry,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_backend: StorageBackend::Sqlite,
            database_url: "sqlite:./approvals.db".to_string(),
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            lookup_concurrency: 4,
            unlimited_threshold: DEFAULT_UNLIMITED_THRESHOLD,
            chains: ChainRegistry::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let defaults = Config::default();

        let storage_backend = match std::env::var("STORAGE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.storage_backend,
        };

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| defaults.database_url.clone());

        let request_timeout = match std::env::var("EXPLORER_TIMEOUT_SECS") {
            Ok(value) => Duration::from_secs(
                value
                    .parse()
                    .context("EXPLORER_TIMEOUT_SECS must be a whole number of seconds")?,
            ),
            Err(_) => defaults.request_timeout,
        };

        let max_retries = match std::env::var("EXPLORER_MAX_RETRIES") {
            Ok(value) => value
                .parse()
                .context("EXPLORER_MAX_RETRIES must be a non-negative integer")?,
            Err(_) => defaults.max_retries,
        };

        let lookup_concurrency = match std::env::var("LOOKUP_CONCURRENCY") {
            Ok(value) => value
                .parse::<usize>()
                .context("LOOKUP_CONCURRENCY must be a positive integer")?
                .max(1),
            Err(_) => defaults.lookup_concurrency,
        };

        let unlimited_threshold = match std::env::var("UNLIMITED_THRESHOLD") {
            Ok(value) => U256::from_str_radix(value.trim(), 10)
                .context("UNLIMITED_THRESHOLD must be a decimal integer")?,
            Err(_) => defaults.unlimited_threshold,
        };

        Ok(Config {
            storage_backend,
            database_url,
            request_timeout,
            max_retries,
            lookup_concurrency,
            unlimited_threshold,
            chains: ChainRegistry::from_env(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_threshold_is_one_ether() {
        assert_eq!(
            DEFAULT_UNLIMITED_THRESHOLD,
            U256::from(10u64).pow(U256::from(18u64))
        );
    }

    #[test]
    fn parses_storage_backend() {
        assert_eq!(
            "MEMORY".parse::<StorageBackend>().unwrap(),
            StorageBackend::Memory
        );
        assert_eq!(
            "sqlite".parse::<StorageBackend>().unwrap(),
            StorageBackend::Sqlite
        );
        assert!("postgres".parse::<StorageBackend>().is_err());
    }
}
