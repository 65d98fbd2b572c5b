//! Settings for `PostgresStore::connect`.

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Where the pricing tables live and how many transactions may run at once.
///
/// Every ledger write and every plan change holds one pooled connection
/// until it commits, so `pool_size` caps the number of concurrent writers.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// How long a writer waits for a free connection before giving up.
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// Apply `migrations/` when the store connects.
    #[serde(default)]
    pub run_migrations: bool,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.trim().is_empty() {
            return Err(ValidationError::MissingRequired("PRICING__DATABASE__URL"));
        }
        if !self.url.starts_with("postgres://") && !self.url.starts_with("postgresql://") {
            return Err(ValidationError::InvalidDatabaseUrl);
        }
        if self.pool_size == 0 {
            return Err(ValidationError::EmptyPool);
        }
        if self.acquire_timeout_ms == 0 {
            return Err(ValidationError::ZeroAcquireTimeout);
        }
        Ok(())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            pool_size: default_pool_size(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            run_migrations: false,
        }
    }
}

fn default_pool_size() -> u32 {
    8
}

fn default_acquire_timeout_ms() -> u64 {
    3_000
}
