//! Application configuration module
//!
//! Type-safe configuration loading from environment variables using the
//! `config` and `dotenvy` crates. Variables use the `PRICING` prefix and nested
//! values are separated by a double underscore.
//!
//! # Example
//!
//! ```no_run
//! use subscription_meter::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Positive tokens: {:?}", config.entitlements.positive_tokens);
//! ```

mod database;
mod entitlements;
mod error;

pub use database::DatabaseConfig;
pub use entitlements::EntitlementConfig;
pub use error::{ConfigError, ValidationError};

use serde::Deserialize;
use std::path::Path;

const ENV_PREFIX: &str = "PRICING";

/// Root configuration.
///
/// `database` is optional: hosts running on the in-memory store leave it out.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL store
    #[serde(default)]
    pub database: Option<DatabaseConfig>,

    /// Entitlement value interpretation
    #[serde(default)]
    pub entitlements: EntitlementConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `PRICING` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `PRICING__DATABASE__URL=...` -> `database.url = ...`
    /// - `PRICING__ENTITLEMENTS__POSITIVE_TOKENS=Y,OK` -> `entitlements.positive_tokens = ["Y", "OK"]`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(environment())
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Load a TOML (or other `config`-supported) file, with environment
    /// variables taking precedence over its values.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(environment())
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(database) = &self.database {
            database.validate()?;
        }
        self.entitlements.validate()?;
        Ok(())
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("entitlements.positive_tokens")
        .try_parsing(true)
}
