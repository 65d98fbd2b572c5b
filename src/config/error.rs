//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Database pool_size must be at least 1")]
    EmptyPool,

    #[error("Database acquire_timeout_ms must be positive")]
    ZeroAcquireTimeout,

    #[error("At least one positive entitlement token is required")]
    NoPositiveTokens,

    #[error("Positive entitlement tokens must not be blank")]
    BlankPositiveToken,
}
