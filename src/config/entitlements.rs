//! Entitlement evaluation settings

use serde::Deserialize;
use std::collections::HashSet;

use super::error::ValidationError;

/// How plan values are interpreted by the evaluator.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct EntitlementConfig {
    /// Values that mark a feature as enabled, compared case-insensitively
    #[serde(default = "default_positive_tokens")]
    pub positive_tokens: Vec<String>,

    /// Value reported for a feature the plan does not include
    #[serde(default = "default_value")]
    pub default_value: String,
}

impl EntitlementConfig {
    /// Upper-cased token set used for membership checks.
    pub fn normalized_tokens(&self) -> HashSet<String> {
        self.positive_tokens
            .iter()
            .map(|t| t.trim().to_uppercase())
            .collect()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.positive_tokens.is_empty() {
            return Err(ValidationError::NoPositiveTokens);
        }
        if self.positive_tokens.iter().any(|t| t.trim().is_empty()) {
            return Err(ValidationError::BlankPositiveToken);
        }
        if self.default_value.is_empty() {
            return Err(ValidationError::MissingRequired("ENTITLEMENTS__DEFAULT_VALUE"));
        }
        Ok(())
    }
}

impl Default for EntitlementConfig {
    fn default() -> Self {
        Self {
            positive_tokens: default_positive_tokens(),
            default_value: default_value(),
        }
    }
}

fn default_positive_tokens() -> Vec<String> {
    vec!["Y".to_string(), "OK".to_string(), "TRUE".to_string()]
}

fn default_value() -> String {
    "0".to_string()
}
