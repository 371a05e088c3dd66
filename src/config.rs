//! Ledger configuration.

use rust_decimal::{Decimal, prelude::Zero};
use thiserror::Error;

use crate::account::DEFAULT_WITHDRAWAL_LIMIT;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Institution name cannot be empty")]
    EmptyInstitution,
    #[error("Withdrawal limit must be positive, got {0}")]
    NonPositiveLimit(Decimal),
}

/// Institution wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Name of the financial institution.
    pub institution: String,
    /// Withdrawal limit given to accounts opened without an explicit one.
    pub withdrawal_limit: Decimal,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            institution: "Square".to_string(),
            withdrawal_limit: DEFAULT_WITHDRAWAL_LIMIT,
        }
    }
}

impl LedgerConfig {
    /// Load configuration from environment variables, keeping defaults for
    /// anything missing or unparsable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(institution) = lookup("LEDGER_INSTITUTION") {
            config.institution = institution;
        }

        if let Some(limit) = lookup("LEDGER_WITHDRAWAL_LIMIT") {
            if let Ok(limit) = limit.trim().parse() {
                config.withdrawal_limit = limit;
            }
        }

        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.institution.trim().is_empty() {
            return Err(ConfigError::EmptyInstitution);
        }

        if self.withdrawal_limit <= Decimal::zero() {
            return Err(ConfigError::NonPositiveLimit(self.withdrawal_limit));
        }

        Ok(())
    }
}
