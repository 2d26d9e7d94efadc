//! Ledger configuration.
//!
//! Sources, later overriding earlier:
//! 1. built-in defaults
//! 2. the YAML file given by `--config` or `CREDIT_LEDGER_CONFIG`
//! 3. `CREDIT_LEDGER__*` environment variables (`CREDIT_LEDGER__COMMISSION__FEE=2.50`)

use crate::error::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Environment variable naming a configuration file.
pub const CONFIG_ENV_VAR: &str = "CREDIT_LEDGER_CONFIG";

/// Prefix for environment overrides.
pub const CONFIG_ENV_PREFIX: &str = "CREDIT_LEDGER";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub commission: CommissionConfig,
    pub retry: RetryConfig,
    pub accrual: AccrualConfig,
}

/// Flat fee charged once an account exceeds its free monthly movements.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommissionConfig {
    /// Deposits and withdrawals per calendar month before the fee applies.
    pub free_transactions: usize,
    pub fee: Decimal,
}

impl Default for CommissionConfig {
    fn default() -> Self {
        Self {
            free_transactions: 10,
            fee: dec!(1.99),
        }
    }
}

/// Bounded backoff for optimistic-concurrency conflicts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: usize,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            min_delay_ms: 5,
            max_delay_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AccrualConfig {
    /// Period of the background overdue-accrual run.
    pub interval_secs: u64,
}

impl AccrualConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for AccrualConfig {
    fn default() -> Self {
        Self {
            interval_secs: 24 * 60 * 60,
        }
    }
}

impl LedgerConfig {
    /// Loads configuration from an optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        use ::config::{Config, Environment, File, FileFormat};

        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml).required(true));
        } else if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
