//! `billing.toml` loading.

use std::fs;
use std::path::{Path, PathBuf};

use iso_currency::Currency;
use serde::{Deserialize, Serialize};

use crate::core::{CreditPolicy, Settings};

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "could not read configuration: {e}"),
            ConfigError::Parse(e) => write!(f, "invalid configuration: {e}"),
            ConfigError::Invalid(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// CSV tables in a directory.
    #[default]
    File,
    /// Nothing persisted; useful for dry runs.
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    pub path: PathBuf,
    /// Attempts after the first for transient store failures.
    pub retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::File,
            path: PathBuf::from("data"),
            retries: 3,
            retry_delay_ms: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoicingConfig {
    pub prefix: String,
    pub credit_policy: CreditPolicy,
    /// Zero disables the edit window.
    pub edit_window_days: i64,
    pub number_attempts: u32,
}

impl Default for InvoicingConfig {
    fn default() -> Self {
        let settings = Settings::default();
        Self {
            prefix: settings.invoice_prefix,
            credit_policy: settings.credit_policy,
            edit_window_days: settings.edit_window_days.unwrap_or(0),
            number_attempts: settings.number_attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// ISO 4217 code amounts are shown in.
    pub currency: String,
    /// Filter used when `RUST_LOG` is not set.
    pub log_level: String,
    pub store: StoreConfig,
    pub invoicing: InvoicingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            currency: "AED".to_string(),
            log_level: "info".to_string(),
            store: StoreConfig::default(),
            invoicing: InvoicingConfig::default(),
        }
    }
}

impl Config {
    /// Reads and validates a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml_str(&data)
    }

    pub fn from_toml_str(data: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(data).map_err(ConfigError::Parse)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if Currency::from_code(&self.currency).is_none() {
            return Err(ConfigError::Invalid(format!(
                "unknown currency {}",
                self.currency
            )));
        }
        let prefix = &self.invoicing.prefix;
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConfigError::Invalid(format!(
                "invoicing.prefix must be alphanumeric, got {prefix:?}"
            )));
        }
        if self.invoicing.edit_window_days < 0 {
            return Err(ConfigError::Invalid(
                "invoicing.edit_window_days must not be negative".into(),
            ));
        }
        if self.invoicing.number_attempts == 0 {
            return Err(ConfigError::Invalid(
                "invoicing.number_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Lifecycle settings for the billing core.
    pub fn settings(&self) -> Settings {
        Settings {
            invoice_prefix: self.invoicing.prefix.clone(),
            credit_policy: self.invoicing.credit_policy,
            edit_window_days: Some(self.invoicing.edit_window_days).filter(|d| *d > 0),
            number_attempts: self.invoicing.number_attempts,
        }
    }
}
