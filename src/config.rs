//! Application configuration
//!
//! Loaded from a TOML file (path from `LOTTOBOOK_CONFIG`, default
//! `lottobook.toml`), with environment overrides for the database path.

use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::models::{BetCategory, RateEntry};

pub const CONFIG_PATH_VAR: &str = "LOTTOBOOK_CONFIG";
pub const DB_PATH_VAR: &str = "LOTTOBOOK_DB_PATH";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// tracing-subscriber filter used when RUST_LOG is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Rate Table seed, category code -> multiplier
    #[serde(default)]
    pub rates: BTreeMap<String, Decimal>,
}

fn default_database_path() -> String {
    "lottobook.db".to_string()
}

fn default_log_filter() -> String {
    "lottobook_backend=info,lottobook=info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            log_filter: default_log_filter(),
            rates: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    /// Load from TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;
        Ok(config)
    }

    /// Load from environment or default path
    pub fn from_env() -> Self {
        let path =
            std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| "lottobook.toml".to_string());

        let mut config = Self::load(&path).unwrap_or_else(|e| {
            tracing::debug!("Using default config ({}): {:#}", path, e);
            Self::default()
        });

        if let Ok(db_path) = std::env::var(DB_PATH_VAR) {
            if !db_path.trim().is_empty() {
                config.database_path = db_path;
            }
        }

        config
    }

    /// Save to TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Parse the `[rates]` table into Rate Table entries.
    pub fn rate_entries(&self) -> anyhow::Result<Vec<RateEntry>> {
        self.rates
            .iter()
            .map(|(code, multiplier)| {
                let category: BetCategory = code
                    .parse()
                    .with_context(|| format!("Invalid key in [rates]: {code}"))?;
                Ok(RateEntry {
                    category,
                    multiplier: *multiplier,
                })
            })
            .collect()
    }
}
