//! Process configuration, layered the way the teacher's `mcp-server::config`
//! does: a `default.toml`-shaped baseline, an optional file override, then
//! `TX_`-prefixed environment variables — extended with the
//! persisted-configuration knobs spec.md §6 names (`recency_weight`,
//! `lease_duration_minutes`, `auto_sync`).

use std::env;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub retrieval: RetrievalKnobs,
    pub sync: SyncKnobs,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    /// Path passed to `Store::open`. `:memory:` and `sqlite://...` both work.
    pub url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

/// The sole retrieval knob spec.md §6 names as persisted configuration
/// rather than a call-time parameter.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrievalKnobs {
    pub recency_weight: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncKnobs {
    pub auto_sync: bool,
    pub lease_duration_minutes: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let builder = ConfigBuilder::builder()
            .set_default("database.url", "tx.sqlite")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .set_default("retrieval.recency_weight", 0.1)?
            .set_default("sync.auto_sync", false)?
            .set_default("sync.lease_duration_minutes", 30)?
            .add_source(Environment::with_prefix("TX").separator("_").try_parsing(true));

        let config = builder.build().context("failed to build configuration")?;
        config.try_deserialize().context("failed to deserialize configuration")
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let builder = ConfigBuilder::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .set_default("retrieval.recency_weight", 0.1)?
            .set_default("sync.auto_sync", false)?
            .set_default("sync.lease_duration_minutes", 30)?
            .add_source(File::with_name(path).format(FileFormat::Toml))
            .add_source(Environment::with_prefix("TX").separator("_").try_parsing(true));

        let config = builder.build().context("failed to build configuration from file")?;
        config.try_deserialize().context("failed to deserialize configuration")
    }

    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => return Err(anyhow::anyhow!("invalid log level: {other}")),
        }
        if !(0.0..=1.0).contains(&self.retrieval.recency_weight) {
            return Err(anyhow::anyhow!(
                "recency_weight must be within [0, 1], got {}",
                self.retrieval.recency_weight
            ));
        }
        if self.sync.lease_duration_minutes <= 0 {
            return Err(anyhow::anyhow!("lease_duration_minutes must be positive"));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig { url: env::var("DATABASE_URL").unwrap_or_else(|_| "tx.sqlite".to_string()) },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Pretty },
            retrieval: RetrievalKnobs { recency_weight: 0.1 },
            sync: SyncKnobs { auto_sync: false, lease_duration_minutes: 30 },
        }
    }
}
