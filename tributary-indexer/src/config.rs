//! Configuration for the Tributary indexer
//!
//! Values come from an optional TOML file overlaid by environment variables
//! (`SOLANA_API`, `KAFKA_BOOTSTRAP_SERVERS`, ...). Keys are the lowercase
//! variable names in both sources.

use crate::core::{IndexerError, IndexerResult};
use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct IndexerConfig {
    /// HTTP JSON-RPC endpoint
    #[validate(url)]
    pub solana_api: String,
    /// Websocket endpoint; derived from `solana_api` when unset
    #[validate(url)]
    #[serde(default)]
    pub solana_ws: Option<String>,
    pub program_id: String,
    /// Anchor IDL of the monitored program
    pub program_idl: String,
    /// Comma-separated Kafka REST proxy endpoints
    #[validate(length(min = 1))]
    pub kafka_bootstrap_servers: String,
    #[serde(default = "default_topic_prefix")]
    #[validate(length(min = 1))]
    pub kafka_topic_prefix: String,
    #[serde(default = "default_redis_url")]
    #[validate(url)]
    pub redis_url: String,
    #[serde(default = "default_commitment")]
    pub commitment: String,
    #[serde(default = "default_catchup_interval_secs")]
    #[validate(range(min = 1))]
    pub catchup_interval_secs: u64,
    #[serde(default = "default_catchup_retry_secs")]
    #[validate(range(min = 1))]
    pub catchup_retry_secs: u64,
    #[serde(default = "default_catchup_limit")]
    #[validate(range(min = 1, max = 1000))]
    pub catchup_limit: usize,
    #[serde(default = "default_rate_limit_backoff_secs")]
    pub rate_limit_backoff_secs: u64,
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    #[serde(default = "default_signature_ttl_secs")]
    #[validate(range(min = 1))]
    pub signature_ttl_secs: u64,
    #[serde(default = "default_redis_timeout_secs")]
    #[validate(range(min = 1, max = 30))]
    pub redis_timeout_secs: u64,
    #[serde(default = "default_bus_timeout_secs")]
    #[validate(range(min = 1, max = 300))]
    pub bus_timeout_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_topic_prefix() -> String {
    "tributary".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_commitment() -> String {
    "confirmed".to_string()
}

fn default_catchup_interval_secs() -> u64 {
    3600
}

fn default_catchup_retry_secs() -> u64 {
    300
}

fn default_catchup_limit() -> usize {
    1000
}

fn default_rate_limit_backoff_secs() -> u64 {
    20
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

fn default_signature_ttl_secs() -> u64 {
    30 * 24 * 60 * 60
}

fn default_redis_timeout_secs() -> u64 {
    2
}

fn default_bus_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl IndexerConfig {
    /// Load from `path` (if it exists) and the process environment.
    pub fn load(path: Option<&Path>) -> IndexerResult<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`IndexerConfig::load`], with an explicit environment instead of the process one.
    pub fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> IndexerResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder = builder.add_source(config::Environment::default().try_parsing(true).source(env));

        let config: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| IndexerError::Configuration(e.to_string()))?;

        config.check()?;
        Ok(config)
    }

    /// Field validation plus the checks `validator` cannot express.
    pub fn check(&self) -> IndexerResult<()> {
        self.validate()
            .map_err(|e| IndexerError::Configuration(e.to_string()))?;
        self.program_pubkey()?;
        self.commitment_config()?;
        match self.log_format.as_str() {
            "pretty" | "json" => Ok(()),
            other => Err(IndexerError::Configuration(format!(
                "LOG_FORMAT must be `pretty` or `json`, got `{}`",
                other
            ))),
        }
    }

    pub fn program_pubkey(&self) -> IndexerResult<Pubkey> {
        Pubkey::from_str(&self.program_id)
            .map_err(|e| IndexerError::Configuration(format!("invalid PROGRAM_ID `{}`: {}", self.program_id, e)))
    }

    pub fn commitment_config(&self) -> IndexerResult<CommitmentConfig> {
        CommitmentConfig::from_str(&self.commitment)
            .map_err(|_| IndexerError::Configuration(format!("invalid COMMITMENT `{}`", self.commitment)))
    }

    pub fn websocket_url(&self) -> String {
        self.solana_ws
            .clone()
            .unwrap_or_else(|| crate::watcher::websocket_url(&self.solana_api))
    }

    pub fn catchup_interval(&self) -> Duration {
        Duration::from_secs(self.catchup_interval_secs)
    }

    pub fn catchup_retry(&self) -> Duration {
        Duration::from_secs(self.catchup_retry_secs)
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_secs(self.rate_limit_backoff_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn signature_ttl(&self) -> Duration {
        Duration::from_secs(self.signature_ttl_secs)
    }

    pub fn redis_timeout(&self) -> Duration {
        Duration::from_secs(self.redis_timeout_secs)
    }

    pub fn bus_timeout(&self) -> Duration {
        Duration::from_secs(self.bus_timeout_secs)
    }
}
