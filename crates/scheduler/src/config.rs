//! Scheduler configuration
//!
//! Optional TOML file overlaid by environment variables (`SOLANA_API`,
//! `ANCHOR_WALLET`, `CRON_SCHEDULE`, ...), keyed by lowercase variable name.

use crate::error::{SchedulerError, SchedulerResult};
use crate::trigger::{parse_schedule, DEFAULT_CRON_SCHEDULE};
use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SchedulerConfig {
    #[validate(url)]
    pub solana_api: String,
    /// Gateway keypair file
    #[validate(length(min = 1))]
    pub anchor_wallet: String,
    pub program_id: String,
    pub program_idl: String,
    #[serde(default = "default_cron_schedule")]
    pub cron_schedule: String,
    #[serde(default = "default_payment_delay_ms")]
    #[validate(range(max = 60000))]
    pub payment_delay_ms: u64,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_commitment")]
    pub commitment: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_cron_schedule() -> String {
    DEFAULT_CRON_SCHEDULE.to_string()
}

fn default_payment_delay_ms() -> u64 {
    1000
}

fn default_commitment() -> String {
    "confirmed".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl SchedulerConfig {
    pub fn load(path: Option<&Path>) -> SchedulerResult<Self> {
        Self::load_with_env(path, None)
    }

    pub fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> SchedulerResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder = builder.add_source(config::Environment::default().try_parsing(true).source(env));

        let config: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| SchedulerError::Configuration(e.to_string()))?;

        config.check()?;
        Ok(config)
    }

    pub fn check(&self) -> SchedulerResult<()> {
        self.validate()
            .map_err(|e| SchedulerError::Configuration(e.to_string()))?;
        self.program_pubkey()?;
        self.commitment_config()?;
        parse_schedule(&self.cron_schedule)?;
        Ok(())
    }

    pub fn program_pubkey(&self) -> SchedulerResult<Pubkey> {
        Pubkey::from_str(&self.program_id)
            .map_err(|e| SchedulerError::Configuration(format!("invalid PROGRAM_ID `{}`: {}", self.program_id, e)))
    }

    pub fn commitment_config(&self) -> SchedulerResult<CommitmentConfig> {
        CommitmentConfig::from_str(&self.commitment)
            .map_err(|_| SchedulerError::Configuration(format!("invalid COMMITMENT `{}`", self.commitment)))
    }

    pub fn payment_delay(&self) -> Duration {
        Duration::from_millis(self.payment_delay_ms)
    }
}
