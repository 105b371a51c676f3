use alloy::primitives::Address;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::orchestrator::EngineSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub log_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub logging: LoggingConfig,
}

/// Contents of `engine.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineFileConfig {
    #[serde(with = "rust_decimal::serde::str")]
    pub min_health_factor: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub max_leverage: Decimal,
    pub slippage_buffer_bps: u32,
    pub fee_bps: u32,
    /// Hex addresses of approved swap venues; empty accepts any venue.
    pub approved_venues: Vec<String>,
}

/// Contents of `oracle.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleFileConfig {
    pub default_max_age_seconds: u64,
    pub sequencer_grace_period_seconds: u64,
}

/// Fully merged configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub app: AppConfig,
    pub engine: EngineFileConfig,
    pub oracle: OracleFileConfig,
}

impl EngineConfig {
    /// Convert the validated file config into runtime [`EngineSettings`].
    pub fn settings(&self) -> Result<EngineSettings> {
        let approved_venues = self
            .engine
            .approved_venues
            .iter()
            .map(|raw| {
                raw.parse::<Address>()
                    .with_context(|| format!("invalid approved venue address: {raw}"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(EngineSettings {
            min_health_factor: self.engine.min_health_factor,
            max_leverage: self.engine.max_leverage,
            slippage_buffer_bps: self.engine.slippage_buffer_bps,
            approved_venues,
        })
    }
}
