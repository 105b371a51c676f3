use alloy::primitives::Address;
use anyhow::{bail, Context, Result};
use rust_decimal_macros::dec;

use crate::constants::{BPS, MAX_FEE_BPS};

use super::types::EngineConfig;

/// Validate the merged configuration. Rejecting a bad value here keeps every
/// arithmetic guard downstream a genuine invariant rather than a first line
/// of defense.
pub fn validate_config(config: &EngineConfig) -> Result<()> {
    let engine = &config.engine;

    if engine.min_health_factor < dec!(1) {
        bail!(
            "min_health_factor {} is below 1.0, the liquidation boundary",
            engine.min_health_factor
        );
    }
    if engine.max_leverage < dec!(1) {
        bail!("max_leverage {} is below the 1x minimum", engine.max_leverage);
    }
    if engine.max_leverage > dec!(100) {
        bail!("max_leverage {} is implausibly high", engine.max_leverage);
    }
    if engine.slippage_buffer_bps >= BPS {
        bail!(
            "slippage_buffer_bps {} must be below {}",
            engine.slippage_buffer_bps,
            BPS
        );
    }
    if engine.fee_bps > MAX_FEE_BPS {
        bail!(
            "fee_bps {} exceeds the maximum of {}",
            engine.fee_bps,
            MAX_FEE_BPS
        );
    }
    for venue in &engine.approved_venues {
        venue
            .parse::<Address>()
            .with_context(|| format!("approved venue is not a valid address: {venue}"))?;
    }

    if config.oracle.default_max_age_seconds == 0 {
        bail!("default_max_age_seconds must be positive");
    }

    Ok(())
}
