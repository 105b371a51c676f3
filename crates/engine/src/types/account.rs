use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

/// Per-reserve configuration read live from the lending pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveConfig {
    pub decimals: u8,
    /// Maximum loan-to-value in basis points; zero means the asset cannot
    /// back a borrow.
    pub ltv_bps: u32,
    /// Liquidation threshold in basis points; at or above it the position is
    /// eligible for liquidation.
    pub liquidation_threshold_bps: u32,
    pub active: bool,
    pub frozen: bool,
    /// Raw-unit borrow cap; zero means uncapped.
    pub borrow_cap: U256,
    /// Raw-unit supply cap; zero means uncapped.
    pub supply_cap: U256,
}

/// Aggregate account state read live from the lending pool.
///
/// Never cached by the engine: the pool is the single source of truth and
/// every sizing computation re-reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountData {
    /// Total supplied collateral value, USD 8 decimals.
    pub total_collateral_usd: U256,
    /// Total outstanding debt value, USD 8 decimals.
    pub total_debt_usd: U256,
    /// Collateral-weighted average loan-to-value, basis points.
    pub ltv_bps: u32,
    /// Collateral-weighted average liquidation threshold, basis points.
    pub liquidation_threshold_bps: u32,
    /// Health factor, WAD-scaled. `U256::MAX` for a debt-free account.
    pub health_factor: U256,
}

/// Interest rate mode for borrow/repay calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateMode {
    Stable,
    Variable,
}
