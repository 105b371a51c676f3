use alloy::primitives::{address, Address, U256};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ---------------------------------------------------------------------------
// Numeric Scales
// ---------------------------------------------------------------------------

/// WAD: 1e18 — fixed-point scale for leverage ratios and health factors.
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Basis points denominator.
pub const BPS: u32 = 10_000;

/// Canonical price precision: USD with 8 decimals (Chainlink convention).
pub const USD_DECIMALS: u8 = 8;

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

/// Pseudo-address for the native (non-tokenized) asset, aggregator convention.
pub const NATIVE_ASSET: Address = address!("EeeeeEeeeeEeEeEeEeEeeEEEeeeeEeeeeeeeEEeE");

// ---------------------------------------------------------------------------
// Admin Limits
// ---------------------------------------------------------------------------

/// Maximum number of feeds accepted by a single batched registry update.
pub const MAX_FEED_BATCH: usize = 20;

/// Hard cap on the owner-settable engine fee (10%).
pub const MAX_FEE_BPS: u32 = 1_000;

// ---------------------------------------------------------------------------
// Default Settings
// ---------------------------------------------------------------------------

pub const DEFAULT_SLIPPAGE_BUFFER_BPS: u32 = 500;
pub const DEFAULT_MIN_HEALTH_FACTOR: Decimal = dec!(1.0);
pub const DEFAULT_MAX_LEVERAGE: Decimal = dec!(5.0);
pub const DEFAULT_FLASH_LOAN_PREMIUM_BPS: u32 = 5;

// ---------------------------------------------------------------------------
// Demo Scenario Addresses (BSC mainnet)
// ---------------------------------------------------------------------------

pub const TOKEN_WBNB: Address = address!("bb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c");
pub const TOKEN_USDT: Address = address!("55d398326f99059fF775485246999027B3197955");
