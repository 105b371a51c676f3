//! Checked fixed-point arithmetic helpers.
//!
//! All value math runs on 256-bit integers with explicit overflow and
//! division-by-zero errors — an uncontrolled trap and a controlled rejection
//! are observably different to integrators. USD values carry 8 decimals,
//! ratios are WAD-scaled (1e18) or basis points.
//!
//! Maximum safe input magnitude: every product here is at most
//! `amount × price` or `value × WAD`, so inputs below 2^128 (≈3.4e38 raw
//! units, far beyond any realistic position) can never overflow the 256-bit
//! intermediate.

use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy::primitives::U256;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::constants::BPS;
use crate::errors::EngineError;

const WAD_SCALE: Decimal = dec!(1_000_000_000_000_000_000);

/// `a * b / denominator` with checked multiply and explicit zero-divisor error.
pub fn mul_div(a: U256, b: U256, denominator: U256, context: &'static str) -> Result<U256, EngineError> {
    if denominator.is_zero() {
        return Err(EngineError::DivisionByZero { context });
    }
    let product = a
        .checked_mul(b)
        .ok_or(EngineError::ArithmeticOverflow { context })?;
    Ok(product / denominator)
}

/// `10^decimals` as a `U256`.
pub fn pow10(decimals: u8) -> U256 {
    U256::from(10u64).pow(U256::from(decimals))
}

/// Convert raw token units to an 8-decimal USD value at the given 8-decimal price.
pub fn token_value_usd(raw: U256, price: U256, decimals: u8) -> Result<U256, EngineError> {
    mul_div(raw, price, pow10(decimals), "token value")
}

/// Convert an 8-decimal USD value to raw token units at the given 8-decimal price.
///
/// The caller must have verified `price > 0`; a zero price still fails with a
/// controlled `DivisionByZero` rather than a trap.
pub fn usd_to_token_units(value: U256, price: U256, decimals: u8) -> Result<U256, EngineError> {
    mul_div(value, pow10(decimals), price, "usd to token units")
}

/// `amount * bps / 10_000`.
pub fn apply_bps(amount: U256, bps: u32) -> Result<U256, EngineError> {
    mul_div(amount, U256::from(bps), U256::from(BPS), "bps share")
}

/// `amount * (10_000 + buffer_bps) / 10_000` — add a slippage buffer.
pub fn with_buffer(amount: U256, buffer_bps: u32) -> Result<U256, EngineError> {
    mul_div(
        amount,
        U256::from(BPS + buffer_bps),
        U256::from(BPS),
        "slippage buffer",
    )
}

/// Convert a non-negative `Decimal` ratio (e.g. leverage `3.0`) to WAD scale.
pub fn decimal_to_wad(value: Decimal) -> Result<U256, EngineError> {
    if value.is_sign_negative() {
        return Err(EngineError::ArithmeticOverflow {
            context: "negative decimal to wad",
        });
    }
    let scaled = value
        .checked_mul(WAD_SCALE)
        .ok_or(EngineError::ArithmeticOverflow {
            context: "decimal to wad",
        })?;
    let truncated = scaled
        .trunc()
        .to_u128()
        .ok_or(EngineError::ArithmeticOverflow {
            context: "decimal to wad",
        })?;
    Ok(U256::from(truncated))
}

/// Convert a WAD-scaled `U256` to `Decimal` for display and threshold checks.
///
/// Values beyond `Decimal`'s 96-bit mantissa (health factor of a debt-free
/// position is `U256::MAX`) saturate to `Decimal::MAX`.
pub fn wad_to_decimal(value: U256) -> Decimal {
    Decimal::from_str(&value.to_string())
        .map(|d| d / WAD_SCALE)
        .unwrap_or(Decimal::MAX)
}

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before UNIX epoch")
        .as_secs()
}
