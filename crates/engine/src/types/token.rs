use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;
use crate::math::{mul_div, pow10};

/// A raw token quantity tagged with its identity and precision.
///
/// Amounts are non-negative by construction (`U256`). Arithmetic across two
/// amounts of different precision must go through [`TokenAmount::rescale`]
/// first; the checked operations reject both token and precision mismatches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAmount {
    pub token: Address,
    pub raw: U256,
    pub decimals: u8,
}

impl TokenAmount {
    pub fn new(token: Address, raw: U256, decimals: u8) -> Self {
        Self {
            token,
            raw,
            decimals,
        }
    }

    pub fn zero(token: Address, decimals: u8) -> Self {
        Self::new(token, U256::ZERO, decimals)
    }

    pub fn is_zero(&self) -> bool {
        self.raw.is_zero()
    }

    /// Re-express this amount at a different precision (floor on downscale).
    pub fn rescale(&self, decimals: u8) -> Result<TokenAmount, EngineError> {
        let raw = if decimals >= self.decimals {
            self.raw
                .checked_mul(pow10(decimals - self.decimals))
                .ok_or(EngineError::ArithmeticOverflow { context: "rescale" })?
        } else {
            self.raw / pow10(self.decimals - decimals)
        };
        Ok(TokenAmount::new(self.token, raw, decimals))
    }

    /// Checked addition; both sides must share token and precision.
    pub fn checked_add(&self, other: &TokenAmount) -> Result<TokenAmount, EngineError> {
        self.ensure_compatible(other)?;
        let raw = self
            .raw
            .checked_add(other.raw)
            .ok_or(EngineError::ArithmeticOverflow {
                context: "token amount add",
            })?;
        Ok(TokenAmount::new(self.token, raw, self.decimals))
    }

    /// Checked subtraction; both sides must share token and precision.
    pub fn checked_sub(&self, other: &TokenAmount) -> Result<TokenAmount, EngineError> {
        self.ensure_compatible(other)?;
        let raw = self
            .raw
            .checked_sub(other.raw)
            .ok_or(EngineError::ArithmeticOverflow {
                context: "token amount sub",
            })?;
        Ok(TokenAmount::new(self.token, raw, self.decimals))
    }

    fn ensure_compatible(&self, other: &TokenAmount) -> Result<(), EngineError> {
        if self.token != other.token {
            return Err(EngineError::TokenMismatch {
                expected: self.token,
                actual: other.token,
            });
        }
        if self.decimals != other.decimals {
            return Err(EngineError::PrecisionMismatch {
                expected: self.decimals,
                actual: other.decimals,
            });
        }
        Ok(())
    }
}

/// A validated unit price for a token, in the canonical 8-decimal USD scale.
///
/// Constructed only by the oracle adapter, which guarantees `price > 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceQuote {
    pub token: Address,
    /// USD price, 8 decimals.
    pub price: U256,
    /// Source feed's last-update timestamp (unix seconds).
    pub updated_at: u64,
}

impl PriceQuote {
    /// USD value (8 decimals) of `amount` at this price.
    pub fn value_of(&self, amount: &TokenAmount) -> Result<U256, EngineError> {
        mul_div(
            amount.raw,
            self.price,
            pow10(amount.decimals),
            "quote value",
        )
    }
}
