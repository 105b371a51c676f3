//! Position sizing calculator.
//!
//! Pure read-path math: converts a desired leverage and live oracle prices
//! into exact flash-loan/borrow amounts (open) or a collateral-to-withdraw
//! amount (unwind). Prices are always re-fetched from the oracle adapter —
//! the API offers no way for a caller to supply its own — and the lending
//! pool's live loan-to-value ratio is the single canonical ratio for both
//! directions of the lifecycle.
//!
//! All value math is 8-decimal USD on 256-bit integers; see `math` for the
//! documented safe input magnitude.

use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::constants::{BPS, WAD};
use crate::errors::EngineError;
use crate::math::{decimal_to_wad, mul_div, usd_to_token_units, with_buffer};
use crate::oracle::FeedRegistry;
use crate::pool::LendingPool;
use crate::types::TokenAmount;

/// Result of open-position sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenSizing {
    /// Extra collateral to flash-loan, in collateral-token units.
    pub flash_loan_amount: TokenAmount,
    /// Debt to draw against the combined collateral, in borrow-token units.
    pub borrow_amount: TokenAmount,
    /// Target total collateral value, USD 8 decimals.
    pub total_collateral_value_usd: U256,
    /// Borrow leg value, USD 8 decimals.
    pub borrow_value_usd: U256,
}

/// Result of unwind sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnwindSizing {
    /// Collateral to withdraw, slippage buffer included.
    pub collateral_to_withdraw: TokenAmount,
    /// The debt leg, unchanged from the input.
    pub debt_amount: TokenAmount,
}

/// Size an open: flash-loan and borrow amounts for `leverage` applied to
/// `user_collateral`.
///
/// In a common USD unit: total target collateral value = user collateral
/// value × leverage; borrow value = total − user value. A leverage whose
/// implied borrow ratio exceeds the collateral's loan-to-value limit is
/// rejected up front, so every accepted sizing satisfies
/// `borrow_value / total_value <= ltv`.
pub fn compute_open_sizing(
    oracle: &FeedRegistry,
    pool: &dyn LendingPool,
    collateral_token: Address,
    borrow_token: Address,
    leverage: Decimal,
    user_collateral: &TokenAmount,
) -> Result<OpenSizing, EngineError> {
    if collateral_token.is_zero() || borrow_token.is_zero() {
        return Err(EngineError::ZeroAddress);
    }
    if user_collateral.is_zero() {
        return Err(EngineError::ZeroAmount);
    }
    if user_collateral.token != collateral_token {
        return Err(EngineError::TokenMismatch {
            expected: collateral_token,
            actual: user_collateral.token,
        });
    }
    if leverage < dec!(1) {
        return Err(EngineError::InvalidLeverage { leverage });
    }

    let collateral_quote = oracle.get_price(collateral_token)?;
    let borrow_quote = oracle.get_price(borrow_token)?;

    let collateral_config = pool.reserve_config(collateral_token)?;
    if collateral_config.ltv_bps == 0 {
        return Err(EngineError::AssetNotUsableAsCollateral {
            token: collateral_token,
        });
    }
    let borrow_config = pool.reserve_config(borrow_token)?;

    let user_value = collateral_quote.value_of(user_collateral)?;
    let leverage_wad = decimal_to_wad(leverage)?;
    let total_value = mul_div(user_value, leverage_wad, WAD, "target value")?;
    let borrow_value = total_value - user_value;

    // borrow_value * BPS > total_value * ltv_bps ⇔ ratio above the limit.
    let ratio_lhs = borrow_value
        .checked_mul(U256::from(BPS))
        .ok_or(EngineError::ArithmeticOverflow {
            context: "ltv ratio",
        })?;
    let ratio_rhs = total_value
        .checked_mul(U256::from(collateral_config.ltv_bps))
        .ok_or(EngineError::ArithmeticOverflow {
            context: "ltv ratio",
        })?;
    if ratio_lhs > ratio_rhs {
        return Err(EngineError::ExcessiveLeverage {
            leverage,
            ltv_bps: collateral_config.ltv_bps,
        });
    }

    if borrow_quote.price.is_zero() || collateral_quote.price.is_zero() {
        // The oracle adapter already rejects non-positive answers; this is
        // the explicit pre-division guard.
        return Err(EngineError::InvalidPrices);
    }
    let borrow_units = usd_to_token_units(borrow_value, borrow_quote.price, borrow_config.decimals)?;
    let total_units = usd_to_token_units(
        total_value,
        collateral_quote.price,
        user_collateral.decimals,
    )?;
    let flash_units = total_units.saturating_sub(user_collateral.raw);

    debug!(
        collateral = %collateral_token,
        borrow = %borrow_token,
        %leverage,
        user_value = %user_value,
        total_value = %total_value,
        borrow_value = %borrow_value,
        flash_units = %flash_units,
        "open sizing computed"
    );

    Ok(OpenSizing {
        flash_loan_amount: TokenAmount::new(collateral_token, flash_units, user_collateral.decimals),
        borrow_amount: TokenAmount::new(borrow_token, borrow_units, borrow_config.decimals),
        total_collateral_value_usd: total_value,
        borrow_value_usd: borrow_value,
    })
}

/// Size an unwind: collateral to withdraw for repaying `debt`.
///
/// collateral = debt value ÷ (collateral price × loan-to-value), then a
/// slippage buffer on top. The orchestrator's unwind callback recomputes
/// with this same function, so the two sites cannot disagree on the ratio.
pub fn compute_unwind_sizing(
    oracle: &FeedRegistry,
    pool: &dyn LendingPool,
    collateral_token: Address,
    debt_token: Address,
    debt: &TokenAmount,
    slippage_buffer_bps: u32,
) -> Result<UnwindSizing, EngineError> {
    if collateral_token.is_zero() || debt_token.is_zero() {
        return Err(EngineError::ZeroAddress);
    }
    if debt.is_zero() {
        return Err(EngineError::ZeroAmount);
    }
    if debt.token != debt_token {
        return Err(EngineError::TokenMismatch {
            expected: debt_token,
            actual: debt.token,
        });
    }

    let collateral_quote = oracle.get_price(collateral_token)?;
    let debt_quote = oracle.get_price(debt_token)?;
    if collateral_quote.price.is_zero() || debt_quote.price.is_zero() {
        return Err(EngineError::InvalidPrices);
    }

    let collateral_config = pool.reserve_config(collateral_token)?;
    if collateral_config.ltv_bps == 0 {
        return Err(EngineError::AssetNotUsableAsCollateral {
            token: collateral_token,
        });
    }

    let debt_value = debt_quote.value_of(debt)?;
    let gross_value = mul_div(
        debt_value,
        U256::from(BPS),
        U256::from(collateral_config.ltv_bps),
        "unwind ratio",
    )?;
    let base_units = usd_to_token_units(
        gross_value,
        collateral_quote.price,
        collateral_config.decimals,
    )?;
    let buffered_units = with_buffer(base_units, slippage_buffer_bps)?;

    debug!(
        collateral = %collateral_token,
        debt = %debt_token,
        debt_value = %debt_value,
        base_units = %base_units,
        buffered_units = %buffered_units,
        "unwind sizing computed"
    );

    Ok(UnwindSizing {
        collateral_to_withdraw: TokenAmount::new(
            collateral_token,
            buffered_units,
            collateral_config.decimals,
        ),
        debt_amount: debt.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{pow10, unix_now};
    use crate::oracle::SimulatedFeed;
    use crate::sim::ledger::InMemoryLedger;
    use crate::sim::pool::SimulatedPool;
    use crate::types::ReserveConfig;
    use alloy::primitives::address;
    use std::cell::RefCell;
    use std::rc::Rc;

    const POOL: Address = address!("00000000000000000000000000000000000000D1");
    const A: Address = address!("0000000000000000000000000000000000000Aa1");
    const B: Address = address!("0000000000000000000000000000000000000Bb2");

    const USD: u64 = 100_000_000;

    fn units(n: u64) -> U256 {
        U256::from(n) * pow10(18)
    }

    fn setup(ltv_bps: u32) -> (FeedRegistry, SimulatedPool) {
        let now = unix_now();
        let mut oracle = FeedRegistry::new(1_800);
        oracle
            .set_feed(A, Rc::new(SimulatedFeed::fresh(8, USD as i128, now)), 3_600)
            .unwrap();
        oracle
            .set_feed(B, Rc::new(SimulatedFeed::fresh(8, USD as i128, now)), 3_600)
            .unwrap();

        let ledger = Rc::new(RefCell::new(InMemoryLedger::new()));
        let mut pool = SimulatedPool::new(POOL, 0, ledger);
        let config = |ltv| ReserveConfig {
            decimals: 18,
            ltv_bps: ltv,
            liquidation_threshold_bps: 8_500,
            active: true,
            frozen: false,
            borrow_cap: U256::ZERO,
            supply_cap: U256::ZERO,
        };
        pool.add_reserve(A, config(ltv_bps), U256::from(USD));
        pool.add_reserve(B, config(ltv_bps), U256::from(USD));
        (oracle, pool)
    }

    #[test]
    fn test_open_three_x_at_eighty_ltv() {
        let (oracle, pool) = setup(8_000);
        let user = TokenAmount::new(A, units(1000), 18);
        let sizing =
            compute_open_sizing(&oracle, &pool, A, B, dec!(3), &user).unwrap();

        // $1000 at 3x → total $3000, borrow $2000, flash 2000 A.
        assert_eq!(sizing.total_collateral_value_usd, U256::from(3000 * USD));
        assert_eq!(sizing.borrow_value_usd, U256::from(2000 * USD));
        assert_eq!(sizing.flash_loan_amount.raw, units(2000));
        assert_eq!(sizing.borrow_amount.raw, units(2000));
    }

    #[test]
    fn test_open_borrow_priced_in_borrow_token() {
        let now = unix_now();
        let (mut oracle, pool) = setup(8_000);
        // B trades at $2.
        oracle
            .set_feed(B, Rc::new(SimulatedFeed::fresh(8, 2 * USD as i128, now)), 3_600)
            .unwrap();
        let user = TokenAmount::new(A, units(1000), 18);
        let sizing =
            compute_open_sizing(&oracle, &pool, A, B, dec!(3), &user).unwrap();
        // $2000 of borrow at $2 each = 1000 B.
        assert_eq!(sizing.borrow_amount.raw, units(1000));
    }

    #[test]
    fn test_open_borrow_ratio_within_ltv() {
        let (oracle, pool) = setup(8_000);
        let user = TokenAmount::new(A, units(1000), 18);
        for leverage in [dec!(1.5), dec!(2), dec!(3), dec!(4.5), dec!(5)] {
            let sizing =
                compute_open_sizing(&oracle, &pool, A, B, leverage, &user).unwrap();
            let lhs = sizing.borrow_value_usd * U256::from(BPS);
            let rhs = sizing.total_collateral_value_usd * U256::from(8_000u32);
            assert!(lhs <= rhs, "ratio above LTV at {leverage}x");
        }
    }

    #[test]
    fn test_open_excessive_leverage_rejected() {
        let (oracle, pool) = setup(8_000);
        let user = TokenAmount::new(A, units(1000), 18);
        // 1/(1-0.8) = 5x is the cap; 6x must fail.
        let err = compute_open_sizing(&oracle, &pool, A, B, dec!(6), &user).unwrap_err();
        assert!(matches!(err, EngineError::ExcessiveLeverage { .. }));
    }

    #[test]
    fn test_open_sub_one_leverage_rejected() {
        let (oracle, pool) = setup(8_000);
        let user = TokenAmount::new(A, units(1000), 18);
        let err = compute_open_sizing(&oracle, &pool, A, B, dec!(0.5), &user).unwrap_err();
        assert!(matches!(err, EngineError::InvalidLeverage { .. }));
    }

    #[test]
    fn test_open_zero_ltv_not_collateral() {
        let (oracle, pool) = setup(0);
        let user = TokenAmount::new(A, units(1000), 18);
        let err = compute_open_sizing(&oracle, &pool, A, B, dec!(2), &user).unwrap_err();
        assert!(matches!(err, EngineError::AssetNotUsableAsCollateral { .. }));
    }

    #[test]
    fn test_open_stale_price_no_sizing() {
        let now = unix_now();
        let (mut oracle, pool) = setup(8_000);
        oracle
            .set_feed(
                A,
                Rc::new(SimulatedFeed::fresh(8, USD as i128, now.saturating_sub(7_200))),
                3_600,
            )
            .unwrap();
        let user = TokenAmount::new(A, units(1000), 18);
        let err = compute_open_sizing(&oracle, &pool, A, B, dec!(3), &user).unwrap_err();
        assert!(matches!(err, EngineError::StalePrice { .. }));
    }

    #[test]
    fn test_unwind_concrete_scenario() {
        let (oracle, pool) = setup(8_000);
        // Debt 1000 B at $1, LTV 80%, collateral at $1:
        // base 1250 A, with 5% buffer 1312.5 A.
        let debt = TokenAmount::new(B, units(1000), 18);
        let sizing = compute_unwind_sizing(&oracle, &pool, A, B, &debt, 500).unwrap();
        assert_eq!(
            sizing.collateral_to_withdraw.raw,
            U256::from(13125u64) * pow10(17)
        );
        assert_eq!(sizing.debt_amount, debt);
    }

    #[test]
    fn test_unwind_zero_buffer_is_exact_ratio() {
        let (oracle, pool) = setup(8_000);
        let debt = TokenAmount::new(B, units(1000), 18);
        let sizing = compute_unwind_sizing(&oracle, &pool, A, B, &debt, 0).unwrap();
        assert_eq!(sizing.collateral_to_withdraw.raw, units(1250));
    }

    #[test]
    fn test_unwind_stale_price_rejected() {
        let now = unix_now();
        let (mut oracle, pool) = setup(8_000);
        oracle
            .set_feed(
                B,
                Rc::new(SimulatedFeed::fresh(8, USD as i128, now.saturating_sub(7_200))),
                3_600,
            )
            .unwrap();
        let debt = TokenAmount::new(B, units(1000), 18);
        let err = compute_unwind_sizing(&oracle, &pool, A, B, &debt, 500).unwrap_err();
        assert!(matches!(err, EngineError::StalePrice { .. }));
    }

    #[test]
    fn test_unwind_zero_debt_rejected() {
        let (oracle, pool) = setup(8_000);
        let debt = TokenAmount::zero(B, 18);
        let err = compute_unwind_sizing(&oracle, &pool, A, B, &debt, 500).unwrap_err();
        assert!(matches!(err, EngineError::ZeroAmount));
    }

    #[test]
    fn test_unwind_zero_ltv_rejected() {
        let (oracle, pool) = setup(0);
        let debt = TokenAmount::new(B, units(1000), 18);
        let err = compute_unwind_sizing(&oracle, &pool, A, B, &debt, 500).unwrap_err();
        assert!(matches!(err, EngineError::AssetNotUsableAsCollateral { .. }));
    }

    #[test]
    fn test_same_token_sizing_supported() {
        let (oracle, pool) = setup(8_000);
        let user = TokenAmount::new(A, units(1000), 18);
        let sizing = compute_open_sizing(&oracle, &pool, A, A, dec!(2), &user).unwrap();
        assert_eq!(sizing.flash_loan_amount.raw, units(1000));
        assert_eq!(sizing.borrow_amount.raw, units(1000));
    }
}
