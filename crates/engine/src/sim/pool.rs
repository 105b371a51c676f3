use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use alloy::primitives::{Address, U256};
use tracing::debug;

use crate::constants::{BPS, WAD};
use crate::errors::EngineError;
use crate::ledger::TokenLedger;
use crate::math::{mul_div, pow10};
use crate::pool::{FlashLoanReceiver, FlashLoanTerms, LendingPool};
use crate::sim::ledger::InMemoryLedger;
use crate::types::{AccountData, RateMode, ReserveConfig};

#[derive(Debug, Clone)]
struct Reserve {
    config: ReserveConfig,
    total_supplied: U256,
    total_borrowed: U256,
    /// The pool's own oracle view, USD 8 decimals.
    price: U256,
}

/// Mutable pool state, snapshotted by the atomic scope.
#[derive(Debug, Clone, Default)]
pub struct PoolState {
    reserves: HashMap<Address, Reserve>,
    supplied: HashMap<(Address, Address), U256>,
    borrowed: HashMap<(Address, Address), U256>,
}

/// In-memory lending pool for the simulation harness.
///
/// Implements supply/borrow/repay/withdraw with Aave-shaped semantics:
/// reserve activation and freeze flags, borrow/supply caps, liquidity limits,
/// loan-to-value borrowing capacity, health-bounded withdrawals, and flash
/// loans with a proportional premium and mandatory same-unit repayment.
pub struct SimulatedPool {
    address: Address,
    premium_bps: u32,
    ledger: Rc<RefCell<InMemoryLedger>>,
    state: PoolState,
}

impl SimulatedPool {
    pub fn new(address: Address, premium_bps: u32, ledger: Rc<RefCell<InMemoryLedger>>) -> Self {
        Self {
            address,
            premium_bps,
            ledger,
            state: PoolState::default(),
        }
    }

    pub fn add_reserve(&mut self, asset: Address, config: ReserveConfig, price: U256) {
        self.state.reserves.insert(
            asset,
            Reserve {
                config,
                total_supplied: U256::ZERO,
                total_borrowed: U256::ZERO,
                price,
            },
        );
    }

    pub fn set_price(&mut self, asset: Address, price: U256) {
        if let Some(reserve) = self.state.reserves.get_mut(&asset) {
            reserve.price = price;
        }
    }

    pub fn set_frozen(&mut self, asset: Address, frozen: bool) {
        if let Some(reserve) = self.state.reserves.get_mut(&asset) {
            reserve.config.frozen = frozen;
        }
    }

    pub fn supplied_of(&self, user: Address, asset: Address) -> U256 {
        self.state
            .supplied
            .get(&(user, asset))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    pub fn borrowed_of(&self, user: Address, asset: Address) -> U256 {
        self.state
            .borrowed
            .get(&(user, asset))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    pub(crate) fn snapshot_state(&self) -> PoolState {
        self.state.clone()
    }

    pub(crate) fn restore_state(&mut self, state: PoolState) {
        self.state = state;
    }

    fn reserve(&self, asset: Address) -> Result<&Reserve, EngineError> {
        self.state
            .reserves
            .get(&asset)
            .ok_or(EngineError::AssetNotListed { token: asset })
    }

    fn require_usable(&self, asset: Address) -> Result<&Reserve, EngineError> {
        let reserve = self.reserve(asset)?;
        if !reserve.config.active {
            return Err(EngineError::ReserveInactive { token: asset });
        }
        if reserve.config.frozen {
            return Err(EngineError::ReserveFrozen { token: asset });
        }
        Ok(reserve)
    }

    fn value_usd(&self, reserve: &Reserve, amount: U256) -> Result<U256, EngineError> {
        mul_div(
            amount,
            reserve.price,
            pow10(reserve.config.decimals),
            "pool value",
        )
    }

    /// (collateral USD, debt USD, risk-adjusted collateral USD at the
    /// liquidation threshold, borrow capacity USD at loan-to-value).
    fn account_values(&self, user: Address) -> Result<(U256, U256, U256, U256), EngineError> {
        let mut collateral = U256::ZERO;
        let mut debt = U256::ZERO;
        let mut adjusted = U256::ZERO;
        let mut capacity = U256::ZERO;

        for ((owner, asset), amount) in &self.state.supplied {
            if *owner != user || amount.is_zero() {
                continue;
            }
            let reserve = self.reserve(*asset)?;
            let value = self.value_usd(reserve, *amount)?;
            collateral += value;
            adjusted += mul_div(
                value,
                U256::from(reserve.config.liquidation_threshold_bps),
                U256::from(BPS),
                "adjusted collateral",
            )?;
            capacity += mul_div(
                value,
                U256::from(reserve.config.ltv_bps),
                U256::from(BPS),
                "borrow capacity",
            )?;
        }
        for ((owner, asset), amount) in &self.state.borrowed {
            if *owner != user || amount.is_zero() {
                continue;
            }
            let reserve = self.reserve(*asset)?;
            debt += self.value_usd(reserve, *amount)?;
        }
        Ok((collateral, debt, adjusted, capacity))
    }
}

impl LendingPool for SimulatedPool {
    fn address(&self) -> Address {
        self.address
    }

    fn supply(
        &mut self,
        caller: Address,
        asset: Address,
        amount: U256,
        on_behalf_of: Address,
    ) -> Result<(), EngineError> {
        if amount.is_zero() {
            return Err(EngineError::ZeroAmount);
        }
        let reserve = self.require_usable(asset)?;
        let cap = reserve.config.supply_cap;
        if cap > U256::ZERO && reserve.total_supplied + amount > cap {
            return Err(EngineError::SupplyCapExceeded { token: asset });
        }

        let received = self
            .ledger
            .borrow_mut()
            .transfer(asset, caller, self.address, amount)?;

        let reserve = self.state.reserves.get_mut(&asset).expect("reserve exists");
        reserve.total_supplied += received;
        let position = self
            .state
            .supplied
            .entry((on_behalf_of, asset))
            .or_insert(U256::ZERO);
        *position += received;

        debug!(asset = %asset, amount = %received, user = %on_behalf_of, "supplied");
        Ok(())
    }

    fn borrow(
        &mut self,
        caller: Address,
        asset: Address,
        amount: U256,
        _rate_mode: RateMode,
        on_behalf_of: Address,
    ) -> Result<(), EngineError> {
        if amount.is_zero() {
            return Err(EngineError::ZeroAmount);
        }
        let reserve = self.require_usable(asset)?;
        let cap = reserve.config.borrow_cap;
        if cap > U256::ZERO && reserve.total_borrowed + amount > cap {
            return Err(EngineError::BorrowCapExceeded { token: asset });
        }
        if self.ledger.borrow().balance_of(asset, self.address) < amount {
            return Err(EngineError::InsufficientLiquidity { token: asset });
        }

        let new_debt_value = self.value_usd(reserve, amount)?;
        let (_, debt, _, capacity) = self.account_values(on_behalf_of)?;
        if debt + new_debt_value > capacity {
            return Err(EngineError::InsufficientCollateral { token: asset });
        }

        self.ledger
            .borrow_mut()
            .transfer(asset, self.address, caller, amount)?;

        let reserve = self.state.reserves.get_mut(&asset).expect("reserve exists");
        reserve.total_borrowed += amount;
        let position = self
            .state
            .borrowed
            .entry((on_behalf_of, asset))
            .or_insert(U256::ZERO);
        *position += amount;

        debug!(asset = %asset, amount = %amount, user = %on_behalf_of, "borrowed");
        Ok(())
    }

    fn repay(
        &mut self,
        caller: Address,
        asset: Address,
        amount: U256,
        _rate_mode: RateMode,
        on_behalf_of: Address,
    ) -> Result<U256, EngineError> {
        if amount.is_zero() {
            return Err(EngineError::ZeroAmount);
        }
        self.reserve(asset)?;

        let outstanding = self.borrowed_of(on_behalf_of, asset);
        let actual = amount.min(outstanding);
        if actual.is_zero() {
            return Ok(U256::ZERO);
        }

        self.ledger
            .borrow_mut()
            .transfer(asset, caller, self.address, actual)?;

        let reserve = self.state.reserves.get_mut(&asset).expect("reserve exists");
        reserve.total_borrowed -= actual;
        self.state
            .borrowed
            .insert((on_behalf_of, asset), outstanding - actual);

        debug!(asset = %asset, amount = %actual, user = %on_behalf_of, "repaid");
        Ok(actual)
    }

    fn withdraw(
        &mut self,
        caller: Address,
        asset: Address,
        amount: U256,
        to: Address,
    ) -> Result<U256, EngineError> {
        if amount.is_zero() {
            return Err(EngineError::ZeroAmount);
        }
        let reserve = self.reserve(asset)?;
        let price = reserve.price;
        let decimals = reserve.config.decimals;
        let lt_bps = reserve.config.liquidation_threshold_bps;

        let supplied = self.supplied_of(caller, asset);
        let liquidity = self.ledger.borrow().balance_of(asset, self.address);
        let mut actual = amount.min(supplied).min(liquidity);

        // A withdrawal may not leave the remaining position below the
        // liquidation threshold; the request is clamped to the healthy
        // maximum, so callers must use the returned amount.
        let (_, debt, adjusted, _) = self.account_values(caller)?;
        if debt > U256::ZERO && lt_bps > 0 {
            let excess = adjusted.saturating_sub(debt);
            let max_value = mul_div(excess, U256::from(BPS), U256::from(lt_bps), "max withdraw")?;
            let max_units = mul_div(max_value, pow10(decimals), price, "max withdraw units")?;
            actual = actual.min(max_units);
        }

        if actual.is_zero() {
            return Err(EngineError::InsufficientCollateral { token: asset });
        }

        self.ledger
            .borrow_mut()
            .transfer(asset, self.address, to, actual)?;

        let reserve = self.state.reserves.get_mut(&asset).expect("reserve exists");
        reserve.total_supplied -= actual;
        self.state
            .supplied
            .insert((caller, asset), supplied - actual);

        debug!(asset = %asset, requested = %amount, actual = %actual, "withdrawn");
        Ok(actual)
    }

    fn reserve_config(&self, asset: Address) -> Result<ReserveConfig, EngineError> {
        Ok(self.reserve(asset)?.config)
    }

    fn account_data(&self, user: Address) -> Result<AccountData, EngineError> {
        let (collateral, debt, adjusted, capacity) = self.account_values(user)?;
        let health_factor = if debt.is_zero() {
            U256::MAX
        } else {
            mul_div(adjusted, WAD, debt, "health factor")?
        };
        let (ltv_bps, liquidation_threshold_bps) = if collateral.is_zero() {
            (0, 0)
        } else {
            (
                u32::try_from(mul_div(capacity, U256::from(BPS), collateral, "avg ltv")?)
                    .unwrap_or(u32::MAX),
                u32::try_from(mul_div(adjusted, U256::from(BPS), collateral, "avg lt")?)
                    .unwrap_or(u32::MAX),
            )
        };
        Ok(AccountData {
            total_collateral_usd: collateral,
            total_debt_usd: debt,
            ltv_bps,
            liquidation_threshold_bps,
            health_factor,
        })
    }

    fn flash_loan_premium_bps(&self) -> u32 {
        self.premium_bps
    }

    fn flash_loan(
        &mut self,
        receiver: &mut dyn FlashLoanReceiver,
        initiator: Address,
        asset: Address,
        amount: U256,
        params: Vec<u8>,
    ) -> Result<(), EngineError> {
        if amount.is_zero() {
            return Err(EngineError::ZeroAmount);
        }
        self.require_usable(asset)?;
        if self.ledger.borrow().balance_of(asset, self.address) < amount {
            return Err(EngineError::InsufficientLiquidity { token: asset });
        }

        let premium = mul_div(
            amount,
            U256::from(self.premium_bps),
            U256::from(BPS),
            "flash premium",
        )?;

        self.ledger
            .borrow_mut()
            .transfer(asset, self.address, initiator, amount)?;

        let terms = FlashLoanTerms {
            pool: self.address,
            asset,
            amount,
            premium,
            initiator,
        };
        debug!(asset = %asset, amount = %amount, premium = %premium, "flash loan drawn");

        receiver.on_flash_loan(self, terms, &params)?;

        let owed = amount + premium;
        self.ledger
            .borrow_mut()
            .transfer(asset, initiator, self.address, owed)
            .map_err(|_| EngineError::FlashLoanNotRepaid { token: asset, owed })?;

        debug!(asset = %asset, owed = %owed, "flash loan repaid");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::wad_to_decimal;
    use alloy::primitives::address;
    use rust_decimal_macros::dec;

    const POOL: Address = address!("00000000000000000000000000000000000000D1");
    const USER: Address = address!("0000000000000000000000000000000000000099");
    const A: Address = address!("0000000000000000000000000000000000000Aa1");
    const B: Address = address!("0000000000000000000000000000000000000Bb2");

    const USD: u64 = 100_000_000; // $1.00 in 8 decimals

    fn config(ltv_bps: u32, lt_bps: u32) -> ReserveConfig {
        ReserveConfig {
            decimals: 18,
            ltv_bps,
            liquidation_threshold_bps: lt_bps,
            active: true,
            frozen: false,
            borrow_cap: U256::ZERO,
            supply_cap: U256::ZERO,
        }
    }

    fn units(n: u64) -> U256 {
        U256::from(n) * pow10(18)
    }

    fn setup() -> (SimulatedPool, Rc<RefCell<InMemoryLedger>>) {
        let ledger = Rc::new(RefCell::new(InMemoryLedger::new()));
        {
            let mut l = ledger.borrow_mut();
            l.register_token(A, 18, 0);
            l.register_token(B, 18, 0);
            l.mint(A, USER, units(10_000));
            l.mint(B, POOL, units(100_000));
            l.mint(A, POOL, units(100_000));
        }
        let mut pool = SimulatedPool::new(POOL, 0, Rc::clone(&ledger));
        pool.add_reserve(A, config(8_000, 8_500), U256::from(USD));
        pool.add_reserve(B, config(8_000, 8_500), U256::from(USD));
        (pool, ledger)
    }

    #[test]
    fn test_supply_and_account_data() {
        let (mut pool, _) = setup();
        pool.supply(USER, A, units(1000), USER).unwrap();
        let data = pool.account_data(USER).unwrap();
        assert_eq!(data.total_collateral_usd, U256::from(1000u64 * USD));
        assert_eq!(data.total_debt_usd, U256::ZERO);
        assert_eq!(data.health_factor, U256::MAX);
        assert_eq!(data.ltv_bps, 8_000);
        assert_eq!(data.liquidation_threshold_bps, 8_500);
    }

    #[test]
    fn test_borrow_within_capacity() {
        let (mut pool, ledger) = setup();
        pool.supply(USER, A, units(1000), USER).unwrap();
        pool.borrow(USER, B, units(700), RateMode::Variable, USER)
            .unwrap();
        assert_eq!(ledger.borrow().balance_of(B, USER), units(700));
        let data = pool.account_data(USER).unwrap();
        // HF = 1000 * 0.85 / 700 ≈ 1.2143
        assert_eq!(wad_to_decimal(data.health_factor).round_dp(4), dec!(1.2143));
    }

    #[test]
    fn test_borrow_beyond_ltv_rejected() {
        let (mut pool, _) = setup();
        pool.supply(USER, A, units(1000), USER).unwrap();
        let err = pool
            .borrow(USER, B, units(801), RateMode::Variable, USER)
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientCollateral { .. }));
    }

    #[test]
    fn test_borrow_cap() {
        let (mut pool, _) = setup();
        pool.state.reserves.get_mut(&B).unwrap().config.borrow_cap = units(100);
        pool.supply(USER, A, units(1000), USER).unwrap();
        let err = pool
            .borrow(USER, B, units(101), RateMode::Variable, USER)
            .unwrap_err();
        assert!(matches!(err, EngineError::BorrowCapExceeded { .. }));
    }

    #[test]
    fn test_frozen_reserve_rejected() {
        let (mut pool, _) = setup();
        pool.set_frozen(A, true);
        let err = pool.supply(USER, A, units(1), USER).unwrap_err();
        assert!(matches!(err, EngineError::ReserveFrozen { .. }));
    }

    #[test]
    fn test_borrow_insufficient_liquidity() {
        let (mut pool, ledger) = setup();
        pool.supply(USER, A, units(1000), USER).unwrap();
        // Drain the pool's B inventory.
        let held = ledger.borrow().balance_of(B, POOL);
        ledger.borrow_mut().transfer(B, POOL, USER, held).unwrap();
        let err = pool
            .borrow(USER, B, units(10), RateMode::Variable, USER)
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientLiquidity { .. }));
    }

    #[test]
    fn test_repay_caps_at_outstanding_debt() {
        let (mut pool, ledger) = setup();
        pool.supply(USER, A, units(1000), USER).unwrap();
        pool.borrow(USER, B, units(500), RateMode::Variable, USER)
            .unwrap();
        // Give the user more B than owed.
        ledger.borrow_mut().mint(B, USER, units(1000));
        let actual = pool
            .repay(USER, B, units(800), RateMode::Variable, USER)
            .unwrap();
        assert_eq!(actual, units(500));
        assert_eq!(pool.borrowed_of(USER, B), U256::ZERO);
    }

    #[test]
    fn test_withdraw_clamped_by_health() {
        let (mut pool, _) = setup();
        pool.supply(USER, A, units(1000), USER).unwrap();
        pool.borrow(USER, B, units(500), RateMode::Variable, USER)
            .unwrap();
        // Healthy max: (1000*0.85 - 500) / 0.85 ≈ 411.76 A
        let actual = pool.withdraw(USER, A, units(600), USER).unwrap();
        assert!(actual < units(412));
        assert!(actual > units(411));
        let data = pool.account_data(USER).unwrap();
        assert!(data.health_factor >= WAD);
    }

    #[test]
    fn test_withdraw_free_when_debt_free() {
        let (mut pool, ledger) = setup();
        pool.supply(USER, A, units(1000), USER).unwrap();
        let actual = pool.withdraw(USER, A, units(1000), USER).unwrap();
        assert_eq!(actual, units(1000));
        assert_eq!(ledger.borrow().balance_of(A, USER), units(10_000));
    }

    #[test]
    fn test_flash_loan_repaid_with_premium() {
        let ledger = Rc::new(RefCell::new(InMemoryLedger::new()));
        {
            let mut l = ledger.borrow_mut();
            l.register_token(B, 18, 0);
            l.mint(B, POOL, units(100_000));
            // Pre-fund the borrower for the premium.
            l.mint(B, USER, units(10));
        }
        let mut pool = SimulatedPool::new(POOL, 5, Rc::clone(&ledger));
        pool.add_reserve(B, config(8_000, 8_500), U256::from(USD));

        struct Passive;
        impl FlashLoanReceiver for Passive {
            fn on_flash_loan(
                &mut self,
                _pool: &mut dyn LendingPool,
                _terms: FlashLoanTerms,
                _params: &[u8],
            ) -> Result<(), EngineError> {
                Ok(())
            }
        }

        pool.flash_loan(&mut Passive, USER, B, units(2000), vec![1])
            .unwrap();
        // 5 bps of 2000 = 1 unit premium retained by the pool.
        assert_eq!(
            ledger.borrow().balance_of(B, POOL),
            units(100_000) + units(1)
        );
        assert_eq!(ledger.borrow().balance_of(B, USER), units(9));
    }

    #[test]
    fn test_flash_loan_not_repaid() {
        let (mut pool, ledger) = setup();

        struct Thief {
            ledger: Rc<RefCell<InMemoryLedger>>,
        }
        impl FlashLoanReceiver for Thief {
            fn on_flash_loan(
                &mut self,
                _pool: &mut dyn LendingPool,
                terms: FlashLoanTerms,
                _params: &[u8],
            ) -> Result<(), EngineError> {
                // Move the loan somewhere the pool cannot pull it back from.
                let stash = address!("00000000000000000000000000000000000000CC");
                self.ledger.borrow_mut().transfer(
                    terms.asset,
                    terms.initiator,
                    stash,
                    terms.amount,
                )?;
                Ok(())
            }
        }

        let sink = address!("00000000000000000000000000000000000000AB");
        let mut thief = Thief {
            ledger: Rc::clone(&ledger),
        };
        let err = pool
            .flash_loan(&mut thief, sink, B, units(2000), vec![1])
            .unwrap_err();
        assert!(matches!(err, EngineError::FlashLoanNotRepaid { .. }));
    }
}
