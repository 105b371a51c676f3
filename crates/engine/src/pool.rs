use alloy::primitives::{Address, U256};

use crate::errors::EngineError;
use crate::types::{AccountData, RateMode, ReserveConfig};

/// Terms of an in-flight flash loan, as reported by the invoking pool.
///
/// Nothing in here is trusted until the receiver has verified `pool` against
/// its configured pool address and `initiator` against itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashLoanTerms {
    /// Address of the pool invoking the callback.
    pub pool: Address,
    pub asset: Address,
    pub amount: U256,
    pub premium: U256,
    /// The account that requested the flash loan.
    pub initiator: Address,
}

/// Inbound flash loan callback.
pub trait FlashLoanReceiver {
    /// Invoked by the pool while the loaned funds sit with the initiator.
    /// On return the pool pulls `amount + premium` back; failing that, the
    /// whole unit of work is discarded.
    fn on_flash_loan(
        &mut self,
        pool: &mut dyn LendingPool,
        terms: FlashLoanTerms,
        params: &[u8],
    ) -> Result<(), EngineError>;
}

/// External lending pool collaborator.
///
/// Explicit `caller` parameters stand in for ambient caller identity.
/// Frozen or inactive reserves, exceeded caps, and insufficient liquidity are
/// expected, recoverable failure modes — never unreachable states.
pub trait LendingPool {
    fn address(&self) -> Address;

    fn supply(
        &mut self,
        caller: Address,
        asset: Address,
        amount: U256,
        on_behalf_of: Address,
    ) -> Result<(), EngineError>;

    fn borrow(
        &mut self,
        caller: Address,
        asset: Address,
        amount: U256,
        rate_mode: RateMode,
        on_behalf_of: Address,
    ) -> Result<(), EngineError>;

    /// Repays up to the outstanding debt; returns the amount actually repaid.
    fn repay(
        &mut self,
        caller: Address,
        asset: Address,
        amount: U256,
        rate_mode: RateMode,
        on_behalf_of: Address,
    ) -> Result<U256, EngineError>;

    /// Withdraws up to the requested amount, bounded by the caller's supplied
    /// balance, available liquidity, and position health; returns the amount
    /// actually withdrawn.
    fn withdraw(
        &mut self,
        caller: Address,
        asset: Address,
        amount: U256,
        to: Address,
    ) -> Result<U256, EngineError>;

    fn reserve_config(&self, asset: Address) -> Result<ReserveConfig, EngineError>;

    fn account_data(&self, user: Address) -> Result<AccountData, EngineError>;

    fn flash_loan_premium_bps(&self) -> u32;

    /// Draws `amount` of `asset` to `initiator`, invokes the receiver's
    /// callback, then pulls `amount + premium` back within the same unit of
    /// work. Any callback failure propagates unchanged.
    fn flash_loan(
        &mut self,
        receiver: &mut dyn FlashLoanReceiver,
        initiator: Address,
        asset: Address,
        amount: U256,
        params: Vec<u8>,
    ) -> Result<(), EngineError>;
}
