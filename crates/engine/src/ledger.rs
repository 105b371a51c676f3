use alloy::primitives::{Address, U256};

use crate::errors::EngineError;

/// Token balance collaborator.
///
/// Stands in for the ERC20 layer: the engine, pool, and swap venue all move
/// funds through one ledger. `transfer` returns the amount actually credited
/// to the recipient, which is less than `amount` for fee-on-transfer tokens —
/// callers that need the received amount must use the return value, never the
/// requested amount. The native asset is a registered token at a reserved
/// address, so value moves in both directions through the same calls.
pub trait TokenLedger {
    fn decimals(&self, token: Address) -> Result<u8, EngineError>;

    fn balance_of(&self, token: Address, owner: Address) -> U256;

    /// Move `amount` from `from` to `to`; returns the amount received.
    fn transfer(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<U256, EngineError>;
}
