use std::collections::HashMap;

use alloy::primitives::{Address, U256};

use crate::constants::BPS;
use crate::errors::EngineError;
use crate::ledger::TokenLedger;

#[derive(Debug, Clone, Copy)]
struct TokenInfo {
    decimals: u8,
    /// Transfer fee burned on every move, basis points. Zero for normal
    /// tokens; non-zero models fee-on-transfer tokens.
    transfer_fee_bps: u32,
}

/// In-memory ERC20-style ledger for the simulation harness.
///
/// Cloneable so the atomic scope can snapshot and restore the whole balance
/// table.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    tokens: HashMap<Address, TokenInfo>,
    balances: HashMap<(Address, Address), U256>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_token(&mut self, token: Address, decimals: u8, transfer_fee_bps: u32) {
        self.tokens.insert(
            token,
            TokenInfo {
                decimals,
                transfer_fee_bps,
            },
        );
    }

    pub fn mint(&mut self, token: Address, to: Address, amount: U256) {
        let entry = self.balances.entry((token, to)).or_insert(U256::ZERO);
        *entry += amount;
    }

    fn info(&self, token: Address) -> Result<TokenInfo, EngineError> {
        self.tokens
            .get(&token)
            .copied()
            .ok_or(EngineError::UnknownToken { token })
    }
}

impl TokenLedger for InMemoryLedger {
    fn decimals(&self, token: Address) -> Result<u8, EngineError> {
        Ok(self.info(token)?.decimals)
    }

    fn balance_of(&self, token: Address, owner: Address) -> U256 {
        self.balances
            .get(&(token, owner))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    fn transfer(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<U256, EngineError> {
        let info = self.info(token)?;
        let have = self.balance_of(token, from);
        if have < amount {
            return Err(EngineError::InsufficientBalance {
                token,
                have,
                need: amount,
            });
        }
        let fee = amount * U256::from(info.transfer_fee_bps) / U256::from(BPS);
        let received = amount - fee;

        self.balances.insert((token, from), have - amount);
        let to_balance = self.balance_of(token, to);
        self.balances.insert((token, to), to_balance + received);
        Ok(received)
    }
}
