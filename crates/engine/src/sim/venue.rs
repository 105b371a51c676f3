use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::constants::{NATIVE_ASSET, WAD};
use crate::errors::EngineError;
use crate::ledger::TokenLedger;
use crate::math::pow10;
use crate::sim::ledger::InMemoryLedger;
use crate::swap::SwapVenue;
use crate::types::SwapInstruction;

/// The payload a real aggregator would encode into calldata. The engine
/// never looks inside; only the venue decodes it.
#[derive(Debug, Serialize, Deserialize)]
struct RouteOrder {
    token_out: Address,
}

/// Mutable venue behavior, snapshotted by the atomic scope.
#[derive(Debug, Clone, Default)]
pub struct VenueState {
    /// (token_in, token_out) → WAD-scaled human exchange rate.
    rates: HashMap<(Address, Address), U256>,
    /// Report the realized output explicitly; `false` forces the adapter's
    /// balance-delta fallback.
    report_output: bool,
    /// When set, every call fails with this reason.
    fail_reason: Option<String>,
}

/// Simulated swap aggregator: fixed-rate routing against its own inventory.
pub struct SimulatedVenue {
    address: Address,
    ledger: Rc<RefCell<InMemoryLedger>>,
    state: VenueState,
}

impl SimulatedVenue {
    pub fn new(address: Address, ledger: Rc<RefCell<InMemoryLedger>>) -> Self {
        Self {
            address,
            ledger,
            state: VenueState {
                report_output: true,
                ..VenueState::default()
            },
        }
    }

    /// Build the opaque calldata a route to `token_out` would carry.
    pub fn encode_order(token_out: Address) -> Vec<u8> {
        serde_json::to_vec(&RouteOrder { token_out }).expect("route order serializes")
    }

    pub fn set_rate(&mut self, token_in: Address, token_out: Address, rate_wad: U256) {
        self.state.rates.insert((token_in, token_out), rate_wad);
    }

    pub fn set_report_output(&mut self, report: bool) {
        self.state.report_output = report;
    }

    pub fn set_fail_reason(&mut self, reason: Option<String>) {
        self.state.fail_reason = reason;
    }

    pub(crate) fn snapshot_state(&self) -> VenueState {
        self.state.clone()
    }

    pub(crate) fn restore_state(&mut self, state: VenueState) {
        self.state = state;
    }
}

impl SwapVenue for SimulatedVenue {
    fn address(&self) -> Address {
        self.address
    }

    fn execute(
        &mut self,
        caller: Address,
        instruction: &SwapInstruction,
    ) -> Result<Option<U256>, EngineError> {
        if let Some(reason) = &self.state.fail_reason {
            return Err(EngineError::SwapFailed {
                reason: reason.clone(),
            });
        }

        let order: RouteOrder =
            serde_json::from_slice(&instruction.calldata).map_err(|e| EngineError::SwapFailed {
                reason: format!("malformed route payload: {e}"),
            })?;

        let rate = self
            .state
            .rates
            .get(&(instruction.token_in, order.token_out))
            .copied()
            .ok_or_else(|| EngineError::SwapFailed {
                reason: format!(
                    "no route {} -> {}",
                    instruction.token_in, order.token_out
                ),
            })?;

        let (received, in_decimals, out_decimals) = {
            let mut ledger = self.ledger.borrow_mut();
            if instruction.native_value > U256::ZERO && instruction.token_in != NATIVE_ASSET {
                ledger.transfer(NATIVE_ASSET, caller, self.address, instruction.native_value)?;
            }
            let received =
                ledger.transfer(instruction.token_in, caller, self.address, instruction.amount_in)?;
            let in_decimals = ledger.decimals(instruction.token_in)?;
            let out_decimals = ledger.decimals(order.token_out)?;
            (received, in_decimals, out_decimals)
        };

        let scaled = received
            .checked_mul(rate)
            .ok_or(EngineError::ArithmeticOverflow {
                context: "venue quote",
            })?
            / WAD;
        let out = if out_decimals >= in_decimals {
            scaled
                .checked_mul(pow10(out_decimals - in_decimals))
                .ok_or(EngineError::ArithmeticOverflow {
                    context: "venue quote scale",
                })?
        } else {
            scaled / pow10(in_decimals - out_decimals)
        };

        let mut ledger = self.ledger.borrow_mut();
        if ledger.balance_of(order.token_out, self.address) < out {
            return Err(EngineError::SwapFailed {
                reason: "insufficient venue inventory".into(),
            });
        }
        let credited = ledger.transfer(order.token_out, self.address, caller, out)?;

        Ok(self.state.report_output.then_some(credited))
    }
}
