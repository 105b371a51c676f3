//! Swap execution adapter.
//!
//! Forwards a pre-built, opaque instruction to the external swap venue and
//! reconciles the realized output. Venues that report an explicit output are
//! taken at their word; venues that return nothing fall back to a balance
//! delta measured on the *received* token — never the spent one, which would
//! produce a near-zero reading and spurious failures on successful swaps.

use std::cell::RefCell;
use std::rc::Rc;

use alloy::primitives::{Address, U256};
use tracing::debug;

use crate::errors::EngineError;
use crate::ledger::TokenLedger;
use crate::types::SwapInstruction;

/// External swap aggregator collaborator.
pub trait SwapVenue {
    fn address(&self) -> Address;

    /// Execute the instruction for `caller`. Returns `Some(realized)` when
    /// the venue reports an output amount, `None` when it does not (forcing
    /// the adapter's balance-delta fallback). Native value, when present in
    /// the instruction, moves through the ledger like any token.
    fn execute(
        &mut self,
        caller: Address,
        instruction: &SwapInstruction,
    ) -> Result<Option<U256>, EngineError>;
}

/// Adapter in front of the venue: whitelist, dispatch, reconciliation.
pub struct SwapExecutor {
    venue: Rc<RefCell<dyn SwapVenue>>,
    ledger: Rc<RefCell<dyn TokenLedger>>,
    /// Approved venue addresses; empty means any venue is accepted.
    approved_venues: Vec<Address>,
}

impl SwapExecutor {
    pub fn new(
        venue: Rc<RefCell<dyn SwapVenue>>,
        ledger: Rc<RefCell<dyn TokenLedger>>,
        approved_venues: Vec<Address>,
    ) -> Self {
        Self {
            venue,
            ledger,
            approved_venues,
        }
    }

    /// Execute `instruction` and return the realized amount of `output_token`
    /// credited to `caller`.
    pub fn execute_swap(
        &self,
        caller: Address,
        instruction: &SwapInstruction,
        output_token: Address,
        min_output: U256,
    ) -> Result<U256, EngineError> {
        if !self.approved_venues.is_empty() && !self.approved_venues.contains(&instruction.venue) {
            return Err(EngineError::UnapprovedVenue {
                venue: instruction.venue,
            });
        }

        let balance_before = self.ledger.borrow().balance_of(output_token, caller);

        let reported = self.venue.borrow_mut().execute(caller, instruction)?;

        let realized = match reported {
            Some(amount) => amount,
            None => {
                // Fallback: measure what actually arrived.
                let balance_after = self.ledger.borrow().balance_of(output_token, caller);
                balance_after.saturating_sub(balance_before)
            }
        };

        debug!(
            venue = %instruction.venue,
            token_in = %instruction.token_in,
            amount_in = %instruction.amount_in,
            output_token = %output_token,
            realized = %realized,
            explicit = reported.is_some(),
            "swap executed"
        );

        if realized < min_output {
            return Err(EngineError::InsufficientOutput {
                realized,
                min: min_output,
            });
        }
        Ok(realized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::pow10;
    use crate::sim::ledger::InMemoryLedger;
    use crate::sim::venue::SimulatedVenue;
    use alloy::primitives::address;

    const ENGINE: Address = address!("00000000000000000000000000000000000000E1");
    const VENUE: Address = address!("00000000000000000000000000000000000000F1");
    const A: Address = address!("0000000000000000000000000000000000000Aa1");
    const B: Address = address!("0000000000000000000000000000000000000Bb2");

    fn setup(report_output: bool) -> (SwapExecutor, Rc<RefCell<InMemoryLedger>>) {
        let ledger = Rc::new(RefCell::new(InMemoryLedger::new()));
        {
            let mut l = ledger.borrow_mut();
            l.register_token(A, 18, 0);
            l.register_token(B, 18, 0);
            l.mint(B, ENGINE, U256::from(2000u64) * pow10(18));
            l.mint(A, VENUE, U256::from(10_000u64) * pow10(18));
        }
        let mut venue = SimulatedVenue::new(VENUE, Rc::clone(&ledger));
        venue.set_rate(B, A, U256::from(1_000_000_000_000_000_000u128)); // 1:1
        venue.set_report_output(report_output);
        let venue: Rc<RefCell<dyn SwapVenue>> = Rc::new(RefCell::new(venue));
        let ledger_dyn: Rc<RefCell<dyn TokenLedger>> = ledger.clone();
        let executor = SwapExecutor::new(venue, ledger_dyn, vec![]);
        (executor, ledger)
    }

    fn instruction(amount_in: U256) -> SwapInstruction {
        SwapInstruction {
            venue: VENUE,
            token_in: B,
            amount_in,
            calldata: SimulatedVenue::encode_order(A),
            native_value: U256::ZERO,
        }
    }

    #[test]
    fn test_explicit_output_used() {
        let (executor, ledger) = setup(true);
        let amount = U256::from(2000u64) * pow10(18);
        let realized = executor
            .execute_swap(ENGINE, &instruction(amount), A, U256::ZERO)
            .unwrap();
        assert_eq!(realized, amount);
        assert_eq!(ledger.borrow().balance_of(A, ENGINE), amount);
    }

    #[test]
    fn test_balance_delta_fallback_measures_received_token() {
        let (executor, ledger) = setup(false);
        // Pre-existing output-token balance must not distort the delta.
        ledger
            .borrow_mut()
            .mint(A, ENGINE, U256::from(500u64) * pow10(18));
        let amount = U256::from(2000u64) * pow10(18);
        let realized = executor
            .execute_swap(ENGINE, &instruction(amount), A, U256::ZERO)
            .unwrap();
        assert_eq!(realized, amount);
    }

    #[test]
    fn test_insufficient_output() {
        let (executor, _) = setup(true);
        let amount = U256::from(2000u64) * pow10(18);
        let err = executor
            .execute_swap(ENGINE, &instruction(amount), A, amount + U256::from(1u64))
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientOutput { .. }));
    }

    #[test]
    fn test_venue_failure_propagates() {
        let (executor, ledger) = setup(true);
        // A venue with no liquidity in the output token fails the low-level call.
        let drained = ledger.borrow().balance_of(A, VENUE);
        ledger
            .borrow_mut()
            .transfer(A, VENUE, ENGINE, drained)
            .unwrap();
        let amount = U256::from(2000u64) * pow10(18);
        let err = executor
            .execute_swap(ENGINE, &instruction(amount), A, U256::ZERO)
            .unwrap_err();
        assert!(matches!(err, EngineError::SwapFailed { .. }));
    }

    #[test]
    fn test_unapproved_venue_rejected() {
        let ledger = Rc::new(RefCell::new(InMemoryLedger::new()));
        let venue = SimulatedVenue::new(VENUE, Rc::clone(&ledger));
        let ledger_dyn: Rc<RefCell<dyn TokenLedger>> = ledger.clone();
        let executor = SwapExecutor::new(
            Rc::new(RefCell::new(venue)),
            ledger_dyn,
            vec![address!("00000000000000000000000000000000000000F2")],
        );
        let err = executor
            .execute_swap(ENGINE, &instruction(U256::from(1u64)), A, U256::ZERO)
            .unwrap_err();
        assert!(matches!(err, EngineError::UnapprovedVenue { .. }));
    }
}
