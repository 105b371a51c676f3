use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;
use crate::types::token::TokenAmount;

/// Pre-built swap routing for the external aggregator.
///
/// `calldata` is opaque to the engine; it is generated off-path and forwarded
/// verbatim. The venue must tolerate `amount_in` overriding any amount baked
/// into the payload, because the unwind flow substitutes the actually
/// withdrawn amount at execution time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapInstruction {
    pub venue: Address,
    pub token_in: Address,
    pub amount_in: U256,
    pub calldata: Vec<u8>,
    /// Native value forwarded with the call (zero for pure token swaps).
    pub native_value: U256,
}

/// Everything needed to open a leveraged position. Computed by the sizing
/// calculator, consumed once by the orchestrator, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRequest {
    /// Flash loan draw; token must equal the collateral token.
    pub flash_loan: TokenAmount,
    /// User collateral pulled into custody. Inside the flash-loan context
    /// this field carries the *actually received* amount.
    pub user_collateral: TokenAmount,
    pub borrow: TokenAmount,
    pub swap: SwapInstruction,
    pub min_swap_output: U256,
}

/// Everything needed to unwind (part of) a position. Same lifecycle as
/// [`OpenRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnwindRequest {
    pub collateral_to_withdraw: TokenAmount,
    pub debt: TokenAmount,
    pub swap: SwapInstruction,
    pub min_swap_output: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    Open(OpenRequest),
    Unwind(UnwindRequest),
}

/// The transient parameter bundle threaded through the flash loan callback.
///
/// Versioned tagged union: encoded immediately before the flash loan request,
/// decoded exactly once at callback entry, matched against the pending
/// `op_id` and then consumed. Unknown versions or kinds fail decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "v")]
pub enum FlashLoanContext {
    #[serde(rename = "1")]
    V1 {
        op_id: u64,
        caller: Address,
        operation: Operation,
    },
}

impl FlashLoanContext {
    pub fn encode(&self) -> Result<Vec<u8>, EngineError> {
        serde_json::to_vec(self).map_err(|e| EngineError::MalformedContext {
            reason: format!("encode: {e}"),
        })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EngineError> {
        if bytes.is_empty() {
            return Err(EngineError::MalformedContext {
                reason: "empty params".into(),
            });
        }
        serde_json::from_slice(bytes).map_err(|e| EngineError::MalformedContext {
            reason: format!("decode: {e}"),
        })
    }
}
