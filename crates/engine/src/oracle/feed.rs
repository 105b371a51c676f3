use std::cell::Cell;

use crate::errors::EngineError;

/// One round of data from a price feed, Chainlink-shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundData {
    pub round_id: u64,
    /// Signed answer in the feed's own precision. Non-positive answers are
    /// rejected by the registry.
    pub answer: i128,
    /// When the round started (unix seconds). For a sequencer status feed
    /// this is the moment the reported status began.
    pub started_at: u64,
    /// When the answer was last updated (unix seconds).
    pub updated_at: u64,
    pub answered_in_round: u64,
}

/// Read-only price feed. The registry layers all validation on top; a feed
/// implementation only reports what it has.
pub trait PriceFeed {
    fn latest_round(&self) -> Result<RoundData, EngineError>;
    /// Precision of `answer`.
    fn decimals(&self) -> u8;
}

/// In-memory feed with settable rounds. Used by the simulation harness and
/// tests; interior mutability keeps the [`PriceFeed`] surface read-only.
#[derive(Debug)]
pub struct SimulatedFeed {
    decimals: u8,
    round: Cell<RoundData>,
}

impl SimulatedFeed {
    pub fn new(decimals: u8, round: RoundData) -> Self {
        Self {
            decimals,
            round: Cell::new(round),
        }
    }

    /// A healthy feed answering `answer` as of `now`.
    pub fn fresh(decimals: u8, answer: i128, now: u64) -> Self {
        Self::new(
            decimals,
            RoundData {
                round_id: 1,
                answer,
                started_at: now,
                updated_at: now,
                answered_in_round: 1,
            },
        )
    }

    pub fn set_round(&self, round: RoundData) {
        self.round.set(round);
    }

    pub fn set_answer(&self, answer: i128, updated_at: u64) {
        let mut round = self.round.get();
        round.round_id += 1;
        round.answered_in_round = round.round_id;
        round.answer = answer;
        round.updated_at = updated_at;
        self.round.set(round);
    }
}

impl PriceFeed for SimulatedFeed {
    fn latest_round(&self) -> Result<RoundData, EngineError> {
        Ok(self.round.get())
    }

    fn decimals(&self) -> u8 {
        self.decimals
    }
}
