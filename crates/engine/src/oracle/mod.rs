//! Price oracle adapter.
//!
//! Wraps a registry of external price feeds and returns validated
//! [`PriceQuote`]s. A failed read always propagates as a typed failure —
//! no default or zero price ever flows into sizing math.

pub mod feed;

use std::collections::HashMap;
use std::rc::Rc;

use alloy::primitives::{Address, U256};
use tracing::debug;

use crate::constants::{MAX_FEED_BATCH, USD_DECIMALS};
use crate::errors::EngineError;
use crate::math::{pow10, unix_now};
use crate::types::PriceQuote;

pub use feed::{PriceFeed, RoundData, SimulatedFeed};

struct FeedEntry {
    feed: Rc<dyn PriceFeed>,
    /// Maximum accepted age of the feed's last update, seconds.
    max_age_seconds: u64,
}

/// Token → feed registry with liveness validation.
///
/// Admin mutation is owner-gated at the orchestrator; the registry itself
/// enforces structural limits (batch size, slice lengths).
pub struct FeedRegistry {
    feeds: HashMap<Address, FeedEntry>,
    /// Optional sequencer status feed: answer 0 = up, anything else = down;
    /// `started_at` marks when the current status began.
    sequencer: Option<Rc<dyn PriceFeed>>,
    grace_period_seconds: u64,
}

impl FeedRegistry {
    pub fn new(grace_period_seconds: u64) -> Self {
        Self {
            feeds: HashMap::new(),
            sequencer: None,
            grace_period_seconds,
        }
    }

    pub fn set_feed(
        &mut self,
        token: Address,
        feed: Rc<dyn PriceFeed>,
        max_age_seconds: u64,
    ) -> Result<(), EngineError> {
        if token.is_zero() {
            return Err(EngineError::ZeroAddress);
        }
        debug!(token = %token, max_age_seconds, "feed registered");
        self.feeds.insert(
            token,
            FeedEntry {
                feed,
                max_age_seconds,
            },
        );
        Ok(())
    }

    /// Batched registration. Rejects mismatched slice lengths and batches
    /// above [`MAX_FEED_BATCH`] before touching the registry.
    pub fn set_feeds(
        &mut self,
        tokens: &[Address],
        feeds: Vec<Rc<dyn PriceFeed>>,
        max_ages_seconds: &[u64],
    ) -> Result<(), EngineError> {
        if tokens.len() != feeds.len() {
            return Err(EngineError::LengthMismatch {
                left: tokens.len(),
                right: feeds.len(),
            });
        }
        if tokens.len() != max_ages_seconds.len() {
            return Err(EngineError::LengthMismatch {
                left: tokens.len(),
                right: max_ages_seconds.len(),
            });
        }
        if tokens.len() > MAX_FEED_BATCH {
            return Err(EngineError::BatchTooLarge {
                len: tokens.len(),
                max: MAX_FEED_BATCH,
            });
        }
        if tokens.iter().any(|t| t.is_zero()) {
            return Err(EngineError::ZeroAddress);
        }
        for ((token, feed), max_age) in tokens.iter().zip(feeds).zip(max_ages_seconds) {
            self.set_feed(*token, feed, *max_age)?;
        }
        Ok(())
    }

    pub fn set_sequencer_feed(&mut self, feed: Rc<dyn PriceFeed>) {
        self.sequencer = Some(feed);
    }

    /// Validated price read for `token`, normalized to 8-decimal USD.
    pub fn get_price(&self, token: Address) -> Result<PriceQuote, EngineError> {
        let now = unix_now();
        self.check_sequencer(now)?;

        let entry = self
            .feeds
            .get(&token)
            .ok_or(EngineError::FeedNotConfigured { token })?;
        let round = entry.feed.latest_round()?;

        if round.answer <= 0 {
            return Err(EngineError::InvalidPrice {
                token,
                answer: round.answer,
            });
        }
        // An unset update timestamp or a lagging answer marks the round as
        // not yet complete.
        if round.updated_at == 0 || round.answered_in_round < round.round_id {
            return Err(EngineError::IncompleteRound {
                token,
                round_id: round.round_id,
                answered_in_round: round.answered_in_round,
            });
        }
        let age = now.saturating_sub(round.updated_at);
        if age > entry.max_age_seconds {
            return Err(EngineError::StalePrice {
                token,
                age_seconds: age,
                max_seconds: entry.max_age_seconds,
            });
        }

        let price = normalize_price(round.answer as u128, entry.feed.decimals());
        Ok(PriceQuote {
            token,
            price,
            updated_at: round.updated_at,
        })
    }

    /// Reject reads during a sequencer outage or within the grace period
    /// after recovery. No-op when no sequencer feed is configured.
    fn check_sequencer(&self, now: u64) -> Result<(), EngineError> {
        let Some(feed) = &self.sequencer else {
            return Ok(());
        };
        let round = feed.latest_round()?;
        if round.answer != 0 {
            return Err(EngineError::SequencerDown);
        }
        let since = now.saturating_sub(round.started_at);
        if since < self.grace_period_seconds {
            return Err(EngineError::GracePeriodActive {
                since_seconds: since,
                grace_seconds: self.grace_period_seconds,
            });
        }
        Ok(())
    }
}

/// Rescale a positive feed answer to the canonical 8-decimal USD precision.
fn normalize_price(answer: u128, feed_decimals: u8) -> U256 {
    let raw = U256::from(answer);
    if feed_decimals > USD_DECIMALS {
        raw / pow10(feed_decimals - USD_DECIMALS)
    } else {
        raw * pow10(USD_DECIMALS - feed_decimals)
    }
}
