use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use thiserror::Error;

/// Typed error hierarchy for the leverage engine.
///
/// Library code returns specific variants; the binary wraps with
/// `anyhow::Context` for propagation. Every failure surfaces synchronously to
/// the operation's caller — there is no deferred error channel.
#[derive(Error, Debug)]
pub enum EngineError {
    // -- Input --------------------------------------------------------------
    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("address must not be zero")]
    ZeroAddress,

    #[error("array length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("batch of {len} entries exceeds maximum {max}")]
    BatchTooLarge { len: usize, max: usize },

    #[error("deadline {deadline} already passed (now {now})")]
    DeadlineExpired { deadline: u64, now: u64 },

    #[error("leverage {leverage}x is below the 1x minimum")]
    InvalidLeverage { leverage: Decimal },

    #[error("leverage {leverage}x exceeds configured maximum {max}x")]
    LeverageAboveCap { leverage: Decimal, max: Decimal },

    #[error("leverage {leverage}x implies a borrow ratio above the {ltv_bps} bps loan-to-value limit")]
    ExcessiveLeverage { leverage: Decimal, ltv_bps: u32 },

    #[error("fee of {bps} bps exceeds maximum {max} bps")]
    InvalidFee { bps: u32, max: u32 },

    #[error("caller {caller} is not the owner")]
    NotOwner { caller: Address },

    #[error("caller {caller} is not the pending owner")]
    NotPendingOwner { caller: Address },

    #[error("an operation is already in progress")]
    ReentrantCall,

    #[error("token precision mismatch: expected {expected} decimals, got {actual}")]
    PrecisionMismatch { expected: u8, actual: u8 },

    #[error("token mismatch: expected {expected}, got {actual}")]
    TokenMismatch { expected: Address, actual: Address },

    #[error("malformed request: {reason}")]
    InvalidRequest { reason: &'static str },

    // -- Oracle -------------------------------------------------------------
    #[error("no price feed configured for token {token}")]
    FeedNotConfigured { token: Address },

    #[error("feed for token {token} returned non-positive answer {answer}")]
    InvalidPrice { token: Address, answer: i128 },

    #[error("price for token {token} is {age_seconds}s old (max {max_seconds}s)")]
    StalePrice {
        token: Address,
        age_seconds: u64,
        max_seconds: u64,
    },

    #[error("feed for token {token} round incomplete: answered in {answered_in_round}, current {round_id}")]
    IncompleteRound {
        token: Address,
        round_id: u64,
        answered_in_round: u64,
    },

    #[error("sequencer is down")]
    SequencerDown,

    #[error("sequencer restarted {since_seconds}s ago, grace period is {grace_seconds}s")]
    GracePeriodActive {
        since_seconds: u64,
        grace_seconds: u64,
    },

    #[error("one or both prices are invalid for unwind sizing")]
    InvalidPrices,

    // -- External protocol --------------------------------------------------
    #[error("asset {token} is not listed on the lending pool")]
    AssetNotListed { token: Address },

    #[error("reserve {token} is not active")]
    ReserveInactive { token: Address },

    #[error("reserve {token} is frozen")]
    ReserveFrozen { token: Address },

    #[error("asset {token} cannot be used as collateral (zero loan-to-value)")]
    AssetNotUsableAsCollateral { token: Address },

    #[error("borrow cap exceeded for reserve {token}")]
    BorrowCapExceeded { token: Address },

    #[error("supply cap exceeded for reserve {token}")]
    SupplyCapExceeded { token: Address },

    #[error("insufficient liquidity in reserve {token}")]
    InsufficientLiquidity { token: Address },

    #[error("collateral cannot cover the requested operation on reserve {token}")]
    InsufficientCollateral { token: Address },

    #[error("insufficient balance of {token}: have {have}, need {need}")]
    InsufficientBalance {
        token: Address,
        have: U256,
        need: U256,
    },

    #[error("token {token} is not registered")]
    UnknownToken { token: Address },

    #[error("flash loan of {token} not repaid: {owed} owed")]
    FlashLoanNotRepaid { token: Address, owed: U256 },

    // -- Swap ---------------------------------------------------------------
    #[error("swap execution failed: {reason}")]
    SwapFailed { reason: String },

    #[error("swap output {realized} below minimum {min}")]
    InsufficientOutput { realized: U256, min: U256 },

    #[error("venue {venue} is not in the approved list")]
    UnapprovedVenue { venue: Address },

    // -- Reconciliation -----------------------------------------------------
    #[error("swap returned {available} but {owed} is owed for flash loan repayment")]
    InsufficientReturnForRepayment { available: U256, owed: U256 },

    #[error("resulting position health factor {health_factor} is below the required minimum {min}")]
    UnhealthyPosition {
        health_factor: Decimal,
        min: Decimal,
    },

    #[error("flash-loaned asset mismatch: expected {expected}, got {actual}")]
    AssetMismatch { expected: Address, actual: Address },

    #[error("flash loan callback rejected: {reason}")]
    UntrustedCallback { reason: String },

    #[error("flash loan context rejected: {reason}")]
    MalformedContext { reason: String },

    // -- Arithmetic ---------------------------------------------------------
    #[error("arithmetic overflow in {context}")]
    ArithmeticOverflow { context: &'static str },

    #[error("division by zero in {context}")]
    DivisionByZero { context: &'static str },
}
