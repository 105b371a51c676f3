//! Leveraged-position orchestrator.
//!
//! Sequences lending-pool and swap-adapter calls inside the atomic scope of a
//! single flash loan, for both the open and unwind directions:
//!
//! open:   pull collateral → flash loan → supply → borrow → swap →
//!         reconcile → repay → health check
//! unwind: flash loan → repay debt → withdraw → swap → reconcile → repay
//!
//! Every operation runs under an exclusive lock and an [`AtomicScope`]; any
//! failed post-condition discards the whole unit of work. The lending pool is
//! the single source of truth for position state — nothing is cached across
//! calls.

use std::cell::RefCell;
use std::rc::Rc;

use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, warn};

use crate::admin::AdminState;
use crate::constants::{
    DEFAULT_MAX_LEVERAGE, DEFAULT_MIN_HEALTH_FACTOR, DEFAULT_SLIPPAGE_BUFFER_BPS, WAD,
};
use crate::errors::EngineError;
use crate::ledger::TokenLedger;
use crate::math::{apply_bps, unix_now, wad_to_decimal};
use crate::oracle::{FeedRegistry, PriceFeed};
use crate::pool::{FlashLoanReceiver, FlashLoanTerms, LendingPool};
use crate::scope::AtomicScope;
use crate::sizing::{self, OpenSizing, UnwindSizing};
use crate::swap::{SwapExecutor, SwapVenue};
use crate::types::{
    FlashLoanContext, OpenRequest, Operation, RateMode, TokenAmount, UnwindRequest,
};

/// Operator-tunable engine parameters, fixed at construction.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Minimum acceptable health factor after an open (must also strictly
    /// exceed 1.0, the pool's liquidation boundary).
    pub min_health_factor: Decimal,
    /// Hard cap on requested leverage.
    pub max_leverage: Decimal,
    /// Buffer added to unwind withdrawals for swap execution variance.
    pub slippage_buffer_bps: u32,
    /// Approved swap venues; empty accepts any venue.
    pub approved_venues: Vec<Address>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            min_health_factor: DEFAULT_MIN_HEALTH_FACTOR,
            max_leverage: DEFAULT_MAX_LEVERAGE,
            slippage_buffer_bps: DEFAULT_SLIPPAGE_BUFFER_BPS,
            approved_venues: Vec::new(),
        }
    }
}

/// What one completed operation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationOutcome {
    pub op_id: u64,
    pub flash_amount: U256,
    pub premium: U256,
    pub swap_output: U256,
    /// Excess over the flash repayment, re-supplied to the position.
    pub surplus: U256,
    pub health_factor: Decimal,
}

/// Values the callback hands back to the entry point.
struct CallbackReport {
    flash_amount: U256,
    premium: U256,
    swap_output: U256,
    surplus: U256,
}

pub struct Orchestrator {
    /// The engine's own account on the ledger and the pool.
    address: Address,
    /// Configured pool identity; callbacks from anyone else are rejected.
    pool_address: Address,
    admin: AdminState,
    settings: EngineSettings,
    oracle: FeedRegistry,
    pool: Rc<RefCell<dyn LendingPool>>,
    ledger: Rc<RefCell<dyn TokenLedger>>,
    swapper: SwapExecutor,
    scope: Rc<RefCell<dyn AtomicScope>>,
    /// Exclusive operation lock. Held from entry until the final
    /// success/failure determination; guards against reentry through the
    /// arbitrary external code behind the swap venue.
    in_flight: bool,
    /// Identifier of the context the current flash loan must carry. Taken
    /// (consumed) on first use, so a context can never be replayed.
    pending_op: Option<u64>,
    next_op_id: u64,
    report: Option<CallbackReport>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        address: Address,
        admin: AdminState,
        settings: EngineSettings,
        oracle: FeedRegistry,
        pool: Rc<RefCell<dyn LendingPool>>,
        ledger: Rc<RefCell<dyn TokenLedger>>,
        venue: Rc<RefCell<dyn SwapVenue>>,
        scope: Rc<RefCell<dyn AtomicScope>>,
    ) -> Self {
        let pool_address = pool.borrow().address();
        let swapper = SwapExecutor::new(
            venue,
            Rc::clone(&ledger),
            settings.approved_venues.clone(),
        );
        Self {
            address,
            pool_address,
            admin,
            settings,
            oracle,
            pool,
            ledger,
            swapper,
            scope,
            in_flight: false,
            pending_op: None,
            next_op_id: 1,
            report: None,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.admin.owner()
    }

    // -----------------------------------------------------------------------
    // Admin surface (owner-gated)
    // -----------------------------------------------------------------------

    pub fn propose_owner(&mut self, caller: Address, new_owner: Address) -> Result<(), EngineError> {
        self.admin.propose_owner(caller, new_owner)
    }

    pub fn accept_owner(&mut self, caller: Address) -> Result<(), EngineError> {
        self.admin.accept_owner(caller)
    }

    pub fn set_fee_bps(&mut self, caller: Address, fee_bps: u32) -> Result<(), EngineError> {
        self.admin.set_fee_bps(caller, fee_bps)
    }

    pub fn set_feed(
        &mut self,
        caller: Address,
        token: Address,
        feed: Rc<dyn PriceFeed>,
        max_age_seconds: u64,
    ) -> Result<(), EngineError> {
        self.admin.ensure_owner(caller)?;
        self.oracle.set_feed(token, feed, max_age_seconds)
    }

    pub fn set_feeds(
        &mut self,
        caller: Address,
        tokens: &[Address],
        feeds: Vec<Rc<dyn PriceFeed>>,
        max_ages_seconds: &[u64],
    ) -> Result<(), EngineError> {
        self.admin.ensure_owner(caller)?;
        self.oracle.set_feeds(tokens, feeds, max_ages_seconds)
    }

    pub fn set_sequencer_feed(
        &mut self,
        caller: Address,
        feed: Rc<dyn PriceFeed>,
    ) -> Result<(), EngineError> {
        self.admin.ensure_owner(caller)?;
        self.oracle.set_sequencer_feed(feed);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Read-only operator surface
    // -----------------------------------------------------------------------

    pub fn compute_open_sizing(
        &self,
        collateral_token: Address,
        borrow_token: Address,
        leverage: Decimal,
        user_collateral: &TokenAmount,
    ) -> Result<OpenSizing, EngineError> {
        if leverage > self.settings.max_leverage {
            return Err(EngineError::LeverageAboveCap {
                leverage,
                max: self.settings.max_leverage,
            });
        }
        sizing::compute_open_sizing(
            &self.oracle,
            &*self.pool.borrow(),
            collateral_token,
            borrow_token,
            leverage,
            user_collateral,
        )
    }

    pub fn compute_unwind_sizing(
        &self,
        collateral_token: Address,
        debt_token: Address,
        debt: &TokenAmount,
    ) -> Result<UnwindSizing, EngineError> {
        sizing::compute_unwind_sizing(
            &self.oracle,
            &*self.pool.borrow(),
            collateral_token,
            debt_token,
            debt,
            self.settings.slippage_buffer_bps,
        )
    }

    // -----------------------------------------------------------------------
    // State-mutating operator surface
    // -----------------------------------------------------------------------

    /// Open a leveraged position. Owner-gated; `deadline` is a unix timestamp
    /// bounding exposure to delayed execution.
    pub fn open_position(
        &mut self,
        caller: Address,
        request: OpenRequest,
        deadline: u64,
    ) -> Result<OperationOutcome, EngineError> {
        self.acquire_lock()?;
        let result = self.open_position_locked(caller, request, deadline);
        self.release_lock();
        result
    }

    /// Unwind (part of) the position by repaying `debt` through a flash loan.
    pub fn unwind_position(
        &mut self,
        caller: Address,
        request: UnwindRequest,
        deadline: u64,
    ) -> Result<OperationOutcome, EngineError> {
        self.acquire_lock()?;
        let result = self.unwind_position_locked(caller, request, deadline);
        self.release_lock();
        result
    }

    fn acquire_lock(&mut self) -> Result<(), EngineError> {
        if self.in_flight {
            return Err(EngineError::ReentrantCall);
        }
        self.in_flight = true;
        Ok(())
    }

    fn release_lock(&mut self) {
        self.in_flight = false;
        self.pending_op = None;
        self.report = None;
    }

    // -----------------------------------------------------------------------
    // Open flow
    // -----------------------------------------------------------------------

    fn open_position_locked(
        &mut self,
        caller: Address,
        request: OpenRequest,
        deadline: u64,
    ) -> Result<OperationOutcome, EngineError> {
        self.admin.ensure_owner(caller)?;
        self.check_deadline(deadline)?;
        self.validate_open_request(&request)?;

        let scope = Rc::clone(&self.scope);
        scope.borrow_mut().begin();
        match self.run_open(caller, request) {
            Ok(outcome) => {
                scope.borrow_mut().commit();
                Ok(outcome)
            }
            Err(e) => {
                scope.borrow_mut().revert();
                Err(e)
            }
        }
    }

    fn run_open(
        &mut self,
        caller: Address,
        mut request: OpenRequest,
    ) -> Result<OperationOutcome, EngineError> {
        let collateral = request.user_collateral.token;

        // Pull the stated collateral into custody; fee-on-transfer tokens
        // deliver less than requested, so only the received amount counts.
        let received = self.ledger.borrow_mut().transfer(
            collateral,
            caller,
            self.address,
            request.user_collateral.raw,
        )?;
        let fee = apply_bps(received, self.admin.fee_bps())?;
        if fee > U256::ZERO {
            self.ledger
                .borrow_mut()
                .transfer(collateral, self.address, self.admin.owner(), fee)?;
        }
        request.user_collateral.raw = received - fee;

        let op_id = self.begin_operation();
        let params = FlashLoanContext::V1 {
            op_id,
            caller,
            operation: Operation::Open(request.clone()),
        }
        .encode()?;

        info!(
            op_id,
            collateral = %collateral,
            user_amount = %request.user_collateral.raw,
            flash_amount = %request.flash_loan.raw,
            borrow = %request.borrow.raw,
            "opening position"
        );

        let engine = self.address;
        let pool_rc = Rc::clone(&self.pool);
        {
            // The pool RefCell stays mutably borrowed for the whole callback
            // chain; the callback works through the reference the pool hands
            // back, never through `self.pool`.
            let mut pool = pool_rc.borrow_mut();
            pool.flash_loan(
                self,
                engine,
                request.flash_loan.token,
                request.flash_loan.raw,
                params,
            )?;
        }

        let report = self.report.take().ok_or(EngineError::UntrustedCallback {
            reason: "flash loan completed without invoking the callback".into(),
        })?;

        // Primary defense against excessive leverage: the resulting live
        // position must clear the liquidation boundary and the configured
        // minimum.
        let account = pool_rc.borrow().account_data(self.address)?;
        let health_factor = wad_to_decimal(account.health_factor);
        let min = self.settings.min_health_factor.max(dec!(1));
        if account.health_factor <= WAD || health_factor < min {
            return Err(EngineError::UnhealthyPosition { health_factor, min });
        }

        info!(op_id, %health_factor, surplus = %report.surplus, "position opened");
        Ok(OperationOutcome {
            op_id,
            flash_amount: report.flash_amount,
            premium: report.premium,
            swap_output: report.swap_output,
            surplus: report.surplus,
            health_factor,
        })
    }

    fn execute_open(
        &mut self,
        pool: &mut dyn LendingPool,
        terms: FlashLoanTerms,
        request: &OpenRequest,
    ) -> Result<(), EngineError> {
        let collateral = request.user_collateral.token;
        if terms.asset != collateral {
            return Err(EngineError::AssetMismatch {
                expected: collateral,
                actual: terms.asset,
            });
        }

        // Supply everything the engine holds of the collateral asset: user
        // collateral plus the flash draw, as actually received.
        let supply_amount = self.ledger.borrow().balance_of(collateral, self.address);
        if supply_amount.is_zero() {
            return Err(EngineError::ZeroAmount);
        }
        pool.supply(self.address, collateral, supply_amount, self.address)?;

        pool.borrow(
            self.address,
            request.borrow.token,
            request.borrow.raw,
            RateMode::Variable,
            self.address,
        )?;

        // Identical borrow and collateral assets need no swap; the borrowed
        // amount itself services the repayment regardless of any pre-existing
        // balance of that token.
        let realized = if request.borrow.token == collateral {
            request.borrow.raw
        } else {
            self.swapper.execute_swap(
                self.address,
                &request.swap,
                collateral,
                request.min_swap_output,
            )?
        };

        let owed = terms.amount + terms.premium;
        if realized < owed {
            return Err(EngineError::InsufficientReturnForRepayment {
                available: realized,
                owed,
            });
        }
        let surplus = realized - owed;
        if surplus > U256::ZERO {
            // Deliberate: surplus stays with the position as extra
            // collateral rather than being refunded.
            pool.supply(self.address, collateral, surplus, self.address)?;
        }

        self.report = Some(CallbackReport {
            flash_amount: terms.amount,
            premium: terms.premium,
            swap_output: realized,
            surplus,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Unwind flow
    // -----------------------------------------------------------------------

    fn unwind_position_locked(
        &mut self,
        caller: Address,
        request: UnwindRequest,
        deadline: u64,
    ) -> Result<OperationOutcome, EngineError> {
        self.admin.ensure_owner(caller)?;
        self.check_deadline(deadline)?;
        self.validate_unwind_request(&request)?;

        let scope = Rc::clone(&self.scope);
        scope.borrow_mut().begin();
        match self.run_unwind(caller, request) {
            Ok(outcome) => {
                scope.borrow_mut().commit();
                Ok(outcome)
            }
            Err(e) => {
                scope.borrow_mut().revert();
                Err(e)
            }
        }
    }

    fn run_unwind(
        &mut self,
        caller: Address,
        request: UnwindRequest,
    ) -> Result<OperationOutcome, EngineError> {
        let op_id = self.begin_operation();
        let params = FlashLoanContext::V1 {
            op_id,
            caller,
            operation: Operation::Unwind(request.clone()),
        }
        .encode()?;

        info!(
            op_id,
            debt = %request.debt.token,
            debt_amount = %request.debt.raw,
            "unwinding position"
        );

        let engine = self.address;
        let pool_rc = Rc::clone(&self.pool);
        {
            let mut pool = pool_rc.borrow_mut();
            pool.flash_loan(self, engine, request.debt.token, request.debt.raw, params)?;
        }

        let report = self.report.take().ok_or(EngineError::UntrustedCallback {
            reason: "flash loan completed without invoking the callback".into(),
        })?;

        let account = pool_rc.borrow().account_data(self.address)?;
        let health_factor = wad_to_decimal(account.health_factor);
        if account.total_debt_usd > U256::ZERO && account.health_factor < WAD {
            return Err(EngineError::UnhealthyPosition {
                health_factor,
                min: dec!(1),
            });
        }

        info!(op_id, %health_factor, surplus = %report.surplus, "position unwound");
        Ok(OperationOutcome {
            op_id,
            flash_amount: report.flash_amount,
            premium: report.premium,
            swap_output: report.swap_output,
            surplus: report.surplus,
            health_factor,
        })
    }

    fn execute_unwind(
        &mut self,
        pool: &mut dyn LendingPool,
        terms: FlashLoanTerms,
        request: &UnwindRequest,
    ) -> Result<(), EngineError> {
        // Defense against malformed or misencoded contexts.
        if terms.asset != request.debt.token {
            return Err(EngineError::AssetMismatch {
                expected: request.debt.token,
                actual: terms.asset,
            });
        }
        let collateral = request.collateral_to_withdraw.token;

        let repaid = pool.repay(
            self.address,
            request.debt.token,
            terms.amount,
            RateMode::Variable,
            self.address,
        )?;
        // The pool caps repayment at the outstanding debt; whatever it left
        // behind still services the flash repayment below.
        let repay_leftover = terms.amount - repaid;

        // Recompute the withdrawal from live state with the same canonical
        // loan-to-value formula the read-only sizing uses. The caller-supplied
        // figure is informational only.
        let repaid_amount = TokenAmount::new(request.debt.token, repaid, request.debt.decimals);
        let recomputed = sizing::compute_unwind_sizing(
            &self.oracle,
            &*pool,
            collateral,
            request.debt.token,
            &repaid_amount,
            self.settings.slippage_buffer_bps,
        )?;
        if recomputed.collateral_to_withdraw.raw != request.collateral_to_withdraw.raw {
            warn!(
                requested = %request.collateral_to_withdraw.raw,
                recomputed = %recomputed.collateral_to_withdraw.raw,
                "unwind withdrawal recomputed from live state differs from request"
            );
        }

        let withdrawn = pool.withdraw(
            self.address,
            collateral,
            recomputed.collateral_to_withdraw.raw,
            self.address,
        )?;

        // Swap what was actually withdrawn — the pool may have rounded down
        // or hit liquidity limits.
        let realized = if collateral == request.debt.token {
            withdrawn
        } else {
            let mut instruction = request.swap.clone();
            instruction.amount_in = withdrawn;
            self.swapper.execute_swap(
                self.address,
                &instruction,
                request.debt.token,
                request.min_swap_output,
            )?
        };

        let owed = terms.amount + terms.premium;
        let available = realized + repay_leftover;
        if available < owed {
            return Err(EngineError::InsufficientReturnForRepayment { available, owed });
        }
        let surplus = available - owed;
        if surplus > U256::ZERO {
            pool.supply(self.address, request.debt.token, surplus, self.address)?;
        }

        self.report = Some(CallbackReport {
            flash_amount: terms.amount,
            premium: terms.premium,
            swap_output: realized,
            surplus,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Shared plumbing
    // -----------------------------------------------------------------------

    fn begin_operation(&mut self) -> u64 {
        let op_id = self.next_op_id;
        self.next_op_id += 1;
        self.pending_op = Some(op_id);
        op_id
    }

    fn check_deadline(&self, deadline: u64) -> Result<(), EngineError> {
        let now = unix_now();
        if now > deadline {
            return Err(EngineError::DeadlineExpired { deadline, now });
        }
        Ok(())
    }

    fn check_registered_decimals(&self, amount: &TokenAmount) -> Result<(), EngineError> {
        let registered = self.ledger.borrow().decimals(amount.token)?;
        if registered != amount.decimals {
            return Err(EngineError::PrecisionMismatch {
                expected: registered,
                actual: amount.decimals,
            });
        }
        Ok(())
    }

    fn validate_open_request(&self, request: &OpenRequest) -> Result<(), EngineError> {
        if request.user_collateral.is_zero()
            || request.flash_loan.is_zero()
            || request.borrow.is_zero()
        {
            return Err(EngineError::ZeroAmount);
        }
        if request.user_collateral.token.is_zero() || request.borrow.token.is_zero() {
            return Err(EngineError::ZeroAddress);
        }
        if request.flash_loan.token != request.user_collateral.token {
            return Err(EngineError::AssetMismatch {
                expected: request.user_collateral.token,
                actual: request.flash_loan.token,
            });
        }
        self.check_registered_decimals(&request.user_collateral)?;
        self.check_registered_decimals(&request.borrow)?;
        if request.borrow.token != request.user_collateral.token {
            if request.swap.venue.is_zero() {
                return Err(EngineError::ZeroAddress);
            }
            if request.swap.token_in != request.borrow.token {
                return Err(EngineError::TokenMismatch {
                    expected: request.borrow.token,
                    actual: request.swap.token_in,
                });
            }
            if request.swap.amount_in != request.borrow.raw {
                return Err(EngineError::InvalidRequest {
                    reason: "swap input does not match the borrow amount",
                });
            }
        }
        Ok(())
    }

    fn validate_unwind_request(&self, request: &UnwindRequest) -> Result<(), EngineError> {
        if request.debt.is_zero() || request.collateral_to_withdraw.is_zero() {
            return Err(EngineError::ZeroAmount);
        }
        if request.debt.token.is_zero() || request.collateral_to_withdraw.token.is_zero() {
            return Err(EngineError::ZeroAddress);
        }
        self.check_registered_decimals(&request.debt)?;
        self.check_registered_decimals(&request.collateral_to_withdraw)?;
        if request.collateral_to_withdraw.token != request.debt.token {
            if request.swap.venue.is_zero() {
                return Err(EngineError::ZeroAddress);
            }
            if request.swap.token_in != request.collateral_to_withdraw.token {
                return Err(EngineError::TokenMismatch {
                    expected: request.collateral_to_withdraw.token,
                    actual: request.swap.token_in,
                });
            }
        }
        Ok(())
    }
}

impl FlashLoanReceiver for Orchestrator {
    /// Inbound callback from the lending pool. Trusts nothing until the
    /// invoking pool and initiator are verified, then decodes and consumes
    /// the versioned context exactly once.
    fn on_flash_loan(
        &mut self,
        pool: &mut dyn LendingPool,
        terms: FlashLoanTerms,
        params: &[u8],
    ) -> Result<(), EngineError> {
        if !self.in_flight {
            return Err(EngineError::UntrustedCallback {
                reason: "no operation in flight".into(),
            });
        }
        if terms.pool != self.pool_address {
            return Err(EngineError::UntrustedCallback {
                reason: format!("unexpected pool {}", terms.pool),
            });
        }
        if terms.initiator != self.address {
            return Err(EngineError::UntrustedCallback {
                reason: format!("unexpected initiator {}", terms.initiator),
            });
        }
        if terms.amount.is_zero() {
            return Err(EngineError::ZeroAmount);
        }
        if params.is_empty() {
            return Err(EngineError::MalformedContext {
                reason: "empty params".into(),
            });
        }

        let context = FlashLoanContext::decode(params)?;
        let FlashLoanContext::V1 {
            op_id, operation, ..
        } = context;

        // Consume the pending slot: a second delivery (or a replayed
        // context) finds nothing to match against.
        let expected = self.pending_op.take().ok_or(EngineError::UntrustedCallback {
            reason: "no pending operation context".into(),
        })?;
        if op_id != expected {
            return Err(EngineError::UntrustedCallback {
                reason: format!("context id {op_id} does not match pending {expected}"),
            });
        }

        match operation {
            Operation::Open(request) => self.execute_open(pool, terms, &request),
            Operation::Unwind(request) => self.execute_unwind(pool, terms, &request),
        }
    }
}
