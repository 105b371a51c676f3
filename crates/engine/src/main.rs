//! Demonstration runner: wires the engine against the simulated execution
//! environment and drives one full open → unwind cycle.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use alloy::primitives::{address, Address, U256};
use anyhow::{Context, Result};
use rust_decimal_macros::dec;
use tracing::info;

use leverage_engine::admin::AdminState;
use leverage_engine::config;
use leverage_engine::constants::{
    DEFAULT_FLASH_LOAN_PREMIUM_BPS, TOKEN_USDT, TOKEN_WBNB, WAD,
};
use leverage_engine::ledger::TokenLedger;
use leverage_engine::math::{pow10, unix_now};
use leverage_engine::oracle::{FeedRegistry, SimulatedFeed};
use leverage_engine::orchestrator::Orchestrator;
use leverage_engine::pool::LendingPool;
use leverage_engine::sim::venue::SimulatedVenue;
use leverage_engine::sim::SimEnv;
use leverage_engine::types::{OpenRequest, ReserveConfig, SwapInstruction, TokenAmount, UnwindRequest};

const OWNER: Address = address!("00000000000000000000000000000000000000A0");
const ENGINE: Address = address!("00000000000000000000000000000000000000E1");
const POOL: Address = address!("00000000000000000000000000000000000000D1");
const VENUE: Address = address!("00000000000000000000000000000000000000F1");

/// $600.00 and $1.00 in the 8-decimal oracle scale.
const WBNB_PRICE: i128 = 60_000_000_000;
const USDT_PRICE: i128 = 100_000_000;

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let config_dir = std::env::var("ENGINE_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config"));
    let config = config::load_config(&config_dir)?;
    let _guard = leverage_engine::logging::init_tracing(&config.app.logging)?;

    info!(
        min_health_factor = %config.engine.min_health_factor,
        max_leverage = %config.engine.max_leverage,
        slippage_buffer_bps = config.engine.slippage_buffer_bps,
        "leverage engine demo starting"
    );

    // -----------------------------------------------------------------------
    // Simulated world: ledger, pool, venue, feeds
    // -----------------------------------------------------------------------

    let env = SimEnv::new(POOL, VENUE, DEFAULT_FLASH_LOAN_PREMIUM_BPS);
    let ledger = env.ledger();
    let pool = env.pool();
    let venue = env.venue();

    {
        let mut l = ledger.borrow_mut();
        l.register_token(TOKEN_WBNB, 18, 0);
        l.register_token(TOKEN_USDT, 18, 0);
        l.mint(TOKEN_WBNB, OWNER, U256::from(20u64) * pow10(18));
        l.mint(TOKEN_WBNB, POOL, U256::from(1_000u64) * pow10(18));
        l.mint(TOKEN_USDT, POOL, U256::from(1_000_000u64) * pow10(18));
        l.mint(TOKEN_WBNB, VENUE, U256::from(1_000u64) * pow10(18));
        l.mint(TOKEN_USDT, VENUE, U256::from(1_000_000u64) * pow10(18));
    }
    {
        let mut p = pool.borrow_mut();
        let reserve = |ltv, lt| ReserveConfig {
            decimals: 18,
            ltv_bps: ltv,
            liquidation_threshold_bps: lt,
            active: true,
            frozen: false,
            borrow_cap: U256::ZERO,
            supply_cap: U256::ZERO,
        };
        p.add_reserve(TOKEN_WBNB, reserve(7_500, 8_000), U256::from(WBNB_PRICE as u64));
        p.add_reserve(TOKEN_USDT, reserve(7_500, 8_000), U256::from(USDT_PRICE as u64));
    }
    {
        // USDT → WBNB at a rate 0.3% better than the oracle so the swap
        // output covers the flash premium; WBNB → USDT at par.
        let mut v = venue.borrow_mut();
        v.set_rate(
            TOKEN_USDT,
            TOKEN_WBNB,
            WAD * U256::from(1_003u64) / U256::from(600_000u64),
        );
        v.set_rate(TOKEN_WBNB, TOKEN_USDT, WAD * U256::from(600u64));
    }

    let now = unix_now();
    let mut oracle = FeedRegistry::new(config.oracle.sequencer_grace_period_seconds);
    let max_age = config.oracle.default_max_age_seconds;
    oracle.set_feed(
        TOKEN_WBNB,
        Rc::new(SimulatedFeed::fresh(8, WBNB_PRICE, now)),
        max_age,
    )?;
    oracle.set_feed(
        TOKEN_USDT,
        Rc::new(SimulatedFeed::fresh(8, USDT_PRICE, now)),
        max_age,
    )?;

    let admin = AdminState::new(OWNER, config.engine.fee_bps)?;
    let settings = config.settings()?;
    let scope = Rc::new(RefCell::new(env));
    let mut orchestrator = Orchestrator::new(
        ENGINE,
        admin,
        settings,
        oracle,
        pool.clone(),
        ledger.clone(),
        venue.clone(),
        scope,
    );

    // -----------------------------------------------------------------------
    // Open: 10 WBNB of equity at 2x
    // -----------------------------------------------------------------------

    let user_collateral = TokenAmount::new(TOKEN_WBNB, U256::from(10u64) * pow10(18), 18);
    let sizing = orchestrator
        .compute_open_sizing(TOKEN_WBNB, TOKEN_USDT, dec!(2), &user_collateral)
        .context("open sizing failed")?;
    info!(
        flash = %sizing.flash_loan_amount.raw,
        borrow = %sizing.borrow_amount.raw,
        "computed open sizing"
    );

    let open = OpenRequest {
        swap: SwapInstruction {
            venue: VENUE,
            token_in: TOKEN_USDT,
            amount_in: sizing.borrow_amount.raw,
            calldata: SimulatedVenue::encode_order(TOKEN_WBNB),
            native_value: U256::ZERO,
        },
        flash_loan: sizing.flash_loan_amount.clone(),
        user_collateral,
        borrow: sizing.borrow_amount.clone(),
        min_swap_output: U256::ZERO,
    };
    let outcome = orchestrator
        .open_position(OWNER, open, unix_now() + 300)
        .context("open position failed")?;
    info!(
        op_id = outcome.op_id,
        swap_output = %outcome.swap_output,
        surplus = %outcome.surplus,
        health_factor = %outcome.health_factor,
        "position opened"
    );

    let account = pool.borrow().account_data(ENGINE)?;
    info!(
        collateral_usd = %account.total_collateral_usd,
        debt_usd = %account.total_debt_usd,
        "live position after open"
    );

    // -----------------------------------------------------------------------
    // Unwind the whole debt
    // -----------------------------------------------------------------------

    let debt = TokenAmount::new(TOKEN_USDT, sizing.borrow_amount.raw, 18);
    let unwind_sizing = orchestrator
        .compute_unwind_sizing(TOKEN_WBNB, TOKEN_USDT, &debt)
        .context("unwind sizing failed")?;
    info!(
        withdraw = %unwind_sizing.collateral_to_withdraw.raw,
        "computed unwind sizing"
    );

    let unwind = UnwindRequest {
        swap: SwapInstruction {
            venue: VENUE,
            token_in: TOKEN_WBNB,
            amount_in: unwind_sizing.collateral_to_withdraw.raw,
            calldata: SimulatedVenue::encode_order(TOKEN_USDT),
            native_value: U256::ZERO,
        },
        collateral_to_withdraw: unwind_sizing.collateral_to_withdraw,
        debt,
        min_swap_output: U256::ZERO,
    };
    let outcome = orchestrator
        .unwind_position(OWNER, unwind, unix_now() + 300)
        .context("unwind position failed")?;
    info!(
        op_id = outcome.op_id,
        swap_output = %outcome.swap_output,
        surplus = %outcome.surplus,
        "position unwound"
    );

    let account = pool.borrow().account_data(ENGINE)?;
    let residual_wbnb = pool.borrow().supplied_of(ENGINE, TOKEN_WBNB);
    let residual_usdt = pool.borrow().supplied_of(ENGINE, TOKEN_USDT);
    info!(
        collateral_usd = %account.total_collateral_usd,
        debt_usd = %account.total_debt_usd,
        %residual_wbnb,
        %residual_usdt,
        owner_wbnb = %ledger.borrow().balance_of(TOKEN_WBNB, OWNER),
        "final state"
    );

    Ok(())
}
