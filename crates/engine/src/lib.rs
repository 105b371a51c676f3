//! Flash-loan leveraged position engine.
//!
//! Opens and unwinds leveraged positions against an external lending pool by
//! combining an uncollateralized flash loan, a supply/borrow cycle, and an
//! external swap — executed as one atomic unit with strict post-conditions.
//!
//! The external world (pool, swap venue, price feeds, token ledger) is
//! consumed through trait seams; `sim` provides the in-process environment
//! the demo binary and the test suite run against.

pub mod admin;
pub mod config;
pub mod constants;
pub mod errors;
pub mod ledger;
pub mod logging;
pub mod math;
pub mod oracle;
pub mod orchestrator;
pub mod pool;
pub mod scope;
pub mod sim;
pub mod sizing;
pub mod swap;
pub mod types;

pub use admin::AdminState;
pub use errors::EngineError;
pub use orchestrator::{EngineSettings, OperationOutcome, Orchestrator};
pub use sizing::{OpenSizing, UnwindSizing};
