pub mod account;
pub mod context;
pub mod token;

pub use account::{AccountData, RateMode, ReserveConfig};
pub use context::{FlashLoanContext, OpenRequest, Operation, SwapInstruction, UnwindRequest};
pub use token::{PriceQuote, TokenAmount};
