//! Chain access layer: retrying RPC client, gas pricing, transaction
//! sending, contract bindings and the settlement routine.

pub mod client;
pub mod contracts;
pub mod gas;
pub mod sender;
pub mod settlement;

pub use client::{is_range_too_large, is_retryable, AccountData, ChainClient, ChainClientConfig};
pub use contracts::{events, SettlementContract};
pub use gas::{GasPricer, GasQuote, Urgency};
pub use sender::{NonceManager, TransactionSender};
pub use settlement::{
    FlashLoanTerms, LiquidationParams, SettlementConfig, SettlementError, SettlementRecord,
    SettlementRoutine, SwapStep,
};
