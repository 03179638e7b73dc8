//! Atomic on-chain settlement: parameter codec and the flash-loan
//! callback routine.

pub mod params;
pub mod routine;

pub use params::{decode_params, encode_params, LiquidationParams, SwapStep};
pub use routine::{
    reconcile_first_hop, FlashLoanTerms, SettlementConfig, SettlementEnv, SettlementPath,
    SettlementRecord, SettlementRoutine, SwapOutcome,
};

use alloy::primitives::U256;
use thiserror::Error;

/// Invariant violations inside the settlement routine. Each one is a
/// whole-transaction revert on chain: no balances move, only gas burns.
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("caller is not pool")]
    CallerNotPool,
    #[error("flash loan initiator is not this contract")]
    UntrustedInitiator,
    #[error("reentrant settlement call")]
    Reentrancy,
    #[error("caller is not owner")]
    NotOwner,
    #[error("malformed liquidation params: {0}")]
    BadParams(String),
    #[error("liquidation call failed: {0}")]
    LiquidationFailed(String),
    #[error("no collateral received")]
    NoCollateralReceived,
    #[error("cannot reconcile first hop (declared {declared}, actual {actual})")]
    CannotReconcile { declared: U256, actual: U256 },
    #[error("swap failed: {0}")]
    SwapFailed(String),
    #[error("insufficient output to repay (have {have}, need {need})")]
    InsufficientOutput { have: U256, need: U256 },
}
