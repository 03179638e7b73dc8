//! Urgency-tiered EIP-1559 gas pricing.
//!
//! The priority fee scales with how profitable the opportunity looks:
//! a fat liquidation is worth outbidding competitors for, a marginal one
//! is not. The max fee always covers at least twice the current base fee
//! so a submission survives short congestion spikes.

use alloy::network::TransactionBuilder;
use alloy::rpc::types::TransactionRequest;

/// Submission urgency, derived from estimated profit unless overridden.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Low,
    Normal,
    High,
    Critical,
}

impl Urgency {
    /// Map estimated profit (basis points of the repaid debt) to a tier.
    pub fn from_profit_bps(profit_bps: i64) -> Self {
        match profit_bps {
            bps if bps >= 500 => Self::Critical,
            bps if bps >= 200 => Self::High,
            bps if bps >= 50 => Self::Normal,
            _ => Self::Low,
        }
    }

    /// Priority-fee multiplier applied to the network's suggestion.
    pub fn priority_multiplier(&self) -> f64 {
        match self {
            Self::Low => 1.0,
            Self::Normal => 1.25,
            Self::High => 1.5,
            Self::Critical => 2.0,
        }
    }
}

/// Priced gas parameters for one submission.
#[derive(Debug, Clone, Copy)]
pub struct GasQuote {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub base_fee: u128,
}

impl GasQuote {
    pub fn apply(&self, tx: &mut TransactionRequest) {
        tx.set_max_fee_per_gas(self.max_fee_per_gas);
        tx.set_max_priority_fee_per_gas(self.max_priority_fee_per_gas);
    }
}

/// Gas pricer with a floor priority fee and a global max-fee cap.
#[derive(Debug, Clone)]
pub struct GasPricer {
    /// Minimum priority fee in wei (used when the node suggests zero).
    pub min_priority_fee: u128,
    /// Hard cap on max_fee_per_gas in wei.
    pub max_fee_cap: u128,
}

impl Default for GasPricer {
    fn default() -> Self {
        Self {
            min_priority_fee: 1_000_000_000,    // 1 gwei
            max_fee_cap: 500_000_000_000,       // 500 gwei
        }
    }
}

impl GasPricer {
    /// Price a submission. `max_fee` is floored at twice the base fee so
    /// the transaction stays includable under congestion.
    pub fn quote(&self, base_fee: u128, suggested_priority: u128, urgency: Urgency) -> GasQuote {
        let suggestion = suggested_priority.max(self.min_priority_fee);
        let priority = ((suggestion as f64) * urgency.priority_multiplier()) as u128;
        let max_fee = (base_fee + priority)
            .max(base_fee.saturating_mul(2))
            .min(self.max_fee_cap);
        GasQuote {
            max_fee_per_gas: max_fee,
            max_priority_fee_per_gas: priority.min(max_fee),
            base_fee,
        }
    }

    /// Worst-case gas cost of a submission in wei.
    pub fn cost_wei(gas_limit: u64, quote: &GasQuote) -> u128 {
        (gas_limit as u128).saturating_mul(quote.max_fee_per_gas)
    }

    /// Fail-closed profitability guard: reject the submission when the
    /// gas spend at the chosen price would eat the whole estimated profit.
    pub fn covers_cost(
        gas_limit: u64,
        quote: &GasQuote,
        native_usd: f64,
        estimated_profit_usd: f64,
    ) -> bool {
        let cost_usd = Self::cost_wei(gas_limit, quote) as f64 / 1e18 * native_usd;
        estimated_profit_usd > cost_usd
    }
}
