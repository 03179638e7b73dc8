//! Contract bindings for the lending pool, protocol data provider and
//! the settlement contract.
//!
//! All interfaces are declared inline with `sol!` so calldata encoding
//! and typed RPC calls share one set of types.

use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use std::sync::Arc;

use crate::sender::TransactionSender;

sol! {
    /// One leg allocation of a multi-hop swap path.
    #[derive(Debug, PartialEq, Eq)]
    struct SwapStep {
        address tokenIn;
        address tokenOut;
        uint24 fee;
        uint256 amountIn;
        bool stable;
    }

    /// Transaction-scoped liquidation parameters, ABI-encoded by the
    /// off-chain coordinator and decoded inside the flash-loan callback.
    /// Either `swapCalldata` (opaque pre-built instruction) or `hops`
    /// (legacy multi-hop path) carries the swap; the other is empty.
    #[derive(Debug, PartialEq, Eq)]
    struct LiquidationParams {
        address user;
        address collateralAsset;
        uint256 debtToCover;
        address swapTarget;
        bytes swapCalldata;
        uint256 minAmountOut;
        address[] pathTokens;
        SwapStep[][] hops;
    }

    /// Lending pool interface (Aave V3 style).
    #[sol(rpc)]
    interface IPool {
        function getUserAccountData(address user) external view returns (
            uint256 totalCollateralBase,
            uint256 totalDebtBase,
            uint256 availableBorrowsBase,
            uint256 currentLiquidationThreshold,
            uint256 ltv,
            uint256 healthFactor
        );

        function flashLoanSimple(
            address receiverAddress,
            address asset,
            uint256 amount,
            bytes calldata params,
            uint16 referralCode
        ) external;

        function liquidationCall(
            address collateralAsset,
            address debtAsset,
            address user,
            uint256 debtToCover,
            bool receiveAToken
        ) external;
    }

    /// Protocol data provider, used to resolve per-asset token addresses.
    #[sol(rpc)]
    interface IProtocolDataProvider {
        function getReserveTokensAddresses(address asset) external view returns (
            address aTokenAddress,
            address stableDebtTokenAddress,
            address variableDebtTokenAddress
        );
    }

    /// Minimal ERC20 surface used by the settlement path.
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function transfer(address to, uint256 amount) external returns (bool);
    }

    /// Settlement contract entry points. Both liquidation variants are
    /// owner-gated on-chain and kick off `flashLoanSimple`.
    interface ISettlement {
        /// Legacy variant: multi-hop path described explicitly.
        function liquidateWithPath(
            address user,
            address collateralAsset,
            address debtAsset,
            uint256 debtToCover,
            address[] calldata pathTokens,
            SwapStep[][] calldata hops,
            uint256 minAmountOut
        ) external;

        /// Opaque variant: pre-built swap instruction executed verbatim.
        function liquidateWithInstruction(
            address user,
            address collateralAsset,
            address debtAsset,
            uint256 debtToCover,
            address swapTarget,
            bytes calldata swapCalldata,
            uint256 minAmountOut
        ) external;

        /// Owner-gated sweep of any token or native balance left in the
        /// contract. `max == true` ignores `amount` and sweeps everything.
        function rescue(address token, uint256 amount, bool max, address to) external;
    }
}

/// Event signatures used by borrower discovery.
pub mod events {
    use super::*;

    /// keccak256("Transfer(address,address,uint256)"). Debt-token
    /// issuance shows up as a mint (transfer from the zero address).
    pub fn transfer() -> B256 {
        keccak256("Transfer(address,address,uint256)")
    }

    /// keccak256("LiquidationCall(address,address,address,uint256,uint256,address,bool)")
    pub fn liquidation_call() -> B256 {
        keccak256("LiquidationCall(address,address,address,uint256,uint256,address,bool)")
    }
}

/// Settlement contract wrapper: encodes calldata for the two flash-loan
/// entry points and the rescue sweep, and submits via the sender.
pub struct SettlementContract {
    /// Deployed settlement contract address
    pub address: Address,
    sender: Option<Arc<TransactionSender>>,
}

impl SettlementContract {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            sender: None,
        }
    }

    pub fn with_sender(address: Address, sender: Arc<TransactionSender>) -> Self {
        Self {
            address,
            sender: Some(sender),
        }
    }

    /// Encode the legacy hop-described liquidation call.
    pub fn encode_liquidate_with_path(
        &self,
        user: Address,
        collateral_asset: Address,
        debt_asset: Address,
        debt_to_cover: U256,
        path_tokens: Vec<Address>,
        hops: Vec<Vec<SwapStep>>,
        min_amount_out: U256,
    ) -> Bytes {
        let call = ISettlement::liquidateWithPathCall {
            user,
            collateralAsset: collateral_asset,
            debtAsset: debt_asset,
            debtToCover: debt_to_cover,
            pathTokens: path_tokens,
            hops,
            minAmountOut: min_amount_out,
        };
        Bytes::from(call.abi_encode())
    }

    /// Encode the opaque-instruction liquidation call.
    pub fn encode_liquidate_with_instruction(
        &self,
        user: Address,
        collateral_asset: Address,
        debt_asset: Address,
        debt_to_cover: U256,
        swap_target: Address,
        swap_calldata: Bytes,
        min_amount_out: U256,
    ) -> Bytes {
        let call = ISettlement::liquidateWithInstructionCall {
            user,
            collateralAsset: collateral_asset,
            debtAsset: debt_asset,
            debtToCover: debt_to_cover,
            swapTarget: swap_target,
            swapCalldata: swap_calldata,
            minAmountOut: min_amount_out,
        };
        Bytes::from(call.abi_encode())
    }

    /// Encode a rescue sweep. `amount = None` sweeps the entire balance.
    pub fn encode_rescue(&self, token: Address, amount: Option<U256>, to: Address) -> Bytes {
        let call = ISettlement::rescueCall {
            token,
            amount: amount.unwrap_or(U256::ZERO),
            max: amount.is_none(),
            to,
        };
        Bytes::from(call.abi_encode())
    }

    /// Submit pre-encoded calldata through the transaction sender.
    pub async fn submit(
        &self,
        calldata: Bytes,
        gas_limit: u64,
        gas: crate::gas::GasQuote,
    ) -> anyhow::Result<B256> {
        let Some(sender) = &self.sender else {
            anyhow::bail!(
                "transaction ready but signer not configured ({} bytes of calldata)",
                calldata.len()
            );
        };
        tracing::info!(
            contract = %self.address,
            calldata_len = calldata.len(),
            gas_limit,
            "submitting settlement transaction"
        );
        sender
            .send_transaction(self.address, calldata, U256::ZERO, gas_limit, gas)
            .await
    }
}
