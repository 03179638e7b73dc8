//! ABI codec for transaction-scoped liquidation parameters.
//!
//! The coordinator encodes [`LiquidationParams`] into the opaque `params`
//! bytes of `flashLoanSimple`; the settlement callback decodes them. The
//! round trip must be lossless for arbitrary hop shapes, including zero
//! hops with a non-empty opaque instruction and the reverse.

use alloy::primitives::Bytes;
use alloy::sol_types::SolValue;

pub use crate::contracts::{LiquidationParams, SwapStep};

use super::SettlementError;

/// Encode params for the flash-loan `params` payload.
pub fn encode_params(params: &LiquidationParams) -> Bytes {
    Bytes::from(params.abi_encode())
}

/// Decode the flash-loan `params` payload.
pub fn decode_params(raw: &[u8]) -> Result<LiquidationParams, SettlementError> {
    LiquidationParams::abi_decode(raw, true)
        .map_err(|e| SettlementError::BadParams(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, U256};

    fn addr(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    fn step(token_in: u8, token_out: u8, amount: u64) -> SwapStep {
        SwapStep {
            tokenIn: addr(token_in),
            tokenOut: addr(token_out),
            fee: alloy::primitives::Uint::<24, 1>::from(3000u32),
            amountIn: U256::from(amount),
            stable: false,
        }
    }

    fn roundtrip(params: &LiquidationParams) {
        let encoded = encode_params(params);
        let decoded = decode_params(&encoded).unwrap();
        assert_eq!(&decoded, params);
    }

    #[test]
    fn roundtrip_with_multi_hop_path() {
        roundtrip(&LiquidationParams {
            user: addr(1),
            collateralAsset: addr(2),
            debtToCover: U256::from(4_000_000u64),
            swapTarget: Address::ZERO,
            swapCalldata: Bytes::new(),
            minAmountOut: U256::from(3_900_000u64),
            pathTokens: vec![addr(2), addr(3), addr(4)],
            hops: vec![
                vec![step(2, 3, 5_000_000), step(2, 3, 1_000_000)],
                vec![step(3, 4, 0)],
            ],
        });
    }

    #[test]
    fn roundtrip_with_zero_hops_and_opaque_instruction() {
        roundtrip(&LiquidationParams {
            user: addr(9),
            collateralAsset: addr(8),
            debtToCover: U256::from(123u64),
            swapTarget: addr(7),
            swapCalldata: Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]),
            minAmountOut: U256::from(100u64),
            pathTokens: vec![],
            hops: vec![],
        });
    }

    #[test]
    fn roundtrip_with_empty_instruction_and_single_hop() {
        roundtrip(&LiquidationParams {
            user: addr(1),
            collateralAsset: addr(2),
            debtToCover: U256::MAX,
            swapTarget: Address::ZERO,
            swapCalldata: Bytes::new(),
            minAmountOut: U256::ZERO,
            pathTokens: vec![addr(2), addr(5)],
            hops: vec![vec![step(2, 5, u64::MAX)]],
        });
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_params(&[0x01, 0x02, 0x03]).is_err());
    }
}
