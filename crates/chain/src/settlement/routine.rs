//! The atomic flash-loan settlement routine.
//!
//! This models the on-chain callback exactly: repay the target's debt,
//! swap seized collateral back to the borrowed asset, reconcile the
//! declared first-hop amount against the actual seized balance, repay
//! principal plus fee and forward the surplus. Any violated invariant
//! returns an error, which on chain is a whole-transaction revert; the
//! model therefore never applies partial effects on the error path
//! beyond what the environment itself rolls back.
//!
//! The routine runs over [`SettlementEnv`] so the identical logic backs
//! both the contract semantics and the tests.

use alloy::primitives::{Address, Bytes, U256};

use super::params::{decode_params, LiquidationParams, SwapStep};
use super::SettlementError;

/// Outcome of the swap step: explicit two-outcome result so a failure
/// reason can be surfaced in the abort diagnostics.
#[derive(Debug, Clone)]
pub enum SwapOutcome {
    Executed(U256),
    Failed(String),
}

/// Which execution path settled the swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementPath {
    /// Opaque pre-built instruction executed verbatim.
    Instruction,
    /// Legacy multi-hop path with first-hop reconciliation.
    MultiHop,
    /// Collateral receipt was already the debt asset; no swap needed.
    DirectRepay,
}

/// Emitted settlement record.
#[derive(Debug, Clone)]
pub struct SettlementRecord {
    pub user: Address,
    pub collateral_asset: Address,
    pub debt_asset: Address,
    pub debt_covered: U256,
    pub profit: U256,
    pub path: SettlementPath,
}

/// Terms of the flash loan as presented to the callback.
#[derive(Debug, Clone, Copy)]
pub struct FlashLoanTerms {
    pub asset: Address,
    pub amount: U256,
    pub premium: U256,
    pub initiator: Address,
}

/// Fixed addresses the routine is deployed with.
#[derive(Debug, Clone, Copy)]
pub struct SettlementConfig {
    /// Lending pool (the only allowed callback caller).
    pub pool: Address,
    /// Swap router for the legacy multi-hop path.
    pub router: Address,
    /// Wrapped native token.
    pub wrapped_native: Address,
    /// Profit receiver and rescue/entry-point gate.
    pub owner: Address,
    /// Own contract address (the only allowed flash-loan initiator).
    pub this: Address,
}

/// Token and pool operations the routine performs. On chain these are
/// external calls inside one transaction; in tests a mock ledger.
pub trait SettlementEnv {
    fn balance_of(&self, token: Address, holder: Address) -> U256;
    fn native_balance(&self, holder: Address) -> U256;
    fn approve(&mut self, token: Address, spender: Address, amount: U256);
    fn liquidation_call(
        &mut self,
        collateral_asset: Address,
        debt_asset: Address,
        user: Address,
        debt_to_cover: U256,
    ) -> Result<(), String>;
    fn swap_with_instruction(&mut self, target: Address, calldata: &Bytes) -> SwapOutcome;
    fn swap_multi_hop(
        &mut self,
        tokens: &[Address],
        amount_in: U256,
        min_amount_out: U256,
        hops: &[Vec<SwapStep>],
    ) -> SwapOutcome;
    fn wrap_native(&mut self, holder: Address, amount: U256);
    fn transfer(&mut self, token: Address, from: Address, to: Address, amount: U256);
    fn transfer_native(&mut self, from: Address, to: Address, amount: U256);
}

/// The settlement routine with its re-entrancy latch.
#[derive(Debug)]
pub struct SettlementRoutine {
    config: SettlementConfig,
    entered: bool,
}

impl SettlementRoutine {
    pub fn new(config: SettlementConfig) -> Self {
        Self {
            config,
            entered: false,
        }
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Owner gate for the flash-loan entry points: validates the caller
    /// and produces the `params` payload handed to `flashLoanSimple`.
    pub fn initiate(
        &self,
        caller: Address,
        params: &LiquidationParams,
    ) -> Result<Bytes, SettlementError> {
        if caller != self.config.owner {
            return Err(SettlementError::NotOwner);
        }
        Ok(super::params::encode_params(params))
    }

    /// The flash-loan callback. All-or-nothing: any `Err` is a revert of
    /// the whole transaction.
    pub fn execute_operation<E: SettlementEnv>(
        &mut self,
        env: &mut E,
        caller: Address,
        terms: &FlashLoanTerms,
        raw_params: &[u8],
    ) -> Result<SettlementRecord, SettlementError> {
        if self.entered {
            return Err(SettlementError::Reentrancy);
        }
        self.entered = true;
        let result = self.run(env, caller, terms, raw_params);
        self.entered = false;
        result
    }

    fn run<E: SettlementEnv>(
        &self,
        env: &mut E,
        caller: Address,
        terms: &FlashLoanTerms,
        raw_params: &[u8],
    ) -> Result<SettlementRecord, SettlementError> {
        let cfg = self.config;
        if caller != cfg.pool {
            return Err(SettlementError::CallerNotPool);
        }
        if terms.initiator != cfg.this {
            return Err(SettlementError::UntrustedInitiator);
        }

        let params = decode_params(raw_params)?;
        let debt_asset = terms.asset;
        let owed = terms.amount + terms.premium;

        // 1. Repay the target's debt with the borrowed funds.
        env.approve(debt_asset, cfg.pool, params.debtToCover);
        env.liquidation_call(
            params.collateralAsset,
            debt_asset,
            params.user,
            params.debtToCover,
        )
        .map_err(SettlementError::LiquidationFailed)?;

        // 2. What did we actually seize?
        let collateral_balance = env.balance_of(params.collateralAsset, cfg.this);
        let path = if collateral_balance.is_zero() {
            if env.balance_of(debt_asset, cfg.this) >= owed {
                // Collateral receipt was paid out in the debt asset.
                SettlementPath::DirectRepay
            } else {
                return Err(SettlementError::NoCollateralReceived);
            }
        } else {
            // 3. Swap the seized collateral back to the debt asset.
            env.approve(params.collateralAsset, cfg.router, collateral_balance);
            let (outcome, path) = if !params.swapCalldata.is_empty() {
                (
                    env.swap_with_instruction(params.swapTarget, &params.swapCalldata),
                    SettlementPath::Instruction,
                )
            } else {
                let mut hops = params.hops.clone();
                reconcile_first_hop(&mut hops, collateral_balance)?;
                (
                    env.swap_multi_hop(
                        &params.pathTokens,
                        collateral_balance,
                        params.minAmountOut,
                        &hops,
                    ),
                    SettlementPath::MultiHop,
                )
            };
            // 4. A failed swap aborts with the surfaced reason.
            if let SwapOutcome::Failed(reason) = outcome {
                return Err(SettlementError::SwapFailed(reason));
            }
            path
        };

        // 5. Fold incidental native currency into its wrapped form.
        let native = env.native_balance(cfg.this);
        if !native.is_zero() {
            env.wrap_native(cfg.this, native);
        }

        // 6. Repay principal + fee, forward the rest as profit.
        let final_balance = env.balance_of(debt_asset, cfg.this);
        if final_balance < owed {
            return Err(SettlementError::InsufficientOutput {
                have: final_balance,
                need: owed,
            });
        }
        env.approve(debt_asset, cfg.pool, owed);
        let profit = final_balance - owed;
        if !profit.is_zero() {
            env.transfer(debt_asset, cfg.this, cfg.owner, profit);
        }

        Ok(SettlementRecord {
            user: params.user,
            collateral_asset: params.collateralAsset,
            debt_asset,
            debt_covered: params.debtToCover,
            profit,
            path,
        })
    }

    /// Owner-gated sweep of balances left outside a settlement.
    /// `token = None` sweeps native currency; `amount = None` sweeps the
    /// entire balance. Returns the swept amount.
    pub fn rescue<E: SettlementEnv>(
        &self,
        env: &mut E,
        caller: Address,
        token: Option<Address>,
        amount: Option<U256>,
        to: Address,
    ) -> Result<U256, SettlementError> {
        if caller != self.config.owner {
            return Err(SettlementError::NotOwner);
        }
        let this = self.config.this;
        match token {
            Some(token) => {
                let balance = env.balance_of(token, this);
                let amount = amount.unwrap_or(balance);
                if amount > balance {
                    return Err(SettlementError::InsufficientOutput {
                        have: balance,
                        need: amount,
                    });
                }
                env.transfer(token, this, to, amount);
                Ok(amount)
            }
            None => {
                let balance = env.native_balance(this);
                let amount = amount.unwrap_or(balance);
                if amount > balance {
                    return Err(SettlementError::InsufficientOutput {
                        have: balance,
                        need: amount,
                    });
                }
                env.transfer_native(this, to, amount);
                Ok(amount)
            }
        }
    }
}

/// Adjust the first hop's declared input to match the actual collateral
/// balance. The signed delta lands on the first allocation only; later
/// hops stay as quoted, since only the first hop's input is assumed to
/// vary.
pub fn reconcile_first_hop(
    hops: &mut [Vec<SwapStep>],
    actual_balance: U256,
) -> Result<(), SettlementError> {
    let Some(first_hop) = hops.first_mut() else {
        return Ok(());
    };
    if first_hop.is_empty() {
        return Ok(());
    }

    let declared: U256 = first_hop
        .iter()
        .fold(U256::ZERO, |acc, step| acc + step.amountIn);
    if declared == actual_balance {
        return Ok(());
    }

    let lead = &mut first_hop[0];
    if actual_balance > declared {
        lead.amountIn += actual_balance - declared;
    } else {
        let shortfall = declared - actual_balance;
        if shortfall > lead.amountIn {
            return Err(SettlementError::CannotReconcile {
                declared,
                actual: actual_balance,
            });
        }
        lead.amountIn -= shortfall;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::params::encode_params;
    use super::*;
    use std::collections::HashMap;

    fn addr(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    const POOL: u8 = 0x10;
    const ROUTER: u8 = 0x20;
    const WNATIVE: u8 = 0x30;
    const OWNER: u8 = 0x40;
    const THIS: u8 = 0x50;
    const USER: u8 = 0x60;
    const COLLATERAL: u8 = 0x70;
    const DEBT: u8 = 0x80;

    fn config() -> SettlementConfig {
        SettlementConfig {
            pool: addr(POOL),
            router: addr(ROUTER),
            wrapped_native: addr(WNATIVE),
            owner: addr(OWNER),
            this: addr(THIS),
        }
    }

    fn terms(amount: u64, premium: u64) -> FlashLoanTerms {
        FlashLoanTerms {
            asset: addr(DEBT),
            amount: U256::from(amount),
            premium: U256::from(premium),
            initiator: addr(THIS),
        }
    }

    fn step(amount: u64) -> SwapStep {
        SwapStep {
            tokenIn: addr(COLLATERAL),
            tokenOut: addr(DEBT),
            fee: alloy::primitives::Uint::<24, 1>::from(3000u32),
            amountIn: U256::from(amount),
            stable: false,
        }
    }

    fn hop_params(debt_to_cover: u64, declared: u64, min_out: u64) -> LiquidationParams {
        LiquidationParams {
            user: addr(USER),
            collateralAsset: addr(COLLATERAL),
            debtToCover: U256::from(debt_to_cover),
            swapTarget: Address::ZERO,
            swapCalldata: Bytes::new(),
            minAmountOut: U256::from(min_out),
            pathTokens: vec![addr(COLLATERAL), addr(DEBT)],
            hops: vec![vec![step(declared)]],
        }
    }

    /// In-memory token ledger standing in for the chain.
    struct MockEnv {
        balances: HashMap<(Address, Address), U256>,
        native: HashMap<Address, U256>,
        /// Collateral credited to the caller on a successful liquidation.
        seize_amount: U256,
        /// Debt-asset output produced by a successful swap.
        swap_output: Result<U256, String>,
        liquidation_reverts: Option<String>,
        approvals: Vec<(Address, Address, U256)>,
    }

    impl MockEnv {
        fn new() -> Self {
            Self {
                balances: HashMap::new(),
                native: HashMap::new(),
                seize_amount: U256::ZERO,
                swap_output: Ok(U256::ZERO),
                liquidation_reverts: None,
                approvals: Vec::new(),
            }
        }

        fn credit(&mut self, token: Address, holder: Address, amount: U256) {
            *self.balances.entry((token, holder)).or_default() += amount;
        }

        fn debit(&mut self, token: Address, holder: Address, amount: U256) {
            let entry = self.balances.entry((token, holder)).or_default();
            *entry = entry.saturating_sub(amount);
        }
    }

    impl SettlementEnv for MockEnv {
        fn balance_of(&self, token: Address, holder: Address) -> U256 {
            self.balances
                .get(&(token, holder))
                .copied()
                .unwrap_or_default()
        }

        fn native_balance(&self, holder: Address) -> U256 {
            self.native.get(&holder).copied().unwrap_or_default()
        }

        fn approve(&mut self, token: Address, spender: Address, amount: U256) {
            self.approvals.push((token, spender, amount));
        }

        fn liquidation_call(
            &mut self,
            collateral_asset: Address,
            debt_asset: Address,
            _user: Address,
            debt_to_cover: U256,
        ) -> Result<(), String> {
            if let Some(reason) = &self.liquidation_reverts {
                return Err(reason.clone());
            }
            self.debit(debt_asset, addr(THIS), debt_to_cover);
            let seized = self.seize_amount;
            self.credit(collateral_asset, addr(THIS), seized);
            Ok(())
        }

        fn swap_with_instruction(&mut self, _target: Address, _calldata: &Bytes) -> SwapOutcome {
            self.run_swap()
        }

        fn swap_multi_hop(
            &mut self,
            _tokens: &[Address],
            _amount_in: U256,
            min_amount_out: U256,
            _hops: &[Vec<SwapStep>],
        ) -> SwapOutcome {
            match self.run_swap() {
                SwapOutcome::Executed(out) if out < min_amount_out => {
                    SwapOutcome::Failed("insufficient output amount".into())
                }
                other => other,
            }
        }

        fn wrap_native(&mut self, holder: Address, amount: U256) {
            let native = self.native.entry(holder).or_default();
            *native = native.saturating_sub(amount);
            self.credit(addr(WNATIVE), holder, amount);
        }

        fn transfer(&mut self, token: Address, from: Address, to: Address, amount: U256) {
            self.debit(token, from, amount);
            self.credit(token, to, amount);
        }

        fn transfer_native(&mut self, from: Address, to: Address, amount: U256) {
            let src = self.native.entry(from).or_default();
            *src = src.saturating_sub(amount);
            *self.native.entry(to).or_default() += amount;
        }
    }

    impl MockEnv {
        fn run_swap(&mut self) -> SwapOutcome {
            match self.swap_output.clone() {
                Ok(out) => {
                    let collateral = self.balance_of(addr(COLLATERAL), addr(THIS));
                    self.debit(addr(COLLATERAL), addr(THIS), collateral);
                    self.credit(addr(DEBT), addr(THIS), out);
                    SwapOutcome::Executed(out)
                }
                Err(reason) => SwapOutcome::Failed(reason),
            }
        }
    }

    #[test]
    fn reconcile_shrinks_declared_amount_to_actual() {
        // Declared 5, actual 3: delta -2, adjusted amount 3.
        let mut hops = vec![vec![step(5)]];
        reconcile_first_hop(&mut hops, U256::from(3)).unwrap();
        assert_eq!(hops[0][0].amountIn, U256::from(3));
    }

    #[test]
    fn reconcile_grows_declared_amount_to_actual() {
        // Declared 1 (stands in for 0.5), actual 4: positive delta lands
        // on the first allocation.
        let mut hops = vec![vec![step(1)]];
        reconcile_first_hop(&mut hops, U256::from(4)).unwrap();
        assert_eq!(hops[0][0].amountIn, U256::from(4));
    }

    #[test]
    fn reconcile_spreads_only_onto_first_allocation() {
        let mut hops = vec![vec![step(3), step(4)], vec![step(7)]];
        reconcile_first_hop(&mut hops, U256::from(5)).unwrap();
        assert_eq!(hops[0][0].amountIn, U256::from(1));
        assert_eq!(hops[0][1].amountIn, U256::from(4));
        // downstream hops stay as quoted
        assert_eq!(hops[1][0].amountIn, U256::from(7));
    }

    #[test]
    fn reconcile_rejects_shortfall_beyond_first_allocation() {
        let mut hops = vec![vec![step(3), step(4)]];
        let err = reconcile_first_hop(&mut hops, U256::from(2)).unwrap_err();
        assert!(matches!(err, SettlementError::CannotReconcile { .. }));
    }

    #[test]
    fn settles_multi_hop_path_and_forwards_profit() {
        let mut routine = SettlementRoutine::new(config());
        let mut env = MockEnv::new();
        // Borrowed 1000 debt units, fee 5. Liquidation seizes 600
        // collateral (declared 500 gets reconciled up), swap yields 1100.
        env.credit(addr(DEBT), addr(THIS), U256::from(1000));
        env.seize_amount = U256::from(600);
        env.swap_output = Ok(U256::from(1100));

        let params = hop_params(900, 500, 1000);
        let record = routine
            .execute_operation(
                &mut env,
                addr(POOL),
                &terms(1000, 5),
                &encode_params(&params),
            )
            .unwrap();

        assert_eq!(record.path, SettlementPath::MultiHop);
        assert_eq!(record.debt_covered, U256::from(900));
        // 100 left after repaying 900, plus 1100 swap output, minus 1005 owed.
        assert_eq!(record.profit, U256::from(195));
        assert_eq!(
            env.balance_of(addr(DEBT), addr(OWNER)),
            U256::from(195),
            "profit forwarded to owner"
        );
        // Contract retains only the owed amount (repaid via approval).
        assert_eq!(env.balance_of(addr(DEBT), addr(THIS)), U256::from(1005));
        assert_eq!(env.balance_of(addr(COLLATERAL), addr(THIS)), U256::ZERO);
    }

    #[test]
    fn rejects_caller_that_is_not_the_pool() {
        let mut routine = SettlementRoutine::new(config());
        let mut env = MockEnv::new();
        let err = routine
            .execute_operation(
                &mut env,
                addr(0x99),
                &terms(1000, 5),
                &encode_params(&hop_params(900, 500, 0)),
            )
            .unwrap_err();
        assert!(matches!(err, SettlementError::CallerNotPool));
        assert!(env.approvals.is_empty(), "no state touched");
    }

    #[test]
    fn rejects_untrusted_initiator() {
        let mut routine = SettlementRoutine::new(config());
        let mut env = MockEnv::new();
        let mut bad_terms = terms(1000, 5);
        bad_terms.initiator = addr(0x99);
        let err = routine
            .execute_operation(
                &mut env,
                addr(POOL),
                &bad_terms,
                &encode_params(&hop_params(900, 500, 0)),
            )
            .unwrap_err();
        assert!(matches!(err, SettlementError::UntrustedInitiator));
    }

    #[test]
    fn liquidation_revert_aborts_with_reason() {
        let mut routine = SettlementRoutine::new(config());
        let mut env = MockEnv::new();
        env.credit(addr(DEBT), addr(THIS), U256::from(1000));
        env.liquidation_reverts = Some("health factor above threshold".into());

        let err = routine
            .execute_operation(
                &mut env,
                addr(POOL),
                &terms(1000, 5),
                &encode_params(&hop_params(900, 500, 0)),
            )
            .unwrap_err();
        assert!(matches!(err, SettlementError::LiquidationFailed(_)));
    }

    #[test]
    fn no_collateral_received_aborts_when_unrepayable() {
        let mut routine = SettlementRoutine::new(config());
        let mut env = MockEnv::new();
        env.credit(addr(DEBT), addr(THIS), U256::from(1000));
        env.seize_amount = U256::ZERO; // nothing seized

        let err = routine
            .execute_operation(
                &mut env,
                addr(POOL),
                &terms(1000, 5),
                &encode_params(&hop_params(900, 500, 0)),
            )
            .unwrap_err();
        assert!(matches!(err, SettlementError::NoCollateralReceived));
    }

    #[test]
    fn no_collateral_but_debt_asset_covers_repays_directly() {
        let mut routine = SettlementRoutine::new(config());
        let mut env = MockEnv::new();
        // Seized "collateral" arrived as the debt asset itself: balance
        // after liquidation still covers principal + fee.
        env.credit(addr(DEBT), addr(THIS), U256::from(1200));
        env.seize_amount = U256::ZERO;

        let record = routine
            .execute_operation(
                &mut env,
                addr(POOL),
                &terms(1000, 5),
                &encode_params(&hop_params(100, 0, 0)),
            )
            .unwrap();
        assert_eq!(record.path, SettlementPath::DirectRepay);
        // 1200 - 100 repaid - 1005 owed = 95 profit.
        assert_eq!(record.profit, U256::from(95));
    }

    #[test]
    fn swap_failure_aborts_with_reason() {
        let mut routine = SettlementRoutine::new(config());
        let mut env = MockEnv::new();
        env.credit(addr(DEBT), addr(THIS), U256::from(1000));
        env.seize_amount = U256::from(600);
        env.swap_output = Err("STF".into());

        let err = routine
            .execute_operation(
                &mut env,
                addr(POOL),
                &terms(1000, 5),
                &encode_params(&hop_params(900, 600, 0)),
            )
            .unwrap_err();
        match err {
            SettlementError::SwapFailed(reason) => assert_eq!(reason, "STF"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn insufficient_output_aborts() {
        let mut routine = SettlementRoutine::new(config());
        let mut env = MockEnv::new();
        env.credit(addr(DEBT), addr(THIS), U256::from(1000));
        env.seize_amount = U256::from(600);
        env.swap_output = Ok(U256::from(800)); // 100 + 800 < 1005 owed

        let err = routine
            .execute_operation(
                &mut env,
                addr(POOL),
                &terms(1000, 5),
                &encode_params(&hop_params(900, 600, 0)),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            SettlementError::InsufficientOutput { have, need }
                if have == U256::from(900) && need == U256::from(1005)
        ));
    }

    #[test]
    fn instruction_path_is_used_when_calldata_present() {
        let mut routine = SettlementRoutine::new(config());
        let mut env = MockEnv::new();
        env.credit(addr(DEBT), addr(THIS), U256::from(1000));
        env.seize_amount = U256::from(600);
        env.swap_output = Ok(U256::from(1100));

        let params = LiquidationParams {
            swapTarget: addr(ROUTER),
            swapCalldata: Bytes::from(vec![0x01]),
            pathTokens: vec![],
            hops: vec![],
            ..hop_params(900, 0, 0)
        };
        let record = routine
            .execute_operation(
                &mut env,
                addr(POOL),
                &terms(1000, 5),
                &encode_params(&params),
            )
            .unwrap();
        assert_eq!(record.path, SettlementPath::Instruction);
    }

    #[test]
    fn wraps_incidental_native_balance() {
        let mut routine = SettlementRoutine::new(config());
        let mut env = MockEnv::new();
        env.credit(addr(DEBT), addr(THIS), U256::from(1100));
        env.seize_amount = U256::ZERO;
        env.native.insert(addr(THIS), U256::from(7));

        routine
            .execute_operation(
                &mut env,
                addr(POOL),
                &terms(1000, 5),
                &encode_params(&hop_params(50, 0, 0)),
            )
            .unwrap();
        assert_eq!(env.native_balance(addr(THIS)), U256::ZERO);
        assert_eq!(env.balance_of(addr(WNATIVE), addr(THIS)), U256::from(7));
    }

    #[test]
    fn initiate_is_owner_gated() {
        let routine = SettlementRoutine::new(config());
        let params = hop_params(900, 500, 0);
        assert!(routine.initiate(addr(OWNER), &params).is_ok());
        assert!(matches!(
            routine.initiate(addr(0x99), &params),
            Err(SettlementError::NotOwner)
        ));
    }

    #[test]
    fn rescue_sweeps_token_amount_or_everything() {
        let routine = SettlementRoutine::new(config());
        let mut env = MockEnv::new();
        env.credit(addr(DEBT), addr(THIS), U256::from(500));

        // Non-owner rejected.
        assert!(matches!(
            routine.rescue(&mut env, addr(0x99), Some(addr(DEBT)), None, addr(OWNER)),
            Err(SettlementError::NotOwner)
        ));

        // Partial amount.
        let swept = routine
            .rescue(
                &mut env,
                addr(OWNER),
                Some(addr(DEBT)),
                Some(U256::from(200)),
                addr(OWNER),
            )
            .unwrap();
        assert_eq!(swept, U256::from(200));

        // Entire remaining balance.
        let swept = routine
            .rescue(&mut env, addr(OWNER), Some(addr(DEBT)), None, addr(OWNER))
            .unwrap();
        assert_eq!(swept, U256::from(300));
        assert_eq!(env.balance_of(addr(DEBT), addr(THIS)), U256::ZERO);
        assert_eq!(env.balance_of(addr(DEBT), addr(OWNER)), U256::from(500));
    }

    #[test]
    fn rescue_sweeps_native_balance() {
        let routine = SettlementRoutine::new(config());
        let mut env = MockEnv::new();
        env.native.insert(addr(THIS), U256::from(42));

        let swept = routine
            .rescue(&mut env, addr(OWNER), None, None, addr(OWNER))
            .unwrap();
        assert_eq!(swept, U256::from(42));
        assert_eq!(env.native_balance(addr(OWNER)), U256::from(42));
    }
}
