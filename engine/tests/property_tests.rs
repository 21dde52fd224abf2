//! Property-based tests over random command sequences
//!
//! After every command, accepted or rejected:
//! - Every pool's fee stays inside its band and shares add up
//! - Each proposal's tally equals the power of its counted votes
//! - No account has delegated more than it owns
//! - Treasury spending never exceeds the budget

use chrono::{DateTime, Duration, TimeZone, Utc};
use engine::{Command, Config, EngineState};
use fee_engine::{FeeAdjustmentParams, MarketSample, PoolCreationParams, TokenInfo};
use governance::{
    ExpenditureRequest, ExpenditureType, GovernanceParameters, ProposalDraft, ProposalFilter,
    ProposalId, ProposalType,
};
use ledger_core::{Address, Amount, Bps, Percent};
use proptest::prelude::*;
use rust_decimal::Decimal;

const GUARDIAN: u64 = 900;
const USERS: u64 = 5;

#[derive(Debug, Clone)]
enum Op {
    Sample { volume: u64, volatility: u32, liquidity: u64 },
    AdjustFee { target: u32, emergency: bool },
    AddLiquidity { user: u64, a: u64, b: u64 },
    RemoveLiquidity { pick: usize, percent: u8 },
    AccrueFees { fees: u64 },
    Sync { user: u64, balance: u64 },
    Delegate { from: u64, to: u64, amount: u64 },
    CancelDelegation { from: u64 },
    Propose { user: u64 },
    Vote { user: u64, pick: usize, option: usize },
    Spend { category: usize, amount: u64 },
    Advance { secs: i64 },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u64..3_000_000, 0u32..20, 0u64..400_000).prop_map(|(volume, volatility, liquidity)| {
            Op::Sample { volume, volatility, liquidity }
        }),
        (0u32..12_000, any::<bool>())
            .prop_map(|(target, emergency)| Op::AdjustFee { target, emergency }),
        (0..USERS, 0u64..10_000, 0u64..10_000)
            .prop_map(|(user, a, b)| Op::AddLiquidity { user, a, b }),
        (any::<usize>(), 1u8..=100)
            .prop_map(|(pick, percent)| Op::RemoveLiquidity { pick, percent }),
        (0u64..5_000).prop_map(|fees| Op::AccrueFees { fees }),
        (0..USERS, 0u64..1_000).prop_map(|(user, balance)| Op::Sync { user, balance }),
        (0..USERS, 0..USERS, 0u64..1_000)
            .prop_map(|(from, to, amount)| Op::Delegate { from, to, amount }),
        (0..USERS).prop_map(|from| Op::CancelDelegation { from }),
        (0..USERS).prop_map(|user| Op::Propose { user }),
        (0..USERS, any::<usize>(), 0usize..3)
            .prop_map(|(user, pick, option)| Op::Vote { user, pick, option }),
        (0usize..6, 0u64..400_000).prop_map(|(category, amount)| Op::Spend { category, amount }),
        (0i64..5_000).prop_map(|secs| Op::Advance { secs }),
    ]
}

fn addr(seed: u64) -> Address {
    Address::from_seed(seed)
}

fn config() -> Config {
    Config {
        guardians: vec![addr(GUARDIAN)],
        governance: GovernanceParameters {
            proposal_threshold: Amount::new(10),
            voting_period: 3600,
            execution_delay: 600,
            passing_threshold: Percent::from_int(60).unwrap(),
            quorum_threshold: Percent::from_int(20).unwrap(),
            emergency_threshold: Percent::from_int(75).unwrap(),
            emergency_execution_delay: 0,
            max_proposals: 5,
            proposal_cooldown: 0,
        },
        ..Config::default()
    }
}

fn pool_params() -> PoolCreationParams {
    let token = |seed: u64, symbol: &str| TokenInfo {
        address: addr(seed),
        symbol: symbol.to_string(),
        decimals: 18,
    };
    PoolCreationParams {
        token_a: token(0xa, "WETH"),
        token_b: token(0xb, "USDC"),
        initial_fee_rate: Bps::saturating(30),
        min_fee_rate: Bps::saturating(10),
        max_fee_rate: Bps::saturating(100),
        fee_adjustment_step: Bps::saturating(5),
        fee_adjustment_cooldown: 600,
        fee_adjustment_params: FeeAdjustmentParams::default(),
        enable_dynamic_fee: true,
        name: None,
        description: None,
    }
}

fn to_command(state: &EngineState, pool: &Address, op: Op, now: DateTime<Utc>) -> Command {
    match op {
        Op::Sample { volume, volatility, liquidity } => Command::SubmitMarketSample {
            pool: pool.clone(),
            sample: MarketSample {
                timestamp: now,
                volume: Amount::from(volume),
                trades: 10,
                liquidity: Amount::from(liquidity),
                price: Decimal::ONE,
                fee_revenue: Amount::ZERO,
                volatility: Decimal::from(volatility),
            },
            reporter: addr(50),
        },
        Op::AdjustFee { target, emergency } => Command::AdjustFee {
            caller: addr(GUARDIAN),
            pool: pool.clone(),
            new_fee_rate: Bps::saturating(target),
            emergency,
        },
        Op::AddLiquidity { user, a, b } => Command::AddLiquidity {
            user: addr(user),
            pool: pool.clone(),
            amount_a: Amount::from(a),
            amount_b: Amount::from(b),
        },
        Op::RemoveLiquidity { pick, percent } => {
            let positions = state.pools().positions(None, Some(pool));
            match positions.get(pick % positions.len().max(1)) {
                Some(p) => Command::RemoveLiquidity {
                    user: p.user.clone(),
                    position_id: p.position_id,
                    shares: p
                        .liquidity_shares
                        .checked_mul_div(percent as u128, 100)
                        .unwrap_or(p.liquidity_shares),
                },
                None => Command::FinalizeProposals,
            }
        }
        Op::AccrueFees { fees } => Command::AccrueFees {
            pool: pool.clone(),
            fees: Amount::from(fees),
        },
        Op::Sync { user, balance } => Command::SyncBalance {
            user: addr(user),
            token_balance: Amount::from(balance),
            staked_balance: Amount::ZERO,
        },
        Op::Delegate { from, to, amount } => Command::Delegate {
            delegator: addr(from),
            delegatee: addr(to),
            amount: Amount::from(amount),
        },
        Op::CancelDelegation { from } => Command::CancelDelegation { delegator: addr(from) },
        Op::Propose { user } => Command::CreateProposal {
            proposer: addr(user),
            draft: Box::new(ProposalDraft {
                title: "Tune fees".to_string(),
                description: "Random proposal".to_string(),
                proposal_type: ProposalType::FeeAdjustment,
                options: Vec::new(),
                execution_action: None,
                authorized_value: Amount::ZERO,
                related_pools: vec![pool.clone()],
            }),
        },
        Op::Vote { user, pick, option } => {
            let (proposals, _) = state.proposals().list(&ProposalFilter::default());
            let id = proposals
                .get(pick % proposals.len().max(1))
                .map(|p| p.proposal_id)
                .unwrap_or(ProposalId(1));
            Command::CastVote {
                voter: addr(user),
                proposal_id: id,
                selected_options: vec![["for", "against", "abstain"][option].to_string()],
                reason: None,
            }
        }
        Op::Spend { category, amount } => {
            let categories = [
                ExpenditureType::Development,
                ExpenditureType::Marketing,
                ExpenditureType::Operations,
                ExpenditureType::Grants,
                ExpenditureType::LiquidityIncentives,
                ExpenditureType::Emergency,
            ];
            Command::RecordExpenditure {
                caller: addr(GUARDIAN),
                request: ExpenditureRequest {
                    expenditure_type: categories[category],
                    amount: Amount::from(amount),
                    asset: addr(60),
                    recipient: addr(61),
                    reason: "random".to_string(),
                    proposal_id: None,
                },
            }
        }
        Op::Advance { .. } => Command::FinalizeProposals,
    }
}

fn check_invariants(state: &EngineState) -> Result<(), TestCaseError> {
    for pool in state.pools().pools() {
        prop_assert!(pool.fees.min_fee_rate <= pool.fee_rate());
        prop_assert!(pool.fee_rate() <= pool.fees.max_fee_rate);
    }
    prop_assert!(state.pools().check_invariants().is_ok());

    for proposal in state.proposals().proposals() {
        let votes = state.proposals().votes(proposal.proposal_id).unwrap();
        let counted: Amount = votes.iter().map(|v| v.voting_power).sum();
        let r = &proposal.results;
        let tallied = r
            .for_votes
            .checked_add(r.against_votes)
            .and_then(|s| s.checked_add(r.abstain_votes))
            .unwrap();
        prop_assert_eq!(tallied, counted);
        prop_assert_eq!(r.total_votes as usize, votes.len());
    }

    prop_assert!(state.voting().check_invariants().is_ok());

    let budget = state.treasury().budget();
    let used: Amount = budget.categories.iter().map(|c| c.used_amount).sum();
    prop_assert!(used <= budget.total_budget);
    prop_assert!(state.treasury().check_invariants().is_ok());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Invariants hold after every step of a random command sequence
    #[test]
    fn prop_invariants_hold(ops in prop::collection::vec(op(), 1..60)) {
        let mut state = EngineState::new(&config()).unwrap();
        let mut now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let created = state.process(
            Command::CreatePool { creator: addr(40), params: Box::new(pool_params()) },
            now,
        );
        prop_assert!(created.result.is_ok());
        let pool = pool_params().pool_address();

        for op in ops {
            if let Op::Advance { secs } = op {
                now += Duration::seconds(secs);
            }
            let command = to_command(&state, &pool, op, now);
            let before = state.sequence();
            let processed = state.process(command, now);
            // Sequence moves only on success
            prop_assert_eq!(state.sequence(), before + processed.result.is_ok() as u64);
            check_invariants(&state)?;
        }
    }

    /// Automatic adjustments move at most one step per cooldown window
    #[test]
    fn prop_fee_moves_one_step_per_window(
        samples in prop::collection::vec((0u64..3_000_000, 0u32..20, 0u64..400_000), 1..30),
    ) {
        let mut state = EngineState::new(&config()).unwrap();
        let mut now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        state
            .process(
                Command::CreatePool { creator: addr(40), params: Box::new(pool_params()) },
                now,
            )
            .result
            .unwrap();
        let pool = pool_params().pool_address();

        for (volume, volatility, liquidity) in samples {
            now += Duration::seconds(300);
            let before = state.pools().get(&pool).unwrap().fee_rate();
            let op = Op::Sample { volume, volatility, liquidity };
            let command = to_command(&state, &pool, op, now);
            state.process(command, now).result.unwrap();
            let after = state.pools().get(&pool).unwrap().fee_rate();
            let moved = (after.get() as i64 - before.get() as i64).unsigned_abs();
            // Several signals can breach together; the cap bounds the combined step
            prop_assert!(moved <= 5 * 3);
        }

        let history: Vec<_> = state.pools().history(&pool).collect();
        for pair in history.windows(2) {
            prop_assert!(pair[1].timestamp - pair[0].timestamp >= Duration::seconds(600));
        }
    }
}
