//! Property-based tests for tallying and delegation
//!
//! - Choice totals and option totals both equal the power cast, however
//!   often voters recast
//! - Voting power is conserved under any mix of syncs and delegations

use chrono::{TimeZone, Utc};
use governance::{default_options, VoteChoice, VotingPowerLedger, VotingResult};
use ledger_core::{Address, Amount, Percent};
use proptest::prelude::*;
use std::collections::HashMap;

const VOTERS: u64 = 6;

#[derive(Debug, Clone)]
enum LedgerOp {
    Sync { user: u64, token: u64, staked: u64 },
    Delegate { from: u64, to: u64, amount: u64 },
    Cancel { from: u64 },
}

fn ledger_op() -> impl Strategy<Value = LedgerOp> {
    prop_oneof![
        (0..VOTERS, 0u64..1_000, 0u64..1_000)
            .prop_map(|(user, token, staked)| LedgerOp::Sync { user, token, staked }),
        (0..VOTERS, 0..VOTERS, 0u64..1_500)
            .prop_map(|(from, to, amount)| LedgerOp::Delegate { from, to, amount }),
        (0..VOTERS).prop_map(|from| LedgerOp::Cancel { from }),
    ]
}

fn choice(index: usize) -> (&'static str, VoteChoice) {
    [
        ("for", VoteChoice::For),
        ("against", VoteChoice::Against),
        ("abstain", VoteChoice::Abstain),
    ][index]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Recasting replaces the earlier vote exactly once
    #[test]
    fn prop_tally_matches_latest_votes(
        votes in prop::collection::vec((0..VOTERS, 0usize..3, 1u64..10_000), 1..40),
    ) {
        let threshold = Percent::from_int(50).unwrap();
        let mut result = VotingResult::new(&default_options(), threshold);
        let mut latest: HashMap<u64, (usize, Amount)> = HashMap::new();

        for (voter, pick, power) in votes {
            let power = Amount::from(power);
            if let Some((previous, old_power)) = latest.get(&voter).copied() {
                let (option, kind) = choice(previous);
                result.retract(option, kind, old_power).unwrap();
            }
            let (option, kind) = choice(pick);
            result.count(option, kind, power).unwrap();
            latest.insert(voter, (pick, power));
        }
        result.refresh(Amount::new(1_000_000), threshold, Percent::from_int(10).unwrap());

        let cast: Amount = latest.values().map(|(_, p)| *p).sum();
        let by_choice = result
            .for_votes
            .checked_add(result.against_votes)
            .and_then(|s| s.checked_add(result.abstain_votes))
            .unwrap();
        let by_option: Amount = result.option_results.iter().map(|o| o.voting_power).sum();
        prop_assert_eq!(result.total_voting_power, cast);
        prop_assert_eq!(by_choice, cast);
        prop_assert_eq!(by_option, cast);
        prop_assert_eq!(result.total_votes as usize, latest.len());
    }

    /// Delegation moves power around without creating or destroying it
    #[test]
    fn prop_delegation_conserves_power(ops in prop::collection::vec(ledger_op(), 1..60)) {
        let mut ledger = VotingPowerLedger::new();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let user = Address::from_seed;

        for op in ops {
            // Rejections are fine; the ledger must stay consistent either way
            let _ = match op {
                LedgerOp::Sync { user: u, token, staked } => ledger
                    .sync_balance(&user(u), Amount::from(token), Amount::from(staked))
                    .map(|_| ()),
                LedgerOp::Delegate { from, to, amount } => ledger
                    .apply_delegation(&user(from), &user(to), Amount::from(amount), now)
                    .map(|_| ()),
                LedgerOp::Cancel { from } => ledger.cancel_delegation(&user(from), now).map(|_| ()),
            };

            prop_assert!(ledger.check_invariants().is_ok());
            let total: Amount = (0..VOTERS).map(|u| ledger.voting_power(&user(u)).unwrap()).sum();
            prop_assert_eq!(total, ledger.total_supply());
        }
    }
}
