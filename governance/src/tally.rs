//! Vote tallying
//!
//! The tally is kept incrementally: a recast vote first retracts the
//! earlier vote's power, then counts the new one, so every counted vote
//! contributes exactly once.

use crate::proposal::ProposalOption;
use crate::{Error, Result};
use ledger_core::{Amount, Percent};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What a vote for an option means
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoteChoice {
    /// In favour
    For,
    /// Against
    Against,
    /// Counted toward participation only
    Abstain,
}

/// Per-option totals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionResult {
    /// Option id
    pub option_id: String,
    /// Votes selecting the option
    pub vote_count: u32,
    /// Power behind the option
    pub voting_power: Amount,
    /// Share of cast power, percent
    pub vote_rate: Decimal,
}

/// Derived tally of a proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotingResult {
    /// Counted votes
    pub total_votes: u32,
    /// Power cast
    pub total_voting_power: Amount,
    /// Power for
    pub for_votes: Amount,
    /// Power against
    pub against_votes: Amount,
    /// Power abstaining
    pub abstain_votes: Amount,
    /// `total_voting_power / eligible`, percent (capped at 100)
    pub participation_rate: Decimal,
    /// Per-option totals
    pub option_results: Vec<OptionResult>,
    /// Quorum and passing threshold both met
    pub is_passed: bool,
    /// Threshold applied, percent
    pub passing_threshold: Decimal,
    /// `for / (for + against)`, percent
    pub actual_vote_rate: Decimal,
    /// Participation met the quorum
    pub quorum_reached: bool,
}

impl VotingResult {
    /// Empty tally over `options`
    pub fn new(options: &[ProposalOption], passing_threshold: Percent) -> Self {
        Self {
            total_votes: 0,
            total_voting_power: Amount::ZERO,
            for_votes: Amount::ZERO,
            against_votes: Amount::ZERO,
            abstain_votes: Amount::ZERO,
            participation_rate: Decimal::ZERO,
            option_results: options
                .iter()
                .map(|o| OptionResult {
                    option_id: o.option_id.clone(),
                    vote_count: 0,
                    voting_power: Amount::ZERO,
                    vote_rate: Decimal::ZERO,
                })
                .collect(),
            is_passed: false,
            passing_threshold: passing_threshold.get(),
            actual_vote_rate: Decimal::ZERO,
            quorum_reached: false,
        }
    }

    fn choice_total(&mut self, choice: VoteChoice) -> &mut Amount {
        match choice {
            VoteChoice::For => &mut self.for_votes,
            VoteChoice::Against => &mut self.against_votes,
            VoteChoice::Abstain => &mut self.abstain_votes,
        }
    }

    fn option_mut(&mut self, option_id: &str) -> Result<&mut OptionResult> {
        self.option_results
            .iter_mut()
            .find(|o| o.option_id == option_id)
            .ok_or_else(|| Error::InvalidOption(option_id.to_string()))
    }

    /// Add a vote's power
    pub fn count(&mut self, option_id: &str, choice: VoteChoice, power: Amount) -> Result<()> {
        let option = self.option_mut(option_id)?;
        option.vote_count += 1;
        option.voting_power = option.voting_power.checked_add(power)?;

        let total = self.choice_total(choice);
        *total = total.checked_add(power)?;
        self.total_votes += 1;
        self.total_voting_power = self.total_voting_power.checked_add(power)?;
        Ok(())
    }

    /// Remove a previously counted vote's power
    pub fn retract(&mut self, option_id: &str, choice: VoteChoice, power: Amount) -> Result<()> {
        let option = self.option_mut(option_id)?;
        option.vote_count = option.vote_count.saturating_sub(1);
        option.voting_power = option.voting_power.checked_sub(power)?;

        let total = self.choice_total(choice);
        *total = total.checked_sub(power)?;
        self.total_votes = self.total_votes.saturating_sub(1);
        self.total_voting_power = self.total_voting_power.checked_sub(power)?;
        Ok(())
    }

    /// Recompute rates and the pass decision
    pub fn refresh(
        &mut self,
        eligible: Amount,
        passing_threshold: Percent,
        quorum_threshold: Percent,
    ) {
        let hundred = Decimal::ONE_HUNDRED;
        self.participation_rate = self
            .total_voting_power
            .ratio_of(eligible)
            .checked_mul(hundred)
            .map_or(hundred, |rate| rate.min(hundred))
            .round_dp(4);

        let decisive = self.for_votes.checked_add(self.against_votes).unwrap_or(Amount::MAX);
        self.actual_vote_rate = (self.for_votes.ratio_of(decisive) * hundred).round_dp(4);

        let cast = self.total_voting_power;
        for option in &mut self.option_results {
            option.vote_rate = (option.voting_power.ratio_of(cast) * hundred).round_dp(4);
        }

        self.passing_threshold = passing_threshold.get();
        self.quorum_reached = !eligible.is_zero()
            && self.total_voting_power.ratio_of(eligible) >= quorum_threshold.as_fraction();
        self.is_passed = self.quorum_reached
            && !decisive.is_zero()
            && self.for_votes.ratio_of(decisive) >= passing_threshold.as_fraction();
    }
}
