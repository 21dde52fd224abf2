//! Voting power ledger
//!
//! The one place voting power is derived:
//!
//! `total = token + staked + delegated_in - delegated_out`
//!
//! Owns the delegation graph so delegation and balances change together,
//! and tracks the power each voter has committed to each open proposal.

use crate::delegation::{Delegation, DelegationGraph};
use crate::proposal::ProposalId;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use ledger_core::{new_record_id, Address, Amount};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Delegation state of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DelegationStatus {
    /// Neither delegating nor receiving
    NotDelegated,
    /// Has an active outgoing delegation
    DelegatingOut,
    /// Receives delegated power
    Receiving,
}

/// Point-in-time view of an account's voting power
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotingPower {
    /// Account
    pub user: Address,
    /// Liquid governance token balance
    pub token_balance: Amount,
    /// Staked balance
    pub staked_balance: Amount,
    /// Power received through delegation
    pub delegated_balance: Amount,
    /// Power lent out through delegation
    pub delegated_out_balance: Amount,
    /// `token + staked + delegated_in - delegated_out`
    pub total_voting_power: Amount,
    /// `total - used`
    pub available_voting_power: Amount,
    /// Largest commitment on any open proposal
    pub used_voting_power: Amount,
    /// Delegation state
    pub delegation_status: DelegationStatus,
    /// Current delegatee, if delegating out
    pub delegatee: Option<Address>,
    /// Accounts delegating to this one
    pub delegator_count: usize,
}

#[derive(Debug, Clone, Default)]
struct Account {
    token_balance: Amount,
    staked_balance: Amount,
    delegated_in: Amount,
    delegated_out: Amount,
}

impl Account {
    fn own(&self) -> Result<Amount> {
        Ok(self.token_balance.checked_add(self.staked_balance)?)
    }

    fn total(&self) -> Result<Amount> {
        Ok(self
            .own()?
            .checked_add(self.delegated_in)?
            .checked_sub(self.delegated_out)?)
    }
}

/// Balances, delegation and vote commitments
#[derive(Debug, Default)]
pub struct VotingPowerLedger {
    accounts: HashMap<Address, Account>,
    delegations: DelegationGraph,
    committed: BTreeMap<ProposalId, HashMap<Address, Amount>>,
    total_supply: Amount,
}

impl VotingPowerLedger {
    /// Empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of every account's token and staked balance
    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Delegation relation
    pub fn delegations(&self) -> &DelegationGraph {
        &self.delegations
    }

    /// Mirror an account's on-chain balances
    pub fn sync_balance(
        &mut self,
        user: &Address,
        token_balance: Amount,
        staked_balance: Amount,
    ) -> Result<VotingPower> {
        let current = self.accounts.get(user).cloned().unwrap_or_default();
        let new_own = token_balance.checked_add(staked_balance)?;
        if new_own < current.delegated_out {
            return Err(Error::BalanceBelowDelegated(format!(
                "{} would hold {} but has delegated {}",
                user, new_own, current.delegated_out
            )));
        }

        let supply = self
            .total_supply
            .checked_sub(current.own()?)?
            .checked_add(new_own)?;

        // All checks passed
        self.total_supply = supply;
        let account = self.accounts.entry(user.clone()).or_default();
        account.token_balance = token_balance;
        account.staked_balance = staked_balance;

        debug!(user = %user.short(), balance = %new_own, "Balance synced");
        self.snapshot(user)
    }

    /// Current total voting power of `user`
    pub fn voting_power(&self, user: &Address) -> Result<Amount> {
        self.accounts.get(user).map_or(Ok(Amount::ZERO), |a| a.total())
    }

    /// Pure read of an account's voting power
    pub fn snapshot(&self, user: &Address) -> Result<VotingPower> {
        let account = self.accounts.get(user).cloned().unwrap_or_default();
        let total = account.total()?;
        let used = self
            .committed
            .values()
            .filter_map(|voters| voters.get(user))
            .copied()
            .max()
            .unwrap_or(Amount::ZERO);
        let delegatee = self.delegations.active_of(user).map(|d| d.delegatee.clone());
        let delegator_count = self.delegations.delegator_count(user);

        let delegation_status = if delegatee.is_some() {
            DelegationStatus::DelegatingOut
        } else if delegator_count > 0 {
            DelegationStatus::Receiving
        } else {
            DelegationStatus::NotDelegated
        };

        Ok(VotingPower {
            user: user.clone(),
            token_balance: account.token_balance,
            staked_balance: account.staked_balance,
            delegated_balance: account.delegated_in,
            delegated_out_balance: account.delegated_out,
            total_voting_power: total,
            available_voting_power: total.saturating_sub(used),
            used_voting_power: used,
            delegation_status,
            delegatee,
            delegator_count,
        })
    }

    /// Whether `user` has power committed to any open proposal
    pub fn has_commitment(&self, user: &Address) -> bool {
        self.committed.values().any(|voters| voters.contains_key(user))
    }

    /// Record the power `user` cast on `proposal`, replacing any earlier commitment
    pub(crate) fn commit(&mut self, proposal: ProposalId, user: &Address, power: Amount) {
        self.committed
            .entry(proposal)
            .or_default()
            .insert(user.clone(), power);
    }

    /// Release every commitment on a closed proposal
    pub(crate) fn release(&mut self, proposal: ProposalId) {
        self.committed.remove(&proposal);
    }

    /// Delegate `amount` of `delegator`'s own power to `delegatee`
    pub fn apply_delegation(
        &mut self,
        delegator: &Address,
        delegatee: &Address,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> Result<Delegation> {
        if amount.is_zero() {
            return Err(ledger_core::Error::InvalidAmount(
                "delegation amount must be positive".to_string(),
            )
            .into());
        }

        let from = self.accounts.get(delegator).cloned().unwrap_or_default();
        let available = from.own()?.saturating_sub(from.delegated_out);
        if amount > available {
            return Err(Error::DelegationExceedsBalance {
                requested: amount.to_string(),
                available: available.to_string(),
            });
        }
        if self.delegations.active_of(delegator).is_some() {
            return Err(Error::DelegationExists(delegator.to_string()));
        }
        if delegator == delegatee {
            return Err(Error::SelfDelegation(delegator.to_string()));
        }
        for user in [delegator, delegatee] {
            if self.has_commitment(user) {
                return Err(Error::PowerCommitted(user.to_string()));
            }
        }

        let to = self.accounts.get(delegatee).cloned().unwrap_or_default();
        let delegated_out = from.delegated_out.checked_add(amount)?;
        let delegated_in = to.delegated_in.checked_add(amount)?;

        // All checks passed
        self.accounts.entry(delegator.clone()).or_default().delegated_out = delegated_out;
        self.accounts.entry(delegatee.clone()).or_default().delegated_in = delegated_in;

        let delegation = Delegation {
            delegation_id: new_record_id(),
            delegator: delegator.clone(),
            delegatee: delegatee.clone(),
            amount,
            created_at: now,
            is_active: true,
            cancelled_at: None,
        };
        self.delegations.insert(delegation.clone());

        info!(
            delegator = %delegator.short(),
            delegatee = %delegatee.short(),
            amount = %amount,
            "Delegation applied"
        );
        Ok(delegation)
    }

    /// Cancel `delegator`'s active delegation, returning the power
    pub fn cancel_delegation(
        &mut self,
        delegator: &Address,
        now: DateTime<Utc>,
    ) -> Result<Delegation> {
        let active = self
            .delegations
            .active_of(delegator)
            .cloned()
            .ok_or_else(|| Error::NoActiveDelegation(delegator.to_string()))?;
        for user in [delegator, &active.delegatee] {
            if self.has_commitment(user) {
                return Err(Error::PowerCommitted(user.to_string()));
            }
        }

        let from = self.accounts.get(delegator).cloned().unwrap_or_default();
        let to = self.accounts.get(&active.delegatee).cloned().unwrap_or_default();
        let delegated_out = from.delegated_out.checked_sub(active.amount)?;
        let delegated_in = to.delegated_in.checked_sub(active.amount)?;

        // All checks passed
        self.accounts.entry(delegator.clone()).or_default().delegated_out = delegated_out;
        self.accounts.entry(active.delegatee.clone()).or_default().delegated_in = delegated_in;
        let cancelled = self
            .delegations
            .deactivate(delegator, now)
            .ok_or_else(|| Error::NoActiveDelegation(delegator.to_string()))?;

        info!(delegator = %delegator.short(), amount = %active.amount, "Delegation cancelled");
        Ok(cancelled)
    }

    /// Verify that no account has delegated more than it owns
    pub fn check_invariants(&self) -> Result<()> {
        for (user, account) in &self.accounts {
            if account.delegated_out > account.own()? {
                return Err(Error::BalanceBelowDelegated(format!(
                    "{} delegated {} of {}",
                    user,
                    account.delegated_out,
                    account.own()?
                )));
            }
        }
        Ok(())
    }
}
