//! Delegation relation between addresses
//!
//! One level deep: delegated-in power can never be delegated onwards, and a
//! delegator has at most one active delegation. The graph only records the
//! relation; balances are derived by the voting power ledger.

use chrono::{DateTime, Utc};
use ledger_core::{Address, Amount};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// Delegation identifier
pub type DelegationId = Uuid;

/// One delegation record; only `is_active` and `cancelled_at` ever change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delegation {
    /// Record id
    pub delegation_id: DelegationId,
    /// Account lending its power
    pub delegator: Address,
    /// Account receiving the power
    pub delegatee: Address,
    /// Power delegated
    pub amount: Amount,
    /// When the delegation started
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    /// Still in force
    pub is_active: bool,
    /// When the delegation was cancelled
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// Directed delegation relation with history
#[derive(Debug, Default)]
pub struct DelegationGraph {
    records: Vec<Delegation>,
    active: HashMap<Address, usize>,
    incoming: HashMap<Address, BTreeSet<Address>>,
}

impl DelegationGraph {
    /// Empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Active outgoing delegation of `delegator`
    pub fn active_of(&self, delegator: &Address) -> Option<&Delegation> {
        self.active.get(delegator).and_then(|&i| self.records.get(i))
    }

    /// Active delegations received by `delegatee`
    pub fn delegators_of(&self, delegatee: &Address) -> Vec<&Delegation> {
        self.incoming
            .get(delegatee)
            .into_iter()
            .flatten()
            .filter_map(|delegator| self.active_of(delegator))
            .collect()
    }

    /// Number of accounts currently delegating to `delegatee`
    pub fn delegator_count(&self, delegatee: &Address) -> usize {
        self.incoming.get(delegatee).map_or(0, |s| s.len())
    }

    /// Every delegation `user` took part in, oldest first
    pub fn history<'a>(&'a self, user: &'a Address) -> impl Iterator<Item = &'a Delegation> {
        self.records
            .iter()
            .filter(move |d| d.delegator == *user || d.delegatee == *user)
    }

    /// All active delegations
    pub fn active(&self) -> impl Iterator<Item = &Delegation> {
        self.active.values().filter_map(|&i| self.records.get(i))
    }

    /// Record a new delegation. Callers check the single-active rule first.
    pub(crate) fn insert(&mut self, delegation: Delegation) {
        let index = self.records.len();
        self.incoming
            .entry(delegation.delegatee.clone())
            .or_default()
            .insert(delegation.delegator.clone());
        self.active.insert(delegation.delegator.clone(), index);
        self.records.push(delegation);
    }

    /// Deactivate the active delegation of `delegator`
    pub(crate) fn deactivate(
        &mut self,
        delegator: &Address,
        now: DateTime<Utc>,
    ) -> Option<Delegation> {
        let index = self.active.remove(delegator)?;
        let record = self.records.get_mut(index)?;
        record.is_active = false;
        record.cancelled_at = Some(now);

        if let Some(set) = self.incoming.get_mut(&record.delegatee) {
            set.remove(delegator);
            if set.is_empty() {
                self.incoming.remove(&record.delegatee);
            }
        }
        Some(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delegation(from: u64, to: u64, amount: u128) -> Delegation {
        Delegation {
            delegation_id: ledger_core::new_record_id(),
            delegator: Address::from_seed(from),
            delegatee: Address::from_seed(to),
            amount: Amount::new(amount),
            created_at: Utc::now(),
            is_active: true,
            cancelled_at: None,
        }
    }

    #[test]
    fn test_insert_and_query() {
        let mut graph = DelegationGraph::new();
        graph.insert(delegation(1, 3, 100));
        graph.insert(delegation(2, 3, 50));

        let to = Address::from_seed(3);
        assert_eq!(graph.delegator_count(&to), 2);
        assert_eq!(graph.delegators_of(&to).len(), 2);
        assert_eq!(graph.active_of(&Address::from_seed(1)).unwrap().amount, Amount::new(100));
    }

    #[test]
    fn test_deactivate_keeps_history() {
        let mut graph = DelegationGraph::new();
        graph.insert(delegation(1, 3, 100));

        let from = Address::from_seed(1);
        let cancelled = graph.deactivate(&from, Utc::now()).unwrap();
        assert!(!cancelled.is_active);
        assert!(cancelled.cancelled_at.is_some());

        assert!(graph.active_of(&from).is_none());
        assert_eq!(graph.delegator_count(&Address::from_seed(3)), 0);
        assert_eq!(graph.history(&from).count(), 1);
        assert!(graph.deactivate(&from, Utc::now()).is_none());
    }
}
