//! Domain events and their channel mapping

use chrono::{DateTime, Utc};
use event_bus::{Channel, Message};
use fee_engine::{
    FeeAdjustmentRecord, LiquidityPosition, MarketSample, Pool, PositionId, Withdrawal,
};
use governance::{
    Delegation, GovernanceParameters, StatusChange, TreasuryAsset, TreasuryExpenditure,
    TreasuryRevenue, Vote, VotingPower,
};
use ledger_core::{Address, Amount};
use serde::{Deserialize, Serialize};

/// Something that changed, published after the command commits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    /// Pool registered
    PoolCreated(Box<Pool>),
    /// Fee rate moved
    FeeAdjusted(FeeAdjustmentRecord),
    /// Pool reconfigured by governance
    PoolConfigUpdated(Box<Pool>),
    /// Market sample stored
    #[serde(rename_all = "camelCase")]
    MarketSampleRecorded {
        /// Pool
        pool: Address,
        /// Sample
        sample: MarketSample,
    },
    /// Deposit
    LiquidityAdded(LiquidityPosition),
    /// Withdrawal
    #[serde(rename_all = "camelCase")]
    LiquidityRemoved {
        /// Owner
        user: Address,
        /// Pool
        pool: Address,
        /// Withdrawal
        withdrawal: Withdrawal,
    },
    /// Fees credited to a pool's positions
    #[serde(rename_all = "camelCase")]
    FeesAccrued {
        /// Pool
        pool: Address,
        /// Fees collected
        fees: Amount,
        /// Fees credited
        credited: Amount,
    },
    /// Rewards paid
    #[serde(rename_all = "camelCase")]
    RewardsClaimed {
        /// Owner
        user: Address,
        /// Position
        position_id: PositionId,
        /// Paid
        amount: Amount,
    },
    /// Proposal stored or opened
    ProposalCreated(Box<governance::Proposal>),
    /// Proposal status moved
    ProposalStatusChanged(StatusChange),
    /// Governance parameters replaced
    GovernanceParametersUpdated(GovernanceParameters),
    /// Vote recorded
    VoteCast(Vote),
    /// Delegation created or cancelled
    DelegationChanged(Delegation),
    /// An account's voting power changed
    VotingPowerUpdated(VotingPower),
    /// Treasury spend
    TreasuryExpenditure(TreasuryExpenditure),
    /// Treasury income
    TreasuryRevenue(TreasuryRevenue),
    /// Treasury holding changed
    TreasuryAssetUpdated(TreasuryAsset),
}

impl Event {
    /// Push channel
    pub fn channel(&self) -> Channel {
        match self {
            Event::PoolCreated(_) | Event::FeeAdjusted(_) | Event::PoolConfigUpdated(_) => {
                Channel::PoolUpdates
            }
            Event::LiquidityAdded(_)
            | Event::LiquidityRemoved { .. }
            | Event::FeesAccrued { .. }
            | Event::RewardsClaimed { .. } => Channel::LiquidityUpdates,
            Event::ProposalCreated(_)
            | Event::ProposalStatusChanged(_)
            | Event::GovernanceParametersUpdated(_) => Channel::ProposalUpdates,
            Event::VoteCast(_) | Event::DelegationChanged(_) | Event::VotingPowerUpdated(_) => {
                Channel::VoteUpdates
            }
            Event::MarketSampleRecorded { .. }
            | Event::TreasuryExpenditure(_)
            | Event::TreasuryRevenue(_)
            | Event::TreasuryAssetUpdated(_) => Channel::AnalyticsUpdates,
        }
    }

    /// Wire type
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::PoolCreated(_) => "pool_created",
            Event::FeeAdjusted(_) => "fee_adjusted",
            Event::PoolConfigUpdated(_) => "pool_config_updated",
            Event::MarketSampleRecorded { .. } => "market_sample_recorded",
            Event::LiquidityAdded(_) => "liquidity_added",
            Event::LiquidityRemoved { .. } => "liquidity_removed",
            Event::FeesAccrued { .. } => "fees_accrued",
            Event::RewardsClaimed { .. } => "rewards_claimed",
            Event::ProposalCreated(_) => "proposal_created",
            Event::ProposalStatusChanged(_) => "proposal_status_changed",
            Event::GovernanceParametersUpdated(_) => "governance_parameters_updated",
            Event::VoteCast(_) => "vote_cast",
            Event::DelegationChanged(_) => "delegation_changed",
            Event::VotingPowerUpdated(_) => "voting_power_updated",
            Event::TreasuryExpenditure(_) => "treasury_expenditure",
            Event::TreasuryRevenue(_) => "treasury_revenue",
            Event::TreasuryAssetUpdated(_) => "treasury_asset_updated",
        }
    }

    /// Entity the event concerns
    pub fn key(&self) -> String {
        match self {
            Event::PoolCreated(pool) | Event::PoolConfigUpdated(pool) => pool.address.to_string(),
            Event::FeeAdjusted(record) => record.pool.to_string(),
            Event::MarketSampleRecorded { pool, .. }
            | Event::LiquidityRemoved { pool, .. }
            | Event::FeesAccrued { pool, .. } => pool.to_string(),
            Event::LiquidityAdded(position) => position.pool.to_string(),
            Event::RewardsClaimed { position_id, .. } => position_id.to_string(),
            Event::ProposalCreated(proposal) => proposal.proposal_id.to_string(),
            Event::ProposalStatusChanged(change) => change.proposal_id.to_string(),
            Event::GovernanceParametersUpdated(_) => "governance".to_string(),
            Event::VoteCast(vote) => vote.proposal_id.to_string(),
            Event::DelegationChanged(d) => d.delegator.to_string(),
            Event::VotingPowerUpdated(p) => p.user.to_string(),
            Event::TreasuryExpenditure(_)
            | Event::TreasuryRevenue(_)
            | Event::TreasuryAssetUpdated(_) => "treasury".to_string(),
        }
    }

    /// Bus envelope
    pub fn to_message(&self, timestamp: DateTime<Utc>) -> serde_json::Result<Message> {
        let mut value = serde_json::to_value(self)?;
        let data = value
            .get_mut("data")
            .map(serde_json::Value::take)
            .unwrap_or(serde_json::Value::Null);
        Ok(Message::new(self.channel(), self.event_type(), self.key(), data, timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use governance::{ProposalId, ProposalStatus};

    #[test]
    fn test_status_change_message() {
        let event = Event::ProposalStatusChanged(StatusChange {
            proposal_id: ProposalId(4),
            from: ProposalStatus::Active,
            to: ProposalStatus::Succeeded,
        });

        let msg = event.to_message(Utc::now()).unwrap();
        assert_eq!(msg.channel, Channel::ProposalUpdates);
        assert_eq!(msg.event_type, "proposal_status_changed");
        assert_eq!(msg.key, "4");
        assert_eq!(msg.data["to"], "SUCCEEDED");
    }

    #[test]
    fn test_accrual_goes_to_liquidity_channel() {
        let event = Event::FeesAccrued {
            pool: Address::from_seed(1),
            fees: Amount::new(100),
            credited: Amount::new(99),
        };
        let msg = event.to_message(Utc::now()).unwrap();
        assert_eq!(msg.channel, Channel::LiquidityUpdates);
        assert_eq!(msg.data["credited"], "99");
    }
}
