//! Typed commands and their outcomes

use crate::api::TxReceipt;
use crate::event::Event;
use fee_engine::{
    FeeAdjustmentRecord, LiquidityPosition, MarketSample, Pool, PoolCreationParams, PositionId,
    Withdrawal,
};
use governance::{
    Delegation, ExpenditureRequest, Proposal, ProposalDraft, ProposalId, RevenueRequest,
    StatusChange, TreasuryAsset, TreasuryExpenditure, TreasuryRevenue, Vote, VotingPower,
};
use ledger_core::{Address, Amount, Bps};
use serde::{Deserialize, Serialize};

/// A state-changing request. Callers are already authenticated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", content = "params", rename_all = "camelCase")]
pub enum Command {
    /// Register a pool
    #[serde(rename_all = "camelCase")]
    CreatePool {
        /// Creator
        creator: Address,
        /// Pool definition
        params: Box<PoolCreationParams>,
    },
    /// Record market telemetry; may adjust the pool's fee
    #[serde(rename_all = "camelCase")]
    SubmitMarketSample {
        /// Pool
        pool: Address,
        /// Observation
        sample: MarketSample,
        /// Reporter, recorded as the adjuster of any resulting adjustment
        reporter: Address,
    },
    /// Guardian-directed fee change
    #[serde(rename_all = "camelCase")]
    AdjustFee {
        /// Guardian
        caller: Address,
        /// Pool
        pool: Address,
        /// Target rate (clamped into the pool's band)
        new_fee_rate: Bps,
        /// Bypass the cooldown
        emergency: bool,
    },
    /// Deposit into a pool
    #[serde(rename_all = "camelCase")]
    AddLiquidity {
        /// Depositor
        user: Address,
        /// Pool
        pool: Address,
        /// Token A amount
        amount_a: Amount,
        /// Token B amount
        amount_b: Amount,
    },
    /// Withdraw from a position
    #[serde(rename_all = "camelCase")]
    RemoveLiquidity {
        /// Owner
        user: Address,
        /// Position
        position_id: PositionId,
        /// Shares to burn
        shares: Amount,
    },
    /// Distribute swap fees to a pool's positions
    #[serde(rename_all = "camelCase")]
    AccrueFees {
        /// Pool
        pool: Address,
        /// Fees collected
        fees: Amount,
    },
    /// Pay out a position's unclaimed rewards
    #[serde(rename_all = "camelCase")]
    ClaimRewards {
        /// Owner
        user: Address,
        /// Position
        position_id: PositionId,
    },
    /// Mirror on-chain governance token balances
    #[serde(rename_all = "camelCase")]
    SyncBalance {
        /// Account
        user: Address,
        /// Liquid balance
        token_balance: Amount,
        /// Staked balance
        staked_balance: Amount,
    },
    /// Delegate voting power
    #[serde(rename_all = "camelCase")]
    Delegate {
        /// Delegator
        delegator: Address,
        /// Delegatee
        delegatee: Address,
        /// Power delegated
        amount: Amount,
    },
    /// Cancel the active delegation
    #[serde(rename_all = "camelCase")]
    CancelDelegation {
        /// Delegator
        delegator: Address,
    },
    /// Store a draft proposal
    #[serde(rename_all = "camelCase")]
    SubmitDraft {
        /// Proposer
        proposer: Address,
        /// Content
        draft: Box<ProposalDraft>,
    },
    /// Open a draft for voting
    #[serde(rename_all = "camelCase")]
    ActivateProposal {
        /// Proposer
        caller: Address,
        /// Proposal
        proposal_id: ProposalId,
    },
    /// Submit and activate
    #[serde(rename_all = "camelCase")]
    CreateProposal {
        /// Proposer
        proposer: Address,
        /// Content
        draft: Box<ProposalDraft>,
    },
    /// Cast or replace a vote
    #[serde(rename_all = "camelCase")]
    CastVote {
        /// Voter
        voter: Address,
        /// Proposal
        proposal_id: ProposalId,
        /// Exactly one option id
        selected_options: Vec<String>,
        /// Optional reason
        #[serde(default)]
        reason: Option<String>,
    },
    /// Withdraw a proposal
    #[serde(rename_all = "camelCase")]
    CancelProposal {
        /// Proposer or guardian
        caller: Address,
        /// Proposal
        proposal_id: ProposalId,
    },
    /// Apply a succeeded proposal's action
    #[serde(rename_all = "camelCase")]
    ExecuteProposal {
        /// Anyone
        caller: Address,
        /// Proposal
        proposal_id: ProposalId,
    },
    /// Close every proposal whose voting window has ended
    FinalizeProposals,
    /// Post a treasury expenditure
    #[serde(rename_all = "camelCase")]
    RecordExpenditure {
        /// Submitter; must be a guardian for unreferenced emergency spends
        caller: Address,
        /// Spend
        request: ExpenditureRequest,
    },
    /// Record treasury income
    #[serde(rename_all = "camelCase")]
    RecordRevenue {
        /// Income
        request: RevenueRequest,
    },
    /// Insert or replace a treasury holding
    #[serde(rename_all = "camelCase")]
    UpsertTreasuryAsset {
        /// Guardian
        caller: Address,
        /// Holding
        asset: TreasuryAsset,
    },
}

impl Command {
    /// Metric and hash label
    pub fn kind(&self) -> &'static str {
        match self {
            Command::CreatePool { .. } => "create_pool",
            Command::SubmitMarketSample { .. } => "submit_market_sample",
            Command::AdjustFee { .. } => "adjust_fee",
            Command::AddLiquidity { .. } => "add_liquidity",
            Command::RemoveLiquidity { .. } => "remove_liquidity",
            Command::AccrueFees { .. } => "accrue_fees",
            Command::ClaimRewards { .. } => "claim_rewards",
            Command::SyncBalance { .. } => "sync_balance",
            Command::Delegate { .. } => "delegate",
            Command::CancelDelegation { .. } => "cancel_delegation",
            Command::SubmitDraft { .. } => "submit_draft",
            Command::ActivateProposal { .. } => "activate_proposal",
            Command::CreateProposal { .. } => "create_proposal",
            Command::CastVote { .. } => "cast_vote",
            Command::CancelProposal { .. } => "cancel_proposal",
            Command::ExecuteProposal { .. } => "execute_proposal",
            Command::FinalizeProposals => "finalize_proposals",
            Command::RecordExpenditure { .. } => "record_expenditure",
            Command::RecordRevenue { .. } => "record_revenue",
            Command::UpsertTreasuryAsset { .. } => "upsert_treasury_asset",
        }
    }

    /// Nominal gas charged on the receipt
    pub fn gas_used(&self) -> u64 {
        match self {
            Command::CreatePool { .. } => 2_500_000,
            Command::SubmitMarketSample { .. } => 60_000,
            Command::AdjustFee { .. } => 45_000,
            Command::AddLiquidity { .. } => 150_000,
            Command::RemoveLiquidity { .. } => 120_000,
            Command::AccrueFees { .. } => 80_000,
            Command::ClaimRewards { .. } => 50_000,
            Command::SyncBalance { .. } => 30_000,
            Command::Delegate { .. } => 90_000,
            Command::CancelDelegation { .. } => 60_000,
            Command::SubmitDraft { .. } => 200_000,
            Command::ActivateProposal { .. } => 80_000,
            Command::CreateProposal { .. } => 250_000,
            Command::CastVote { .. } => 85_000,
            Command::CancelProposal { .. } => 40_000,
            Command::ExecuteProposal { .. } => 300_000,
            Command::FinalizeProposals => 50_000,
            Command::RecordExpenditure { .. } => 100_000,
            Command::RecordRevenue { .. } => 60_000,
            Command::UpsertTreasuryAsset { .. } => 40_000,
        }
    }
}

/// What a command produced
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Outcome {
    /// New pool
    PoolCreated(Box<Pool>),
    /// Sample stored; the adjustment it triggered, if any
    SampleRecorded(Option<FeeAdjustmentRecord>),
    /// Directed adjustment; `None` when the clamped rate equals the current one
    FeeAdjusted(Option<FeeAdjustmentRecord>),
    /// Position after the deposit
    LiquidityAdded(LiquidityPosition),
    /// Withdrawal
    LiquidityRemoved(Withdrawal),
    /// Fees credited to positions
    FeesAccrued(Amount),
    /// Rewards paid
    RewardsClaimed(Amount),
    /// Account after the sync
    BalanceSynced(VotingPower),
    /// New delegation
    Delegated(Delegation),
    /// Cancelled delegation
    DelegationCancelled(Delegation),
    /// Stored draft
    DraftSubmitted(Box<Proposal>),
    /// Activated proposal
    ProposalActivated(Box<Proposal>),
    /// Created and activated proposal
    ProposalCreated(Box<Proposal>),
    /// Recorded vote
    VoteCast(Vote),
    /// Cancelled proposal
    ProposalCancelled(Box<Proposal>),
    /// Executed proposal
    ProposalExecuted(Box<Proposal>),
    /// Status changes from an explicit finalize
    ProposalsFinalized(Vec<StatusChange>),
    /// Recorded expenditure
    ExpenditureRecorded(TreasuryExpenditure),
    /// Recorded revenue
    RevenueRecorded(TreasuryRevenue),
    /// Stored holding
    AssetUpserted(TreasuryAsset),
}

/// Result of an applied command
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    /// Transaction receipt
    pub receipt: TxReceipt,
    /// Command output
    pub outcome: Outcome,
    /// Events published for this command, lazy closes included
    pub events: Vec<Event>,
}
