//! Proposal lifecycle
//!
//! ```text
//! Draft ──activate──▶ Active ──close──▶ Succeeded ──execute──▶ Executed
//!   │                   │  │                 │
//!   │                   │  └──close──▶ Defeated | Expired
//!   └───────────────────┴─────────────────────┴──cancel──▶ Cancelled
//! ```
//!
//! Closing is lazy: [`ProposalBook::finalize_due`] settles every Active
//! proposal whose voting window has ended, and the engine calls it before
//! each command.

use crate::params::GovernanceParameters;
use crate::tally::{VoteChoice, VotingResult};
use crate::treasury::{ExpenditureRequest, ExpenditureType};
use crate::voting_power::VotingPowerLedger;
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use fee_engine::{PoolConfigUpdate, PoolCreationParams, SortOrder, DEFAULT_PAGE_SIZE};
use ledger_core::{content_hash, new_record_id, Address, Amount, Bps, Hash32, Percent};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use tracing::{debug, info};
use uuid::Uuid;

/// Maximum title length in characters
pub const MAX_TITLE_LEN: usize = 200;

/// Proposal identifier, assigned sequentially from 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProposalId(pub u64);

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Proposal category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalType {
    /// Change a pool's fee rate
    FeeAdjustment,
    /// Register a pool
    PoolCreation,
    /// Reconfigure a pool
    PoolConfiguration,
    /// Off-engine protocol upgrade (signal only)
    ProtocolUpgrade,
    /// Spend from the treasury
    TreasuryManagement,
    /// Change governance parameters
    GovernanceParameters,
    /// Emergency action with its own threshold and delay
    EmergencyAction,
    /// Community signal
    CommunityInitiative,
}

impl ProposalType {
    /// Stable label
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalType::FeeAdjustment => "FEE_ADJUSTMENT",
            ProposalType::PoolCreation => "POOL_CREATION",
            ProposalType::PoolConfiguration => "POOL_CONFIGURATION",
            ProposalType::ProtocolUpgrade => "PROTOCOL_UPGRADE",
            ProposalType::TreasuryManagement => "TREASURY_MANAGEMENT",
            ProposalType::GovernanceParameters => "GOVERNANCE_PARAMETERS",
            ProposalType::EmergencyAction => "EMERGENCY_ACTION",
            ProposalType::CommunityInitiative => "COMMUNITY_INITIATIVE",
        }
    }

    /// Emergency proposals use the emergency threshold and delay
    pub fn is_emergency(&self) -> bool {
        matches!(self, ProposalType::EmergencyAction)
    }
}

/// Proposal status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalStatus {
    /// Stored, not yet open for voting
    Draft,
    /// Voting window open
    Active,
    /// Passed, awaiting execution
    Succeeded,
    /// Failed the vote
    Defeated,
    /// Executed
    Executed,
    /// Closed without quorum past the execution delay
    Expired,
    /// Withdrawn
    Cancelled,
}

impl ProposalStatus {
    /// No further transitions possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProposalStatus::Executed
                | ProposalStatus::Expired
                | ProposalStatus::Cancelled
                | ProposalStatus::Defeated
        )
    }

    /// Stable label
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Draft => "DRAFT",
            ProposalStatus::Active => "ACTIVE",
            ProposalStatus::Succeeded => "SUCCEEDED",
            ProposalStatus::Defeated => "DEFEATED",
            ProposalStatus::Executed => "EXECUTED",
            ProposalStatus::Expired => "EXPIRED",
            ProposalStatus::Cancelled => "CANCELLED",
        }
    }
}

/// A votable option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalOption {
    /// Option id, unique within the proposal
    pub option_id: String,
    /// Display text
    pub description: String,
    /// Tally bucket
    pub choice: VoteChoice,
}

/// For / against / abstain
pub fn default_options() -> Vec<ProposalOption> {
    [
        ("for", "For", VoteChoice::For),
        ("against", "Against", VoteChoice::Against),
        ("abstain", "Abstain", VoteChoice::Abstain),
    ]
    .into_iter()
    .map(|(id, description, choice)| ProposalOption {
        option_id: id.to_string(),
        description: description.to_string(),
        choice,
    })
    .collect()
}

/// Component an execution action addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionTarget {
    /// Pool registry
    Pools,
    /// Governance parameters
    Governance,
    /// Treasury ledger
    Treasury,
    /// Nothing; signal only
    None,
}

/// What a proposal does when executed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "params", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionAction {
    /// Move a pool's fee rate
    AdjustFee {
        /// Pool address
        pool: Address,
        /// Target rate (clamped into the pool's band)
        new_fee_rate: Bps,
    },
    /// Register a pool
    CreatePool(Box<PoolCreationParams>),
    /// Reconfigure a pool
    UpdatePoolConfig {
        /// Pool address
        pool: Address,
        /// Changes
        update: PoolConfigUpdate,
    },
    /// Replace the governance parameters
    UpdateGovernanceParameters(GovernanceParameters),
    /// Post a treasury expenditure
    TreasuryExpenditure(ExpenditureRequest),
    /// No state change
    Signal,
}

impl ExecutionAction {
    /// Component addressed
    pub fn target(&self) -> ExecutionTarget {
        match self {
            ExecutionAction::AdjustFee { .. }
            | ExecutionAction::CreatePool(_)
            | ExecutionAction::UpdatePoolConfig { .. } => ExecutionTarget::Pools,
            ExecutionAction::UpdateGovernanceParameters(_) => ExecutionTarget::Governance,
            ExecutionAction::TreasuryExpenditure(_) => ExecutionTarget::Treasury,
            ExecutionAction::Signal => ExecutionTarget::None,
        }
    }

    /// Pool addressed, if any
    pub fn pool(&self) -> Option<&Address> {
        match self {
            ExecutionAction::AdjustFee { pool, .. }
            | ExecutionAction::UpdatePoolConfig { pool, .. } => Some(pool),
            _ => None,
        }
    }

    fn allowed_for(&self, proposal_type: ProposalType) -> bool {
        use ExecutionAction as A;
        use ProposalType as T;
        match (proposal_type, self) {
            (_, A::Signal) => true,
            (T::FeeAdjustment, A::AdjustFee { .. }) => true,
            (T::PoolCreation, A::CreatePool(_)) => true,
            (T::PoolConfiguration, A::UpdatePoolConfig { .. }) => true,
            (T::GovernanceParameters, A::UpdateGovernanceParameters(_)) => true,
            (T::TreasuryManagement, A::TreasuryExpenditure(_)) => true,
            (T::EmergencyAction, A::AdjustFee { .. } | A::UpdatePoolConfig { .. }) => true,
            (T::EmergencyAction, A::TreasuryExpenditure(req)) => {
                req.expenditure_type == ExpenditureType::Emergency
            }
            _ => false,
        }
    }

    fn validate(&self, authorized_value: Amount) -> Result<()> {
        match self {
            ExecutionAction::CreatePool(params) => params
                .validate()
                .map_err(|e| Error::InvalidProposal(format!("pool creation: {}", e))),
            ExecutionAction::UpdatePoolConfig { update, .. } if update.is_empty() => {
                Err(Error::InvalidProposal("empty pool config update".to_string()))
            }
            ExecutionAction::UpdateGovernanceParameters(params) => params.validate(),
            ExecutionAction::TreasuryExpenditure(req) => {
                if req.amount.is_zero() {
                    return Err(Error::InvalidProposal(
                        "expenditure amount must be positive".to_string(),
                    ));
                }
                if req.amount > authorized_value {
                    return Err(Error::InvalidProposal(format!(
                        "expenditure {} exceeds authorized value {}",
                        req.amount, authorized_value
                    )));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Action attached to a proposal, with its execution stamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionData {
    /// Component addressed
    pub target: ExecutionTarget,
    /// Action
    pub action: ExecutionAction,
    /// Value authorized (treasury spend cap)
    pub value: Amount,
    /// Applied
    pub is_executed: bool,
    /// Transaction that applied it
    pub tx_hash: Option<Hash32>,
    /// When it was applied
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub executed_at: Option<DateTime<Utc>>,
}

/// Proposal submission
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalDraft {
    /// Title
    pub title: String,
    /// Description
    pub description: String,
    /// Category
    #[serde(rename = "type")]
    pub proposal_type: ProposalType,
    /// Options; for/against/abstain when empty
    #[serde(default)]
    pub options: Vec<ProposalOption>,
    /// Action to run on execution
    #[serde(default)]
    pub execution_action: Option<ExecutionAction>,
    /// Spend authorization for treasury actions; defaults to the request amount
    #[serde(default)]
    pub authorized_value: Amount,
    /// Pools the proposal concerns
    #[serde(default)]
    pub related_pools: Vec<Address>,
}

/// A governance proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    /// Id
    pub proposal_id: ProposalId,
    /// Title
    pub title: String,
    /// Description
    pub description: String,
    /// Category
    #[serde(rename = "type")]
    pub proposal_type: ProposalType,
    /// Status
    pub status: ProposalStatus,
    /// Submitter
    pub proposer: Address,
    /// Submitted at
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    /// Voting opens (set on activation)
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub voting_start_time: Option<DateTime<Utc>>,
    /// Voting closes (set on activation)
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub voting_end_time: Option<DateTime<Utc>>,
    /// Executed at
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub execution_time: Option<DateTime<Utc>>,
    /// Options
    pub options: Vec<ProposalOption>,
    /// Tally
    pub results: VotingResult,
    /// Attached action
    pub execution_data: Option<ExecutionData>,
    /// Pools concerned
    pub related_pools: Vec<Address>,
    /// SHA-256 of the proposal content
    pub proposal_hash: Hash32,
    /// Executed
    pub is_executed: bool,
    /// Execution transaction
    pub execution_tx_hash: Option<Hash32>,
    /// Total eligible power snapshotted at activation
    pub eligible_voting_power: Amount,
}

#[derive(Serialize)]
struct ProposalContent<'a> {
    title: &'a str,
    description: &'a str,
    proposal_type: ProposalType,
    proposer: &'a Address,
    created_at: i64,
    options: &'a [ProposalOption],
    action: Option<&'a ExecutionAction>,
    value: Amount,
    related_pools: &'a [Address],
}

impl Proposal {
    /// Passing threshold that applies to this proposal
    pub fn passing_threshold(&self, params: &GovernanceParameters) -> Percent {
        if self.proposal_type.is_emergency() {
            params.emergency_threshold
        } else {
            params.passing_threshold
        }
    }

    /// Execution delay that applies to this proposal
    pub fn execution_delay(&self, params: &GovernanceParameters) -> Duration {
        let secs = if self.proposal_type.is_emergency() {
            params.emergency_execution_delay
        } else {
            params.execution_delay
        };
        Duration::seconds(secs as i64)
    }

    /// Voting window contains `now`
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.status == ProposalStatus::Active && self.voting_end_time.is_some_and(|end| now < end)
    }

    fn option(&self, option_id: &str) -> Result<&ProposalOption> {
        self.options
            .iter()
            .find(|o| o.option_id == option_id)
            .ok_or_else(|| {
                Error::InvalidOption(format!("{} on proposal {}", option_id, self.proposal_id))
            })
    }
}

/// Recorded ballot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    /// Vote id
    pub vote_id: Uuid,
    /// Proposal
    pub proposal_id: ProposalId,
    /// Voter
    pub voter: Address,
    /// Power at cast time; never changes afterwards
    pub voting_power: Amount,
    /// Selected option ids
    pub selected_options: Vec<String>,
    /// Cast at
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    /// Voter's reason
    pub reason: Option<String>,
    /// Power includes delegated-in power
    pub is_delegated: bool,
    /// Voter's own delegatee, when part of their power is delegated out
    pub delegatee: Option<Address>,
}

impl Vote {
    /// Choice the ballot counts toward
    pub fn choice(&self, proposal: &Proposal) -> Result<VoteChoice> {
        let option_id = self
            .selected_options
            .first()
            .ok_or_else(|| Error::InvalidOption("no option selected".to_string()))?;
        Ok(proposal.option(option_id)?.choice)
    }
}

/// Status change produced by a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    /// Proposal
    pub proposal_id: ProposalId,
    /// Previous status
    pub from: ProposalStatus,
    /// New status
    pub to: ProposalStatus,
}

/// Proposal list sort key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProposalSortBy {
    /// Submission time
    #[default]
    CreatedAt,
    /// Voting close
    VotingEnd,
    /// Power cast
    Votes,
}

/// Proposal list filter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProposalFilter {
    /// Status
    pub status: Option<ProposalStatus>,
    /// Category
    #[serde(rename = "type")]
    pub proposal_type: Option<ProposalType>,
    /// Submitter
    pub proposer: Option<Address>,
    /// Sort key
    pub sort_by: ProposalSortBy,
    /// Sort direction
    pub sort_order: SortOrder,
    /// 1-based page
    pub page: Option<usize>,
    /// Page size
    pub page_size: Option<usize>,
}

/// Governance-wide statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernanceStats {
    /// Proposals ever submitted
    pub total_proposals: usize,
    /// Proposals currently Active
    pub active_proposals: usize,
    /// Succeeded or Executed
    pub passed_proposals: usize,
    /// Counted votes across all proposals
    pub total_votes: usize,
    /// Distinct voters
    pub active_voters: usize,
    /// Mean participation over closed proposals, percent
    pub average_participation_rate: Decimal,
    /// Total eligible power now
    pub total_voting_power: Amount,
    /// Mean seconds from voting close to execution
    pub average_execution_time: u64,
}

/// Owner of every proposal and vote
#[derive(Debug, Default)]
pub struct ProposalBook {
    proposals: BTreeMap<ProposalId, Proposal>,
    ballots: BTreeMap<ProposalId, BTreeMap<Address, Vote>>,
    vote_log: Vec<Vote>,
    last_activation: HashMap<Address, DateTime<Utc>>,
    next_id: u64,
}

impl ProposalBook {
    /// Empty book
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a proposal
    pub fn get(&self, id: ProposalId) -> Result<&Proposal> {
        self.proposals
            .get(&id)
            .ok_or_else(|| Error::ProposalNotFound(id.to_string()))
    }

    fn get_mut(&mut self, id: ProposalId) -> Result<&mut Proposal> {
        self.proposals
            .get_mut(&id)
            .ok_or_else(|| Error::ProposalNotFound(id.to_string()))
    }

    /// All proposals in id order
    pub fn proposals(&self) -> impl Iterator<Item = &Proposal> {
        self.proposals.values()
    }

    /// Number of Active proposals
    pub fn active_count(&self) -> usize {
        self.proposals
            .values()
            .filter(|p| p.status == ProposalStatus::Active)
            .count()
    }

    /// Store a Draft
    pub fn submit_draft(
        &mut self,
        draft: ProposalDraft,
        proposer: &Address,
        now: DateTime<Utc>,
    ) -> Result<ProposalId> {
        let proposal = self.build(draft, proposer, now)?;
        let id = proposal.proposal_id;
        self.next_id = id.0;
        self.proposals.insert(id, proposal);
        debug!(proposal = %id, proposer = %proposer.short(), "Draft submitted");
        Ok(id)
    }

    fn build(
        &self,
        draft: ProposalDraft,
        proposer: &Address,
        now: DateTime<Utc>,
    ) -> Result<Proposal> {
        let title = draft.title.trim().to_string();
        if title.is_empty() || title.chars().count() > MAX_TITLE_LEN {
            return Err(Error::InvalidProposal(format!(
                "title must be 1..={} characters",
                MAX_TITLE_LEN
            )));
        }
        if draft.description.trim().is_empty() {
            return Err(Error::InvalidProposal("description is empty".to_string()));
        }

        let options = if draft.options.is_empty() {
            default_options()
        } else {
            draft.options
        };
        let ids: BTreeSet<&str> = options.iter().map(|o| o.option_id.as_str()).collect();
        if ids.len() != options.len() {
            return Err(Error::InvalidProposal("duplicate option id".to_string()));
        }
        let has = |c: VoteChoice| options.iter().any(|o| o.choice == c);
        if !has(VoteChoice::For) || !has(VoteChoice::Against) {
            return Err(Error::InvalidProposal(
                "options must include a for and an against choice".to_string(),
            ));
        }

        let mut related_pools = draft.related_pools;
        let execution_data = match draft.execution_action {
            Some(action) => {
                if !action.allowed_for(draft.proposal_type) {
                    return Err(Error::InvalidProposal(format!(
                        "action {:?} does not match proposal type {}",
                        action.target(),
                        draft.proposal_type.as_str()
                    )));
                }
                let value = match &action {
                    ExecutionAction::TreasuryExpenditure(req) => {
                        if draft.authorized_value.is_zero() {
                            req.amount
                        } else {
                            draft.authorized_value
                        }
                    }
                    _ => draft.authorized_value,
                };
                action.validate(value)?;
                if let Some(pool) = action.pool() {
                    if !related_pools.contains(pool) {
                        related_pools.push(pool.clone());
                    }
                }
                Some(ExecutionData {
                    target: action.target(),
                    action,
                    value,
                    is_executed: false,
                    tx_hash: None,
                    executed_at: None,
                })
            }
            None => None,
        };

        let id = ProposalId(self.next_id + 1);
        let content = ProposalContent {
            title: &title,
            description: &draft.description,
            proposal_type: draft.proposal_type,
            proposer,
            created_at: now.timestamp(),
            options: &options,
            action: execution_data.as_ref().map(|d| &d.action),
            value: execution_data.as_ref().map_or(Amount::ZERO, |d| d.value),
            related_pools: &related_pools,
        };
        let proposal_hash = content_hash(&content)?;

        Ok(Proposal {
            proposal_id: id,
            title,
            description: draft.description,
            proposal_type: draft.proposal_type,
            status: ProposalStatus::Draft,
            proposer: proposer.clone(),
            created_at: now,
            voting_start_time: None,
            voting_end_time: None,
            execution_time: None,
            results: VotingResult::new(&options, Percent::ZERO),
            options,
            execution_data,
            related_pools,
            proposal_hash,
            is_executed: false,
            execution_tx_hash: None,
            eligible_voting_power: Amount::ZERO,
        })
    }

    fn check_activation(
        &self,
        proposer: &Address,
        ledger: &VotingPowerLedger,
        params: &GovernanceParameters,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let power = ledger.voting_power(proposer)?;
        if power < params.proposal_threshold {
            return Err(Error::InsufficientVotingPower(format!(
                "{} has {} but {} is required to propose",
                proposer, power, params.proposal_threshold
            )));
        }
        if let Some(last) = self.last_activation.get(proposer) {
            let elapsed = (now - *last).num_seconds().max(0) as u64;
            if elapsed < params.proposal_cooldown {
                return Err(Error::ProposalCooldown {
                    remaining_secs: params.proposal_cooldown - elapsed,
                });
            }
        }
        if self.active_count() >= params.max_proposals as usize {
            return Err(Error::TooManyActiveProposals(params.max_proposals));
        }
        Ok(())
    }

    /// Open a Draft for voting
    pub fn activate(
        &mut self,
        id: ProposalId,
        caller: &Address,
        ledger: &VotingPowerLedger,
        params: &GovernanceParameters,
        now: DateTime<Utc>,
    ) -> Result<StatusChange> {
        let proposal = self.get(id)?;
        if proposal.status != ProposalStatus::Draft {
            return Err(Error::InvalidTransition(format!(
                "proposal {} is {}, not DRAFT",
                id,
                proposal.status.as_str()
            )));
        }
        if proposal.proposer != *caller {
            return Err(Error::NotAuthorized(format!(
                "only the proposer may activate proposal {}",
                id
            )));
        }
        self.check_activation(caller, ledger, params, now)?;

        let eligible = ledger.total_supply();
        let passing = {
            let proposal = self.get(id)?;
            proposal.passing_threshold(params)
        };

        // All checks passed
        let proposal = self.get_mut(id)?;
        proposal.status = ProposalStatus::Active;
        proposal.voting_start_time = Some(now);
        proposal.voting_end_time = Some(now + Duration::seconds(params.voting_period as i64));
        proposal.eligible_voting_power = eligible;
        proposal.results.refresh(eligible, passing, params.quorum_threshold);
        self.last_activation.insert(caller.clone(), now);

        info!(proposal = %id, eligible = %eligible, "Proposal activated");
        Ok(StatusChange {
            proposal_id: id,
            from: ProposalStatus::Draft,
            to: ProposalStatus::Active,
        })
    }

    /// Submit and activate atomically
    pub fn create(
        &mut self,
        draft: ProposalDraft,
        proposer: &Address,
        ledger: &VotingPowerLedger,
        params: &GovernanceParameters,
        now: DateTime<Utc>,
    ) -> Result<ProposalId> {
        self.check_activation(proposer, ledger, params, now)?;
        let id = self.submit_draft(draft, proposer, now)?;
        self.activate(id, proposer, ledger, params, now)?;
        Ok(id)
    }

    /// Cast or replace a vote
    #[allow(clippy::too_many_arguments)]
    pub fn cast_vote(
        &mut self,
        ledger: &mut VotingPowerLedger,
        params: &GovernanceParameters,
        id: ProposalId,
        voter: &Address,
        selected_options: Vec<String>,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Vote> {
        let proposal = self.get(id)?;
        if !proposal.is_open(now) {
            return Err(Error::VotingClosed(id.to_string()));
        }
        if selected_options.len() != 1 {
            return Err(Error::InvalidOption(format!(
                "exactly one option must be selected, got {}",
                selected_options.len()
            )));
        }
        let new_choice = proposal.option(&selected_options[0])?.choice;

        let snapshot = ledger.snapshot(voter)?;
        let power = snapshot.total_voting_power;
        if power.is_zero() {
            return Err(Error::InsufficientVotingPower(format!("{} has no voting power", voter)));
        }

        let previous = self.ballots.get(&id).and_then(|b| b.get(voter)).cloned();
        let mut results = proposal.results.clone();
        if let Some(old) = &previous {
            results.retract(&old.selected_options[0], old.choice(proposal)?, old.voting_power)?;
        }
        results.count(&selected_options[0], new_choice, power)?;
        results.refresh(
            proposal.eligible_voting_power,
            proposal.passing_threshold(params),
            params.quorum_threshold,
        );

        let vote = Vote {
            vote_id: new_record_id(),
            proposal_id: id,
            voter: voter.clone(),
            voting_power: power,
            selected_options,
            timestamp: now,
            reason,
            is_delegated: !snapshot.delegated_balance.is_zero(),
            delegatee: snapshot.delegatee,
        };

        // All checks passed
        self.get_mut(id)?.results = results;
        self.ballots.entry(id).or_default().insert(voter.clone(), vote.clone());
        self.vote_log.push(vote.clone());
        ledger.commit(id, voter, power);

        debug!(
            proposal = %id,
            voter = %voter.short(),
            power = %power,
            recast = previous.is_some(),
            "Vote cast"
        );
        Ok(vote)
    }

    /// Close every Active proposal whose voting window has ended
    pub fn finalize_due(
        &mut self,
        ledger: &mut VotingPowerLedger,
        params: &GovernanceParameters,
        now: DateTime<Utc>,
    ) -> Vec<StatusChange> {
        let mut changes = Vec::new();

        for proposal in self.proposals.values_mut() {
            if proposal.status != ProposalStatus::Active {
                continue;
            }
            let Some(end) = proposal.voting_end_time else {
                continue;
            };
            if now < end {
                continue;
            }

            let passing = proposal.passing_threshold(params);
            let delay = proposal.execution_delay(params);
            proposal
                .results
                .refresh(proposal.eligible_voting_power, passing, params.quorum_threshold);

            let to = if proposal.results.is_passed {
                ProposalStatus::Succeeded
            } else if !proposal.results.quorum_reached && now >= end + delay {
                ProposalStatus::Expired
            } else {
                ProposalStatus::Defeated
            };
            proposal.status = to;
            ledger.release(proposal.proposal_id);

            info!(
                proposal = %proposal.proposal_id,
                status = to.as_str(),
                participation = %proposal.results.participation_rate,
                for_rate = %proposal.results.actual_vote_rate,
                "Voting closed"
            );
            changes.push(StatusChange {
                proposal_id: proposal.proposal_id,
                from: ProposalStatus::Active,
                to,
            });
        }

        changes
    }

    /// Withdraw a non-terminal proposal
    pub fn cancel(
        &mut self,
        ledger: &mut VotingPowerLedger,
        id: ProposalId,
        caller: &Address,
        is_guardian: bool,
    ) -> Result<StatusChange> {
        let proposal = self.get(id)?;
        if proposal.status.is_terminal() {
            return Err(Error::InvalidTransition(format!(
                "proposal {} is {}",
                id,
                proposal.status.as_str()
            )));
        }
        if proposal.proposer != *caller && !is_guardian {
            return Err(Error::NotAuthorized(format!(
                "only the proposer or a guardian may cancel proposal {}",
                id
            )));
        }

        let proposal = self.get_mut(id)?;
        let from = proposal.status;
        proposal.status = ProposalStatus::Cancelled;
        ledger.release(id);

        info!(proposal = %id, by = %caller.short(), guardian = is_guardian, "Proposal cancelled");
        Ok(StatusChange {
            proposal_id: id,
            from,
            to: ProposalStatus::Cancelled,
        })
    }

    /// Check that `id` may execute now and return its action
    pub fn check_execution(
        &self,
        id: ProposalId,
        params: &GovernanceParameters,
        now: DateTime<Utc>,
    ) -> Result<Option<ExecutionData>> {
        let proposal = self.get(id)?;
        if proposal.is_executed || proposal.status == ProposalStatus::Executed {
            return Err(Error::AlreadyExecuted(id.to_string()));
        }
        if proposal.status != ProposalStatus::Succeeded {
            return Err(Error::InvalidTransition(format!(
                "proposal {} is {}, not SUCCEEDED",
                id,
                proposal.status.as_str()
            )));
        }

        let end = proposal
            .voting_end_time
            .ok_or_else(|| Error::InvalidTransition(format!("proposal {} never opened", id)))?;
        let ready_at = end + proposal.execution_delay(params);
        if now < ready_at {
            return Err(Error::ExecutionDelayPending {
                remaining_secs: (ready_at - now).num_seconds().max(0) as u64,
            });
        }
        Ok(proposal.execution_data.clone())
    }

    /// Stamp a proposal executed
    pub fn mark_executed(
        &mut self,
        id: ProposalId,
        tx_hash: Hash32,
        now: DateTime<Utc>,
    ) -> Result<StatusChange> {
        let proposal = self.get_mut(id)?;
        if proposal.is_executed {
            return Err(Error::AlreadyExecuted(id.to_string()));
        }
        let from = proposal.status;
        proposal.status = ProposalStatus::Executed;
        proposal.is_executed = true;
        proposal.execution_time = Some(now);
        proposal.execution_tx_hash = Some(tx_hash);
        if let Some(data) = &mut proposal.execution_data {
            data.is_executed = true;
            data.tx_hash = Some(tx_hash);
            data.executed_at = Some(now);
        }

        info!(proposal = %id, tx = %tx_hash, "Proposal executed");
        Ok(StatusChange {
            proposal_id: id,
            from,
            to: ProposalStatus::Executed,
        })
    }

    /// Put back a proposal saved before a failed execution
    pub fn restore(&mut self, proposal: Proposal) {
        self.proposals.insert(proposal.proposal_id, proposal);
    }

    /// Counted votes on a proposal
    pub fn votes(&self, id: ProposalId) -> Result<Vec<Vote>> {
        self.get(id)?;
        Ok(self
            .ballots
            .get(&id)
            .map(|b| b.values().cloned().collect())
            .unwrap_or_default())
    }

    /// Every ballot ever cast, including replaced ones, in arrival order
    pub fn vote_log(&self) -> &[Vote] {
        &self.vote_log
    }

    /// Filter, sort and page proposals. Returns the page and the total match count.
    pub fn list(&self, filter: &ProposalFilter) -> (Vec<Proposal>, usize) {
        let mut matches: Vec<&Proposal> = self
            .proposals
            .values()
            .filter(|p| {
                filter.status.map_or(true, |s| p.status == s)
                    && filter.proposal_type.map_or(true, |t| p.proposal_type == t)
                    && filter.proposer.as_ref().map_or(true, |a| p.proposer == *a)
            })
            .collect();

        matches.sort_by(|a, b| {
            let ord = match filter.sort_by {
                ProposalSortBy::CreatedAt => a.created_at.cmp(&b.created_at),
                ProposalSortBy::VotingEnd => a.voting_end_time.cmp(&b.voting_end_time),
                ProposalSortBy::Votes => {
                    a.results.total_voting_power.cmp(&b.results.total_voting_power)
                }
            }
            .then_with(|| a.proposal_id.cmp(&b.proposal_id));
            match filter.sort_order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });

        let total = matches.len();
        let page_size = filter.page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1);
        let page = filter.page.unwrap_or(1).max(1);
        let items = matches
            .into_iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .cloned()
            .collect();
        (items, total)
    }

    /// Governance-wide statistics
    pub fn stats(&self, ledger: &VotingPowerLedger) -> GovernanceStats {
        let closed: Vec<&Proposal> = self
            .proposals
            .values()
            .filter(|p| {
                matches!(
                    p.status,
                    ProposalStatus::Succeeded
                        | ProposalStatus::Defeated
                        | ProposalStatus::Executed
                        | ProposalStatus::Expired
                )
            })
            .collect();
        let average_participation_rate = if closed.is_empty() {
            Decimal::ZERO
        } else {
            let sum: Decimal = closed.iter().map(|p| p.results.participation_rate).sum();
            (sum / Decimal::from(closed.len() as u64)).round_dp(2)
        };

        let execution_secs: Vec<i64> = self
            .proposals
            .values()
            .filter_map(|p| Some((p.execution_time? - p.voting_end_time?).num_seconds()))
            .collect();
        let average_execution_time = if execution_secs.is_empty() {
            0
        } else {
            (execution_secs.iter().sum::<i64>() / execution_secs.len() as i64).max(0) as u64
        };

        let voters: BTreeSet<&Address> = self.ballots.values().flat_map(|b| b.keys()).collect();

        GovernanceStats {
            total_proposals: self.proposals.len(),
            active_proposals: self.active_count(),
            passed_proposals: self
                .proposals
                .values()
                .filter(|p| {
                    matches!(p.status, ProposalStatus::Succeeded | ProposalStatus::Executed)
                })
                .count(),
            total_votes: self.ballots.values().map(|b| b.len()).sum(),
            active_voters: voters.len(),
            average_participation_rate,
            total_voting_power: ledger.total_supply(),
            average_execution_time,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use ledger_core::ErrorCode;

    fn community() -> ProposalDraft {
        draft(ProposalType::CommunityInitiative)
    }

    fn vote(
        book: &mut ProposalBook,
        ledger: &mut VotingPowerLedger,
        id: ProposalId,
        seed: u64,
        option: &str,
        now: DateTime<Utc>,
    ) -> Result<Vote> {
        let voter = Address::from_seed(seed);
        book.cast_vote(ledger, &params(), id, &voter, vec![option.to_string()], None, now)
    }

    #[test]
    fn test_scenario_passes_with_quorum() {
        let now = Utc::now();
        let mut ledger = ledger(&[(1, 500), (2, 200), (3, 50), (4, 250)]);
        let mut book = ProposalBook::new();
        let id = book
            .create(community(), &Address::from_seed(1), &ledger, &params(), now)
            .unwrap();
        assert_eq!(book.get(id).unwrap().eligible_voting_power, Amount::new(1000));

        vote(&mut book, &mut ledger, id, 1, "for", now).unwrap();
        vote(&mut book, &mut ledger, id, 2, "against", now).unwrap();
        vote(&mut book, &mut ledger, id, 3, "abstain", now).unwrap();

        let changes = book.finalize_due(&mut ledger, &params(), now + Duration::seconds(3600));
        assert_eq!(changes[0].to, ProposalStatus::Succeeded);

        let results = &book.get(id).unwrap().results;
        assert_eq!(results.participation_rate, Decimal::from(75));
        assert!(results.is_passed);
        assert!(!ledger.has_commitment(&Address::from_seed(1)));
    }

    #[test]
    fn test_recast_replaces_previous_vote() {
        let now = Utc::now();
        let mut ledger = ledger(&[(1, 500), (2, 200)]);
        let mut book = ProposalBook::new();
        let id = book
            .create(community(), &Address::from_seed(1), &ledger, &params(), now)
            .unwrap();

        vote(&mut book, &mut ledger, id, 2, "for", now).unwrap();
        ledger.sync_balance(&Address::from_seed(2), Amount::new(300), Amount::ZERO).unwrap();
        vote(&mut book, &mut ledger, id, 2, "against", now).unwrap();

        let results = &book.get(id).unwrap().results;
        assert_eq!(results.for_votes, Amount::ZERO);
        assert_eq!(results.against_votes, Amount::new(300));
        assert_eq!(results.total_votes, 1);
        assert_eq!(book.vote_log().len(), 2);
        assert_eq!(book.votes(id).unwrap().len(), 1);
    }

    #[test]
    fn test_vote_after_close_rejected() {
        let now = Utc::now();
        let mut ledger = ledger(&[(1, 500)]);
        let mut book = ProposalBook::new();
        let id = book
            .create(community(), &Address::from_seed(1), &ledger, &params(), now)
            .unwrap();

        let closed = now + Duration::seconds(3600);
        let err = vote(&mut book, &mut ledger, id, 1, "for", closed).unwrap_err();
        assert!(matches!(err, Error::VotingClosed(_)));
        assert_eq!(err.code(), ErrorCode::ResourceConflict);
    }

    #[test]
    fn test_expired_vs_defeated() {
        let now = Utc::now();
        let mut ledger = ledger(&[(1, 100), (2, 900)]);
        let mut book = ProposalBook::new();
        let p = params();

        let a = book
            .create(community(), &Address::from_seed(1), &ledger, &p, now)
            .unwrap();
        let b = book
            .create(community(), &Address::from_seed(2), &ledger, &p, now)
            .unwrap();
        // 10% participation on `a`, below the 20% quorum
        vote(&mut book, &mut ledger, a, 1, "for", now).unwrap();
        vote(&mut book, &mut ledger, b, 1, "for", now).unwrap();

        // Both miss quorum and are defeated when they close on time
        let at_close = now + Duration::seconds(3600);
        let first = book.finalize_due(&mut ledger, &p, at_close);
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|c| c.to == ProposalStatus::Defeated));

        let mut book = ProposalBook::new();
        let c = book
            .create(community(), &Address::from_seed(1), &ledger, &p, now)
            .unwrap();
        vote(&mut book, &mut ledger, c, 1, "for", now).unwrap();
        // Closed only after the execution delay has also passed
        let late = now + Duration::seconds(3600 + 600);
        let changes = book.finalize_due(&mut ledger, &p, late);
        assert_eq!(changes[0].to, ProposalStatus::Expired);
    }

    #[test]
    fn test_activation_checks() {
        let now = Utc::now();
        let ledger = ledger(&[(1, 5), (2, 100)]);
        let mut book = ProposalBook::new();
        let mut p = params();

        let err = book
            .create(community(), &Address::from_seed(1), &ledger, &p, now)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InsufficientPermissions);
        assert_eq!(book.proposals().count(), 0);

        p.proposal_cooldown = 3600;
        book.create(community(), &Address::from_seed(2), &ledger, &p, now)
            .unwrap();
        let err = book
            .create(community(), &Address::from_seed(2), &ledger, &p, now)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::RateLimitExceeded);
    }

    #[test]
    fn test_max_active_proposals() {
        let now = Utc::now();
        let ledger = ledger(&[(1, 100), (2, 100), (3, 100)]);
        let mut book = ProposalBook::new();
        let p = params();
        for seed in [1, 2] {
            book.create(community(), &Address::from_seed(seed), &ledger, &p, now)
                .unwrap();
        }
        let err = book
            .create(community(), &Address::from_seed(3), &ledger, &p, now)
            .unwrap_err();
        assert!(matches!(err, Error::TooManyActiveProposals(2)));
    }

    #[test]
    fn test_two_step_flow() {
        let now = Utc::now();
        let ledger = ledger(&[(1, 100)]);
        let mut book = ProposalBook::new();
        let proposer = Address::from_seed(1);

        let id = book.submit_draft(community(), &proposer, now).unwrap();
        assert_eq!(book.get(id).unwrap().status, ProposalStatus::Draft);

        let err = book.activate(id, &Address::from_seed(2), &ledger, &params(), now).unwrap_err();
        assert!(matches!(err, Error::NotAuthorized(_)));

        let change = book.activate(id, &proposer, &ledger, &params(), now).unwrap();
        assert_eq!(change.to, ProposalStatus::Active);
        assert!(book.activate(id, &proposer, &ledger, &params(), now).is_err());
    }

    #[test]
    fn test_action_must_match_type() {
        let now = Utc::now();
        let mut book = ProposalBook::new();
        let mut d = community();
        d.execution_action = Some(ExecutionAction::UpdateGovernanceParameters(params()));
        let err = book.submit_draft(d, &Address::from_seed(1), now).unwrap_err();
        assert!(matches!(err, Error::InvalidProposal(_)));

        let mut d = draft(ProposalType::FeeAdjustment);
        d.execution_action = Some(ExecutionAction::AdjustFee {
            pool: Address::from_seed(0xbeef),
            new_fee_rate: Bps::saturating(35),
        });
        let id = book.submit_draft(d, &Address::from_seed(1), now).unwrap();
        let proposal = book.get(id).unwrap();
        assert_eq!(proposal.related_pools, vec![Address::from_seed(0xbeef)]);
        assert_eq!(proposal.execution_data.as_ref().unwrap().target, ExecutionTarget::Pools);
    }

    #[test]
    fn test_proposal_hash_covers_content() {
        let now = Utc::now();
        let mut book = ProposalBook::new();
        let a = book
            .submit_draft(community(), &Address::from_seed(1), now)
            .unwrap();
        let mut d = community();
        d.title = "Something else".to_string();
        let b = book.submit_draft(d, &Address::from_seed(1), now).unwrap();

        assert_ne!(book.get(a).unwrap().proposal_hash, book.get(b).unwrap().proposal_hash);
    }

    #[test]
    fn test_cancel_and_execution_gates() {
        let now = Utc::now();
        let mut ledger = ledger(&[(1, 500), (2, 100)]);
        let mut book = ProposalBook::new();
        let p = params();
        let id = book
            .create(community(), &Address::from_seed(1), &ledger, &p, now)
            .unwrap();

        let err = book.cancel(&mut ledger, id, &Address::from_seed(2), false).unwrap_err();
        assert!(matches!(err, Error::NotAuthorized(_)));

        vote(&mut book, &mut ledger, id, 1, "for", now).unwrap();
        let closed = now + Duration::seconds(3600);
        book.finalize_due(&mut ledger, &p, closed);

        let err = book.check_execution(id, &p, closed).unwrap_err();
        assert!(matches!(err, Error::ExecutionDelayPending { remaining_secs: 600 }));

        let ready = closed + Duration::seconds(600);
        assert!(book.check_execution(id, &p, ready).unwrap().is_none());
        book.mark_executed(id, Hash32::default(), ready).unwrap();

        assert!(matches!(book.check_execution(id, &p, ready), Err(Error::AlreadyExecuted(_))));
        let err = book.cancel(&mut ledger, id, &Address::from_seed(1), true).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition(_)));

        let stats = book.stats(&ledger);
        assert_eq!(stats.passed_proposals, 1);
        assert_eq!(stats.average_execution_time, 600);
    }
}
