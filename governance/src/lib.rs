//! Governance
//!
//! Proposal lifecycle, vote tallying, delegation-aware voting power and the
//! treasury ledger.
//!
//! # Invariants
//!
//! - One counted vote per (voter, proposal); a recast replaces the earlier contribution
//! - `for + against + abstain == Σ counted vote power`
//! - A delegator has at most one active delegation, never above its own balance
//! - `Σ category used ≤ total budget`

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod delegation;
pub mod error;
pub mod params;
pub mod proposal;
pub mod tally;
pub mod treasury;
pub mod voting_power;

pub use delegation::{Delegation, DelegationGraph, DelegationId};
pub use error::{Error, Result};
pub use params::GovernanceParameters;
pub use proposal::{
    default_options, ExecutionAction, ExecutionData, ExecutionTarget, GovernanceStats, Proposal,
    ProposalBook, ProposalDraft, ProposalFilter, ProposalId, ProposalOption, ProposalSortBy,
    ProposalStatus, ProposalType, StatusChange, Vote,
};
pub use tally::{OptionResult, VoteChoice, VotingResult};
pub use treasury::{
    AssetType, BudgetAllocation, CategoryAllocation, CategoryBudget, ExpenditureRequest,
    ExpenditureType, RevenueRequest, RevenueType, Treasury, TreasuryAsset, TreasuryExpenditure,
    TreasuryGenesis, TreasuryRevenue,
};
pub use voting_power::{DelegationStatus, VotingPower, VotingPowerLedger};
