//! Error types for governance

use ledger_core::ErrorCode;
use thiserror::Error;

/// Governance error
#[derive(Debug, Error)]
pub enum Error {
    /// Proposal id unknown
    #[error("Proposal not found: {0}")]
    ProposalNotFound(String),

    /// Proposer below the proposal threshold, or voter without power
    #[error("Insufficient voting power: {0}")]
    InsufficientVotingPower(String),

    /// Proposer activated a proposal too recently
    #[error("Proposal cooldown active: {remaining_secs}s remaining")]
    ProposalCooldown {
        /// Seconds until the proposer may activate again
        remaining_secs: u64,
    },

    /// Concurrent active proposal limit reached
    #[error("Too many active proposals: limit {0}")]
    TooManyActiveProposals(u32),

    /// Vote outside the voting window
    #[error("Voting closed for proposal {0}")]
    VotingClosed(String),

    /// Transition not allowed from the current status
    #[error("Invalid proposal transition: {0}")]
    InvalidTransition(String),

    /// Execution attempted before the delay elapsed
    #[error("Execution delay pending: {remaining_secs}s remaining")]
    ExecutionDelayPending {
        /// Seconds until execution is allowed
        remaining_secs: u64,
    },

    /// Proposal already executed
    #[error("Proposal already executed: {0}")]
    AlreadyExecuted(String),

    /// Caller may not perform this action on the proposal
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    /// Malformed proposal content
    #[error("Invalid proposal: {0}")]
    InvalidProposal(String),

    /// Selected option does not exist
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// Delegator already has an active delegation
    #[error("Active delegation already exists for {0}")]
    DelegationExists(String),

    /// Delegator and delegatee are the same account
    #[error("Cannot delegate to self: {0}")]
    SelfDelegation(String),

    /// Amount exceeds the delegator's own non-delegated balance
    #[error("Delegation of {requested} exceeds non-delegated balance of {available}")]
    DelegationExceedsBalance {
        /// Requested amount
        requested: String,
        /// Own power not yet delegated
        available: String,
    },

    /// Nothing to cancel
    #[error("No active delegation for {0}")]
    NoActiveDelegation(String),

    /// Power is committed to an open proposal
    #[error("Voting power of {0} is committed to an open proposal")]
    PowerCommitted(String),

    /// Balance update would strand delegated power
    #[error("Balance update rejected: {0}")]
    BalanceBelowDelegated(String),

    /// Governance parameters out of range
    #[error("Invalid governance parameters: {0}")]
    InvalidParameters(String),

    /// Expenditure over its category allocation
    #[error("Category cap exceeded: {0}")]
    CategoryCapExceeded(String),

    /// Expenditure without a matching executed proposal, or over its authorization
    #[error("Unauthorized expenditure: {0}")]
    UnauthorizedExpenditure(String),

    /// Treasury value would go negative
    #[error("Insufficient treasury funds: {0}")]
    InsufficientTreasuryFunds(String),

    /// Treasury invariant broken; mutations halted
    #[error("Treasury corrupted: {0}")]
    TreasuryCorrupted(String),

    /// No allocation for the expenditure category
    #[error("Unknown budget category: {0}")]
    UnknownCategory(String),

    /// Arithmetic or primitive error
    #[error(transparent)]
    Ledger(#[from] ledger_core::Error),
}

impl Error {
    /// Boundary code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ProposalNotFound(_) | Error::NoActiveDelegation(_) => {
                ErrorCode::ResourceNotFound
            }
            Error::InsufficientVotingPower(_) | Error::NotAuthorized(_) => {
                ErrorCode::InsufficientPermissions
            }
            Error::ProposalCooldown { .. } => ErrorCode::RateLimitExceeded,
            Error::TooManyActiveProposals(_)
            | Error::VotingClosed(_)
            | Error::InvalidTransition(_)
            | Error::ExecutionDelayPending { .. }
            | Error::AlreadyExecuted(_)
            | Error::DelegationExists(_)
            | Error::DelegationExceedsBalance { .. }
            | Error::PowerCommitted(_)
            | Error::BalanceBelowDelegated(_)
            | Error::CategoryCapExceeded(_)
            | Error::UnauthorizedExpenditure(_)
            | Error::InsufficientTreasuryFunds(_) => ErrorCode::ResourceConflict,
            Error::InvalidProposal(_)
            | Error::InvalidOption(_)
            | Error::SelfDelegation(_)
            | Error::InvalidParameters(_)
            | Error::UnknownCategory(_) => ErrorCode::InvalidParameter,
            Error::TreasuryCorrupted(_) => ErrorCode::InternalError,
            Error::Ledger(e) => e.code(),
        }
    }

    /// Domain reason attached to boundary errors
    pub fn reason(&self) -> &'static str {
        match self {
            Error::ProposalNotFound(_) => "PROPOSAL_NOT_FOUND",
            Error::InsufficientVotingPower(_) => "INSUFFICIENT_VOTING_POWER",
            Error::ProposalCooldown { .. } => "PROPOSAL_COOLDOWN",
            Error::TooManyActiveProposals(_) => "TOO_MANY_ACTIVE_PROPOSALS",
            Error::VotingClosed(_) => "VOTING_CLOSED",
            Error::InvalidTransition(_) => "INVALID_TRANSITION",
            Error::ExecutionDelayPending { .. } => "EXECUTION_DELAY_PENDING",
            Error::AlreadyExecuted(_) => "ALREADY_EXECUTED",
            Error::NotAuthorized(_) => "NOT_AUTHORIZED",
            Error::InvalidProposal(_) => "INVALID_PROPOSAL",
            Error::InvalidOption(_) => "INVALID_OPTION",
            Error::DelegationExists(_) => "DELEGATION_EXISTS",
            Error::SelfDelegation(_) => "SELF_DELEGATION",
            Error::DelegationExceedsBalance { .. } => "DELEGATION_EXCEEDS_BALANCE",
            Error::NoActiveDelegation(_) => "NO_ACTIVE_DELEGATION",
            Error::PowerCommitted(_) => "POWER_COMMITTED",
            Error::BalanceBelowDelegated(_) => "BALANCE_BELOW_DELEGATED",
            Error::InvalidParameters(_) => "INVALID_GOVERNANCE_PARAMETERS",
            Error::CategoryCapExceeded(_) => "CATEGORY_CAP_EXCEEDED",
            Error::UnauthorizedExpenditure(_) => "UNAUTHORIZED_EXPENDITURE",
            Error::InsufficientTreasuryFunds(_) => "INSUFFICIENT_TREASURY_FUNDS",
            Error::TreasuryCorrupted(_) => "TREASURY_CORRUPTED",
            Error::UnknownCategory(_) => "UNKNOWN_BUDGET_CATEGORY",
            Error::Ledger(e) => e.reason(),
        }
    }
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflicts_map_to_resource_conflict() {
        let err = Error::DelegationExceedsBalance {
            requested: "100".into(),
            available: "50".into(),
        };
        assert_eq!(err.code(), ErrorCode::ResourceConflict);
        assert_eq!(Error::VotingClosed("1".into()).code(), ErrorCode::ResourceConflict);
        assert_eq!(
            Error::UnauthorizedExpenditure("x".into()).reason(),
            "UNAUTHORIZED_EXPENDITURE"
        );
    }

    #[test]
    fn test_corruption_is_internal() {
        assert_eq!(
            Error::TreasuryCorrupted("sum".into()).code(),
            ErrorCode::InternalError
        );
    }
}
