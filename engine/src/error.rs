//! Error types for the engine

use ledger_core::ErrorCode;
use thiserror::Error;

/// Engine error
#[derive(Debug, Error)]
pub enum Error {
    /// Pool, fee or liquidity failure
    #[error(transparent)]
    Fee(#[from] fee_engine::Error),

    /// Governance or treasury failure
    #[error(transparent)]
    Governance(#[from] governance::Error),

    /// Arithmetic or encoding failure
    #[error(transparent)]
    Ledger(#[from] ledger_core::Error),

    /// Event payload encoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Guardian-only command from another caller
    #[error("Not a guardian: {0}")]
    NotGuardian(String),

    /// Command cancelled before it was applied
    #[error("Command cancelled before it was applied")]
    Cancelled,

    /// Actor mailbox closed
    #[error("Engine unavailable: {0}")]
    Unavailable(String),
}

impl Error {
    /// Boundary code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Fee(e) => e.code(),
            Error::Governance(e) => e.code(),
            Error::Ledger(e) => e.code(),
            Error::Serialization(_) | Error::Io(_) => ErrorCode::InternalError,
            Error::Config(_) => ErrorCode::InvalidParameter,
            Error::NotGuardian(_) => ErrorCode::InsufficientPermissions,
            Error::Cancelled => ErrorCode::InvalidRequest,
            Error::Unavailable(_) => ErrorCode::ServiceUnavailable,
        }
    }

    /// Stable domain reason
    pub fn reason(&self) -> &'static str {
        match self {
            Error::Fee(e) => e.reason(),
            Error::Governance(e) => e.reason(),
            Error::Ledger(e) => e.reason(),
            Error::Serialization(_) => "SERIALIZATION_FAILED",
            Error::Config(_) => "INVALID_CONFIG",
            Error::Io(_) => "IO_FAILED",
            Error::NotGuardian(_) => "NOT_GUARDIAN",
            Error::Cancelled => "COMMAND_CANCELLED",
            Error::Unavailable(_) => "ENGINE_UNAVAILABLE",
        }
    }
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_codes_pass_through() {
        let err: Error = fee_engine::Error::CooldownActive { remaining_secs: 10 }.into();
        assert_eq!(err.code(), ErrorCode::ResourceConflict);
        assert_eq!(err.reason(), "FEE_COOLDOWN_ACTIVE");

        let err: Error = governance::Error::ProposalCooldown { remaining_secs: 5 }.into();
        assert_eq!(err.code(), ErrorCode::RateLimitExceeded);
    }

    #[test]
    fn test_mailbox_closed_is_unavailable() {
        assert_eq!(
            Error::Unavailable("mailbox closed".into()).code(),
            ErrorCode::ServiceUnavailable
        );
    }
}
