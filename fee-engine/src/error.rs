//! Error types for the fee engine

use ledger_core::ErrorCode;
use thiserror::Error;

/// Fee engine error
#[derive(Debug, Error)]
pub enum Error {
    /// Pool not registered
    #[error("Pool not found: {0}")]
    PoolNotFound(String),

    /// A pool for this token pair already exists
    #[error("Pool already exists: {0}")]
    PoolExists(String),

    /// Invalid pool or adjustment configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Market signal outside its domain
    #[error("Invalid market signal: {0}")]
    InvalidSignal(String),

    /// Directed adjustment attempted inside the cooldown window
    #[error("Fee adjustment cooldown active: {remaining_secs}s remaining")]
    CooldownActive {
        /// Seconds until the next adjustment is allowed
        remaining_secs: u64,
    },

    /// Liquidity position not found
    #[error("Position not found: {0}")]
    PositionNotFound(String),

    /// Position does not hold enough shares
    #[error("Insufficient shares: requested {requested}, held {held}")]
    InsufficientShares {
        /// Shares requested
        requested: String,
        /// Shares held
        held: String,
    },

    /// Caller does not own the position
    #[error("Position {0} is owned by another account")]
    NotPositionOwner(String),

    /// Pool state violates an invariant
    #[error("Pool state corrupted: {0}")]
    Corrupted(String),

    /// Arithmetic or primitive error
    #[error(transparent)]
    Ledger(#[from] ledger_core::Error),
}

impl Error {
    /// Boundary code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::PoolNotFound(_) | Error::PositionNotFound(_) => ErrorCode::ResourceNotFound,
            Error::PoolExists(_)
            | Error::CooldownActive { .. }
            | Error::InsufficientShares { .. } => ErrorCode::ResourceConflict,
            Error::InvalidConfig(_) | Error::InvalidSignal(_) => ErrorCode::InvalidParameter,
            Error::NotPositionOwner(_) => ErrorCode::InsufficientPermissions,
            Error::Corrupted(_) => ErrorCode::InternalError,
            Error::Ledger(e) => e.code(),
        }
    }

    /// Domain reason attached to boundary errors
    pub fn reason(&self) -> &'static str {
        match self {
            Error::PoolNotFound(_) => "POOL_NOT_FOUND",
            Error::PoolExists(_) => "POOL_EXISTS",
            Error::InvalidConfig(_) => "INVALID_POOL_CONFIG",
            Error::InvalidSignal(_) => "INVALID_MARKET_SIGNAL",
            Error::CooldownActive { .. } => "FEE_COOLDOWN_ACTIVE",
            Error::PositionNotFound(_) => "POSITION_NOT_FOUND",
            Error::InsufficientShares { .. } => "INSUFFICIENT_SHARES",
            Error::NotPositionOwner(_) => "NOT_POSITION_OWNER",
            Error::Corrupted(_) => "POOL_CORRUPTED",
            Error::Ledger(e) => e.reason(),
        }
    }
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
