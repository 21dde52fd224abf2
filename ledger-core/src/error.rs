//! Error types for the ledger primitives
//!
//! Also defines [`ErrorCode`], the boundary taxonomy every component maps
//! its own errors onto.

use std::fmt;
use thiserror::Error;

/// Result type for ledger primitive operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boundary error codes (`1000`-`1010`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    /// Malformed request
    InvalidRequest = 1000,
    /// Required parameter absent
    MissingParameter = 1001,
    /// Parameter present but out of range or malformed
    InvalidParameter = 1002,
    /// Caller not authenticated
    Unauthorized = 1003,
    /// Caller credentials expired
    TokenExpired = 1004,
    /// Caller authenticated but not allowed
    InsufficientPermissions = 1005,
    /// Entity does not exist
    ResourceNotFound = 1006,
    /// Request conflicts with current entity state
    ResourceConflict = 1007,
    /// Caller is rate limited (e.g. proposal cooldown)
    RateLimitExceeded = 1008,
    /// Engine fault or corrupted invariant
    InternalError = 1009,
    /// Engine not accepting commands
    ServiceUnavailable = 1010,
}

impl ErrorCode {
    /// All codes in numeric order
    pub const ALL: [ErrorCode; 11] = [
        ErrorCode::InvalidRequest,
        ErrorCode::MissingParameter,
        ErrorCode::InvalidParameter,
        ErrorCode::Unauthorized,
        ErrorCode::TokenExpired,
        ErrorCode::InsufficientPermissions,
        ErrorCode::ResourceNotFound,
        ErrorCode::ResourceConflict,
        ErrorCode::RateLimitExceeded,
        ErrorCode::InternalError,
        ErrorCode::ServiceUnavailable,
    ];

    /// Numeric wire value
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Parse numeric wire value
    pub fn from_u16(code: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_u16() == code)
    }

    /// Stable upper-case name
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::MissingParameter => "MISSING_PARAMETER",
            ErrorCode::InvalidParameter => "INVALID_PARAMETER",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::TokenExpired => "TOKEN_EXPIRED",
            ErrorCode::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            ErrorCode::ResourceNotFound => "RESOURCE_NOT_FOUND",
            ErrorCode::ResourceConflict => "RESOURCE_CONFLICT",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::InternalError => "INTERNAL_SERVER_ERROR",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_u16())
    }
}

/// Ledger primitive errors
#[derive(Error, Debug)]
pub enum Error {
    /// Checked addition or multiplication overflowed
    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    /// Checked subtraction went below zero
    #[error("Insufficient amount: {0}")]
    Underflow(String),

    /// Division by zero
    #[error("Division by zero: {0}")]
    DivisionByZero(String),

    /// Amount cannot be represented at the requested scale
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Rate or percentage outside its domain
    #[error("Invalid rate: {0}")]
    InvalidRate(String),

    /// Malformed address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Canonical encoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

impl Error {
    /// Boundary code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Overflow(_)
            | Error::InvalidAmount(_)
            | Error::InvalidRate(_)
            | Error::InvalidAddress(_) => ErrorCode::InvalidParameter,
            Error::Underflow(_) => ErrorCode::ResourceConflict,
            Error::DivisionByZero(_) | Error::Serialization(_) => ErrorCode::InternalError,
        }
    }

    /// Domain reason attached to boundary errors
    pub fn reason(&self) -> &'static str {
        match self {
            Error::Overflow(_) => "ARITHMETIC_OVERFLOW",
            Error::Underflow(_) => "INSUFFICIENT_AMOUNT",
            Error::DivisionByZero(_) => "DIVISION_BY_ZERO",
            Error::InvalidAmount(_) => "INVALID_AMOUNT",
            Error::InvalidRate(_) => "INVALID_RATE",
            Error::InvalidAddress(_) => "INVALID_ADDRESS",
            Error::Serialization(_) => "SERIALIZATION",
        }
    }
}
