//! Ledger Core
//!
//! Exact-arithmetic primitives shared by every engine component.
//!
//! # Design
//!
//! - **Fixed width**: monetary values are `u128` counts of the smallest unit
//! - **Checked**: every add/sub/mul reports overflow instead of wrapping
//! - **Explicit scale**: decimals only enter at conversion boundaries
//! - **No floats**: ratios and percentages use `rust_decimal::Decimal`
//!
//! Also home to the boundary error taxonomy ([`ErrorCode`]), address
//! validation, and content/transaction hashing.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod amount;
pub mod error;
pub mod hash;
pub mod rate;
pub mod types;

// Re-exports
pub use amount::Amount;
pub use error::{Error, ErrorCode, Result};
pub use hash::{content_hash, transaction_hash, Hash32};
pub use rate::{Bps, Percent, BPS_DENOMINATOR};
pub use types::{is_valid_address, new_record_id, Address};
