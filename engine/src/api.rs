//! Boundary shapes: receipts, the response envelope, errors and routes
//!
//! The transport itself lives outside the engine. These types fix what
//! goes over it: camelCase fields, amounts as decimal strings, timestamps
//! as unix seconds.

use crate::Error;
use chrono::{DateTime, Utc};
use ledger_core::{Amount, ErrorCode, Hash32};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Receipt status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    /// Accepted, not yet applied
    Pending,
    /// Applied
    Confirmed,
    /// Rejected
    Failed,
}

/// Returned by every mutating call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    /// Unique per committed command
    pub transaction_hash: Hash32,
    /// Nominal gas
    pub gas_used: u64,
    /// Configured gas price
    pub gas_price: Amount,
    /// Status
    pub status: TxStatus,
}

/// Error body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Numeric code (`1000`-`1010`)
    pub code: u16,
    /// Human-readable message
    pub message: String,
    /// `{"reason": ...}` plus any extra context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ApiError {
    /// Build from a code and message with no domain reason
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.as_u16(),
            message: message.into(),
            details: None,
        }
    }

    /// Taxonomy entry, if the code is known
    pub fn error_code(&self) -> Option<ErrorCode> {
        ErrorCode::from_u16(self.code)
    }

    /// Domain reason from `details.reason`
    pub fn reason(&self) -> Option<&str> {
        self.details.as_ref()?.get("reason")?.as_str()
    }
}

impl From<&Error> for ApiError {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code().as_u16(),
            message: err.to_string(),
            details: Some(json!({ "reason": err.reason() })),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError::from(&err)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "{} [{}]: {}", self.code, reason, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

impl std::error::Error for ApiError {}

/// Response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// `true` when `data` is set
    pub success: bool,
    /// Payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
    /// Response time
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    /// Successful response
    pub fn ok(data: T, timestamp: DateTime<Utc>) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp,
        }
    }

    /// Failed response
    pub fn err(error: ApiError, timestamp: DateTime<Utc>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            timestamp,
        }
    }

    /// Wrap a command or query result
    pub fn from_result(result: std::result::Result<T, ApiError>, timestamp: DateTime<Utc>) -> Self {
        match result {
            Ok(data) => Self::ok(data, timestamp),
            Err(error) => Self::err(error, timestamp),
        }
    }
}

/// One page of a listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Matches across all pages
    pub total: usize,
    /// 1-based page number
    pub page: usize,
    /// Page size
    pub page_size: usize,
    /// More pages follow
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Wrap a listing result
    pub fn new(items: Vec<T>, total: usize, page: usize, page_size: usize) -> Self {
        let seen = page.saturating_sub(1).saturating_mul(page_size).saturating_add(items.len());
        Self {
            items,
            total,
            page,
            page_size,
            has_more: seen < total,
        }
    }
}

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// Read
    Get,
    /// Mutate
    Post,
}

/// REST route served by the surrounding transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Route {
    /// Method
    pub method: Method,
    /// Path template
    pub path: &'static str,
    /// What it maps to
    pub description: &'static str,
}

const fn route(method: Method, path: &'static str, description: &'static str) -> Route {
    Route { method, path, description }
}

/// Route table
pub const ROUTES: &[Route] = &[
    route(Method::Get, "/api/v1/pools", "List pools"),
    route(Method::Post, "/api/v1/pools", "CreatePool"),
    route(Method::Get, "/api/v1/governance/proposals", "List proposals"),
    route(Method::Post, "/api/v1/governance/proposals", "CreateProposal"),
    route(Method::Get, "/api/v1/governance/proposals/{id}", "Proposal detail"),
    route(Method::Post, "/api/v1/governance/proposals/{id}/vote", "CastVote"),
    route(Method::Get, "/api/v1/liquidity/positions", "List positions"),
    route(Method::Post, "/api/v1/liquidity/add", "AddLiquidity"),
    route(Method::Post, "/api/v1/liquidity/remove", "RemoveLiquidity"),
    route(Method::Get, "/api/v1/analytics/global", "Global statistics"),
    route(Method::Get, "/api/v1/analytics/pools/{address}", "Pool analytics"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_from_engine_error() {
        let err: Error = governance::Error::CategoryCapExceeded("grants".into()).into();
        let api = ApiError::from(&err);

        assert_eq!(api.code, 1007);
        assert_eq!(api.error_code(), Some(ErrorCode::ResourceConflict));
        assert_eq!(api.reason(), Some("CATEGORY_CAP_EXCEEDED"));
    }

    #[test]
    fn test_receipt_wire_shape() {
        let receipt = TxReceipt {
            transaction_hash: Hash32::default(),
            gas_used: 21_000,
            gas_price: Amount::new(20_000_000_000),
            status: TxStatus::Confirmed,
        };
        let value = serde_json::to_value(&receipt).unwrap();

        assert_eq!(value["gasUsed"], 21_000);
        assert_eq!(value["gasPrice"], "20000000000");
        assert_eq!(value["status"], "confirmed");
        assert!(value["transactionHash"].as_str().unwrap().starts_with("0x"));
    }

    #[test]
    fn test_error_envelope_omits_data() {
        let error = ApiError::new(ErrorCode::ResourceNotFound, "no such pool");
        let response: ApiResponse<()> = ApiResponse::err(error, Utc::now());
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["success"], false);
        assert!(value.get("data").is_none());
        assert_eq!(value["error"]["code"], 1006);
    }

    #[test]
    fn test_page_has_more() {
        let page = Page::new(vec![1, 2], 5, 1, 2);
        assert!(page.has_more);
        let last = Page::new(vec![5], 5, 3, 2);
        assert!(!last.has_more);
    }
}
