//! API request and error types.
//!
//! Field names are camelCase to match the transport payloads.

use serde::{Deserialize, Serialize};

use crate::grid::TransactionStatus;

/// Body of `PUT /grid/transaction/status`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateRequest {
    pub transaction_id: String,
    pub status: TransactionStatus,
}

/// Error body for 400 and 500 responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always `false`.
    pub success: bool,
    /// Human-readable error description.
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}
