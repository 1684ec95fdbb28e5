//! Grid transaction records and their wire shapes.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of energy flow relative to the microgrid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Buy,
    Sell,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state. `Pending` is the only state with outgoing edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Returns `true` for `pending -> completed` and `pending -> failed`.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Completed) | (Self::Pending, Self::Failed)
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One buy or sell negotiation with the external grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridTransaction {
    pub transaction_id: Uuid,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    #[serde(rename = "amountKWh")]
    pub amount_kwh: f64,
    #[serde(rename = "pricePerKWh")]
    pub price_per_kwh: f64,
    pub timestamp: DateTime<Utc>,
    pub status: TransactionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_ids: Option<Vec<String>>,
}

/// Connectivity and tariff figures for the grid connection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridStatusSnapshot {
    pub connected: bool,
    /// Energy the grid will currently accept or supply (kWh).
    pub available_capacity: f64,
    /// Price paid when buying ($/kWh).
    pub current_buy_rate: f64,
    /// Price received when selling ($/kWh).
    pub current_sell_rate: f64,
}

/// Payload attached to a [`TransactionResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransactionDetails {
    Transaction(GridTransaction),
    StatusChange {
        #[serde(rename = "transactionId")]
        transaction_id: Uuid,
        status: TransactionStatus,
    },
    GridStatus(GridStatusSnapshot),
}

/// Outcome of a ledger operation. Failures are reported here, never thrown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<Uuid>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<TransactionDetails>,
}

impl TransactionResult {
    /// Failure result carrying only a message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            transaction_id: None,
            message: message.into(),
            details: None,
        }
    }
}

/// Buy or sell order as received over HTTP or the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridOrder {
    pub amount: f64,
    pub price: f64,
    #[serde(default)]
    pub device_ids: Option<Vec<String>>,
}
