//! Buy/sell transaction lifecycle against the external grid.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::telemetry::GridTelemetry;
use super::types::{
    GridStatusSnapshot, GridTransaction, TransactionDetails, TransactionResult, TransactionStatus,
    TransactionType,
};
use crate::audit::{AuditRecorder, EventKind};
use crate::error::{LedgerError, TelemetryError};

/// Audit device id used for every grid event.
pub const GRID_DEVICE_ID: &str = "grid";

/// How long a settled transaction stays in the index by default.
pub const DEFAULT_SETTLED_RETENTION_MINUTES: i64 = 24 * 60;

struct Entry {
    tx: GridTransaction,
    settled_at: Option<DateTime<Utc>>,
}

/// Tracks transactions opened by this process and enforces
/// `pending -> completed | failed` as the only legal transition.
///
/// The index lives in memory only; the audit trail is the durable record.
/// Pending transactions are kept until they settle. Settled ones are evicted
/// once they are older than the retention window, checked whenever a new
/// transaction is opened, so the index holds the open book plus one window
/// of history.
pub struct GridLedger {
    audit: Arc<AuditRecorder>,
    telemetry: Arc<dyn GridTelemetry>,
    retention: TimeDelta,
    transactions: Mutex<HashMap<Uuid, Entry>>,
}

impl GridLedger {
    pub fn new(audit: Arc<AuditRecorder>, telemetry: Arc<dyn GridTelemetry>) -> Self {
        Self::with_retention(
            audit,
            telemetry,
            TimeDelta::minutes(DEFAULT_SETTLED_RETENTION_MINUTES),
        )
    }

    /// Like [`GridLedger::new`], keeping settled transactions for `retention`.
    pub fn with_retention(
        audit: Arc<AuditRecorder>,
        telemetry: Arc<dyn GridTelemetry>,
        retention: TimeDelta,
    ) -> Self {
        Self {
            audit,
            telemetry,
            retention,
            transactions: Mutex::new(HashMap::new()),
        }
    }

    /// Opens a pending purchase of `amount_kwh` at `price_per_kwh`.
    pub async fn buy(
        &self,
        amount_kwh: f64,
        price_per_kwh: f64,
        device_ids: Option<Vec<String>>,
    ) -> TransactionResult {
        self.initiate(TransactionType::Buy, amount_kwh, price_per_kwh, device_ids)
            .await
    }

    /// Opens a pending sale of `amount_kwh` at `price_per_kwh`.
    pub async fn sell(
        &self,
        amount_kwh: f64,
        price_per_kwh: f64,
        device_ids: Option<Vec<String>>,
    ) -> TransactionResult {
        self.initiate(TransactionType::Sell, amount_kwh, price_per_kwh, device_ids)
            .await
    }

    async fn initiate(
        &self,
        kind: TransactionType,
        amount_kwh: f64,
        price_per_kwh: f64,
        device_ids: Option<Vec<String>>,
    ) -> TransactionResult {
        match self.open(kind, amount_kwh, price_per_kwh, device_ids).await {
            Ok(tx) => {
                info!(transaction_id = %tx.transaction_id, %kind, amount_kwh, price_per_kwh, "grid transaction initiated");
                self.audit
                    .info(
                        GRID_DEVICE_ID,
                        EventKind::GridTransaction,
                        format!("Grid {kind} transaction initiated: {amount_kwh}kWh at ${price_per_kwh}/kWh"),
                    )
                    .await;
                TransactionResult {
                    success: true,
                    transaction_id: Some(tx.transaction_id),
                    message: format!("Grid {kind} transaction initiated successfully"),
                    details: Some(TransactionDetails::Transaction(tx)),
                }
            }
            Err(err) => {
                let message = format!("Failed to initiate grid {kind} transaction: {err}");
                warn!(%kind, error = %err, "grid transaction rejected");
                self.audit
                    .error(GRID_DEVICE_ID, EventKind::GridTransaction, message.clone())
                    .await;
                TransactionResult::failure(message)
            }
        }
    }

    async fn open(
        &self,
        kind: TransactionType,
        amount_kwh: f64,
        price_per_kwh: f64,
        device_ids: Option<Vec<String>>,
    ) -> Result<GridTransaction, LedgerError> {
        ensure_positive("amount", amount_kwh)?;
        ensure_positive("price", price_per_kwh)?;

        let tx = GridTransaction {
            transaction_id: Uuid::new_v4(),
            kind,
            amount_kwh,
            price_per_kwh,
            timestamp: Utc::now(),
            status: TransactionStatus::Pending,
            device_ids,
        };
        let mut transactions = self.transactions.lock().await;
        self.evict_settled(&mut transactions, tx.timestamp);
        transactions.insert(
            tx.transaction_id,
            Entry {
                tx: tx.clone(),
                settled_at: None,
            },
        );
        Ok(tx)
    }

    fn evict_settled(&self, transactions: &mut HashMap<Uuid, Entry>, now: DateTime<Utc>) {
        let before = transactions.len();
        transactions.retain(|_, entry| {
            entry
                .settled_at
                .is_none_or(|settled| now - settled < self.retention)
        });
        let evicted = before - transactions.len();
        if evicted > 0 {
            debug!(evicted, "settled grid transactions evicted");
        }
    }

    /// Moves a pending transaction to `status`.
    ///
    /// Unknown ids, non-pending transactions, and a `pending` target are
    /// reported as failures and audited as errors.
    pub async fn update_status(
        &self,
        transaction_id: &str,
        status: TransactionStatus,
    ) -> TransactionResult {
        match self.transition(transaction_id, status).await {
            Ok(id) => {
                info!(transaction_id = %id, %status, "grid transaction status updated");
                self.audit
                    .info(
                        GRID_DEVICE_ID,
                        EventKind::GridTransaction,
                        format!("Grid transaction {id} status updated to: {status}"),
                    )
                    .await;
                TransactionResult {
                    success: true,
                    transaction_id: Some(id),
                    message: format!("Transaction status updated to {status}"),
                    details: Some(TransactionDetails::StatusChange {
                        transaction_id: id,
                        status,
                    }),
                }
            }
            Err(err) => {
                let message = format!("Failed to update transaction status: {err}");
                warn!(transaction_id, %status, error = %err, "grid status update rejected");
                self.audit
                    .error(GRID_DEVICE_ID, EventKind::GridTransaction, message.clone())
                    .await;
                TransactionResult::failure(message)
            }
        }
    }

    async fn transition(
        &self,
        transaction_id: &str,
        status: TransactionStatus,
    ) -> Result<Uuid, LedgerError> {
        let id = Uuid::parse_str(transaction_id)
            .map_err(|_| LedgerError::UnknownTransaction(transaction_id.to_string()))?;

        let mut transactions = self.transactions.lock().await;
        let entry = transactions
            .get_mut(&id)
            .ok_or_else(|| LedgerError::UnknownTransaction(transaction_id.to_string()))?;

        if !entry.tx.status.can_transition_to(status) {
            return Err(LedgerError::IllegalTransition {
                id: id.to_string(),
                from: entry.tx.status.as_str(),
                to: status.as_str(),
            });
        }
        entry.tx.status = status;
        entry.settled_at = Some(Utc::now());
        Ok(id)
    }

    /// Returns a copy of a transaction opened by this process, unless it
    /// settled and has since been evicted.
    pub async fn transaction(&self, id: Uuid) -> Option<GridTransaction> {
        self.transactions
            .lock()
            .await
            .get(&id)
            .map(|entry| entry.tx.clone())
    }

    /// Current connectivity and tariff figures.
    ///
    /// # Errors
    ///
    /// Returns a `TelemetryError` if the telemetry source cannot be read.
    pub async fn status(&self) -> Result<GridStatusSnapshot, TelemetryError> {
        self.telemetry.snapshot().await
    }

    /// [`GridLedger::status`] wrapped as a transaction result for transport replies.
    pub async fn status_result(&self) -> TransactionResult {
        match self.status().await {
            Ok(snapshot) => TransactionResult {
                success: true,
                transaction_id: None,
                message: "Grid status retrieved successfully".to_string(),
                details: Some(TransactionDetails::GridStatus(snapshot)),
            },
            Err(err) => TransactionResult::failure(format!("Failed to get grid status: {err}")),
        }
    }
}

fn ensure_positive(field: &'static str, value: f64) -> Result<(), LedgerError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(LedgerError::InvalidAmount { field, value })
    }
}
