//! Error taxonomy shared by the planners, the ledger, and the command dispatcher.

use thiserror::Error;

/// Failure reported by a device directory adapter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DirectoryError {
    /// The backing store could not be reached or answered with an error.
    #[error("device directory unavailable: {0}")]
    Unavailable(String),
}

/// A priority level outside the closed domain `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("priority level {level} is outside 1..=5")]
pub struct PolicyViolation {
    pub level: u8,
}

/// A priority table whose level-1 rule would allow shedding or shifting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("priority level 1 must never be shed or shifted")]
pub struct UnprotectedCriticalLevel;

/// Errors surfaced by the load-shedding and load-shifting planners.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    /// Caller supplied a target that is not a finite, in-range number.
    #[error("invalid target: {0}")]
    InvalidTarget(String),
    /// A candidate device carried a priority level with no rule.
    #[error(transparent)]
    PolicyViolation(#[from] PolicyViolation),
    /// The device directory failed; never retried.
    #[error("device directory unavailable: {0}")]
    DirectoryUnavailable(String),
}

impl From<DirectoryError> for PlanError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Unavailable(reason) => Self::DirectoryUnavailable(reason),
        }
    }
}

/// Reasons a grid transaction could not be opened or transitioned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("invalid amount: {field} must be a finite number > 0, got {value}")]
    InvalidAmount { field: &'static str, value: f64 },
    #[error("unknown transaction {0}")]
    UnknownTransaction(String),
    #[error("transaction {id} cannot move from {from} to {to}")]
    IllegalTransition {
        id: String,
        from: &'static str,
        to: &'static str,
    },
}

/// Failure fetching a grid status snapshot.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("grid telemetry unavailable: {0}")]
pub struct TelemetryError(pub String);

/// Command-protocol errors raised by the dispatcher.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error("malformed command: {0}")]
    MalformedCommand(String),
    #[error("invalid amount: {value} must not be negative")]
    InvalidAmount { value: f64 },
    #[error("unknown target: {0}")]
    UnknownTarget(String),
    #[error("invalid battery action: {0}")]
    InvalidBatteryAction(String),
}

/// Transport failures. Publishing is best-effort and never fatal to the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("failed to publish on {topic}: {reason}")]
    PublishFailure { topic: String, reason: String },
    #[error("failed to subscribe to {topic}: {reason}")]
    SubscribeFailure { topic: String, reason: String },
}

/// Failure appending to the audit sink.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("audit sink write failed: {0}")]
pub struct AuditSinkError(pub String);

/// Failure encoding or decoding a compact error-diagnostics record.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("binary encode failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("binary decode failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("json codec failed: {0}")]
    Json(#[from] serde_json::Error),
}
