use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    LoadShed,
    LoadShift,
    GridTransaction,
    OptimizationCommand,
    BatteryStatus,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoadShed => "loadShed",
            Self::LoadShift => "loadShift",
            Self::GridTransaction => "gridTransaction",
            Self::OptimizationCommand => "optimizationCommand",
            Self::BatteryStatus => "batteryStatus",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit record.
///
/// `acknowledged` is flipped by an operator workflow outside the core and is
/// always `false` when recorded here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventKind,
    pub severity: Severity,
    pub message: String,
    pub acknowledged: bool,
}

impl AuditEvent {
    /// Creates an unacknowledged event stamped with the current time.
    pub fn new(
        device_id: impl Into<String>,
        event_type: EventKind,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            timestamp: Utc::now(),
            event_type,
            severity,
            message: message.into(),
            acknowledged: false,
        }
    }
}
