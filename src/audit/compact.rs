//! Five-field diagnostics record published for error-severity events.
//!
//! The binary form is MessagePack in positional (array) layout, so field names
//! never go over the wire. The JSON form carries the same five fields by name.

use serde::{Deserialize, Serialize};

use super::event::{AuditEvent, Severity};
use crate::error::CodecError;

/// Wire encoding for the error-diagnostics channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorEncoding {
    /// MessagePack, positional layout.
    #[default]
    Binary,
    /// Plain JSON object.
    Json,
}

/// Compact projection of an [`AuditEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactEvent {
    pub device_id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    pub event_type: String,
    pub severity: Severity,
    pub message: String,
}

impl From<&AuditEvent> for CompactEvent {
    fn from(event: &AuditEvent) -> Self {
        Self {
            device_id: event.device_id.clone(),
            timestamp_ms: event.timestamp.timestamp_millis(),
            event_type: event.event_type.as_str().to_string(),
            severity: event.severity,
            message: event.message.clone(),
        }
    }
}

impl CompactEvent {
    /// Serializes the record with `encoding`.
    ///
    /// # Errors
    ///
    /// Returns a `CodecError` if the underlying serializer fails.
    pub fn encode(&self, encoding: ErrorEncoding) -> Result<Vec<u8>, CodecError> {
        match encoding {
            ErrorEncoding::Binary => Ok(rmp_serde::to_vec(self)?),
            ErrorEncoding::Json => Ok(serde_json::to_vec(self)?),
        }
    }

    /// Parses a record previously produced by [`CompactEvent::encode`].
    ///
    /// # Errors
    ///
    /// Returns a `CodecError` if `bytes` is not a valid record in `encoding`.
    pub fn decode(bytes: &[u8], encoding: ErrorEncoding) -> Result<Self, CodecError> {
        match encoding {
            ErrorEncoding::Binary => Ok(rmp_serde::from_slice(bytes)?),
            ErrorEncoding::Json => Ok(serde_json::from_slice(bytes)?),
        }
    }
}
