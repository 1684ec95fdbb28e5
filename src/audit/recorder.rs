use std::sync::Arc;

use tracing::{debug, warn};

use super::compact::{CompactEvent, ErrorEncoding};
use super::event::{AuditEvent, EventKind, Severity};
use super::sink::AuditSink;
use crate::transport::{Transport, topics};

/// Writes audit events and republishes errors for remote diagnostics.
///
/// Neither the sink write nor the diagnostics publish can fail the caller;
/// both failures are logged and dropped.
pub struct AuditRecorder {
    sink: Arc<dyn AuditSink>,
    transport: Arc<dyn Transport>,
    encoding: ErrorEncoding,
}

impl AuditRecorder {
    pub fn new(
        sink: Arc<dyn AuditSink>,
        transport: Arc<dyn Transport>,
        encoding: ErrorEncoding,
    ) -> Self {
        Self {
            sink,
            transport,
            encoding,
        }
    }

    /// Records one event.
    pub async fn record(
        &self,
        device_id: &str,
        event_type: EventKind,
        severity: Severity,
        message: impl Into<String>,
    ) {
        let event = AuditEvent::new(device_id, event_type, severity, message);
        debug!(device_id, %event_type, %severity, message = %event.message, "audit");

        let diagnostics = (severity == Severity::Error).then(|| CompactEvent::from(&event));

        if let Err(err) = self.sink.append(event).await {
            warn!(device_id, %event_type, error = %err, "audit sink write failed");
        }

        if let Some(compact) = diagnostics {
            self.publish_diagnostics(&compact).await;
        }
    }

    pub async fn info(&self, device_id: &str, event_type: EventKind, message: impl Into<String>) {
        self.record(device_id, event_type, Severity::Info, message).await;
    }

    pub async fn error(&self, device_id: &str, event_type: EventKind, message: impl Into<String>) {
        self.record(device_id, event_type, Severity::Error, message).await;
    }

    async fn publish_diagnostics(&self, compact: &CompactEvent) {
        let payload = match compact.encode(self.encoding) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "failed to encode error diagnostics");
                return;
            }
        };
        if let Err(err) = self.transport.publish(topics::ERROR_EVENTS, payload).await {
            warn!(error = %err, "failed to publish error diagnostics");
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::audit::sink::MemoryAuditLog;
    use crate::error::{AuditSinkError, TransportError};
    use crate::transport::{LocalBus, Message, Subscription};

    struct BrokenSink;

    #[async_trait]
    impl AuditSink for BrokenSink {
        async fn append(&self, _event: AuditEvent) -> Result<(), AuditSinkError> {
            Err(AuditSinkError("disk full".into()))
        }
    }

    struct BrokenTransport;

    #[async_trait]
    impl Transport for BrokenTransport {
        async fn publish(&self, topic: &str, _payload: Vec<u8>) -> Result<(), TransportError> {
            Err(TransportError::PublishFailure {
                topic: topic.to_string(),
                reason: "broker gone".into(),
            })
        }

        async fn subscribe(&self, topics: &[&str]) -> Result<Subscription, TransportError> {
            Err(TransportError::SubscribeFailure {
                topic: topics.join(","),
                reason: "broker gone".into(),
            })
        }
    }

    async fn recorder_with_bus(
        encoding: ErrorEncoding,
    ) -> (AuditRecorder, Arc<MemoryAuditLog>, tokio::sync::mpsc::UnboundedReceiver<Message>) {
        let log = Arc::new(MemoryAuditLog::new());
        let bus = Arc::new(LocalBus::new());
        let rx = bus.subscribe(&[topics::ERROR_EVENTS]).await.unwrap();
        (AuditRecorder::new(log.clone(), bus, encoding), log, rx)
    }

    #[tokio::test]
    async fn info_is_stored_but_not_published() {
        let (recorder, log, mut rx) = recorder_with_bus(ErrorEncoding::Binary).await;
        recorder.info("system", EventKind::LoadShed, "ok").await;

        assert_eq!(log.len().await, 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn error_is_stored_and_published_in_binary() {
        let (recorder, log, mut rx) = recorder_with_bus(ErrorEncoding::Binary).await;
        recorder.error("grid", EventKind::GridTransaction, "boom").await;

        let events = log.snapshot().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].severity, Severity::Error);
        assert!(!events[0].acknowledged);

        let msg = rx.try_recv().expect("error should be published");
        let compact = CompactEvent::decode(&msg.payload, ErrorEncoding::Binary).unwrap();
        assert_eq!(compact.device_id, "grid");
        assert_eq!(compact.message, "boom");
        assert_eq!(compact.timestamp_ms, events[0].timestamp.timestamp_millis());
    }

    #[tokio::test]
    async fn json_fallback_is_used_when_configured() {
        let (recorder, _log, mut rx) = recorder_with_bus(ErrorEncoding::Json).await;
        recorder.error("battery", EventKind::BatteryStatus, "bad").await;

        let msg = rx.try_recv().expect("error should be published");
        let value: serde_json::Value = serde_json::from_slice(&msg.payload).unwrap();
        assert_eq!(value["device_id"], "battery");
        assert_eq!(value["event_type"], "batteryStatus");
    }

    #[tokio::test]
    async fn sink_and_transport_failures_are_swallowed() {
        let recorder = AuditRecorder::new(
            Arc::new(BrokenSink),
            Arc::new(BrokenTransport),
            ErrorEncoding::Binary,
        );
        recorder.error("grid", EventKind::GridTransaction, "still returns").await;
        recorder.info("grid", EventKind::GridTransaction, "still returns").await;
    }
}
