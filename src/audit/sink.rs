use async_trait::async_trait;
use tokio::sync::Mutex;

use super::event::AuditEvent;
use crate::error::AuditSinkError;

/// Append-only destination for audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, event: AuditEvent) -> Result<(), AuditSinkError>;
}

/// Audit trail kept in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every recorded event in append order.
    pub async fn snapshot(&self) -> Vec<AuditEvent> {
        self.events.lock().await.clone()
    }

    /// Number of recorded events.
    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.lock().await.is_empty()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditLog {
    async fn append(&self, event: AuditEvent) -> Result<(), AuditSinkError> {
        self.events.lock().await.push(event);
        Ok(())
    }
}
