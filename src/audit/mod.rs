/// Compact binary record for the error-diagnostics channel.
pub mod compact;
pub mod event;
/// Audit wrapper that also republishes error events.
pub mod recorder;
pub mod sink;

pub use compact::{CompactEvent, ErrorEncoding};
pub use event::{AuditEvent, EventKind, Severity};
pub use recorder::AuditRecorder;
pub use sink::{AuditSink, MemoryAuditLog};
