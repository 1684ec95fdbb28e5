//! CSV export for the in-memory audit trail.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use chrono::SecondsFormat;

use crate::audit::AuditEvent;

/// Column header for audit-trail CSV export.
const HEADER: &str = "device_id,timestamp,event_type,severity,message,acknowledged";

/// Exports audit events to a CSV file at the given path.
///
/// Writes a header row followed by one row per event, in recording order.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_audit_csv(events: &[AuditEvent], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_audit_csv(events, buf)
}

/// Writes audit events as CSV to any writer.
///
/// Timestamps are RFC 3339 with millisecond precision; messages are quoted
/// by the CSV writer when they contain separators.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_audit_csv(events: &[AuditEvent], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(HEADER.split(','))?;

    for e in events {
        let timestamp = e.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
        wtr.write_record([
            e.device_id.as_str(),
            timestamp.as_str(),
            e.event_type.as_str(),
            e.severity.as_str(),
            e.message.as_str(),
            if e.acknowledged { "true" } else { "false" },
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
