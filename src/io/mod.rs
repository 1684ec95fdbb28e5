/// CSV export of the audit trail.
pub mod export;
