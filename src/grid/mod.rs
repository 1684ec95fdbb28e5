pub mod ledger;
/// Grid status seam for a live telemetry feed.
pub mod telemetry;
pub mod types;

pub use ledger::{DEFAULT_SETTLED_RETENTION_MINUTES, GRID_DEVICE_ID, GridLedger};
pub use telemetry::{GridTelemetry, StaticGridTelemetry};
pub use types::{
    GridOrder, GridStatusSnapshot, GridTransaction, TransactionDetails, TransactionResult,
    TransactionStatus, TransactionType,
};
