//! Demand-response control core for a small electrical microgrid.

#[cfg(feature = "api")]
pub mod api;
/// Audit events, the audit sink port, and the error-diagnostics codec.
pub mod audit;
pub mod config;
/// Device records and the device directory port.
pub mod devices;
/// Inbound optimization-command protocol.
pub mod dispatch;
pub mod error;
/// Grid buy/sell transactions and grid status.
pub mod grid;
pub mod io;
pub mod logging;
/// Load-shedding and load-shifting planners.
pub mod planning;
pub mod policy;
pub mod runner;
pub mod service;
/// Publish/subscribe transport port and the in-process bus.
pub mod transport;
