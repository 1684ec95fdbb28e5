//! Publish/subscribe port connecting the core to device, battery, and grid actors.
//!
//! Connection management (broker reconnects, backoff) belongs to the adapter
//! behind [`Transport`], never to the core.

/// In-process publish/subscribe bus.
pub mod local;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;

pub use local::LocalBus;

/// Topic names used on the message transport.
pub mod topics {
    pub const GRID_BUY_REQUEST: &str = "grid/buy/request";
    pub const GRID_SELL_REQUEST: &str = "grid/sell/request";
    pub const GRID_TRANSACTION_RESPONSE: &str = "grid/transaction/response";
    pub const GRID_STATUS_REQUEST: &str = "grid/status/request";
    pub const GRID_STATUS_RESPONSE: &str = "grid/status/response";
    pub const COMMANDS: &str = "microgrid/commands";
    pub const COMMANDS_RESPONSE: &str = "microgrid/commands/response";
    pub const BATTERY_STATUS: &str = "microgrid/battery/status";
    /// Outbound only: compact error-diagnostics records.
    pub const ERROR_EVENTS: &str = "microgrid/events/error";
}

/// A payload received on a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Stream of messages for the topics passed to [`Transport::subscribe`].
pub type Subscription = mpsc::UnboundedReceiver<Message>;

/// Message transport consumed by the core.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publishes `payload` on `topic`.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Subscribes to every topic in `topics`, merged into one stream.
    async fn subscribe(&self, topics: &[&str]) -> Result<Subscription, TransportError>;
}

/// Builds a transport client id of the form `<prefix>-<random hex>`.
pub fn client_id(prefix: &str) -> String {
    format!("{prefix}-{:x}", rand::random::<u64>())
}
