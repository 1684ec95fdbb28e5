//! Transport message loop with a typed dispatch table keyed by topic.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dispatch::BatteryStatusUpdate;
use crate::error::TransportError;
use crate::grid::{GridOrder, TransactionResult, TransactionType};
use crate::service::Services;
use crate::transport::{Transport, topics};

/// Inbound message kinds handled by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    GridBuy,
    GridSell,
    GridStatus,
    Command,
    BatteryStatus,
}

/// Topic to handler table. Each topic is subscribed exactly once.
pub const ROUTES: &[(&str, Route)] = &[
    (topics::GRID_BUY_REQUEST, Route::GridBuy),
    (topics::GRID_SELL_REQUEST, Route::GridSell),
    (topics::GRID_STATUS_REQUEST, Route::GridStatus),
    (topics::COMMANDS, Route::Command),
    (topics::BATTERY_STATUS, Route::BatteryStatus),
];

/// Looks up the route registered for `topic`.
pub fn route_for(topic: &str) -> Option<Route> {
    ROUTES
        .iter()
        .find(|(t, _)| *t == topic)
        .map(|(_, route)| *route)
}

/// Handles one inbound payload. Every outcome is reported on the matching
/// response topic or the audit trail; nothing propagates to the loop.
pub async fn handle_message(services: &Services, route: Route, payload: &[u8]) {
    match route {
        Route::GridBuy => grid_order(services, TransactionType::Buy, payload).await,
        Route::GridSell => grid_order(services, TransactionType::Sell, payload).await,
        Route::GridStatus => {
            let result = services.ledger.status_result().await;
            publish_json(services, topics::GRID_STATUS_RESPONSE, &result).await;
        }
        Route::Command => {
            if let Err(err) = services.dispatcher.handle_command(payload).await {
                debug!(error = %err, "command finished with error");
            }
        }
        Route::BatteryStatus => match serde_json::from_slice::<BatteryStatusUpdate>(payload) {
            Ok(update) => {
                services.dispatcher.handle_battery_status(&update).await;
            }
            Err(err) => warn!(error = %err, "discarding malformed battery status update"),
        },
    }
}

async fn grid_order(services: &Services, kind: TransactionType, payload: &[u8]) {
    let result = match serde_json::from_slice::<GridOrder>(payload) {
        Ok(order) => match kind {
            TransactionType::Buy => {
                services
                    .ledger
                    .buy(order.amount, order.price, order.device_ids)
                    .await
            }
            TransactionType::Sell => {
                services
                    .ledger
                    .sell(order.amount, order.price, order.device_ids)
                    .await
            }
        },
        Err(err) => {
            warn!(%kind, error = %err, "malformed grid order");
            TransactionResult::failure(format!("Failed to process {kind} request"))
        }
    };
    publish_json(services, topics::GRID_TRANSACTION_RESPONSE, &result).await;
}

async fn publish_json(services: &Services, topic: &str, value: &TransactionResult) {
    match serde_json::to_vec(value) {
        Ok(payload) => {
            if let Err(err) = services.transport.publish(topic, payload).await {
                warn!(topic, error = %err, "failed to publish response");
            }
        }
        Err(err) => warn!(topic, error = %err, "failed to encode response"),
    }
}

/// Subscribes to every routed topic and handles each message on its own task.
///
/// Runs until the subscription closes.
///
/// # Errors
///
/// Returns `SubscribeFailure` if the transport refuses the subscription.
pub async fn run(services: Arc<Services>) -> Result<(), TransportError> {
    let topics: Vec<&str> = ROUTES.iter().map(|(topic, _)| *topic).collect();
    let mut subscription = services.transport.subscribe(&topics).await?;
    info!(topics = ?topics, "transport runner subscribed");

    while let Some(message) = subscription.recv().await {
        let Some(route) = route_for(&message.topic) else {
            debug!(topic = %message.topic, "no route for topic");
            continue;
        };
        let services = services.clone();
        tokio::spawn(async move {
            handle_message(&services, route, &message.payload).await;
        });
    }

    info!("transport subscription closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditLog;
    use crate::config::ServiceConfig;
    use crate::devices::MemoryDirectory;
    use crate::grid::{GridStatusSnapshot, TransactionDetails};
    use crate::transport::LocalBus;

    fn services() -> (Services, Arc<LocalBus>) {
        let bus = Arc::new(LocalBus::new());
        let services = Services::new(
            &ServiceConfig::empty(),
            Arc::new(MemoryDirectory::default()),
            Arc::new(MemoryAuditLog::new()),
            bus.clone(),
        )
        .unwrap();
        (services, bus)
    }

    #[test]
    fn every_inbound_topic_has_one_route() {
        assert_eq!(route_for("grid/buy/request"), Some(Route::GridBuy));
        assert_eq!(route_for("microgrid/battery/status"), Some(Route::BatteryStatus));
        assert_eq!(route_for(topics::ERROR_EVENTS), None);
        for (i, (topic, _)) in ROUTES.iter().enumerate() {
            assert!(
                ROUTES[i + 1..].iter().all(|(other, _)| other != topic),
                "{topic} is routed twice"
            );
        }
    }

    #[tokio::test]
    async fn sell_order_is_answered() {
        let (services, bus) = services();
        let mut rx = bus.subscribe(&[topics::GRID_TRANSACTION_RESPONSE]).await.unwrap();

        handle_message(&services, Route::GridSell, br#"{"amount": 4, "price": 0.12}"#).await;

        let result: TransactionResult =
            serde_json::from_slice(&rx.try_recv().unwrap().payload).unwrap();
        assert!(result.success);
        assert_eq!(result.message, "Grid sell transaction initiated successfully");
    }

    #[tokio::test]
    async fn unparseable_order_reports_failure() {
        let (services, bus) = services();
        let mut rx = bus.subscribe(&[topics::GRID_TRANSACTION_RESPONSE]).await.unwrap();

        handle_message(&services, Route::GridBuy, b"{oops").await;

        let result: TransactionResult =
            serde_json::from_slice(&rx.try_recv().unwrap().payload).unwrap();
        assert!(!result.success);
        assert_eq!(result.message, "Failed to process buy request");
    }

    #[tokio::test]
    async fn status_request_returns_snapshot() {
        let (services, bus) = services();
        let mut rx = bus.subscribe(&[topics::GRID_STATUS_RESPONSE]).await.unwrap();

        handle_message(&services, Route::GridStatus, b"").await;

        let result: TransactionResult =
            serde_json::from_slice(&rx.try_recv().unwrap().payload).unwrap();
        assert!(result.success);
        assert_eq!(
            result.details,
            Some(TransactionDetails::GridStatus(GridStatusSnapshot {
                connected: true,
                available_capacity: 1000.0,
                current_buy_rate: 0.15,
                current_sell_rate: 0.12,
            }))
        );
    }
}
