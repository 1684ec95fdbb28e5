//! REST API over the demand-response core.
//!
//! Endpoints:
//! - `POST /load-shed` and `POST /load-shift` run a planning pass
//! - `POST /grid/buy`, `POST /grid/sell` open grid transactions
//! - `PUT /grid/transaction/status` settles a pending transaction
//! - `GET /grid/status` returns the current grid snapshot

mod handlers;
mod types;

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use tracing::info;

use crate::service::Services;

pub use types::{ErrorResponse, StatusUpdateRequest};

/// Builds the axum router with all API routes.
pub fn router(state: Arc<Services>) -> Router {
    Router::new()
        .route("/load-shed", post(handlers::load_shed))
        .route("/load-shift", post(handlers::load_shift))
        .route("/grid/buy", post(handlers::grid_buy))
        .route("/grid/sell", post(handlers::grid_sell))
        .route("/grid/transaction/status", put(handlers::update_transaction_status))
        .route("/grid/status", get(handlers::grid_status))
        .with_state(state)
}

/// Binds to `addr` and serves the API until `shutdown` resolves.
///
/// # Errors
///
/// Returns an `io::Error` if the listener cannot bind or the server fails.
pub async fn serve(
    state: Arc<Services>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
