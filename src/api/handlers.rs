//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use tracing::warn;

use super::types::{ErrorResponse, StatusUpdateRequest};
use crate::grid::{GridOrder, GridStatusSnapshot, TransactionResult};
use crate::planning::{LoadShiftingResult, ShiftRequest};
use crate::service::Services;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

fn internal(error: impl ToString) -> (StatusCode, Json<ErrorResponse>) {
    let error = error.to_string();
    warn!(%error, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(error)),
    )
}

/// Runs a shedding pass.
///
/// `POST /load-shed` with `{"targetReductionKW": 3}` → 200 + `LoadSheddingResult`
/// Missing, non-numeric or non-positive target → 400 + `ErrorResponse`
pub async fn load_shed(
    State(state): State<Arc<Services>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let target = body
        .ok()
        .and_then(|Json(v)| v.get("targetReductionKW").and_then(Value::as_f64))
        .filter(|t| t.is_finite() && *t > 0.0);
    let Some(target) = target else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Invalid targetReductionKW")),
        )
            .into_response();
    };

    match state.shedder.shed(target).await {
        Ok(result) => Json(result).into_response(),
        Err(err) => internal(err).into_response(),
    }
}

/// Runs a shifting pass.
///
/// `POST /load-shift` with `{"deviceTypes": [...], "delayMinutes": 30}` → 200 + `LoadShiftingResult`
pub async fn load_shift(
    State(state): State<Arc<Services>>,
    body: Result<Json<ShiftRequest>, JsonRejection>,
) -> ApiResult<LoadShiftingResult> {
    let Json(request) = body.map_err(|e| internal(e.body_text()))?;
    state
        .shifter
        .shift(&request)
        .await
        .map(Json)
        .map_err(internal)
}

/// `POST /grid/buy` → 200 + `TransactionResult`
pub async fn grid_buy(
    State(state): State<Arc<Services>>,
    body: Result<Json<GridOrder>, JsonRejection>,
) -> ApiResult<TransactionResult> {
    let Json(order) = body.map_err(|e| internal(e.body_text()))?;
    let result = state
        .ledger
        .buy(order.amount, order.price, order.device_ids)
        .await;
    Ok(Json(result))
}

/// `POST /grid/sell` → 200 + `TransactionResult`
pub async fn grid_sell(
    State(state): State<Arc<Services>>,
    body: Result<Json<GridOrder>, JsonRejection>,
) -> ApiResult<TransactionResult> {
    let Json(order) = body.map_err(|e| internal(e.body_text()))?;
    let result = state
        .ledger
        .sell(order.amount, order.price, order.device_ids)
        .await;
    Ok(Json(result))
}

/// `PUT /grid/transaction/status` → 200 + `TransactionResult`
pub async fn update_transaction_status(
    State(state): State<Arc<Services>>,
    body: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> ApiResult<TransactionResult> {
    let Json(request) = body.map_err(|e| internal(e.body_text()))?;
    let result = state
        .ledger
        .update_status(&request.transaction_id, request.status)
        .await;
    Ok(Json(result))
}

/// `GET /grid/status` → 200 + `GridStatusSnapshot`
pub async fn grid_status(State(state): State<Arc<Services>>) -> ApiResult<GridStatusSnapshot> {
    state.ledger.status().await.map(Json).map_err(internal)
}
