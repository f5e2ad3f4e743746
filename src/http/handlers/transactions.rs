use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::domain::transaction::SubmitRequest;
use crate::http::error::{bad_request, error_response};
use crate::AppState;

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok", "service": "payments-retry" }))
}

/// POST /api/transactions - submit a failed transaction for retry evaluation.
pub async fn submit(
    State(state): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> impl IntoResponse {
    if req.transaction_id.is_empty() {
        return bad_request("MISSING_TRANSACTION_ID", "transaction_id is required").into_response();
    }
    if req.decline_code.is_empty() {
        return bad_request("MISSING_DECLINE_CODE", "decline_code is required").into_response();
    }
    if req.amount <= 0.0 {
        return bad_request("INVALID_AMOUNT", "amount must be positive").into_response();
    }
    if req.currency.is_empty() {
        return bad_request("MISSING_CURRENCY", "currency is required").into_response();
    }

    match state.engine.submit(req).await {
        Ok(resp) => (StatusCode::CREATED, Json(resp)).into_response(),
        Err(err) => error_response(err).into_response(),
    }
}

/// GET /api/transactions/:id - transaction status, retry history and its
/// webhook events.
pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.store.get(&id) {
        Ok(tx) => {
            let events = state.notifier.events_for_transaction(&tx.id);
            Json(serde_json::json!({
                "transaction": tx,
                "webhook_events": events,
            }))
            .into_response()
        }
        Err(err) => error_response(err).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
}

/// GET /api/transactions - list all transactions, optionally by status.
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    let transactions = state.store.list(params.status.as_deref());
    Json(serde_json::json!({
        "total": transactions.len(),
        "transactions": transactions,
    }))
}

/// POST /api/transactions/:id/retry - manually trigger the next attempt.
pub async fn retry(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    if let Err(err) = state.engine.execute_retry(&id).await {
        return error_response(err).into_response();
    }
    match state.store.get(&id) {
        Ok(tx) => Json(tx).into_response(),
        Err(err) => error_response(err).into_response(),
    }
}

/// POST /api/retry/process-all - drive every pending retry to completion
/// (accelerated demo mode).
pub async fn process_all(State(state): State<AppState>) -> impl IntoResponse {
    let (attempts_made, recovered) = state.engine.process_all_pending().await;
    Json(serde_json::json!({
        "message": "All pending retries processed",
        "total_attempts_made": attempts_made,
        "transactions_recovered": recovered,
    }))
}
