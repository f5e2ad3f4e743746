use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::AppState;

/// GET /api/webhooks/events - all recorded webhook events.
pub async fn events(State(state): State<AppState>) -> impl IntoResponse {
    let events = state.notifier.events();
    Json(serde_json::json!({
        "total": events.len(),
        "events": events,
    }))
}
