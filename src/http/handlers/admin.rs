use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::seed::generate_transactions;
use crate::AppState;

const SEED_COUNT: usize = 200;

/// POST /api/seed - reset state, generate a demo dataset and process every
/// retry in accelerated mode.
pub async fn seed(State(state): State<AppState>) -> impl IntoResponse {
    state.store.clear();
    state.notifier.clear();

    let seed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x5eed);

    let mut submitted = 0;
    for request in generate_transactions(SEED_COUNT, seed) {
        let transaction_id = request.transaction_id.clone();
        match state.engine.submit(request).await {
            Ok(_) => submitted += 1,
            Err(err) => {
                tracing::error!(transaction_id = %transaction_id, error = %err, "seed submit failed");
            }
        }
    }

    let (attempts_made, recovered) = state.engine.process_all_pending().await;

    Json(serde_json::json!({
        "message": format!("Seeded {submitted} transactions and processed retries"),
        "total_seeded": submitted,
        "retry_attempts_made": attempts_made,
        "transactions_recovered": recovered,
    }))
}

/// POST /api/reset - drop all transactions and recorded events.
pub async fn reset(State(state): State<AppState>) -> impl IntoResponse {
    state.store.clear();
    state.notifier.clear();
    Json(serde_json::json!({ "message": "All data cleared" }))
}
