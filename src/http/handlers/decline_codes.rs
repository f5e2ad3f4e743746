use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::domain::retry_config::format_duration;
use crate::AppState;

/// GET /api/decline-codes - reference listing of the known decline codes
/// and their retry strategies.
pub async fn list(State(state): State<AppState>) -> impl IntoResponse {
    let (hard, soft) = state.catalog.codes_by_category();

    let mut strategies = serde_json::Map::new();
    for code in &soft {
        if let Some(strategy) = state.catalog.strategy(code) {
            let delays: Vec<String> =
                strategy.delays.iter().map(|d| format_duration(*d)).collect();
            strategies.insert(
                code.clone(),
                serde_json::json!({
                    "max_attempts": strategy.max_attempts,
                    "delays": delays,
                    "backoff_type": strategy.backoff_type,
                    "use_alt_processor": strategy.use_alt_processor,
                    "description": strategy.description,
                }),
            );
        }
    }

    Json(serde_json::json!({
        "hard_declines": hard,
        "soft_declines": soft,
        "retry_strategies": strategies,
    }))
}
