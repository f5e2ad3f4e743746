use std::collections::BTreeMap;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::domain::transaction::{
    AnalyticsOverview, AttemptStats, DeclineCategory, DeclineReasonStats, Transaction,
    TransactionStatus,
};
use crate::AppState;

/// GET /api/analytics/overview - overall recovery metrics.
pub async fn overview(State(state): State<AppState>) -> impl IntoResponse {
    Json(compute_overview(&state.store.get_all()))
}

/// GET /api/analytics/by-decline - recovery rate per decline code.
pub async fn by_decline(State(state): State<AppState>) -> impl IntoResponse {
    let (soft, hard) = compute_by_decline(&state.store.get_all());
    Json(serde_json::json!({
        "soft_declines": soft,
        "hard_declines": hard,
    }))
}

/// GET /api/analytics/by-attempt - success rate per attempt number.
pub async fn by_attempt(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "by_attempt": compute_by_attempt(&state.store.get_all()) }))
}

fn compute_overview(all: &[Transaction]) -> AnalyticsOverview {
    let mut overview = AnalyticsOverview {
        total_transactions: all.len(),
        ..AnalyticsOverview::default()
    };

    for tx in all {
        match tx.decline_category {
            DeclineCategory::Hard => overview.hard_declines += 1,
            DeclineCategory::Soft => overview.soft_declines += 1,
        }
        match tx.status {
            TransactionStatus::Recovered => overview.recovered += 1,
            TransactionStatus::FailedFinal => overview.failed_final += 1,
            TransactionStatus::Scheduled | TransactionStatus::Retrying => {
                overview.pending_retry += 1
            }
            TransactionStatus::Rejected => {}
        }
        overview.total_retry_attempts += tx.retry_attempts.len();
        overview.successful_attempts += tx.retry_attempts.iter().filter(|a| a.success).count();
    }

    if overview.soft_declines > 0 {
        overview.recovery_rate_pct =
            overview.recovered as f64 / overview.soft_declines as f64 * 100.0;
    }
    if overview.total_retry_attempts > 0 {
        overview.efficiency_rate_pct =
            overview.successful_attempts as f64 / overview.total_retry_attempts as f64 * 100.0;
    }
    overview
}

fn compute_by_decline(all: &[Transaction]) -> (Vec<DeclineReasonStats>, Vec<DeclineReasonStats>) {
    let mut stats_map: BTreeMap<String, DeclineReasonStats> = BTreeMap::new();

    for tx in all {
        let stats = stats_map.entry(tx.decline_code.clone()).or_insert_with(|| {
            DeclineReasonStats {
                decline_code: tx.decline_code.clone(),
                category: match tx.decline_category {
                    DeclineCategory::Hard => "hard".to_string(),
                    DeclineCategory::Soft => "soft".to_string(),
                },
                ..DeclineReasonStats::default()
            }
        });

        stats.total += 1;
        match tx.status {
            TransactionStatus::Recovered => {
                stats.recovered += 1;
                if let Some(winning) = tx.retry_attempts.iter().find(|a| a.success) {
                    stats.avg_attempts_to_recover += winning.attempt_number as f64;
                }
            }
            TransactionStatus::FailedFinal | TransactionStatus::Rejected => stats.failed += 1,
            TransactionStatus::Scheduled | TransactionStatus::Retrying => stats.pending += 1,
        }
    }

    let mut soft = Vec::new();
    let mut hard = Vec::new();
    for (_, mut stats) in stats_map {
        if stats.recovered > 0 {
            stats.avg_attempts_to_recover /= stats.recovered as f64;
        }
        let completed = stats.recovered + stats.failed;
        if completed > 0 && stats.category == "soft" {
            stats.recovery_rate_pct = stats.recovered as f64 / completed as f64 * 100.0;
        }
        if stats.category == "soft" {
            soft.push(stats);
        } else {
            hard.push(stats);
        }
    }

    soft.sort_by(|a, b| {
        b.recovery_rate_pct
            .partial_cmp(&a.recovery_rate_pct)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hard.sort_by(|a, b| b.total.cmp(&a.total));
    (soft, hard)
}

fn compute_by_attempt(all: &[Transaction]) -> Vec<AttemptStats> {
    let mut attempt_map: BTreeMap<u32, AttemptStats> = BTreeMap::new();

    for tx in all {
        for attempt in &tx.retry_attempts {
            let stats = attempt_map.entry(attempt.attempt_number).or_insert_with(|| AttemptStats {
                attempt_number: attempt.attempt_number,
                ..AttemptStats::default()
            });
            stats.total_attempts += 1;
            if attempt.success {
                stats.successes += 1;
            }
        }
    }

    attempt_map
        .into_values()
        .map(|mut stats| {
            if stats.total_attempts > 0 {
                stats.success_rate_pct =
                    stats.successes as f64 / stats.total_attempts as f64 * 100.0;
            }
            stats
        })
        .collect()
}
