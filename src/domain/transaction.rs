use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclineCategory {
    Hard,
    Soft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Retry plan created, waiting for the first attempt.
    Scheduled,
    /// At least one retry attempted, more slots remain.
    Retrying,
    /// A retry attempt succeeded.
    Recovered,
    /// All retry attempts exhausted, none succeeded.
    FailedFinal,
    /// Hard decline, will not retry.
    Rejected,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Scheduled => "scheduled",
            TransactionStatus::Retrying => "retrying",
            TransactionStatus::Recovered => "recovered",
            TransactionStatus::FailedFinal => "failed_final",
            TransactionStatus::Rejected => "rejected",
        }
    }

    /// Terminal statuses permit no further mutation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Recovered | TransactionStatus::FailedFinal | TransactionStatus::Rejected
        )
    }

    /// Pending statuses are eligible for the scheduler to pick up.
    pub fn is_pending(&self) -> bool {
        matches!(self, TransactionStatus::Scheduled | TransactionStatus::Retrying)
    }
}

pub const EVENT_RETRY_SCHEDULED: &str = "retry.scheduled";
pub const EVENT_RETRY_SUCCEEDED: &str = "retry.succeeded";
pub const EVENT_RETRY_FAILED: &str = "retry.failed";
pub const EVENT_RETRY_EXHAUSTED: &str = "retry.exhausted";

/// A failed payment transaction submitted for retry evaluation. The store
/// owns the canonical copy; every external view is an owned clone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub amount: f64,
    pub currency: String,
    pub customer_id: String,
    pub merchant_id: String,
    pub original_processor: String,
    pub decline_code: String,
    pub decline_category: DeclineCategory,
    pub status: TransactionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_plan: Option<RetryPlan>,
    pub retry_attempts: Vec<RetryAttempt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

/// The scheduled retry strategy for a soft-declined transaction, produced
/// once at submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPlan {
    pub max_attempts: u32,
    pub strategy: String,
    pub decline_code: String,
    pub scheduled_times: Vec<DateTime<Utc>>,
    pub processors: Vec<String>,
}

/// The result of a single executed retry attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryAttempt {
    pub attempt_number: u32,
    pub processor: String,
    pub scheduled_at: DateTime<Utc>,
    pub executed_at: DateTime<Utc>,
    pub success: bool,
    pub response_code: String,
    pub response_message: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubmitRequest {
    pub transaction_id: String,
    pub amount: f64,
    pub currency: String,
    #[serde(default)]
    pub customer_id: String,
    #[serde(default)]
    pub merchant_id: String,
    #[serde(default)]
    pub original_processor: String,
    pub decline_code: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitResponse {
    pub transaction_id: String,
    pub decline_category: DeclineCategory,
    pub status: TransactionStatus,
    pub retry_eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_plan: Option<RetryPlan>,
    pub message: String,
}

/// A merchant-facing notification about one retry state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub event_type: String,
    pub transaction_id: String,
    pub status: TransactionStatus,
    pub attempt_number: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalyticsOverview {
    pub total_transactions: usize,
    pub hard_declines: usize,
    pub soft_declines: usize,
    pub recovered: usize,
    pub failed_final: usize,
    pub pending_retry: usize,
    pub recovery_rate_pct: f64,
    pub total_retry_attempts: usize,
    pub successful_attempts: usize,
    pub efficiency_rate_pct: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeclineReasonStats {
    pub decline_code: String,
    pub category: String,
    pub total: usize,
    pub recovered: usize,
    pub failed: usize,
    pub pending: usize,
    pub recovery_rate_pct: f64,
    pub avg_attempts_to_recover: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AttemptStats {
    pub attempt_number: u32,
    pub total_attempts: usize,
    pub successes: usize,
    pub success_rate_pct: f64,
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorPayload,
}

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}
