use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::decline::DeclineCatalog;
use crate::domain::transaction::{
    DeclineCategory, RetryAttempt, SubmitRequest, SubmitResponse, Transaction, TransactionStatus,
    EVENT_RETRY_EXHAUSTED, EVENT_RETRY_FAILED, EVENT_RETRY_SCHEDULED, EVENT_RETRY_SUCCEEDED,
};
use crate::error::{RetryError, RetryResult};
use crate::processor::ProcessorAdapter;
use crate::store::TransactionStore;
use crate::webhook::WebhookNotifier;

/// Orchestrates the retry lifecycle: classifies submissions, builds plans,
/// executes attempts and owns every state transition. Holds its
/// collaborators behind `Arc`s; none of them reference the engine back.
pub struct RetryEngine {
    store: Arc<TransactionStore>,
    adapter: Arc<dyn ProcessorAdapter>,
    notifier: Arc<WebhookNotifier>,
    catalog: Arc<DeclineCatalog>,
}

impl RetryEngine {
    pub fn new(
        store: Arc<TransactionStore>,
        adapter: Arc<dyn ProcessorAdapter>,
        notifier: Arc<WebhookNotifier>,
        catalog: Arc<DeclineCatalog>,
    ) -> Self {
        Self { store, adapter, notifier, catalog }
    }

    /// Evaluate a failed transaction and create a retry plan if eligible.
    /// Idempotent on transaction ID: the atomic insert in the store is the
    /// only arbiter, so a duplicate submission produces no event and no
    /// overwritten plan.
    pub async fn submit(&self, req: SubmitRequest) -> RetryResult<SubmitResponse> {
        let (category, reason) = self.catalog.classify(&req.decline_code);
        let now = Utc::now();
        let created_at = parse_submitted_timestamp(req.timestamp.as_deref(), now);

        let mut tx = Transaction {
            id: req.transaction_id.clone(),
            amount: req.amount,
            currency: req.currency,
            customer_id: req.customer_id,
            merchant_id: req.merchant_id,
            original_processor: req.original_processor,
            decline_code: req.decline_code,
            decline_category: category,
            status: TransactionStatus::Rejected,
            retry_plan: None,
            retry_attempts: Vec::new(),
            next_retry_at: None,
            created_at,
            updated_at: now,
            webhook_url: req.webhook_url,
        };

        if category == DeclineCategory::Hard {
            self.store.save_if_absent(&tx)?;
            tracing::info!(
                transaction_id = %tx.id,
                decline_code = %tx.decline_code,
                reason = %reason,
                "hard decline rejected"
            );
            return Ok(SubmitResponse {
                transaction_id: tx.id,
                decline_category: category,
                status: TransactionStatus::Rejected,
                retry_eligible: false,
                retry_plan: None,
                message: format!("Hard decline: {reason}. Transaction will not be retried."),
            });
        }

        let plan = match self.catalog.build_plan(&tx.decline_code, &tx.original_processor, now) {
            Some(plan) => plan,
            None => {
                // classify() only reports soft for codes with a strategy,
                // so this arm is unreachable in practice.
                return Err(RetryError::NotRetryable {
                    id: tx.id,
                    reason: "no retry strategy for decline code".to_string(),
                });
            }
        };

        tx.status = TransactionStatus::Scheduled;
        tx.next_retry_at = plan.scheduled_times.first().copied();
        tx.retry_plan = Some(plan.clone());

        self.store.save_if_absent(&tx)?;

        self.notifier.emit(&tx, EVENT_RETRY_SCHEDULED, 0);
        tracing::info!(
            transaction_id = %tx.id,
            decline_code = %tx.decline_code,
            max_attempts = plan.max_attempts,
            first_retry_at = ?tx.next_retry_at,
            "transaction scheduled for retry"
        );

        Ok(SubmitResponse {
            transaction_id: tx.id,
            decline_category: category,
            status: TransactionStatus::Scheduled,
            retry_eligible: true,
            retry_plan: Some(plan.clone()),
            message: format!(
                "Soft decline: {reason}. Scheduled {} retry attempts.",
                plan.max_attempts
            ),
        })
    }

    /// Execute the next retry attempt for a transaction.
    ///
    /// Runs in three phases so the store lock is never held across the
    /// processor call: snapshot and eligibility check, out-of-lock adapter
    /// call, then an atomic commit that re-validates the snapshot. If a
    /// concurrent execution committed first, the re-validation fails and
    /// this attempt is discarded.
    pub async fn execute_retry(&self, tx_id: &str) -> RetryResult<()> {
        // Phase A: snapshot & eligibility.
        let tx = self.store.get(tx_id)?;

        if !tx.status.is_pending() {
            return Err(RetryError::NotRetryable {
                id: tx_id.to_string(),
                reason: format!("status is {}", tx.status.as_str()),
            });
        }
        let plan = match &tx.retry_plan {
            Some(plan) => plan.clone(),
            None => {
                return Err(RetryError::NotRetryable {
                    id: tx_id.to_string(),
                    reason: "no retry plan".to_string(),
                })
            }
        };

        let attempt_number = tx.retry_attempts.len() as u32 + 1;
        if attempt_number > plan.max_attempts {
            let finalized = self.store.update(tx_id, |tx| {
                tx.status = TransactionStatus::FailedFinal;
                tx.next_retry_at = None;
                tx.updated_at = Utc::now();
                Ok(())
            })?;
            self.notifier.emit(&finalized, EVENT_RETRY_EXHAUSTED, attempt_number - 1);
            return Err(RetryError::Exhausted(tx_id.to_string()));
        }

        let slot = (attempt_number - 1) as usize;
        let processor = plan.processors[slot].clone();
        let scheduled_at = plan.scheduled_times[slot];

        tracing::info!(
            transaction_id = %tx.id,
            attempt = attempt_number,
            processor = %processor,
            "executing retry attempt"
        );

        // Phase B: processor call outside all shared locks.
        let result = self.adapter.process(&tx.decline_code, attempt_number, &processor).await;

        let attempt = RetryAttempt {
            attempt_number,
            processor: processor.clone(),
            scheduled_at,
            executed_at: Utc::now(),
            success: result.success,
            response_code: result.response_code,
            response_message: result.response_message,
        };

        // Phase C: atomic commit with re-validation.
        let succeeded = result.success;
        let max_attempts = plan.max_attempts;
        let next_time = plan.scheduled_times.get(attempt_number as usize).copied();
        let committed = self.store.update(tx_id, move |tx| {
            if !tx.status.is_pending() {
                return Err(RetryError::NotRetryable {
                    id: tx.id.clone(),
                    reason: "concurrent state change".to_string(),
                });
            }
            if tx.retry_attempts.len() as u32 + 1 != attempt_number {
                return Err(RetryError::NotRetryable {
                    id: tx.id.clone(),
                    reason: "concurrent retry detected".to_string(),
                });
            }

            tx.retry_attempts.push(attempt);
            tx.updated_at = Utc::now();

            if succeeded {
                tx.status = TransactionStatus::Recovered;
                tx.next_retry_at = None;
            } else if attempt_number >= max_attempts {
                tx.status = TransactionStatus::FailedFinal;
                tx.next_retry_at = None;
            } else {
                tx.status = TransactionStatus::Retrying;
                tx.next_retry_at = next_time;
            }
            Ok(())
        })?;

        match committed.status {
            TransactionStatus::Recovered => {
                self.notifier.emit(&committed, EVENT_RETRY_SUCCEEDED, attempt_number);
                tracing::info!(
                    transaction_id = %committed.id,
                    attempt = attempt_number,
                    processor = %processor,
                    "transaction recovered"
                );
            }
            TransactionStatus::FailedFinal => {
                self.notifier.emit(&committed, EVENT_RETRY_EXHAUSTED, attempt_number);
                tracing::info!(
                    transaction_id = %committed.id,
                    total_attempts = attempt_number,
                    "transaction failed after all retries"
                );
            }
            _ => {
                self.notifier.emit(&committed, EVENT_RETRY_FAILED, attempt_number);
                tracing::info!(
                    transaction_id = %committed.id,
                    attempt = attempt_number,
                    "retry attempt failed, next scheduled"
                );
            }
        }

        Ok(())
    }

    /// Drive every pending transaction to a terminal state (accelerated
    /// demo mode). Returns committed attempt count and how many
    /// transactions ended up recovered.
    pub async fn process_all_pending(&self) -> (usize, usize) {
        let pending = self.store.get_pending();
        let mut attempts_made = 0;
        let mut recovered = 0;

        for tx in pending {
            loop {
                if self.execute_retry(&tx.id).await.is_err() {
                    break;
                }
                attempts_made += 1;

                let refreshed = match self.store.get(&tx.id) {
                    Ok(tx) => tx,
                    Err(_) => break,
                };
                match refreshed.status {
                    TransactionStatus::Recovered => {
                        recovered += 1;
                        break;
                    }
                    TransactionStatus::FailedFinal => break,
                    _ => {}
                }
            }
        }

        (attempts_made, recovered)
    }
}

/// A submission may carry its own RFC-3339 timestamp; malformed or missing
/// values fall back to the current instant.
fn parse_submitted_timestamp(raw: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(now)
}
