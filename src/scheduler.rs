use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::engine::RetryEngine;
use crate::store::TransactionStore;

/// Background loop that wakes on a fixed tick, collects due retries and
/// asks the engine to execute them. Holds no state of its own; safe to
/// restart. Per-transaction failures are logged and never stop the loop.
pub struct RetryScheduler {
    engine: Arc<RetryEngine>,
    store: Arc<TransactionStore>,
    interval: Duration,
}

impl RetryScheduler {
    pub fn new(engine: Arc<RetryEngine>, store: Arc<TransactionStore>, interval: Duration) -> Self {
        Self { engine, store, interval }
    }

    /// Run until the token is cancelled. Exits promptly once the current
    /// tick's work completes.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(interval = ?self.interval, "retry scheduler started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("retry scheduler stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.process_due_retries().await;
                }
            }
        }
    }

    async fn process_due_retries(&self) {
        let due = self.store.get_due(Utc::now());
        for tx in due {
            tracing::info!(
                transaction_id = %tx.id,
                scheduled_for = ?tx.next_retry_at,
                "scheduler executing due retry"
            );
            if let Err(err) = self.engine.execute_retry(&tx.id).await {
                tracing::error!(
                    transaction_id = %tx.id,
                    error = %err,
                    "scheduler retry failed"
                );
            }
        }
    }
}
