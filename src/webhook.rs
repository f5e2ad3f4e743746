use std::sync::RwLock;
use std::time::Duration;

use chrono::Utc;

use crate::domain::transaction::{Transaction, WebhookEvent};

/// Records every retry state transition and notifies merchants that asked
/// for callbacks. Recording is synchronous so the event ledger is
/// authoritative; delivery happens on a spawned task and never blocks the
/// engine.
pub struct WebhookNotifier {
    events: RwLock<Vec<WebhookEvent>>,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Record one event and, when the transaction carries a webhook URL,
    /// dispatch the POST in the background.
    pub fn emit(&self, tx: &Transaction, event_type: &str, attempt_number: u32) {
        let event = WebhookEvent {
            event_type: event_type.to_string(),
            transaction_id: tx.id.clone(),
            status: tx.status,
            attempt_number,
            timestamp: Utc::now(),
        };

        self.events
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());

        match &tx.webhook_url {
            Some(url) if !url.is_empty() => {
                let client = self.client.clone();
                let url = url.clone();
                tokio::spawn(async move {
                    deliver(client, url, event).await;
                });
            }
            _ => {
                tracing::debug!(
                    event_type,
                    transaction_id = %tx.id,
                    "webhook event recorded (no URL configured)"
                );
            }
        }
    }

    pub fn events(&self) -> Vec<WebhookEvent> {
        self.events.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn events_for_transaction(&self, tx_id: &str) -> Vec<WebhookEvent> {
        self.events
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| e.transaction_id == tx_id)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.events.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl Default for WebhookNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// POST the event to the merchant endpoint, retrying twice with doubling
/// backoff on transport errors and 5xx responses.
async fn deliver(client: reqwest::Client, url: String, event: WebhookEvent) {
    let mut attempt = 0_u8;
    let mut backoff_ms = 150_u64;
    loop {
        let retry = match client.post(&url).json(&event).send().await {
            Ok(resp) => {
                if resp.status().is_server_error() {
                    true
                } else {
                    tracing::info!(
                        url = %url,
                        event_type = %event.event_type,
                        transaction_id = %event.transaction_id,
                        status_code = resp.status().as_u16(),
                        "webhook delivered"
                    );
                    false
                }
            }
            Err(err) => {
                tracing::warn!(
                    url = %url,
                    event_type = %event.event_type,
                    transaction_id = %event.transaction_id,
                    error = %err,
                    "webhook delivery failed"
                );
                true
            }
        };

        if !retry || attempt >= 2 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        backoff_ms *= 2;
        attempt += 1;
    }
}
