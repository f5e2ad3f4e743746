use std::sync::Arc;

pub mod config;
pub mod domain {
    pub mod decline;
    pub mod retry_config;
    pub mod transaction;
}
pub mod engine;
pub mod error;
pub mod http {
    pub mod error;
    pub mod handlers {
        pub mod admin;
        pub mod analytics;
        pub mod decline_codes;
        pub mod transactions;
        pub mod webhooks;
    }
    pub mod middleware;
}
pub mod processor;
pub mod scheduler;
pub mod seed;
pub mod store;
pub mod webhook;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<engine::RetryEngine>,
    pub store: Arc<store::TransactionStore>,
    pub notifier: Arc<webhook::WebhookNotifier>,
    pub catalog: Arc<domain::decline::DeclineCatalog>,
}
