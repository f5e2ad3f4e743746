use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use payments_retry::config::AppConfig;
use payments_retry::domain::decline::DeclineCatalog;
use payments_retry::domain::retry_config::{apply_strategy_overrides, load_retry_config};
use payments_retry::engine::RetryEngine;
use payments_retry::http::handlers::{admin, analytics, decline_codes, transactions, webhooks};
use payments_retry::http::middleware::{cors, request_log};
use payments_retry::processor::simulator::ProcessorSimulator;
use payments_retry::scheduler::RetryScheduler;
use payments_retry::store::TransactionStore;
use payments_retry::webhook::WebhookNotifier;
use payments_retry::AppState;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env();

    let catalog = Arc::new(build_catalog(cfg.retry_config_path.as_deref()));
    let store = Arc::new(TransactionStore::new());
    let notifier = Arc::new(WebhookNotifier::new());

    let simulator_seed = cfg.simulator_seed.unwrap_or_else(|| {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x5eed)
    });
    let adapter = Arc::new(ProcessorSimulator::new(Arc::clone(&catalog), simulator_seed));

    let engine = Arc::new(RetryEngine::new(
        Arc::clone(&store),
        adapter,
        Arc::clone(&notifier),
        Arc::clone(&catalog),
    ));

    let shutdown = CancellationToken::new();
    let scheduler = RetryScheduler::new(
        Arc::clone(&engine),
        Arc::clone(&store),
        Duration::from_secs(cfg.scheduler_interval_secs),
    );
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown.clone()));

    let state = AppState { engine, store, notifier, catalog };

    let app = Router::new()
        .route("/health", get(transactions::health))
        .route("/api/transactions", post(transactions::submit).get(transactions::list))
        .route("/api/transactions/:id", get(transactions::get))
        .route("/api/transactions/:id/retry", post(transactions::retry))
        .route("/api/retry/process-all", post(transactions::process_all))
        .route("/api/analytics/overview", get(analytics::overview))
        .route("/api/analytics/by-decline", get(analytics::by_decline))
        .route("/api/analytics/by-attempt", get(analytics::by_attempt))
        .route("/api/decline-codes", get(decline_codes::list))
        .route("/api/webhooks/events", get(webhooks::events))
        .route("/api/seed", post(admin::seed))
        .route("/api/reset", post(admin::reset))
        .layer(axum::middleware::from_fn(request_log))
        .layer(axum::middleware::from_fn(cors))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!(bind_addr = %cfg.bind_addr, "payments-retry engine starting");

    let shutdown_signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
            shutdown_signal.cancel();
        })
        .await?;

    // The scheduler observes the cancelled token; wait for it to drain.
    shutdown.cancel();
    let _ = scheduler_handle.await;
    Ok(())
}

fn build_catalog(override_path: Option<&str>) -> DeclineCatalog {
    let catalog = DeclineCatalog::with_defaults();
    let Some(path) = override_path else {
        return catalog;
    };

    match load_retry_config(path) {
        Ok(file) => {
            // Overrides land on a scratch copy so a bad file leaves the
            // defaults fully intact.
            let mut candidate = catalog.clone();
            match apply_strategy_overrides(&mut candidate, &file.strategies) {
                Ok(()) => {
                    tracing::info!(path, overrides = file.strategies.len(), "retry config applied");
                    candidate
                }
                Err(err) => {
                    tracing::error!(path, error = %err, "retry config rejected, using defaults");
                    catalog
                }
            }
        }
        Err(err) => {
            tracing::error!(path, error = %err, "retry config unreadable, using defaults");
            catalog
        }
    }
}
