//! Process entry point: loads configuration, initializes logging, and runs
//! the legacy synchronous HTTP surface and the worker pipeline side by side
//! on one `tokio` multi-threaded runtime.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use voprf_token_service::config::Settings;
use voprf_token_service::http::{build_router, install_recorder, metrics_router, AppState};
use voprf_token_service::issuer::{rotate_due_issuers, InMemoryIssuerRegistry, IssuerCache, IssuerRegistry};
use voprf_token_service::ledger::{InMemoryLedger, SpentTokenFilter};
use voprf_token_service::telemetry::{self, LogFormat};
use voprf_token_service::worker::{spawn_workers, RequestSet, ResultSet, WorkerContext};

const WORKER_COUNT: usize = 4;
const REQUEST_QUEUE_DEPTH: usize = 1024;
const SPENT_TOKEN_FILTER_SLOTS: usize = 1_000_000;
const SPENT_TOKEN_FILTER_HASHES: usize = 7;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init(LogFormat::Pretty);
    let settings = Settings::load()?;
    info!(listen_port = settings.listen_port, metrics_port = settings.metrics_port, "starting");

    let recorder = install_recorder();
    let registry: Arc<dyn IssuerRegistry> = Arc::new(InMemoryIssuerRegistry::new());
    let ledger: Arc<dyn voprf_token_service::ledger::Ledger> = Arc::new(InMemoryLedger::new());
    let cache = Arc::new(IssuerCache::new(settings.caching.ttl()));
    let filter: Option<Arc<SpentTokenFilter>> = settings
        .caching
        .enabled
        .then(|| Arc::new(SpentTokenFilter::new(SPENT_TOKEN_FILTER_SLOTS, SPENT_TOKEN_FILTER_HASHES)));

    let app_state = Arc::new(AppState {
        registry: registry.clone(),
        ledger: ledger.clone(),
        cache: cache.clone(),
        filter: filter.clone(),
        tolerable_equivalence: vec![],
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (request_tx, request_rx) = mpsc::channel::<RequestSet>(REQUEST_QUEUE_DEPTH);
    let (result_tx, mut result_rx) = mpsc::channel::<ResultSet>(REQUEST_QUEUE_DEPTH);
    let (requeue_tx, mut requeue_rx) = mpsc::channel::<(RequestSet, Duration)>(REQUEST_QUEUE_DEPTH);

    let worker_ctx = Arc::new(WorkerContext {
        registry: registry.clone(),
        ledger,
        cache: cache.clone(),
        filter: filter.clone(),
        tolerable_equivalence: vec![],
    });
    let workers = spawn_workers(
        WORKER_COUNT,
        worker_ctx,
        request_rx,
        result_tx,
        requeue_tx.clone(),
        shutdown_rx.clone(),
    );

    // Results are logged rather than published to a message bus; wiring a
    // real stream transport is the deployment's responsibility (§1).
    tokio::spawn(async move {
        while let Some(result) = result_rx.recv().await {
            info!(request_id = %result.request_id, "worker result emitted");
        }
    });

    // Requeues after backoff are resubmitted to the same in-process queue;
    // a production deployment instead redelivers via its stream transport.
    let requeue_input = request_tx.clone();
    tokio::spawn(async move {
        while let Some((request_set, after)) = requeue_rx.recv().await {
            let resubmit = requeue_input.clone();
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                let _ = resubmit.send(request_set).await;
            });
        }
    });

    let rotation_registry = registry.clone();
    let rotation_cache = cache.clone();
    let mut rotation_shutdown = shutdown_rx.clone();
    let rotation_interval = settings.rotation_interval();
    let default_days_before_expiry = settings.default_days_before_expiry;
    let default_issuer_valid_days = settings.default_issuer_valid_days;
    let v3_buffer = settings.v3_buffer;
    let v3_key_duration = settings.v3_key_duration();
    let rotation_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(rotation_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = rotation_shutdown.changed() => break,
                _ = ticker.tick() => {
                    let outcome = rotate_due_issuers(
                        rotation_registry.as_ref(),
                        rotation_cache.as_ref(),
                        time::OffsetDateTime::now_utc(),
                        default_days_before_expiry,
                        default_issuer_valid_days,
                        v3_buffer,
                        v3_key_duration,
                    )
                    .await;
                    match outcome {
                        Ok(outcomes) if !outcomes.is_empty() => {
                            info!(count = outcomes.len(), "rotation tick completed");
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "rotation tick failed"),
                    }
                }
            }
        }
    });

    let http_listener = tokio::net::TcpListener::bind(("0.0.0.0", settings.listen_port)).await?;
    let metrics_listener = tokio::net::TcpListener::bind(("0.0.0.0", settings.metrics_port)).await?;

    let http_server = axum::serve(http_listener, build_router(app_state));
    let metrics_server = axum::serve(metrics_listener, metrics_router(recorder));

    tokio::select! {
        res = http_server => {
            if let Err(e) = res {
                warn!(error = %e, "http server exited");
            }
        }
        res = metrics_server => {
            if let Err(e) = res {
                warn!(error = %e, "metrics server exited");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
    }

    let _ = shutdown_tx.send(true);
    for worker in workers {
        let _ = worker.await;
    }
    let _ = rotation_task.await;
    Ok(())
}
