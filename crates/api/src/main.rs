use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use atelier_adapters::{AdapterRegistry, ModelServerConfig};
use atelier_broker::{ChannelQueue, JobBroker, MemoryStatusStore};
use atelier_events::EventBus;
use atelier_pipeline::{ExecutorConfig, JobExecutor, ModelCache};
use atelier_storage::StorageConfig;
use atelier_worker::{Worker, WorkerConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atelier_api::background;
use atelier_api::config::ServerConfig;
use atelier_api::router::build_app_router;
use atelier_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "atelier_api=debug,atelier_worker=debug,atelier_pipeline=debug,tower_http=debug"
                    .into()
            }),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Model catalog and adapters ---
    let catalog = Arc::new(config.load_catalog().expect("Failed to load model catalog"));
    let model_server = ModelServerConfig::from_env();
    let registry = AdapterRegistry::with_defaults(&model_server);
    registry
        .validate_catalog(&catalog)
        .expect("Model catalog references an unsupported adapter");
    tracing::info!(models = catalog.len(), "Model catalog loaded");

    let cache = Arc::new(ModelCache::new(Arc::clone(&catalog), registry));

    // --- Storage ---
    let storage_config = StorageConfig::from_env();
    let storage = storage_config
        .build()
        .await
        .expect("Failed to initialise storage backend");
    tracing::info!(backend = storage.backend_name(), "Storage gateway ready");

    // --- Executor ---
    let executor = Arc::new(JobExecutor::new(
        Arc::clone(&cache),
        storage,
        ExecutorConfig::from_env(),
    ));

    // --- Broker ---
    let event_bus = Arc::new(EventBus::default());
    let broker = JobBroker::new(
        Arc::new(MemoryStatusStore::new()),
        Arc::new(ChannelQueue::new(config.queue_capacity)),
        Arc::clone(&event_bus),
    );

    let event_log_handle = tokio::spawn(background::event_log::run(event_bus.subscribe()));

    // --- Worker ---
    let worker_cancel = CancellationToken::new();
    let worker = Worker::new(broker.worker_channel(), executor, WorkerConfig::from_env());
    let worker_handle = tokio::spawn({
        let cancel = worker_cancel.clone();
        async move { worker.run(cancel).await }
    });

    // --- Retention ---
    let retention_cancel = CancellationToken::new();
    let retention_handle = tokio::spawn(background::job_retention::run(
        broker.clone(),
        config.retention_hours,
        retention_cancel.clone(),
    ));

    tracing::info!("Background services started (worker, event log, job retention)");

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        broker,
        cache,
        event_bus: Arc::clone(&event_bus),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Running jobs get the grace period; queued ones are failed by the worker.
    worker_cancel.cancel();
    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(shutdown_timeout, worker_handle).await.is_err() {
        tracing::warn!(
            timeout_secs = config.shutdown_timeout_secs,
            "Worker did not drain in time"
        );
    } else {
        tracing::info!("Worker stopped");
    }

    retention_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), retention_handle).await;

    // The event log ends once every bus handle is gone.
    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), event_log_handle).await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C, starting graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
