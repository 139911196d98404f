use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use media_orchestrator::{
    app_state::AppState,
    config::{AppConfig, ComputeBackend, StorageBackend},
    db::{self, memory::InMemoryJobStore, store::JobStore, PgJobStore},
    routes,
    services::{
        compute::{ComputeGateway, MockGateway, RunpodGateway},
        job_service::JobService,
        queue::{DispatchQueue, DispatchWorker},
        signing::AssetSigner,
        storage::{LocalStorage, S3Storage, StorageProvider},
    },
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing media orchestrator");

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe_metrics();

    let store: Arc<dyn JobStore> = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to PostgreSQL database");
            let pool = db::init_pool(database_url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Running database migrations");
            db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            Arc::new(PgJobStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, jobs are kept in memory only");
            Arc::new(InMemoryJobStore::new())
        }
    };

    let signer = Arc::new(AssetSigner::new(&config.asset_token_secret));
    let (storage, assets): (Arc<dyn StorageProvider>, Option<Arc<LocalStorage>>) =
        match config.storage_backend {
            StorageBackend::Local => {
                tracing::info!(data_root = %config.data_root.display(), "Using local storage");
                let local = Arc::new(
                    LocalStorage::new(&config.data_root, &config.public_base_url, signer)
                        .expect("Failed to initialize local storage"),
                );
                (local.clone(), Some(local))
            }
            StorageBackend::S3 => {
                tracing::info!(bucket = %config.s3_bucket, "Using S3 storage");
                let s3 = S3Storage::new(
                    &config.s3_bucket,
                    &config.s3_region,
                    &config.s3_endpoint,
                    &config.s3_access_key,
                    &config.s3_secret_key,
                    &config.s3_prefix,
                )
                .expect("Failed to initialize S3 storage");
                (Arc::new(s3), None)
            }
        };

    let compute: Arc<dyn ComputeGateway> = match config.compute_backend {
        ComputeBackend::Runpod => Arc::new(
            RunpodGateway::new(
                &config.runpod_api_base,
                &config.runpod_endpoint_id,
                &config.runpod_api_key,
                config.compute_timeout(),
            )
            .expect("Failed to initialize RunPod gateway"),
        ),
        ComputeBackend::Mock => {
            tracing::warn!("Using mock compute backend");
            Arc::new(MockGateway)
        }
    };

    let settings = config.orchestrator_settings();
    if settings.callback_url.is_none() {
        tracing::warn!(
            public_base_url = %config.public_base_url,
            "Public base URL is not reachable remotely, completion relies on status polling"
        );
    }

    let (queue, receiver) = DispatchQueue::new();
    let jobs = Arc::new(
        JobService::new(store.clone(), storage, compute, queue, settings)
            .expect("Failed to initialize job service"),
    );

    if config.requeue_on_startup {
        match jobs.requeue_pending().await {
            Ok(0) => {}
            Ok(count) => tracing::info!(count, "Re-enqueued pending jobs"),
            Err(e) => tracing::error!(error = %e, "Failed to re-enqueue pending jobs"),
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = DispatchWorker::new(jobs.clone(), receiver, config.dispatch_idle_timeout());
    let worker_handle = tokio::spawn(worker.run(shutdown_rx));

    let state = AppState::new(jobs, store, assets, &config.callback_secret);

    // Room for every input at the upload ceiling plus form overhead
    let body_limit = (config.max_upload_mb as usize)
        .saturating_mul(1024 * 1024)
        .saturating_mul(3)
        .saturating_add(1024 * 1024);

    let app = routes::router(state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(body_limit));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    let _ = shutdown_tx.send(true);
    if let Err(e) = worker_handle.await {
        tracing::error!(error = %e, "Dispatch worker panicked");
    }
    tracing::info!("Shutdown complete");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
