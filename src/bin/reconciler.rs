//! Standalone reconciliation poller.
//!
//! Sweeps in-flight jobs in the shared PostgreSQL store on a fixed interval,
//! for deployments that run the poller apart from the API server.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

use media_orchestrator::{
    config::{AppConfig, ComputeBackend, StorageBackend},
    db::{self, PgJobStore},
    services::{
        compute::{ComputeGateway, MockGateway, RunpodGateway},
        job_service::JobService,
        queue::DispatchQueue,
        signing::AssetSigner,
        storage::{LocalStorage, S3Storage, StorageProvider},
    },
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting reconciliation poller");

    let config = AppConfig::from_env().expect("Failed to load configuration");
    let database_url = config
        .database_url
        .as_deref()
        .expect("DATABASE_URL is required for the standalone reconciler");

    tracing::info!("Connecting to PostgreSQL");
    let pool = db::init_pool(database_url)
        .await
        .expect("Failed to connect to database");

    let storage: Arc<dyn StorageProvider> = match config.storage_backend {
        StorageBackend::Local => Arc::new(
            LocalStorage::new(
                &config.data_root,
                &config.public_base_url,
                Arc::new(AssetSigner::new(&config.asset_token_secret)),
            )
            .expect("Failed to initialize local storage"),
        ),
        StorageBackend::S3 => Arc::new(
            S3Storage::new(
                &config.s3_bucket,
                &config.s3_region,
                &config.s3_endpoint,
                &config.s3_access_key,
                &config.s3_secret_key,
                &config.s3_prefix,
            )
            .expect("Failed to initialize S3 storage"),
        ),
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
        ComputeBackend::Mock => Arc::new(MockGateway),
    };

    // Dispatch stays with the API server; this queue is never drained.
    let (queue, _receiver) = DispatchQueue::new();
    let jobs = JobService::new(
        Arc::new(PgJobStore::new(pool)),
        storage,
        compute,
        queue,
        config.orchestrator_settings(),
    )
    .expect("Failed to initialize job service");

    let interval = Duration::from_secs(config.reconcile_interval_secs.max(1));
    tracing::info!(interval_secs = interval.as_secs(), "Reconciler ready");

    loop {
        match jobs.reconcile_inflight().await {
            Ok(report) if report.checked > 0 => tracing::info!(
                checked = report.checked,
                completed = report.completed,
                failed = report.failed,
                pending = report.pending,
                errors = report.errors,
                "Reconciliation sweep finished"
            ),
            Ok(_) => tracing::trace!("No in-flight jobs"),
            Err(e) => tracing::error!(error = %e, "Reconciliation sweep failed, will retry"),
        }

        tokio::select! {
            _ = sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
                break;
            }
        }
    }
}
