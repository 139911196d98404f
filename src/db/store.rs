use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::queries;
use crate::models::job::{Job, JobStatus};

/// Durable record of job state.
///
/// Every mutation is a whole-row read-modify-write of a single job.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError>;

    async fn create(&self, job: &Job) -> Result<(), StoreError>;

    async fn update(&self, job: &Job) -> Result<(), StoreError>;

    /// Newest job with `fingerprint` whose status is in `statuses`,
    /// ties on creation time broken by the larger id.
    async fn find_latest_by_fingerprint(
        &self,
        fingerprint: &str,
        statuses: &[JobStatus],
    ) -> Result<Option<Job>, StoreError>;

    /// Jobs in any of `statuses`, oldest first.
    async fn list_by_status(&self, statuses: &[JobStatus]) -> Result<Vec<Job>, StoreError>;

    /// Processing jobs that hold a remote compute handle, oldest first.
    async fn list_inflight(&self) -> Result<Vec<Job>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        queries::get_job(&self.pool, id).await
    }

    async fn create(&self, job: &Job) -> Result<(), StoreError> {
        queries::insert_job(&self.pool, job).await
    }

    async fn update(&self, job: &Job) -> Result<(), StoreError> {
        queries::update_job(&self.pool, job).await
    }

    async fn find_latest_by_fingerprint(
        &self,
        fingerprint: &str,
        statuses: &[JobStatus],
    ) -> Result<Option<Job>, StoreError> {
        queries::find_latest_by_fingerprint(&self.pool, fingerprint, statuses).await
    }

    async fn list_by_status(&self, statuses: &[JobStatus]) -> Result<Vec<Job>, StoreError> {
        queries::list_jobs_by_status(&self.pool, statuses).await
    }

    async fn list_inflight(&self) -> Result<Vec<Job>, StoreError> {
        queries::list_inflight_jobs(&self.pool).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("job {0} already exists")]
    Conflict(Uuid),

    #[error("corrupt job row: {0}")]
    Corrupt(String),
}
