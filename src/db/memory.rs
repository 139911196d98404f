use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::store::{JobStore, StoreError};
use crate::models::job::{Job, JobStatus};

/// Process-local store for development and tests.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

fn oldest_first(mut jobs: Vec<Job>) -> Vec<Job> {
    jobs.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
    jobs
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn create(&self, job: &Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::Conflict(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn update(&self, job: &Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job.id) {
            Some(existing) => {
                *existing = job.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(job.id)),
        }
    }

    async fn find_latest_by_fingerprint(
        &self,
        fingerprint: &str,
        statuses: &[JobStatus],
    ) -> Result<Option<Job>, StoreError> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .values()
            .filter(|job| job.fingerprint == fingerprint && statuses.contains(&job.status))
            .max_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)))
            .cloned())
    }

    async fn list_by_status(&self, statuses: &[JobStatus]) -> Result<Vec<Job>, StoreError> {
        let jobs = self.jobs.read().await;
        Ok(oldest_first(
            jobs.values()
                .filter(|job| statuses.contains(&job.status))
                .cloned()
                .collect(),
        ))
    }

    async fn list_inflight(&self) -> Result<Vec<Job>, StoreError> {
        let jobs = self.jobs.read().await;
        Ok(oldest_first(
            jobs.values()
                .filter(|job| job.status == JobStatus::Processing && job.remote_handle.is_some())
                .cloned()
                .collect(),
        ))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
