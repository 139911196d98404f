//! Job orchestration: intake, dispatch, completion and reconciliation.
//!
//! Every mutation re-reads the job and writes the whole row back. The only
//! multi-writer race (a callback against a poll-derived completion) is closed
//! by the terminal-state check in [`JobService::handle_callback`].

use base64::Engine;
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::config::OrchestratorSettings;
use crate::db::store::{JobStore, StoreError};
use crate::models::callback::{CallbackPayload, OutputSource, POLL_SOURCE, SOURCE_KEY};
use crate::models::job::{InputKind, InvalidTransition, Job, JobParams, JobStage, JobStatus};
use crate::services::compute::{
    CallbackTarget, ComputeError, ComputeGateway, RemoteState, SubmitRequest,
};
use crate::services::fingerprint::request_fingerprint;
use crate::services::media_validation::{validate_extension, validate_size};
use crate::services::queue::{DispatchQueue, QueueError};
use crate::services::storage::{StorageError, StorageProvider, OUTPUT_FILE_NAME};

/// One uploaded input as received from the client.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub file_name: String,
    pub content: Vec<u8>,
}

/// An intake request.
#[derive(Debug, Clone)]
pub struct SubmitJob {
    pub params: JobParams,
    pub inputs: BTreeMap<InputKind, InputFile>,
}

/// Result of intake. `created` is false when an existing job was returned.
#[derive(Debug, Clone)]
pub struct Submission {
    pub job: Job,
    pub created: bool,
}

/// What the dispatch worker did with a queue entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The job no longer exists.
    Missing,
    /// The job was not in a dispatchable status.
    Skipped(JobStatus),
    Submitted { remote_handle: Option<String> },
    /// The job was finished elsewhere while the submission was in flight;
    /// the receipt was not recorded.
    Superseded {
        status: JobStatus,
        remote_handle: Option<String>,
    },
    Failed { error: String },
}

/// Effect of reconciling one in-flight job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    Pending,
    Completed,
    Failed,
}

/// Tally of one reconciliation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub checked: usize,
    pub pending: usize,
    pub completed: usize,
    pub failed: usize,
    pub errors: usize,
}

pub struct JobService {
    store: Arc<dyn JobStore>,
    storage: Arc<dyn StorageProvider>,
    compute: Arc<dyn ComputeGateway>,
    queue: DispatchQueue,
    http: reqwest::Client,
    settings: OrchestratorSettings,
}

impl JobService {
    pub fn new(
        store: Arc<dyn JobStore>,
        storage: Arc<dyn StorageProvider>,
        compute: Arc<dyn ComputeGateway>,
        queue: DispatchQueue,
        settings: OrchestratorSettings,
    ) -> Result<Self, JobError> {
        let http = reqwest::Client::builder()
            .timeout(settings.output_download_timeout)
            .build()
            .map_err(JobError::OutputFetch)?;

        Ok(Self {
            store,
            storage,
            compute,
            queue,
            http,
            settings,
        })
    }

    pub fn storage_backend(&self) -> &'static str {
        self.storage.backend()
    }

    pub fn compute_backend(&self) -> &'static str {
        self.compute.name()
    }

    pub async fn get(&self, job_id: Uuid) -> Result<Job, JobError> {
        self.store
            .get(job_id)
            .await?
            .ok_or(JobError::NotFound(job_id))
    }

    /// Idempotent intake.
    ///
    /// A request whose fingerprint matches a queued, processing or done job
    /// returns that job without touching storage or the queue.
    pub async fn submit(&self, request: SubmitJob) -> Result<Submission, JobError> {
        let SubmitJob { params, inputs } = request;

        for kind in InputKind::ALL {
            if kind.is_required() && !inputs.contains_key(&kind) {
                return Err(JobError::InvalidInput(format!("missing required input {kind}")));
            }
        }

        let mut stored_names = BTreeMap::new();
        for (kind, file) in &inputs {
            let ext = validate_extension(&file.file_name, *kind)
                .map_err(|e| JobError::InvalidInput(format!("{kind}: {e}")))?;
            validate_size(file.content.len(), self.settings.max_upload_mb)
                .map_err(|e| JobError::InvalidInput(format!("{kind}: {e}")))?;
            stored_names.insert(*kind, format!("{kind}{ext}"));
        }

        let contents: BTreeMap<InputKind, &[u8]> = inputs
            .iter()
            .map(|(kind, file)| (*kind, file.content.as_slice()))
            .collect();
        let fingerprint = request_fingerprint(&params, &contents);

        if let Some(existing) = self
            .store
            .find_latest_by_fingerprint(&fingerprint, &JobStatus::DEDUP_CANDIDATES)
            .await?
        {
            metrics::counter!("jobs_deduplicated_total").increment(1);
            tracing::info!(
                job_id = %existing.id,
                status = %existing.status,
                "Duplicate submission, returning existing job"
            );
            return Ok(Submission {
                job: existing,
                created: false,
            });
        }

        let job_id = Uuid::new_v4();
        let mut refs = BTreeMap::new();
        for (kind, file) in &inputs {
            let asset_ref = self
                .storage
                .persist_input(job_id, &stored_names[kind], &file.content)
                .await?;
            refs.insert(*kind, asset_ref);
        }

        let job = Job::new(job_id, params, fingerprint, refs, Utc::now());
        self.store.create(&job).await?;
        self.queue.enqueue(job.id)?;

        metrics::counter!("jobs_submitted_total", "mode" => job.mode.to_string()).increment(1);
        tracing::info!(
            job_id = %job.id,
            mode = %job.mode,
            quality = %job.quality,
            aspect_ratio = %job.aspect_ratio,
            "Job created and queued"
        );

        Ok(Submission { job, created: true })
    }

    /// Re-arm a failed job and hand it back to the dispatch worker.
    pub async fn retry(&self, job_id: Uuid) -> Result<Job, JobError> {
        let mut job = self.get(job_id).await?;
        job.arm_retry(Utc::now())?;
        self.store.update(&job).await?;
        self.queue.enqueue(job.id)?;

        metrics::counter!("jobs_retried_total").increment(1);
        tracing::info!(job_id = %job.id, "Job re-armed for retry");
        Ok(job)
    }

    /// Re-enqueue every `queued`/`retry` job, e.g. after a restart.
    pub async fn requeue_pending(&self) -> Result<usize, JobError> {
        let jobs = self
            .store
            .list_by_status(&[JobStatus::Queued, JobStatus::Retry])
            .await?;
        for job in &jobs {
            self.queue.enqueue(job.id)?;
        }
        Ok(jobs.len())
    }

    /// Submit one queued job to the compute backend.
    ///
    /// Any failure on the way is terminal for the attempt; the job is marked
    /// failed and the outcome reports it instead of an error.
    pub async fn dispatch(&self, job_id: Uuid) -> Result<DispatchOutcome, JobError> {
        let Some(mut job) = self.store.get(job_id).await? else {
            tracing::warn!(job_id = %job_id, "Queued job no longer exists");
            return Ok(DispatchOutcome::Missing);
        };
        if !job.status.is_dispatchable() {
            tracing::debug!(job_id = %job_id, status = %job.status, "Skipping non-dispatchable job");
            return Ok(DispatchOutcome::Skipped(job.status));
        }

        match self.submit_to_compute(&mut job).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                let message = err.to_string();
                self.fail_job(job_id, &message, "dispatch").await?;
                Ok(DispatchOutcome::Failed { error: message })
            }
        }
    }

    async fn submit_to_compute(&self, job: &mut Job) -> Result<DispatchOutcome, JobError> {
        job.enter_stage(JobStage::Preprocessing, JobStatus::Processing, Utc::now())?;
        self.store.update(job).await?;

        let mut assets = BTreeMap::new();
        for (kind, asset_ref) in &job.inputs {
            let url = self
                .storage
                .build_reference_url(asset_ref, self.settings.asset_ttl)
                .await?;
            assets.insert(format!("{kind}_url"), url);
        }
        let output_target = self
            .storage
            .build_write_target(job.id, OUTPUT_FILE_NAME, self.settings.output_url_ttl)
            .await?;
        let callback = self.settings.callback_url.as_ref().map(|url| CallbackTarget {
            url: url.clone(),
            secret: self.settings.callback_secret.clone(),
        });

        job.enter_stage(JobStage::Generating, JobStatus::Processing, Utc::now())?;
        self.store.update(job).await?;

        let started = Instant::now();
        let receipt = self
            .compute
            .submit(SubmitRequest {
                job: &*job,
                assets,
                output_target,
                callback,
            })
            .await
            .map_err(JobError::GatewaySubmission)?;
        metrics::histogram!("compute_submit_seconds").record(started.elapsed().as_secs_f64());

        // A fast backend may already have called back; write onto the latest row.
        let mut current = self.get(job.id).await?;
        if current.status.is_terminal() {
            tracing::warn!(
                job_id = %current.id,
                status = %current.status,
                remote_handle = ?receipt.remote_handle,
                "Job finished while submission was in flight, receipt dropped"
            );
            return Ok(DispatchOutcome::Superseded {
                status: current.status,
                remote_handle: receipt.remote_handle,
            });
        }
        current.remote_handle = receipt.remote_handle.clone();
        current.request_id = receipt.request_id.clone();
        current.updated_at = Utc::now();
        self.store.update(&current).await?;
        *job = current;

        tracing::info!(
            job_id = %job.id,
            remote_handle = ?receipt.remote_handle,
            request_id = ?receipt.request_id,
            backend = self.compute.name(),
            "Job submitted to compute backend"
        );
        Ok(DispatchOutcome::Submitted {
            remote_handle: receipt.remote_handle,
        })
    }

    /// Apply a completion notification. The payload is assumed authentic.
    ///
    /// Terminal jobs are returned unchanged, so duplicate deliveries and the
    /// loser of a callback/poll race are no-ops.
    pub async fn handle_callback(&self, payload: CallbackPayload) -> Result<Job, JobError> {
        let mut job = self.get(payload.job_id).await?;
        let source = if payload.is_poll_derived() { "poll" } else { "callback" };

        if job.is_completed() {
            tracing::debug!(job_id = %job.id, source, "Duplicate completion ignored");
            return Ok(job);
        }
        if job.status.is_terminal() {
            tracing::info!(job_id = %job.id, status = %job.status, source, "Completion for terminal job ignored");
            return Ok(job);
        }

        if payload.is_failure() {
            let message = payload
                .error
                .as_deref()
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .unwrap_or("remote worker reported failure");
            return self.fail_job(job.id, message, "remote").await;
        }

        let output = match payload.output_source() {
            Ok(output) => output,
            Err(reason) => return self.reject_completion(job.id, reason).await,
        };

        // Dispatch may have recorded the remote handle since the first read.
        job = self.get(job.id).await?;
        if job.status.is_terminal() {
            return Ok(job);
        }
        job.enter_stage(JobStage::Enhancing, JobStatus::Processing, Utc::now())?;
        self.store.update(&job).await?;

        let output_ref = match output {
            OutputSource::WrittenBack(reported) => {
                let expected = self.storage.output_ref(job.id, OUTPUT_FILE_NAME);
                if reported != expected {
                    return self
                        .reject_completion(job.id, format!("unexpected output_ref {reported:?}"))
                        .await;
                }
                expected
            }
            OutputSource::Inline(encoded) => {
                let bytes = match base64::engine::general_purpose::STANDARD.decode(encoded.trim()) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        return self
                            .reject_completion(job.id, format!("output_base64 is not valid base64: {e}"))
                            .await
                    }
                };
                self.storage
                    .persist_output(job.id, OUTPUT_FILE_NAME, &bytes)
                    .await?
            }
            OutputSource::Remote(url) => {
                // On failure the job stays in `enhancing`; the next sweep retries.
                let bytes = self.download_output(url).await?;
                self.storage
                    .persist_output(job.id, OUTPUT_FILE_NAME, &bytes)
                    .await?
            }
        };

        let mut current = self.get(job.id).await?;
        if current.status.is_terminal() {
            tracing::debug!(job_id = %current.id, source, "Job finished concurrently, keeping first result");
            return Ok(current);
        }
        current.complete(output_ref, Utc::now())?;
        self.store.update(&current).await?;

        metrics::counter!("jobs_completed_total", "source" => source).increment(1);
        tracing::info!(
            job_id = %current.id,
            source,
            output_ref = current.output_ref.as_deref().unwrap_or_default(),
            "Job completed"
        );
        Ok(current)
    }

    /// A success payload that cannot be trusted fails the job.
    async fn reject_completion(&self, job_id: Uuid, reason: String) -> Result<Job, JobError> {
        self.fail_job(job_id, &format!("malformed completion: {reason}"), "malformed_completion")
            .await?;
        Err(JobError::InvalidCallback(reason))
    }

    async fn download_output(&self, url: &str) -> Result<Vec<u8>, JobError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(JobError::OutputFetch)?;
        let bytes = response.bytes().await.map_err(JobError::OutputFetch)?;
        Ok(bytes.to_vec())
    }

    /// Mark a job failed unless it already reached a terminal state.
    async fn fail_job(&self, job_id: Uuid, message: &str, reason: &'static str) -> Result<Job, JobError> {
        let mut job = self.get(job_id).await?;
        if job.status.is_terminal() {
            return Ok(job);
        }
        job.fail(message, Utc::now())?;
        self.store.update(&job).await?;

        metrics::counter!("jobs_failed_total", "reason" => reason).increment(1);
        tracing::warn!(job_id = %job_id, reason, error = %message, "Job failed");
        Ok(job)
    }

    /// Poll the backend for every in-flight job.
    ///
    /// A status error on one job is logged and counted; the sweep continues.
    pub async fn reconcile_inflight(&self) -> Result<SweepReport, JobError> {
        let jobs = self.store.list_inflight().await?;
        let mut report = SweepReport::default();

        for job in jobs {
            report.checked += 1;
            let job_id = job.id;
            match self.reconcile_job(job).await {
                Ok(Reconciliation::Pending) => report.pending += 1,
                Ok(Reconciliation::Completed) => report.completed += 1,
                Ok(Reconciliation::Failed) => report.failed += 1,
                Err(e) => {
                    report.errors += 1;
                    tracing::warn!(job_id = %job_id, error = %e, "Reconciliation skipped job");
                }
            }
        }

        Ok(report)
    }

    pub async fn reconcile_job(&self, job: Job) -> Result<Reconciliation, JobError> {
        let Some(handle) = job.remote_handle.as_deref() else {
            return Ok(Reconciliation::Pending);
        };
        let status = self
            .compute
            .get_status(handle)
            .await
            .map_err(JobError::GatewayStatus)?;

        match status.state() {
            RemoteState::Pending => Ok(Reconciliation::Pending),
            RemoteState::Unknown => {
                tracing::debug!(job_id = %job.id, remote_status = %status.status, "Unrecognized remote status");
                Ok(Reconciliation::Pending)
            }
            RemoteState::Failed => {
                let message = status.error_message().unwrap_or_else(|| {
                    format!("remote job ended with status {}", status.status.to_ascii_lowercase())
                });
                self.fail_job(job.id, &message, "remote").await?;
                Ok(Reconciliation::Failed)
            }
            RemoteState::Completed => {
                let Some(output) = status.output.as_ref().and_then(Value::as_object) else {
                    self.fail_job(job.id, "remote job completed without an output payload", "malformed_completion")
                        .await?;
                    return Ok(Reconciliation::Failed);
                };

                let reported = string_field(output, "status").unwrap_or_default();
                if matches!(reported.to_ascii_lowercase().as_str(), "failed" | "error") {
                    let message = string_field(output, "error")
                        .unwrap_or_else(|| "remote worker reported failure".to_string());
                    self.fail_job(job.id, &message, "remote").await?;
                    return Ok(Reconciliation::Failed);
                }

                let payload = CallbackPayload {
                    job_id: job.id,
                    status: "completed".to_string(),
                    output_url: string_field(output, "output_url"),
                    output_base64: string_field(output, "output_base64"),
                    output_ref: string_field(output, "output_ref"),
                    error: None,
                    metadata: BTreeMap::from([(SOURCE_KEY.to_string(), POLL_SOURCE.to_string())]),
                };
                match self.handle_callback(payload).await {
                    Ok(updated) => Ok(match updated.status {
                        JobStatus::Done => Reconciliation::Completed,
                        JobStatus::Failed => Reconciliation::Failed,
                        _ => Reconciliation::Pending,
                    }),
                    Err(JobError::InvalidCallback(_)) => Ok(Reconciliation::Failed),
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Fetchable URL of a finished job's output.
    pub async fn output_url(&self, job: &Job) -> Result<Option<String>, JobError> {
        match (&job.status, &job.output_ref) {
            (JobStatus::Done, Some(output_ref)) => Ok(Some(
                self.storage
                    .build_reference_url(output_ref, self.settings.output_url_ttl)
                    .await?,
            )),
            _ => Ok(None),
        }
    }

    /// Bytes of a finished job's output.
    pub async fn read_output(&self, job_id: Uuid) -> Result<Vec<u8>, JobError> {
        let job = self.get(job_id).await?;
        match (&job.status, &job.output_ref) {
            (JobStatus::Done, Some(output_ref)) => Ok(self.storage.read(output_ref).await?),
            _ => Err(JobError::OutputUnavailable(job_id)),
        }
    }
}

fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("job {0} has no output")]
    OutputUnavailable(Uuid),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("compute submission failed: {0}")]
    GatewaySubmission(#[source] ComputeError),

    #[error("compute status check failed: {0}")]
    GatewayStatus(#[source] ComputeError),

    #[error("invalid callback: {0}")]
    InvalidCallback(String),

    #[error("output download failed: {0}")]
    OutputFetch(#[source] reqwest::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("job store error: {0}")]
    Store(#[from] StoreError),

    #[error("dispatch queue error: {0}")]
    Queue(#[from] QueueError),
}
