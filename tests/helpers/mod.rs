//! Test doubles and helpers shared by the integration suites

#![allow(dead_code)]

use async_trait::async_trait;
use base64::Engine;
use reqwest::multipart;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::sleep;
use uuid::Uuid;

use media_orchestrator::config::OrchestratorSettings;
use media_orchestrator::db::memory::InMemoryJobStore;
use media_orchestrator::db::store::JobStore;
use media_orchestrator::models::callback::CallbackPayload;
use media_orchestrator::models::job::{
    AspectRatio, InputKind, Job, JobMode, JobParams, QualityTier,
};
use media_orchestrator::services::compute::{
    ComputeError, ComputeGateway, RemoteStatus, SubmitReceipt, SubmitRequest,
};
use media_orchestrator::services::job_service::{InputFile, JobService, SubmitJob};
use media_orchestrator::services::queue::DispatchQueue;
use media_orchestrator::services::storage::{StorageError, StorageProvider, WriteTarget};

use crate::fixtures::{MediaFixture, REFERENCE_VIDEO, RESULT_VIDEO, SOURCE_IMAGE};

pub const CALLBACK_SECRET: &str = "test-callback-secret";

/// In-memory storage that counts writes
#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    input_writes: AtomicUsize,
    output_writes: AtomicUsize,
    write_back: bool,
}

impl FakeStorage {
    pub fn with_write_back() -> Self {
        Self {
            write_back: true,
            ..Self::default()
        }
    }

    pub fn input_writes(&self) -> usize {
        self.input_writes.load(Ordering::SeqCst)
    }

    pub fn output_writes(&self) -> usize {
        self.output_writes.load(Ordering::SeqCst)
    }

    pub fn object(&self, asset_ref: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(asset_ref).cloned()
    }

    /// Simulate the remote backend uploading straight to storage.
    pub fn put_object(&self, asset_ref: &str, content: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(asset_ref.to_string(), content.to_vec());
    }
}

#[async_trait]
impl StorageProvider for FakeStorage {
    fn backend(&self) -> &'static str {
        "fake"
    }

    async fn persist_input(
        &self,
        job_id: Uuid,
        name: &str,
        content: &[u8],
    ) -> Result<String, StorageError> {
        self.input_writes.fetch_add(1, Ordering::SeqCst);
        let asset_ref = format!("mem://uploads/{job_id}/{name}");
        self.put_object(&asset_ref, content);
        Ok(asset_ref)
    }

    async fn persist_output(
        &self,
        job_id: Uuid,
        name: &str,
        content: &[u8],
    ) -> Result<String, StorageError> {
        self.output_writes.fetch_add(1, Ordering::SeqCst);
        let asset_ref = self.output_ref(job_id, name);
        self.put_object(&asset_ref, content);
        Ok(asset_ref)
    }

    fn output_ref(&self, job_id: Uuid, name: &str) -> String {
        format!("mem://outputs/{job_id}/{name}")
    }

    async fn build_reference_url(
        &self,
        asset_ref: &str,
        ttl: Duration,
    ) -> Result<String, StorageError> {
        Ok(format!(
            "https://assets.test/{}?ttl={}",
            asset_ref.trim_start_matches("mem://"),
            ttl.as_secs()
        ))
    }

    async fn build_write_target(
        &self,
        job_id: Uuid,
        name: &str,
        ttl: Duration,
    ) -> Result<Option<WriteTarget>, StorageError> {
        if !self.write_back {
            return Ok(None);
        }
        let output_ref = self.output_ref(job_id, name);
        Ok(Some(WriteTarget {
            upload_url: format!("https://upload.test/{job_id}/{name}"),
            output_url: self.build_reference_url(&output_ref, ttl).await?,
            output_ref,
        }))
    }

    async fn read(&self, asset_ref: &str) -> Result<Vec<u8>, StorageError> {
        self.object(asset_ref)
            .ok_or_else(|| StorageError::NotFound(asset_ref.to_string()))
    }
}

/// What the gateway saw for one submission
#[derive(Debug, Clone)]
pub struct SeenSubmission {
    pub job_id: Uuid,
    pub assets: BTreeMap<String, String>,
    pub has_output_target: bool,
    pub callback_url: Option<String>,
}

/// Compute gateway driven by the test
#[derive(Default)]
pub struct ScriptedGateway {
    submit_failure: Mutex<Option<String>>,
    submit_delay: Mutex<Option<Duration>>,
    next_handle: Mutex<Option<String>>,
    statuses: Mutex<HashMap<String, Result<RemoteStatus, String>>>,
    submissions: Mutex<Vec<SeenSubmission>>,
}

impl ScriptedGateway {
    /// Make the next submit call fail with `message`.
    pub fn fail_next_submit(&self, message: &str) {
        *self.submit_failure.lock().unwrap() = Some(message.to_string());
    }

    /// Hold the next submit call for `delay` before it answers.
    pub fn delay_next_submit(&self, delay: Duration) {
        *self.submit_delay.lock().unwrap() = Some(delay);
    }

    /// Answer the next submit with `remote_handle` instead of the default.
    pub fn hand_out_next(&self, remote_handle: &str) {
        *self.next_handle.lock().unwrap() = Some(remote_handle.to_string());
    }

    pub fn set_status(&self, remote_handle: &str, status: RemoteStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(remote_handle.to_string(), Ok(status));
    }

    pub fn set_status_error(&self, remote_handle: &str, message: &str) {
        self.statuses
            .lock()
            .unwrap()
            .insert(remote_handle.to_string(), Err(message.to_string()));
    }

    pub fn submissions(&self) -> Vec<SeenSubmission> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ComputeGateway for ScriptedGateway {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn submit(&self, request: SubmitRequest<'_>) -> Result<SubmitReceipt, ComputeError> {
        if let Some(message) = self.submit_failure.lock().unwrap().take() {
            return Err(ComputeError::Other(message));
        }
        let delay = self.submit_delay.lock().unwrap().take();
        if let Some(delay) = delay {
            sleep(delay).await;
        }
        let remote_handle = self
            .next_handle
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| remote_handle_for(request.job.id));

        let mut submissions = self.submissions.lock().unwrap();
        submissions.push(SeenSubmission {
            job_id: request.job.id,
            assets: request.assets.clone(),
            has_output_target: request.output_target.is_some(),
            callback_url: request.callback.as_ref().map(|c| c.url.clone()),
        });

        Ok(SubmitReceipt {
            remote_handle: Some(remote_handle),
            request_id: Some(format!("req-{}", submissions.len())),
        })
    }

    async fn get_status(&self, remote_handle: &str) -> Result<RemoteStatus, ComputeError> {
        match self.statuses.lock().unwrap().get(remote_handle) {
            Some(Ok(status)) => Ok(status.clone()),
            Some(Err(message)) => Err(ComputeError::Other(message.clone())),
            None => Ok(RemoteStatus::new("IN_PROGRESS")),
        }
    }
}

pub fn remote_handle_for(job_id: Uuid) -> String {
    format!("remote-{job_id}")
}

pub fn test_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        callback_url: Some("https://orchestrator.test/v1/compute/callback".to_string()),
        callback_secret: CALLBACK_SECRET.to_string(),
        max_upload_mb: 1,
        ..OrchestratorSettings::default()
    }
}

/// A job service wired to fakes, with the queue receiver left to the test
pub struct Harness {
    pub service: Arc<JobService>,
    pub store: Arc<InMemoryJobStore>,
    pub storage: Arc<FakeStorage>,
    pub gateway: Arc<ScriptedGateway>,
    pub receiver: UnboundedReceiver<Uuid>,
}

pub fn harness() -> Harness {
    harness_with(FakeStorage::default(), test_settings())
}

pub fn harness_with(storage: FakeStorage, settings: OrchestratorSettings) -> Harness {
    let store = Arc::new(InMemoryJobStore::new());
    let storage = Arc::new(storage);
    let gateway = Arc::new(ScriptedGateway::default());
    let (queue, receiver) = DispatchQueue::new();

    let service = JobService::new(
        store.clone() as Arc<dyn JobStore>,
        storage.clone(),
        gateway.clone(),
        queue,
        settings,
    )
    .expect("job service");

    Harness {
        service: Arc::new(service),
        store,
        storage,
        gateway,
        receiver,
    }
}

fn input(fixture: &MediaFixture) -> (InputKind, InputFile) {
    (
        fixture.kind,
        InputFile {
            file_name: fixture.file_name.to_string(),
            content: fixture.bytes.to_vec(),
        },
    )
}

pub fn video_swap_params() -> JobParams {
    JobParams {
        mode: JobMode::VideoSwap,
        quality: QualityTier::Balanced,
        enable_4k: false,
        aspect_ratio: AspectRatio::Portrait,
    }
}

/// The canonical two-input video swap request
pub fn video_swap_request() -> SubmitJob {
    SubmitJob {
        params: video_swap_params(),
        inputs: BTreeMap::from([input(&REFERENCE_VIDEO), input(&SOURCE_IMAGE)]),
    }
}

/// A video swap request whose source image is unique to `seed`
pub fn seeded_request(seed: &str) -> SubmitJob {
    let mut request = video_swap_request();
    let image = request
        .inputs
        .get_mut(&InputKind::SourceImage)
        .expect("source image");
    image.content.extend_from_slice(seed.as_bytes());
    request
}

/// Submit and dispatch a fresh job, returning it in `processing`.
pub async fn dispatched_job(h: &Harness, seed: &str) -> Job {
    let submission = h.service.submit(seeded_request(seed)).await.expect("submit");
    h.service.dispatch(submission.job.id).await.expect("dispatch");
    h.service.get(submission.job.id).await.expect("get")
}

pub fn encoded_result() -> String {
    base64::engine::general_purpose::STANDARD.encode(RESULT_VIDEO)
}

/// A well-formed success callback carrying the result inline
pub fn completed_callback(job_id: Uuid) -> CallbackPayload {
    CallbackPayload {
        job_id,
        status: "completed".to_string(),
        output_url: None,
        output_base64: Some(encoded_result()),
        output_ref: None,
        error: None,
        metadata: BTreeMap::new(),
    }
}

/// Backend status for a completed job with the given output document
pub fn completed_status(output: Value) -> RemoteStatus {
    RemoteStatus {
        status: "COMPLETED".to_string(),
        output: Some(output),
        error: None,
    }
}

pub fn inline_output() -> Value {
    json!({"status": "completed", "output_base64": encoded_result()})
}

/// Serve `RESULT_VIDEO` at `/result.mp4` on an ephemeral port, returning its URL.
pub async fn serve_result() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/result.mp4", listener.local_addr().unwrap());
    let app = axum::Router::new().route("/result.mp4", axum::routing::get(|| async { RESULT_VIDEO }));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    url
}

/// A URL on a port nothing listens on.
pub async fn unreachable_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/result.mp4")
}

/// Poll `check` until it returns true or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Multipart form for a job submission over HTTP
pub fn job_form(mode: &str, fixtures: &[MediaFixture]) -> multipart::Form {
    let mut form = multipart::Form::new()
        .text("mode", mode.to_string())
        .text("quality", "balanced")
        .text("aspect_ratio", "9:16");
    for fixture in fixtures {
        form = form.part(
            fixture.kind.to_string(),
            multipart::Part::bytes(fixture.bytes.to_vec())
                .file_name(fixture.file_name)
                .mime_str(fixture.mime)
                .expect("valid mime"),
        );
    }
    form
}

/// Poll a running server until the job reaches `done` or `failed`.
pub async fn wait_for_terminal(
    client: &reqwest::Client,
    base_url: &str,
    job_id: &str,
    timeout_secs: u64,
) -> Result<Value, Box<dyn std::error::Error>> {
    let max_attempts = timeout_secs * 2;

    for _ in 0..max_attempts {
        let response = client
            .get(format!("{base_url}/v1/jobs/{job_id}"))
            .send()
            .await?;
        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(format!("Status check failed: {error_text}").into());
        }

        let body: Value = response.json().await?;
        match body["status"].as_str() {
            Some("done") | Some("failed") => return Ok(body),
            _ => sleep(Duration::from_millis(500)).await,
        }
    }

    Err(format!("Job did not finish within {timeout_secs} seconds").into())
}
