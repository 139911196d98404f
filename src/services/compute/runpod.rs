use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

use super::{CallbackTarget, ComputeError, ComputeGateway, RemoteStatus, SubmitReceipt, SubmitRequest};
use crate::models::job::{AspectRatio, JobMode, QualityTier};
use crate::services::storage::WriteTarget;

/// Client for a RunPod serverless endpoint.
pub struct RunpodGateway {
    http: Client,
    api_base: String,
    endpoint_id: String,
    api_key: String,
}

#[derive(Serialize)]
struct RunRequest<'a> {
    input: WorkerInput<'a>,
}

#[derive(Serialize)]
struct WorkerInput<'a> {
    job_id: Uuid,
    mode: JobMode,
    quality: QualityTier,
    enable_4k: bool,
    aspect_ratio: AspectRatio,
    assets: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_target: Option<&'a WriteTarget>,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback: Option<&'a CallbackTarget>,
}

#[derive(Deserialize)]
struct RunResponse {
    id: Option<String>,
    #[serde(default)]
    input: Option<Value>,
}

impl RunpodGateway {
    pub fn new(
        api_base: &str,
        endpoint_id: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, ComputeError> {
        if api_key.is_empty() || endpoint_id.is_empty() {
            return Err(ComputeError::Config(
                "RUNPOD_API_KEY and RUNPOD_ENDPOINT_ID must be set".to_string(),
            ));
        }

        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            endpoint_id: endpoint_id.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.api_base, self.endpoint_id, path)
    }
}

fn worker_input<'a>(request: &'a SubmitRequest<'_>) -> WorkerInput<'a> {
    let job = request.job;
    WorkerInput {
        job_id: job.id,
        mode: job.mode,
        quality: job.quality,
        enable_4k: job.enable_4k,
        aspect_ratio: job.aspect_ratio,
        assets: &request.assets,
        output_target: request.output_target.as_ref(),
        callback: request.callback.as_ref(),
    }
}

#[async_trait]
impl ComputeGateway for RunpodGateway {
    fn name(&self) -> &'static str {
        "runpod"
    }

    async fn submit(&self, request: SubmitRequest<'_>) -> Result<SubmitReceipt, ComputeError> {
        let body = RunRequest {
            input: worker_input(&request),
        };

        let response = self
            .http
            .post(self.url("run"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ComputeError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let run: RunResponse = response.json().await?;
        let request_id = run
            .input
            .as_ref()
            .and_then(|input| input.get("job_id"))
            .and_then(Value::as_str)
            .map(str::to_string);

        tracing::info!(
            job_id = %request.job.id,
            remote_handle = ?run.id,
            "Submitted job to RunPod"
        );

        Ok(SubmitReceipt {
            remote_handle: run.id,
            request_id,
        })
    }

    async fn get_status(&self, remote_handle: &str) -> Result<RemoteStatus, ComputeError> {
        let response = self
            .http
            .get(self.url(&format!("status/{remote_handle}")))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(RemoteStatus {
                status: "NOT_FOUND".to_string(),
                output: None,
                error: Some(Value::String(
                    "remote job id not found on this endpoint".to_string(),
                )),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ComputeError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<RemoteStatus>().await?)
    }
}
