use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

use super::error::{ApiError, ApiResult};
use crate::app_state::AppState;
use crate::models::api::{JobCreateResponse, JobStatusResponse};
use crate::models::job::{AspectRatio, InputKind, JobMode, JobParams, QualityTier};
use crate::services::job_service::{InputFile, SubmitJob};

/// POST /v1/jobs: submit a media job as multipart form data.
///
/// Text fields: `mode` (required), `quality`, `enable_4k`, `aspect_ratio`.
/// File fields are named after their input kind.
pub async fn create_job(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<JobCreateResponse>)> {
    let mut mode = None;
    let mut quality = QualityTier::default();
    let mut enable_4k = false;
    let mut aspect_ratio = AspectRatio::default();
    let mut inputs = BTreeMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "mode" => mode = Some(parse_field::<JobMode>(&name, field.text().await)?),
            "quality" => quality = parse_field(&name, field.text().await)?,
            "aspect_ratio" => aspect_ratio = parse_field(&name, field.text().await)?,
            "enable_4k" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                enable_4k = parse_flag(&raw)
                    .ok_or_else(|| ApiError::BadRequest(format!("invalid enable_4k value {raw:?}")))?;
            }
            other => {
                let kind = InputKind::from_str(other)
                    .map_err(|_| ApiError::BadRequest(format!("unexpected field {other:?}")))?;
                // The extension check needs a real client filename
                let file_name = field
                    .file_name()
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        ApiError::BadRequest(format!("{kind} must be sent as a file with a filename"))
                    })?;
                let content = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                inputs.insert(
                    kind,
                    InputFile {
                        file_name,
                        content: content.to_vec(),
                    },
                );
            }
        }
    }

    let mode = mode.ok_or_else(|| ApiError::BadRequest("mode is required".to_string()))?;
    let submission = state
        .jobs
        .submit(SubmitJob {
            params: JobParams {
                mode,
                quality,
                enable_4k,
                aspect_ratio,
            },
            inputs,
        })
        .await?;

    let status = if submission.created {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(JobCreateResponse::from(&submission.job))))
}

/// GET /v1/jobs/{job_id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job = state.jobs.get(job_id).await?;
    let output_url = state.jobs.output_url(&job).await?;
    Ok(Json(JobStatusResponse::from_job(&job, output_url)))
}

/// POST /v1/jobs/{job_id}/retry: re-arm a failed job.
pub async fn retry_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<JobCreateResponse>)> {
    let job = state.jobs.retry(job_id).await?;
    Ok((StatusCode::ACCEPTED, Json(JobCreateResponse::from(&job))))
}

/// GET /v1/jobs/{job_id}/output: stream the finished output.
pub async fn download_output(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let bytes = state.jobs.read_output(job_id).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "video/mp4".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{job_id}.mp4\""),
            ),
        ],
        bytes,
    ))
}

fn parse_field<T: FromStr>(
    name: &str,
    text: Result<String, axum::extract::multipart::MultipartError>,
) -> ApiResult<T> {
    let raw = text.map_err(|e| ApiError::BadRequest(e.to_string()))?;
    raw.trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid {name} value {raw:?}")))
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
