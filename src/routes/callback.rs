use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use garde::Validate;

use super::error::{ApiError, ApiResult};
use crate::app_state::AppState;
use crate::config::CALLBACK_SIGNATURE_HEADER;
use crate::models::api::CallbackAck;
use crate::models::callback::CallbackPayload;
use crate::services::signing::verify_webhook;

/// POST /v1/compute/callback: completion notification from the compute backend.
///
/// The signature header is checked over the raw body before anything is parsed.
pub async fn compute_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<CallbackAck>> {
    let Some(signature) = headers
        .get(CALLBACK_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
    else {
        metrics::counter!("callbacks_rejected_total", "reason" => "missing_signature").increment(1);
        return Err(ApiError::Unauthorized("missing callback signature".to_string()));
    };

    if verify_webhook(state.callback_secret.as_bytes(), &body, signature).is_err() {
        metrics::counter!("callbacks_rejected_total", "reason" => "bad_signature").increment(1);
        tracing::warn!("Rejected callback with invalid signature");
        return Err(ApiError::Unauthorized("invalid callback signature".to_string()));
    }

    let payload: CallbackPayload = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid callback body: {e}")))?;
    payload
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    tracing::info!(job_id = %payload.job_id, status = %payload.status, "Callback received");
    let job = state.jobs.handle_callback(payload).await?;

    Ok(Json(CallbackAck {
        job_id: job.id,
        status: job.status,
    }))
}
