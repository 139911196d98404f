use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;

use super::error::{ApiError, ApiResult};
use crate::app_state::AppState;

/// GET /v1/assets/{token}: serve a locally stored asset by signed token.
///
/// Bad, expired and unknown tokens all answer 404.
pub async fn get_asset(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let storage = state
        .assets
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("asset not found".to_string()))?;

    let path = storage.resolve_token(&token).await.map_err(|e| {
        tracing::debug!(error = %e, "Asset token rejected");
        ApiError::NotFound("asset not found".to_string())
    })?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to read asset: {e}")))?;

    let content_type = content_type_for(path.extension().and_then(|e| e.to_str()).unwrap_or_default());
    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}

fn content_type_for(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "m4a" | "aac" => "audio/aac",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("MP4"), "video/mp4");
        assert_eq!(content_type_for("jpeg"), "image/jpeg");
        assert_eq!(content_type_for(""), "application/octet-stream");
    }
}
