//! Processed artifact delivery.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use tokio_util::io::ReaderStream;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// `GET /api/download/{filename}` — stream a produced artifact.
pub async fn download_artifact(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<Response> {
    // Rejected before any filesystem access
    if !is_safe_filename(&filename) {
        return Err(ApiError::bad_request("Invalid filename"));
    }

    let path = state.config.work_dir.join(&filename);
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| ApiError::not_found("Artifact not found or expired"))?;
    let size = file
        .metadata()
        .await
        .map_err(|e| ApiError::internal(format!("cannot stat artifact: {e}")))?
        .len();

    // A served artifact lingers long enough for the client to retry the
    // save, then goes away.
    state
        .janitor
        .schedule(path.clone(), state.config.download_retention);
    metrics::record_download();

    info!(filename = %filename, size, "artifact download started");

    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(header::CONTENT_LENGTH, size)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .body(body)
        .map_err(|e| ApiError::internal(format!("cannot build response: {e}")))
}

/// A filename is safe when it cannot escape the work directory.
fn is_safe_filename(name: &str) -> bool {
    !name.is_empty() && !name.contains("..") && !name.contains('/') && !name.contains('\\')
}
