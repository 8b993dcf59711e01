//! Removal job submission.
//!
//! The submit handler accepts a multipart request, validates it at the
//! boundary, then hands the job to a pipeline task and answers with a
//! server-sent-event stream of that job's events.

use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::multipart::Field;
use axum::extract::{Multipart, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{self, Stream};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use unmark_media::Engine;
use unmark_models::{
    parse_regions, EngineKind, EngineSelection, InpaintAlgorithm, Job, JobEvent, ModelKind,
    Quality, Region, DEFAULT_AI_BATCH_SIZE,
};

use crate::error::{ApiError, ApiResult};
use crate::pipeline::JobPipeline;
use crate::state::AppState;

/// Raw multipart fields, collected before any interpretation.
#[derive(Default)]
struct SubmitFields {
    input_path: Option<PathBuf>,
    regions: Option<String>,
    method: Option<String>,
    algorithm: Option<String>,
    quality: Option<String>,
    batch_size: Option<String>,
}

/// `POST /api/remove` — submit a removal job.
pub async fn submit_removal(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let fields = collect_fields(&state, multipart).await?;
    let input_path = fields.input_path.clone();

    let (job, engine) = match resolve_job(&state, fields) {
        Ok(resolved) => resolved,
        Err(e) => {
            // The upload was already written; a rejected request must
            // not leave it behind.
            if let Some(path) = input_path {
                state.janitor.delete_now(&path).await;
            }
            return Err(e);
        }
    };

    info!(
        job_id = %job.output_name,
        engine = job.engine.label(),
        regions = job.regions.len(),
        "job accepted"
    );

    let snapshot = state.capabilities.snapshot(false).await;
    let pipeline = JobPipeline::new(
        Arc::new(engine),
        Arc::clone(&state.janitor),
        state.config.retention,
        state.config.scripts_dir.clone(),
        snapshot,
    );

    let (tx, rx) = mpsc::channel::<JobEvent>(32);
    tokio::spawn(async move {
        pipeline.run(job, tx).await;
    });

    let stream = stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        let frame = Event::default()
            .json_data(&event)
            .unwrap_or_else(|_| Event::default().data("{}"));
        Some((Ok::<_, Infallible>(frame), rx))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Drain the multipart body, streaming the video payload to disk.
///
/// A body that fails partway through must not leave the stored upload
/// behind.
async fn collect_fields(state: &AppState, multipart: Multipart) -> ApiResult<SubmitFields> {
    let mut fields = SubmitFields::default();

    if let Err(e) = fill_fields(state, multipart, &mut fields).await {
        if let Some(path) = &fields.input_path {
            state.janitor.delete_now(path).await;
        }
        return Err(e);
    }

    Ok(fields)
}

async fn fill_fields(
    state: &AppState,
    mut multipart: Multipart,
    fields: &mut SubmitFields,
) -> ApiResult<()> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("malformed multipart body: {e}")))?
    {
        match field.name() {
            Some("video") => {
                fields.input_path = Some(save_upload(state, field).await?);
            }
            Some("regions") => fields.regions = Some(read_text(field).await?),
            Some("method") => fields.method = Some(read_text(field).await?),
            Some("algorithm") => fields.algorithm = Some(read_text(field).await?),
            Some("quality") => fields.quality = Some(read_text(field).await?),
            Some("batch_size") => fields.batch_size = Some(read_text(field).await?),
            _ => {}
        }
    }

    Ok(())
}

async fn read_text(field: Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("unreadable form field: {e}")))
}

/// Stream the uploaded payload into the work directory.
async fn save_upload(state: &AppState, mut field: Field<'_>) -> ApiResult<PathBuf> {
    let extension = field
        .file_name()
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("mp4")
        .to_ascii_lowercase();

    let path = state
        .config
        .work_dir
        .join(format!("upload_{}.{extension}", Uuid::new_v4().simple()));

    let mut file = tokio::fs::File::create(&path)
        .await
        .map_err(|e| ApiError::internal(format!("cannot store upload: {e}")))?;

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| ApiError::bad_request(format!("upload interrupted: {e}")))?
    {
        file.write_all(&chunk)
            .await
            .map_err(|e| ApiError::internal(format!("cannot store upload: {e}")))?;
    }
    file.flush()
        .await
        .map_err(|e| ApiError::internal(format!("cannot store upload: {e}")))?;

    Ok(path)
}

/// Interpret the collected fields into a job. All identifier and region
/// validation happens here, before anything is spawned.
fn resolve_job(state: &AppState, fields: SubmitFields) -> ApiResult<(Job, Engine)> {
    let input_path = fields
        .input_path
        .ok_or_else(|| ApiError::bad_request("a video file is required"))?;

    let regions_raw = fields
        .regions
        .ok_or_else(|| ApiError::bad_request(
            "regions is required: a JSON array of {x, y, width, height} objects",
        ))?;
    let regions: Vec<Region> =
        parse_regions(&regions_raw).map_err(|e| ApiError::bad_request(e.to_string()))?;

    let method = fields
        .method
        .ok_or_else(|| ApiError::bad_request("method is required"))?;
    let kind = EngineKind::parse(&method).map_err(|e| ApiError::bad_request(e.to_string()))?;

    let selection = match kind {
        EngineKind::Filter => EngineSelection::Filter,
        EngineKind::Inpaint => {
            let raw = fields.algorithm.ok_or_else(|| {
                ApiError::bad_request("algorithm is required for the inpaint engine (TELEA or NS)")
            })?;
            let algorithm = InpaintAlgorithm::parse(&raw)
                .map_err(|e| ApiError::bad_request(e.to_string()))?;
            EngineSelection::Inpaint { algorithm }
        }
        EngineKind::AiModel => {
            let raw = fields.algorithm.ok_or_else(|| {
                ApiError::bad_request(
                    "algorithm is required for the ai engine (STTN, LAMA or PROPAINTER)",
                )
            })?;
            let model =
                ModelKind::parse(&raw).map_err(|e| ApiError::bad_request(e.to_string()))?;
            let batch_size = match fields.batch_size.as_deref() {
                None | Some("") => DEFAULT_AI_BATCH_SIZE,
                Some(raw) => raw.parse().map_err(|_| {
                    ApiError::bad_request("batch_size must be a positive integer")
                })?,
            };
            EngineSelection::AiModel { model, batch_size }
        }
    };

    let quality = match fields.quality.as_deref() {
        None | Some("") => Quality::default(),
        Some(raw) => Quality::parse(raw).map_err(|e| ApiError::bad_request(e.to_string()))?,
    };

    let job = Job::new(
        &state.config.work_dir,
        input_path,
        selection,
        regions,
        quality,
    );
    let engine = Engine::from_selection(&selection);

    Ok((job, engine))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::lifecycle::ArtifactJanitor;
    use unmark_media::capability::{CapabilityCache, SystemProbe};

    fn test_state() -> AppState {
        let config = ApiConfig::default();
        AppState {
            capabilities: Arc::new(CapabilityCache::with_ttl(
                Arc::new(SystemProbe),
                config.capability_ttl,
            )),
            janitor: Arc::new(ArtifactJanitor::new()),
            config,
        }
    }

    fn fields(method: &str, algorithm: Option<&str>) -> SubmitFields {
        SubmitFields {
            input_path: Some(PathBuf::from("/tmp/upload_x.mp4")),
            regions: Some(r#"[{"x":10,"y":10,"width":100,"height":50}]"#.to_string()),
            method: Some(method.to_string()),
            algorithm: algorithm.map(String::from),
            quality: None,
            batch_size: None,
        }
    }

    #[test]
    fn test_resolve_filter_job() {
        let (job, _engine) = resolve_job(&test_state(), fields("filter", None)).unwrap();
        assert_eq!(job.engine, EngineSelection::Filter);
        assert_eq!(job.quality, Quality::High);
        assert!(job.output_name.starts_with("unmark_"));
    }

    #[test]
    fn test_unknown_method_rejected() {
        let err = resolve_job(&test_state(), fields("sorcery", None)).unwrap_err();
        assert!(err.to_string().contains("unknown method"));
    }

    #[test]
    fn test_inpaint_requires_algorithm() {
        let err = resolve_job(&test_state(), fields("inpaint", None)).unwrap_err();
        assert!(err.to_string().contains("algorithm is required"));

        let (job, _) = resolve_job(&test_state(), fields("inpaint", Some("ns"))).unwrap();
        assert_eq!(
            job.engine,
            EngineSelection::Inpaint {
                algorithm: InpaintAlgorithm::Ns
            }
        );
    }

    #[test]
    fn test_ai_batch_size_defaults() {
        let (job, _) = resolve_job(&test_state(), fields("ai", Some("LAMA"))).unwrap();
        assert_eq!(
            job.engine,
            EngineSelection::AiModel {
                model: ModelKind::Lama,
                batch_size: DEFAULT_AI_BATCH_SIZE
            }
        );
    }

    #[test]
    fn test_empty_regions_rejected_with_expected_shape() {
        let mut f = fields("filter", None);
        f.regions = Some("[]".to_string());
        let err = resolve_job(&test_state(), f).unwrap_err();
        assert!(err.to_string().contains("{x, y, width, height}"));
    }

    #[test]
    fn test_missing_video_rejected() {
        let mut f = fields("filter", None);
        f.input_path = None;
        let err = resolve_job(&test_state(), f).unwrap_err();
        assert!(err.to_string().contains("video file is required"));
    }
}
