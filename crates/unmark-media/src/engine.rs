//! The closed set of removal engines behind one execute contract.
//!
//! Every variant turns one validated job into exactly one external
//! process invocation, streams normalized progress through the supplied
//! channel, and verifies the output file exists before reporting
//! success. The exit status alone is never trusted.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use metrics::histogram;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use unmark_models::{
    CapabilitySnapshot, EngineSelection, InpaintAlgorithm, ModelKind, Progress, Quality, Region,
};

use crate::capability::SOFTWARE_ENCODER;
use crate::encoder::encoder_args;
use crate::error::{MediaError, MediaResult};
use crate::exec::{run_streaming, OutputLine};
use crate::filter::delogo_chain;
use crate::progress::{parse_engine_line, EngineMessage, FfmpegProgressParser};

/// What a successful engine run produced.
#[derive(Debug, Clone)]
pub struct EngineOutcome {
    pub output: PathBuf,
    pub file_size: u64,
    /// Encoder used for the output stream, when the engine controls
    /// encoding (the script engines bring their own writer).
    pub encoder: Option<String>,
}

/// Everything an engine needs for one invocation.
#[derive(Debug, Clone)]
pub struct EngineContext {
    pub input: PathBuf,
    pub output: PathBuf,
    pub regions: Vec<Region>,
    pub quality: Quality,
    /// Source duration in milliseconds, probed once per job
    pub total_duration_ms: i64,
    /// Directory holding the Python engine scripts
    pub scripts_dir: PathBuf,
    pub capabilities: Arc<CapabilitySnapshot>,
}

/// Sink for normalized progress updates.
pub type ProgressSender = mpsc::UnboundedSender<Progress>;

/// Contract shared by every engine variant (and test harnesses).
#[async_trait]
pub trait RemovalEngine: Send + Sync {
    /// Short identifier for logs and metrics.
    fn name(&self) -> &'static str;

    /// Run the engine over `ctx`, pushing progress as it arrives.
    async fn execute(&self, ctx: &EngineContext, progress: ProgressSender)
        -> MediaResult<EngineOutcome>;
}

/// The closed set of processing variants.
#[derive(Debug, Clone)]
pub enum Engine {
    /// Single-pass ffmpeg delogo chain
    Filter,
    /// Classical OpenCV inpainting script
    Inpaint { algorithm: InpaintAlgorithm },
    /// Trained inpainting model script
    AiModel { model: ModelKind, batch_size: u32 },
}

impl Engine {
    /// Resolve the wire-level selection into a runnable engine.
    pub fn from_selection(selection: &EngineSelection) -> Self {
        match *selection {
            EngineSelection::Filter => Engine::Filter,
            EngineSelection::Inpaint { algorithm } => Engine::Inpaint { algorithm },
            EngineSelection::AiModel { model, batch_size } => {
                Engine::AiModel { model, batch_size }
            }
        }
    }
}

#[async_trait]
impl RemovalEngine for Engine {
    fn name(&self) -> &'static str {
        match self {
            Engine::Filter => "filter",
            Engine::Inpaint { .. } => "inpaint",
            Engine::AiModel { .. } => "ai",
        }
    }

    async fn execute(
        &self,
        ctx: &EngineContext,
        progress: ProgressSender,
    ) -> MediaResult<EngineOutcome> {
        let started = Instant::now();
        let result = match self {
            Engine::Filter => run_filter(ctx, progress).await,
            Engine::Inpaint { algorithm } => {
                run_script(ctx, progress, ScriptJob::Inpaint(*algorithm)).await
            }
            Engine::AiModel { model, batch_size } => {
                run_script(ctx, progress, ScriptJob::Ai(*model, *batch_size)).await
            }
        };

        histogram!("unmark_engine_duration_seconds", "engine" => self.name())
            .record(started.elapsed().as_secs_f64());
        result
    }
}

/// Run the ffmpeg delogo path.
async fn run_filter(ctx: &EngineContext, progress: ProgressSender) -> MediaResult<EngineOutcome> {
    if !ctx.capabilities.tools.ffmpeg {
        return Err(MediaError::tool_unavailable(
            "ffmpeg",
            "install ffmpeg and make sure it is on PATH",
        ));
    }

    // First working encoder wins; no hardware means the software
    // fallback, never a failed job.
    let encoder = ctx
        .capabilities
        .default_encoder()
        .map(|e| e.name.clone())
        .unwrap_or_else(|| SOFTWARE_ENCODER.to_string());

    let mut args: Vec<String> = [
        "-y",
        "-hide_banner",
        "-v",
        "error",
        "-progress",
        "pipe:2",
        "-i",
    ]
    .into_iter()
    .map(String::from)
    .collect();
    args.push(ctx.input.to_string_lossy().into_owned());
    args.push("-vf".to_string());
    args.push(delogo_chain(&ctx.regions));
    args.extend(encoder_args(&encoder, ctx.quality));
    args.extend(
        ["-c:a", "copy", "-movflags", "+faststart", "-pix_fmt", "yuv420p"]
            .into_iter()
            .map(String::from),
    );
    args.push(ctx.output.to_string_lossy().into_owned());

    info!(encoder, regions = ctx.regions.len(), "starting filter engine");

    let mut parser = FfmpegProgressParser::new(ctx.total_duration_ms);
    run_streaming("ffmpeg", &args, |line| {
        if let OutputLine::Stderr(text) = line {
            if let Some(update) = parser.push_line(&text) {
                let _ = progress.send(update);
            }
        }
    })
    .await?;

    finish_outcome(&ctx.output, "ffmpeg", Some(encoder)).await
}

enum ScriptJob {
    Inpaint(InpaintAlgorithm),
    Ai(ModelKind, u32),
}

impl ScriptJob {
    fn script(&self) -> &'static str {
        match self {
            ScriptJob::Inpaint(_) => "inpaint_video.py",
            ScriptJob::Ai(..) => "ai_watermark_remover.py",
        }
    }
}

/// Run one of the Python engine scripts, consuming its JSON stdout.
async fn run_script(
    ctx: &EngineContext,
    progress: ProgressSender,
    job: ScriptJob,
) -> MediaResult<EngineOutcome> {
    let tools = &ctx.capabilities.tools;
    if !tools.python {
        return Err(MediaError::tool_unavailable(
            "python3",
            "install Python 3 to use the inpainting engines",
        ));
    }
    match job {
        ScriptJob::Inpaint(_) if !tools.opencv => {
            return Err(MediaError::tool_unavailable(
                "OpenCV",
                "run: pip install opencv-python numpy",
            ));
        }
        ScriptJob::Ai(..) if !tools.torch => {
            return Err(MediaError::tool_unavailable(
                "PyTorch",
                "run: pip install torch torchvision",
            ));
        }
        _ => {}
    }

    let script = job.script();
    let script_path = ctx.scripts_dir.join(script);
    let regions_json = serde_json::to_string(&ctx.regions)?;

    let mut args = vec![
        script_path.to_string_lossy().into_owned(),
        "--input".to_string(),
        ctx.input.to_string_lossy().into_owned(),
        "--output".to_string(),
        ctx.output.to_string_lossy().into_owned(),
        "--regions".to_string(),
        regions_json,
        "--algorithm".to_string(),
    ];
    match job {
        ScriptJob::Inpaint(algorithm) => args.push(algorithm.as_str().to_string()),
        ScriptJob::Ai(model, batch_size) => {
            args.push(model.as_str().to_string());
            args.push("--batch-size".to_string());
            args.push(batch_size.to_string());
        }
    }

    info!(script, regions = ctx.regions.len(), "starting script engine");

    let mut reported_error: Option<String> = None;
    let result = run_streaming("python3", &args, |line| {
        let OutputLine::Stdout(text) = line else {
            return;
        };
        let Some(message) = parse_engine_line(&text) else {
            return;
        };
        match &message {
            EngineMessage::Progress { .. } => {
                if let Some(update) = message.to_progress() {
                    let _ = progress.send(update);
                }
            }
            EngineMessage::Info { message } => {
                debug!(script, message = message.as_deref().unwrap_or(""), "engine info");
            }
            // Weight downloads report their own 0-100 range; feeding it
            // into the job percent would make processing appear to
            // restart, so it is logged only.
            EngineMessage::DownloadProgress { progress } => {
                debug!(script, percent = ?progress, "model download");
            }
            EngineMessage::Complete { .. } => {}
            EngineMessage::Error { .. } => {
                if let Some(text) = message.error_text() {
                    reported_error = Some(text.to_string());
                }
            }
        }
    })
    .await;

    match result {
        Ok(_) => finish_outcome(&ctx.output, script, None).await,
        Err(err) => {
            // The structured stdout message beats the raw stderr tail.
            if let Some(message) = reported_error {
                warn!(script, message, "engine reported failure");
                Err(MediaError::EngineReported(message))
            } else {
                Err(err)
            }
        }
    }
}

/// Verify the output file and build the outcome.
async fn finish_outcome(
    output: &Path,
    program: &str,
    encoder: Option<String>,
) -> MediaResult<EngineOutcome> {
    let metadata = tokio::fs::metadata(output).await.map_err(|_| {
        MediaError::OutputMissing {
            program: program.to_string(),
            path: output.to_path_buf(),
        }
    })?;

    Ok(EngineOutcome {
        output: output.to_path_buf(),
        file_size: metadata.len(),
        encoder,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use unmark_models::ToolAvailability;

    fn snapshot_with(tools: ToolAvailability) -> Arc<CapabilitySnapshot> {
        Arc::new(CapabilitySnapshot {
            platform: "linux".to_string(),
            arch: "x86_64".to_string(),
            gpus: vec![],
            working_encoders: vec![],
            tools,
            probed_at: Utc::now(),
        })
    }

    fn context(tools: ToolAvailability) -> EngineContext {
        EngineContext {
            input: PathBuf::from("/tmp/in.mp4"),
            output: PathBuf::from("/tmp/out.mp4"),
            regions: vec![Region::new(0, 0, 10, 10)],
            quality: Quality::High,
            total_duration_ms: 10_000,
            scripts_dir: PathBuf::from("scripts"),
            capabilities: snapshot_with(tools),
        }
    }

    #[tokio::test]
    async fn test_missing_python_is_tool_unavailable() {
        let engine = Engine::Inpaint {
            algorithm: InpaintAlgorithm::Telea,
        };
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = engine
            .execute(&context(ToolAvailability::default()), tx)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::ToolUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_missing_torch_names_remediation() {
        let tools = ToolAvailability {
            python: true,
            ..Default::default()
        };
        let engine = Engine::AiModel {
            model: ModelKind::Lama,
            batch_size: 8,
        };
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = engine.execute(&context(tools), tx).await.unwrap_err();
        assert!(err.to_string().contains("pip install torch"));
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_fails_filter_engine() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = Engine::Filter
            .execute(&context(ToolAvailability::default()), tx)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::ToolUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_missing_output_after_success() {
        let err = finish_outcome(Path::new("/nonexistent/out.mp4"), "ffmpeg", None)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::OutputMissing { .. }));
    }

    #[test]
    fn test_from_selection_preserves_options() {
        let engine = Engine::from_selection(&EngineSelection::AiModel {
            model: ModelKind::Sttn,
            batch_size: 4,
        });
        match engine {
            Engine::AiModel { model, batch_size } => {
                assert_eq!(model, ModelKind::Sttn);
                assert_eq!(batch_size, 4);
            }
            other => panic!("unexpected engine: {other:?}"),
        }
    }
}
