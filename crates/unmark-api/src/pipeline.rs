//! Job pipeline: drives one removal request end to end.
//!
//! One pipeline run owns one job and at most one external process at a
//! time. The emitted event order is fixed: one `start`, zero or more
//! progress events with non-decreasing percent, then exactly one
//! terminal event.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use unmark_media::engine::{EngineContext, ProgressSender, RemovalEngine};
use unmark_media::probe;
use unmark_media::progress::ProgressGate;
use unmark_media::MediaError;
use unmark_models::{validate_regions, Job, JobEvent};

use crate::lifecycle::ArtifactJanitor;
use crate::metrics;

/// Pipeline states. `Complete` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Validating,
    Running,
    Finalizing,
    Complete,
    Failed,
}

/// Drives jobs through validation, execution and finalization.
pub struct JobPipeline {
    engine: Arc<dyn RemovalEngine>,
    janitor: Arc<ArtifactJanitor>,
    retention: Duration,
    scripts_dir: std::path::PathBuf,
    capabilities: Arc<unmark_models::CapabilitySnapshot>,
}

impl JobPipeline {
    pub fn new(
        engine: Arc<dyn RemovalEngine>,
        janitor: Arc<ArtifactJanitor>,
        retention: Duration,
        scripts_dir: std::path::PathBuf,
        capabilities: Arc<unmark_models::CapabilitySnapshot>,
    ) -> Self {
        Self {
            engine,
            janitor,
            retention,
            scripts_dir,
            capabilities,
        }
    }

    /// Run `job` to completion, emitting events on `events`.
    ///
    /// Every accepted job reaches exactly one terminal event. A closed
    /// `events` receiver (client gone) aborts the engine task, which
    /// kills the child process.
    pub async fn run(&self, job: Job, events: mpsc::Sender<JobEvent>) -> PipelineState {
        let job_id = job.output_name.clone();
        metrics::record_job_started(job.engine.label());

        // validating -> failed: nothing is spawned for a bad region
        // list, and a rejected job's files go away immediately
        if let Err(e) = validate_regions(&job.regions) {
            warn!(job_id = %job_id, error = %e, "job rejected during validation");
            let _ = events.send(JobEvent::error(e.to_string())).await;
            self.janitor.delete_now(&job.input_path).await;
            self.janitor.delete_now(&job.output_path).await;
            metrics::record_job_failed(job.engine.label());
            return PipelineState::Failed;
        }

        // validating -> running
        let start = JobEvent::start(job.engine, job.regions.clone(), job.output_name.clone());
        if events.send(start).await.is_err() {
            info!(job_id = %job_id, "client disconnected before start");
            self.cleanup_failed(&job).await;
            return PipelineState::Failed;
        }

        // One probe per job; every engine sees the same duration.
        let total_duration_ms = match probe::media_info(&job.input_path).await {
            Ok(info) => info.duration_ms(),
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "duration probe failed; percent will stay at 0");
                0
            }
        };

        let ctx = EngineContext {
            input: job.input_path.clone(),
            output: job.output_path.clone(),
            regions: job.regions.clone(),
            quality: job.quality,
            total_duration_ms,
            scripts_dir: self.scripts_dir.clone(),
            capabilities: Arc::clone(&self.capabilities),
        };

        let (progress_tx, progress_rx): (ProgressSender, _) = mpsc::unbounded_channel();
        let engine = Arc::clone(&self.engine);
        let handle =
            tokio::spawn(async move { engine.execute(&ctx, progress_tx).await });

        let client_connected = self
            .forward_progress(progress_rx, &events)
            .await;

        if !client_connected {
            // Recommended hardening: no consumer left, stop the work.
            info!(job_id = %job_id, "client disconnected; aborting engine");
            handle.abort();
            let _ = handle.await;
            self.cleanup_failed(&job).await;
            metrics::record_job_failed(job.engine.label());
            return PipelineState::Failed;
        }

        let state = match handle.await {
            Ok(Ok(outcome)) => self.finalize(&job, outcome, &events).await,
            Ok(Err(err)) => {
                self.emit_failure(&job, &events, &err).await;
                PipelineState::Failed
            }
            Err(join_err) => {
                warn!(job_id = %job_id, error = %join_err, "engine task died");
                let _ = events
                    .send(JobEvent::error("processing task failed unexpectedly"))
                    .await;
                PipelineState::Failed
            }
        };

        match state {
            PipelineState::Complete => {
                metrics::record_job_completed(job.engine.label());
                // Both files linger for the retention window
                self.janitor.schedule(&job.output_path, self.retention);
                self.janitor.schedule(&job.input_path, self.retention);
            }
            _ => {
                metrics::record_job_failed(job.engine.label());
                self.cleanup_failed(&job).await;
            }
        }

        state
    }

    /// Forward progress updates until the engine drops its sender.
    /// Returns `false` once the events receiver is gone.
    async fn forward_progress(
        &self,
        mut progress_rx: mpsc::UnboundedReceiver<unmark_models::Progress>,
        events: &mpsc::Sender<JobEvent>,
    ) -> bool {
        let mut gate = ProgressGate::new();
        while let Some(update) = progress_rx.recv().await {
            let Some(update) = gate.accept(update) else {
                continue;
            };
            if events.send(JobEvent::Progress(update)).await.is_err() {
                return false;
            }
        }
        true
    }

    /// running -> finalizing -> complete, or failed when the output is
    /// missing despite an apparent success.
    async fn finalize(
        &self,
        job: &Job,
        outcome: unmark_media::EngineOutcome,
        events: &mpsc::Sender<JobEvent>,
    ) -> PipelineState {
        let metadata = match tokio::fs::metadata(&job.output_path).await {
            Ok(metadata) => metadata,
            Err(_) => {
                warn!(
                    job_id = %job.output_name,
                    "engine reported success but output is missing"
                );
                let _ = events
                    .send(JobEvent::error(
                        "processing reported success but produced no output file",
                    ))
                    .await;
                return PipelineState::Failed;
            }
        };

        info!(
            job_id = %job.output_name,
            file_size = metadata.len(),
            "job complete"
        );

        let _ = events
            .send(JobEvent::Complete {
                filename: job.output_name.clone(),
                download_url: format!("/api/download/{}", job.output_name),
                file_size: metadata.len(),
                encoder_used: outcome.encoder,
            })
            .await;

        PipelineState::Complete
    }

    async fn emit_failure(&self, job: &Job, events: &mpsc::Sender<JobEvent>, err: &MediaError) {
        warn!(job_id = %job.output_name, error = %err, "job failed");

        let event = match err.diagnostic_tail() {
            Some(tail) => JobEvent::error_with_detail(err.to_string(), tail),
            None => JobEvent::error(err.to_string()),
        };
        let _ = events.send(event).await;
    }

    /// Failure cleanup: partial output goes immediately, the input is
    /// kept for the retention window for post-mortem inspection.
    async fn cleanup_failed(&self, job: &Job) {
        self.janitor.delete_now(&job.output_path).await;
        self.janitor.schedule(&job.input_path, self.retention);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use unmark_media::{EngineOutcome, MediaResult};
    use unmark_models::{
        CapabilitySnapshot, EngineSelection, Progress, Quality, Region, Stage, ToolAvailability,
    };

    enum FakeBehavior {
        /// Write the output file, then succeed
        Succeed,
        /// Report success without producing a file
        SucceedWithoutFile,
        Fail(fn() -> MediaError),
    }

    struct FakeEngine {
        percents: Vec<u8>,
        behavior: FakeBehavior,
    }

    #[async_trait]
    impl RemovalEngine for FakeEngine {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn execute(
            &self,
            ctx: &EngineContext,
            progress: ProgressSender,
        ) -> MediaResult<EngineOutcome> {
            for &percent in &self.percents {
                let _ = progress.send(Progress::percent(Stage::Processing, percent));
            }

            match &self.behavior {
                FakeBehavior::Succeed => {
                    tokio::fs::write(&ctx.output, b"processed").await?;
                    Ok(EngineOutcome {
                        output: ctx.output.clone(),
                        file_size: 9,
                        encoder: None,
                    })
                }
                FakeBehavior::SucceedWithoutFile => Ok(EngineOutcome {
                    output: ctx.output.clone(),
                    file_size: 0,
                    encoder: None,
                }),
                FakeBehavior::Fail(make) => Err(make()),
            }
        }
    }

    fn snapshot() -> Arc<CapabilitySnapshot> {
        Arc::new(CapabilitySnapshot {
            platform: "linux".to_string(),
            arch: "x86_64".to_string(),
            gpus: vec![],
            working_encoders: vec![],
            tools: ToolAvailability::default(),
            probed_at: Utc::now(),
        })
    }

    fn job_in(dir: &TempDir, regions: Vec<Region>) -> Job {
        let input = dir.path().join("input.mp4");
        std::fs::write(&input, b"video").unwrap();
        Job::new(
            dir.path(),
            input,
            EngineSelection::Filter,
            regions,
            Quality::High,
        )
    }

    fn pipeline(engine: FakeEngine) -> JobPipeline {
        JobPipeline::new(
            Arc::new(engine),
            Arc::new(ArtifactJanitor::new()),
            Duration::from_secs(600),
            PathBuf::from("scripts"),
            snapshot(),
        )
    }

    async fn collect_events(
        pipeline: &JobPipeline,
        job: Job,
    ) -> (PipelineState, Vec<JobEvent>) {
        let (tx, mut rx) = mpsc::channel(32);
        let state = pipeline.run(job, tx).await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        (state, events)
    }

    #[tokio::test]
    async fn test_successful_job_emits_start_progress_complete() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(FakeEngine {
            percents: vec![10, 50, 100],
            behavior: FakeBehavior::Succeed,
        });
        let job = job_in(&dir, vec![Region::new(0, 0, 10, 10)]);

        let (state, events) = collect_events(&pipeline, job).await;

        assert_eq!(state, PipelineState::Complete);
        assert_eq!(events.first().unwrap().type_name(), "start");
        assert_eq!(events.last().unwrap().type_name(), "complete");
        assert_eq!(
            events.iter().filter(|e| e.is_terminal()).count(),
            1,
            "exactly one terminal event"
        );
    }

    #[tokio::test]
    async fn test_percent_sequence_is_monotonic() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(FakeEngine {
            percents: vec![10, 5, 50, 30, 90],
            behavior: FakeBehavior::Succeed,
        });
        let job = job_in(&dir, vec![Region::new(0, 0, 10, 10)]);

        let (_, events) = collect_events(&pipeline, job).await;

        let percents: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                JobEvent::Progress(p) => Some(p.percent),
                _ => None,
            })
            .collect();
        assert_eq!(percents, vec![10, 50, 90]);
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_empty_regions_fail_before_start() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(FakeEngine {
            percents: vec![],
            behavior: FakeBehavior::Succeed,
        });
        let job = job_in(&dir, vec![]);

        let (state, events) = collect_events(&pipeline, job).await;

        assert_eq!(state, PipelineState::Failed);
        assert_eq!(events.len(), 1);
        match &events[0] {
            JobEvent::Error { message, .. } => {
                assert!(message.contains("{x, y, width, height}"));
            }
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_silent_failure_is_failed_not_complete() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(FakeEngine {
            percents: vec![100],
            behavior: FakeBehavior::SucceedWithoutFile,
        });
        let job = job_in(&dir, vec![Region::new(0, 0, 10, 10)]);

        let (state, events) = collect_events(&pipeline, job).await;

        assert_eq!(state, PipelineState::Failed);
        let terminal = events.last().unwrap();
        assert_eq!(terminal.type_name(), "error");
    }

    #[tokio::test]
    async fn test_tool_failure_carries_diagnostic_tail() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(FakeEngine {
            percents: vec![],
            behavior: FakeBehavior::Fail(|| MediaError::ToolFailed {
                program: "ffmpeg".to_string(),
                exit_code: Some(1),
                stderr_tail: "decode error".to_string(),
            }),
        });
        let job = job_in(&dir, vec![Region::new(0, 0, 10, 10)]);

        let (state, events) = collect_events(&pipeline, job).await;

        assert_eq!(state, PipelineState::Failed);
        match events.last().unwrap() {
            JobEvent::Error { detail, .. } => {
                assert!(detail.as_deref().unwrap_or("").contains("decode error"));
            }
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_job_deletes_partial_output() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(FakeEngine {
            percents: vec![],
            behavior: FakeBehavior::Fail(|| MediaError::EngineReported("boom".to_string())),
        });
        let job = job_in(&dir, vec![Region::new(0, 0, 10, 10)]);
        // Simulate a partial artifact left on disk
        std::fs::write(&job.output_path, b"partial").unwrap();
        let output_path = job.output_path.clone();
        let input_path = job.input_path.clone();

        let (state, _) = collect_events(&pipeline, job).await;

        assert_eq!(state, PipelineState::Failed);
        assert!(!output_path.exists(), "partial output removed immediately");
        assert!(input_path.exists(), "input kept for the retention window");
    }

    #[tokio::test]
    async fn test_concurrent_jobs_stream_independently() {
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();

        let pipeline_a = pipeline(FakeEngine {
            percents: vec![20, 40, 60],
            behavior: FakeBehavior::Succeed,
        });
        let pipeline_b = pipeline(FakeEngine {
            percents: vec![5, 95],
            behavior: FakeBehavior::Succeed,
        });

        let job_a = job_in(&dir_a, vec![Region::new(0, 0, 10, 10)]);
        let job_b = job_in(&dir_b, vec![Region::new(5, 5, 20, 20)]);

        let ((state_a, events_a), (state_b, events_b)) = tokio::join!(
            collect_events(&pipeline_a, job_a),
            collect_events(&pipeline_b, job_b)
        );

        assert_eq!(state_a, PipelineState::Complete);
        assert_eq!(state_b, PipelineState::Complete);

        let percents = |events: &[JobEvent]| -> Vec<u8> {
            events
                .iter()
                .filter_map(|e| match e {
                    JobEvent::Progress(p) => Some(p.percent),
                    _ => None,
                })
                .collect()
        };
        assert_eq!(percents(&events_a), vec![20, 40, 60]);
        assert_eq!(percents(&events_b), vec![5, 95]);
    }
}
