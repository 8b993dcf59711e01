//! Hardware/software capability probing with a TTL cache.
//!
//! Probing is expensive (one synthetic encode per candidate encoder),
//! so the computed snapshot is cached for a fixed TTL and replaced
//! wholesale on refresh. Refresh follows stale-check, recompute,
//! replace: concurrent refreshes may race, both recompute, and the last
//! write wins.

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use unmark_models::{CapabilitySnapshot, EncoderCapability, ToolAvailability};

/// How long a computed snapshot stays fresh.
pub const SNAPSHOT_TTL: Duration = Duration::from_secs(300);

/// Per-encoder synthetic encode timeout.
const ENCODER_TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Software fallback encoder, always probed last.
pub const SOFTWARE_ENCODER: &str = "libx264";

/// Candidate encoders in probe priority order for `platform`.
///
/// Platform-native accelerator first, vendor accelerators in a stable
/// order after it, software encoder always last. The first candidate
/// that passes the synthetic encode becomes the default for new jobs.
pub fn encoder_candidates(platform: &str) -> Vec<&'static str> {
    let mut candidates = Vec::new();
    if platform == "macos" {
        candidates.push("h264_videotoolbox");
    }
    candidates.extend(["h264_nvenc", "h264_amf", "h264_qsv"]);
    candidates.push(SOFTWARE_ENCODER);
    candidates
}

/// Everything except the software fallback is hardware-accelerated.
pub fn is_hardware_encoder(name: &str) -> bool {
    name != SOFTWARE_ENCODER
}

/// Verify candidates against a tester, keeping priority order.
///
/// Individual failures record absence rather than raising: an encoder
/// that fails or times out is simply left out of the working set.
pub async fn verify_encoders<F, Fut>(candidates: &[&'static str], test: F) -> Vec<EncoderCapability>
where
    F: Fn(&'static str) -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let mut working = Vec::new();
    for &name in candidates {
        if test(name).await {
            working.push(EncoderCapability {
                name: name.to_string(),
                hardware: is_hardware_encoder(name),
                verified: true,
            });
        } else {
            debug!(encoder = name, "encoder failed synthetic encode");
        }
    }
    working
}

/// A source of capability snapshots.
#[async_trait]
pub trait CapabilityProbe: Send + Sync {
    async fn probe(&self) -> CapabilitySnapshot;
}

/// Probes the real host: ffmpeg encoders, GPUs, and the Python runtime.
#[derive(Debug, Default)]
pub struct SystemProbe;

#[async_trait]
impl CapabilityProbe for SystemProbe {
    async fn probe(&self) -> CapabilitySnapshot {
        counter!("unmark_capability_probes_total").increment(1);

        let platform = std::env::consts::OS.to_string();
        let arch = std::env::consts::ARCH.to_string();
        let tools = probe_tools().await;
        let gpus = detect_gpus(&platform).await;

        let working_encoders = if tools.ffmpeg {
            verify_encoders(&encoder_candidates(&platform), test_encoder).await
        } else {
            warn!("ffmpeg not found; no encoders available");
            Vec::new()
        };

        info!(
            platform,
            gpus = gpus.len(),
            encoders = working_encoders.len(),
            python = tools.python,
            "capability probe finished"
        );

        CapabilitySnapshot {
            platform,
            arch,
            gpus,
            working_encoders,
            tools,
            probed_at: Utc::now(),
        }
    }
}

/// Run a trivial synthetic encode to verify an encoder actually works.
async fn test_encoder(name: &'static str) -> bool {
    let command = Command::new("ffmpeg")
        .args([
            "-hide_banner",
            "-y",
            "-f",
            "lavfi",
            "-i",
            "color=black:s=64x64:d=0.1",
            "-c:v",
            name,
            "-f",
            "null",
            "-",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .output();

    match tokio::time::timeout(ENCODER_TEST_TIMEOUT, command).await {
        Ok(Ok(output)) => output.status.success(),
        Ok(Err(e)) => {
            debug!(encoder = name, error = %e, "encoder test could not run");
            false
        }
        Err(_) => {
            warn!(encoder = name, "encoder test timed out");
            false
        }
    }
}

/// Enumerate GPU names via platform-specific inspection.
///
/// Absence of a working inspection tool yields an empty list, never an
/// error.
async fn detect_gpus(platform: &str) -> Vec<String> {
    match platform {
        "macos" => query_lines(
            "system_profiler",
            &["SPDisplaysDataType"],
            |line| {
                line.trim()
                    .strip_prefix("Chipset Model:")
                    .map(|name| name.trim().to_string())
            },
        )
        .await,
        _ => {
            query_lines(
                "nvidia-smi",
                &["--query-gpu=name", "--format=csv,noheader"],
                |line| {
                    let name = line.trim();
                    (!name.is_empty()).then(|| name.to_string())
                },
            )
            .await
        }
    }
}

async fn query_lines<F>(program: &str, args: &[&str], extract: F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await;

    match output {
        Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| extract(line))
            .collect(),
        _ => Vec::new(),
    }
}

/// Probe for the external tools the engines depend on.
async fn probe_tools() -> ToolAvailability {
    let ffmpeg = which::which("ffmpeg").is_ok();
    let ffprobe = which::which("ffprobe").is_ok();
    let python = which::which("python3").is_ok();

    let (opencv, torch) = if python {
        (
            python_import_ok("cv2, numpy").await,
            python_import_ok("torch").await,
        )
    } else {
        (false, false)
    };

    ToolAvailability {
        ffmpeg,
        ffprobe,
        python,
        opencv,
        torch,
    }
}

async fn python_import_ok(modules: &str) -> bool {
    Command::new("python3")
        .args(["-c", &format!("import {modules}")])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

struct CachedSnapshot {
    snapshot: Arc<CapabilitySnapshot>,
    computed_at: Instant,
}

/// TTL cache over a capability probe.
pub struct CapabilityCache {
    probe: Arc<dyn CapabilityProbe>,
    ttl: Duration,
    slot: RwLock<Option<CachedSnapshot>>,
}

impl CapabilityCache {
    pub fn new(probe: Arc<dyn CapabilityProbe>) -> Self {
        Self::with_ttl(probe, SNAPSHOT_TTL)
    }

    pub fn with_ttl(probe: Arc<dyn CapabilityProbe>, ttl: Duration) -> Self {
        Self {
            probe,
            ttl,
            slot: RwLock::new(None),
        }
    }

    /// Get the current snapshot, probing only when the cache is cold,
    /// past its TTL, or a refresh is forced.
    pub async fn snapshot(&self, force_refresh: bool) -> Arc<CapabilitySnapshot> {
        if !force_refresh {
            let slot = self.slot.read().await;
            if let Some(cached) = slot.as_ref() {
                if cached.computed_at.elapsed() < self.ttl {
                    return Arc::clone(&cached.snapshot);
                }
            }
        }

        let snapshot = Arc::new(self.probe.probe().await);
        let mut slot = self.slot.write().await;
        *slot = Some(CachedSnapshot {
            snapshot: Arc::clone(&snapshot),
            computed_at: Instant::now(),
        });
        snapshot
    }

    /// Peek at the cached snapshot without triggering a probe.
    ///
    /// Returns the snapshot and whether it is past its TTL.
    pub async fn peek(&self) -> Option<(Arc<CapabilitySnapshot>, bool)> {
        let slot = self.slot.read().await;
        slot.as_ref().map(|cached| {
            (
                Arc::clone(&cached.snapshot),
                cached.computed_at.elapsed() >= self.ttl,
            )
        })
    }

    /// Drop the cached snapshot so the next read re-probes.
    pub async fn invalidate(&self) {
        *self.slot.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProbe {
        calls: AtomicUsize,
    }

    impl CountingProbe {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }

        fn count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CapabilityProbe for CountingProbe {
        async fn probe(&self) -> CapabilitySnapshot {
            self.calls.fetch_add(1, Ordering::SeqCst);
            CapabilitySnapshot {
                platform: "linux".to_string(),
                arch: "x86_64".to_string(),
                gpus: vec![],
                working_encoders: vec![],
                tools: ToolAvailability::default(),
                probed_at: Utc::now(),
            }
        }
    }

    #[tokio::test]
    async fn test_reads_within_ttl_probe_once() {
        let probe = CountingProbe::new();
        let cache = CapabilityCache::with_ttl(Arc::clone(&probe) as Arc<dyn CapabilityProbe>, Duration::from_secs(300));

        for _ in 0..5 {
            cache.snapshot(false).await;
        }
        assert_eq!(probe.count(), 1);
    }

    #[tokio::test]
    async fn test_expired_cache_reprobes_once() {
        let probe = CountingProbe::new();
        let cache = CapabilityCache::with_ttl(Arc::clone(&probe) as Arc<dyn CapabilityProbe>, Duration::ZERO);

        cache.snapshot(false).await;
        cache.snapshot(false).await;
        assert_eq!(probe.count(), 2);
    }

    #[tokio::test]
    async fn test_force_refresh_reprobes() {
        let probe = CountingProbe::new();
        let cache = CapabilityCache::with_ttl(Arc::clone(&probe) as Arc<dyn CapabilityProbe>, Duration::from_secs(300));

        cache.snapshot(false).await;
        cache.snapshot(true).await;
        assert_eq!(probe.count(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_drops_cached_snapshot() {
        let probe = CountingProbe::new();
        let cache = CapabilityCache::with_ttl(Arc::clone(&probe) as Arc<dyn CapabilityProbe>, Duration::from_secs(300));

        cache.snapshot(false).await;
        cache.invalidate().await;
        assert!(cache.peek().await.is_none());
        cache.snapshot(false).await;
        assert_eq!(probe.count(), 2);
    }

    #[tokio::test]
    async fn test_third_priority_candidate_becomes_default() {
        let candidates = ["h264_nvenc", "h264_amf", "h264_qsv", "libx264"];
        let working = verify_encoders(&candidates, |name| async move { name == "h264_qsv" }).await;

        assert_eq!(working.len(), 1);
        assert_eq!(working[0].name, "h264_qsv");
        assert!(working[0].hardware);
    }

    #[tokio::test]
    async fn test_verified_encoders_keep_priority_order() {
        let candidates = ["h264_nvenc", "h264_qsv", "libx264"];
        let working = verify_encoders(&candidates, |name| async move { name != "h264_nvenc" }).await;

        let names: Vec<_> = working.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["h264_qsv", "libx264"]);
        assert!(!working[1].hardware);
    }

    #[test]
    fn test_platform_priority_order() {
        let mac = encoder_candidates("macos");
        assert_eq!(mac[0], "h264_videotoolbox");
        assert_eq!(*mac.last().unwrap(), SOFTWARE_ENCODER);

        let linux = encoder_candidates("linux");
        assert_eq!(linux[0], "h264_nvenc");
        assert_eq!(*linux.last().unwrap(), SOFTWARE_ENCODER);
    }
}
