//! Temp artifact lifecycle management.
//!
//! Inputs and outputs are ephemeral: each path gets a one-shot deletion
//! after its retention window, and failed jobs lose their partial
//! output immediately. Deletion is idempotent, and cleanup failures are
//! logged, never propagated — by the time they can happen the job has
//! already terminated.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

/// Schedules one-shot deletions for job artifacts.
#[derive(Debug, Default)]
pub struct ArtifactJanitor;

impl ArtifactJanitor {
    pub fn new() -> Self {
        Self
    }

    /// Arm a one-shot deletion of `path` after `delay`.
    pub fn schedule(&self, path: impl Into<PathBuf>, delay: Duration) {
        let path = path.into();
        debug!(path = %path.display(), delay_secs = delay.as_secs(), "scheduling artifact removal");

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            remove_quietly(&path).await;
        });
    }

    /// Delete `path` immediately (failure cleanup).
    pub async fn delete_now(&self, path: &Path) {
        remove_quietly(path).await;
    }
}

/// Remove a file, treating an already-missing path as a no-op.
async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed artifact"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove artifact"),
    }
}
