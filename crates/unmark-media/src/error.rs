//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while driving external tools.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("ffmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("ffprobe not found in PATH")]
    FfprobeNotFound,

    #[error("{tool} is required but not available; {hint}")]
    ToolUnavailable { tool: String, hint: String },

    #[error("failed to spawn {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with status {exit_code:?}")]
    ToolFailed {
        program: String,
        exit_code: Option<i32>,
        /// Bounded tail of stderr, for diagnostics
        stderr_tail: String,
    },

    /// The engine itself reported a structured failure on stdout.
    #[error("engine failed: {0}")]
    EngineReported(String),

    /// Zero exit status but no output file. Treated as a failure: the
    /// output file is the authoritative success signal.
    #[error("{program} reported success but produced no output at {path}")]
    OutputMissing { program: String, path: PathBuf },

    #[error("ffprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("invalid video file: {0}")]
    InvalidVideo(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Create a tool-unavailable error with a remediation hint.
    pub fn tool_unavailable(tool: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::ToolUnavailable {
            tool: tool.into(),
            hint: hint.into(),
        }
    }

    /// The bounded diagnostic tail, when this error carries one.
    pub fn diagnostic_tail(&self) -> Option<&str> {
        match self {
            MediaError::ToolFailed { stderr_tail, .. } if !stderr_tail.is_empty() => {
                Some(stderr_tail)
            }
            MediaError::FfprobeFailed {
                stderr: Some(stderr),
                ..
            } => Some(stderr),
            _ => None,
        }
    }
}
