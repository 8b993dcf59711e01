//! Stream event schemas.
//!
//! Every frame a client sees on the event stream is one [`JobEvent`],
//! serialized with a `type` tag of `start`, `progress`, `complete` or
//! `error`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{EngineSelection, Region};

/// Coarse processing stage reported alongside progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Engine is starting up (model load, warmup)
    Preparing,
    /// Frames are being processed
    Processing,
    /// Output is being finalized
    Finalizing,
}

/// Canonical, engine-agnostic progress shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Progress {
    pub stage: Stage,
    /// Completion percentage, clamped to 0-100
    pub percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_frames: Option<u64>,
}

impl Progress {
    /// A bare percentage update with no rate information.
    pub fn percent(stage: Stage, percent: u8) -> Self {
        Self {
            stage,
            percent,
            fps: None,
            speed: None,
            frame: None,
            total_frames: None,
        }
    }
}

/// Event envelope pushed to clients over the event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// Job accepted; echoes the resolved engine and regions
    Start {
        engine: EngineSelection,
        regions: Vec<Region>,
        output_name: String,
    },

    /// Normalized progress update with non-decreasing percent
    Progress(Progress),

    /// Terminal success
    Complete {
        filename: String,
        download_url: String,
        file_size: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        encoder_used: Option<String>,
    },

    /// Terminal failure
    Error {
        message: String,
        /// Bounded diagnostic tail, never the full tool output
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl JobEvent {
    pub fn start(engine: EngineSelection, regions: Vec<Region>, output_name: impl Into<String>) -> Self {
        JobEvent::Start {
            engine,
            regions,
            output_name: output_name.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        JobEvent::Error {
            message: message.into(),
            detail: None,
        }
    }

    pub fn error_with_detail(message: impl Into<String>, detail: impl Into<String>) -> Self {
        JobEvent::Error {
            message: message.into(),
            detail: Some(detail.into()),
        }
    }

    /// `true` for `complete` and `error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Complete { .. } | JobEvent::Error { .. })
    }

    /// The wire value of the `type` tag.
    pub fn type_name(&self) -> &'static str {
        match self {
            JobEvent::Start { .. } => "start",
            JobEvent::Progress(_) => "progress",
            JobEvent::Complete { .. } => "complete",
            JobEvent::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_event_wire_shape() {
        let event = JobEvent::Progress(Progress {
            stage: Stage::Processing,
            percent: 42,
            fps: Some(30.0),
            speed: Some(1.5),
            frame: None,
            total_frames: None,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["stage"], "processing");
        assert_eq!(json["percent"], 42);
        assert_eq!(json["speed"], 1.5);
        assert!(json.get("frame").is_none());
    }

    #[test]
    fn test_start_event_echoes_selection() {
        let event = JobEvent::start(
            EngineSelection::Filter,
            vec![Region::new(10, 10, 100, 50)],
            "unmark_abc.mp4",
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "start");
        assert_eq!(json["engine"]["kind"], "filter");
        assert_eq!(json["regions"][0]["width"], 100);
    }

    #[test]
    fn test_terminal_classification() {
        assert!(JobEvent::error("boom").is_terminal());
        assert!(!JobEvent::Progress(Progress::percent(Stage::Processing, 1)).is_terminal());
    }

    #[test]
    fn test_error_detail_omitted_when_absent() {
        let json = serde_json::to_value(JobEvent::error("boom")).unwrap();
        assert!(json.get("detail").is_none());
    }
}
