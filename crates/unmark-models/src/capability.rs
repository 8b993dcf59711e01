//! Capability snapshot types.
//!
//! The snapshot is computed by the prober in `unmark-media` and shared
//! process-wide as an immutable aggregate.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Result of probing one candidate encoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EncoderCapability {
    /// ffmpeg encoder name, e.g. `h264_nvenc`
    pub name: String,
    /// Hardware-accelerated (everything except the software fallback)
    pub hardware: bool,
    /// Passed the synthetic encode test
    pub verified: bool,
}

/// Availability of the external tools the engines depend on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ToolAvailability {
    pub ffmpeg: bool,
    pub ffprobe: bool,
    /// Python 3 interpreter on PATH
    pub python: bool,
    /// `cv2` + `numpy` importable (classical inpainting)
    pub opencv: bool,
    /// `torch` importable (AI models)
    pub torch: bool,
}

/// Immutable aggregate of everything the prober discovered.
///
/// Read-mostly and shared across jobs; replaced wholesale on refresh.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CapabilitySnapshot {
    /// Operating system, e.g. `linux`, `macos`
    pub platform: String,
    pub arch: String,
    /// Human-readable GPU names, empty when none were detected
    pub gpus: Vec<String>,
    /// Encoders that passed the synthetic encode, best first
    pub working_encoders: Vec<EncoderCapability>,
    pub tools: ToolAvailability,
    pub probed_at: DateTime<Utc>,
}

impl CapabilitySnapshot {
    /// Default encoder for new jobs: the first working entry.
    pub fn default_encoder(&self) -> Option<&EncoderCapability> {
        self.working_encoders.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_encoder_is_first_working() {
        let snapshot = CapabilitySnapshot {
            platform: "linux".to_string(),
            arch: "x86_64".to_string(),
            gpus: vec![],
            working_encoders: vec![
                EncoderCapability {
                    name: "h264_qsv".to_string(),
                    hardware: true,
                    verified: true,
                },
                EncoderCapability {
                    name: "libx264".to_string(),
                    hardware: false,
                    verified: true,
                },
            ],
            tools: ToolAvailability::default(),
            probed_at: Utc::now(),
        };
        assert_eq!(snapshot.default_encoder().unwrap().name, "h264_qsv");
    }
}
