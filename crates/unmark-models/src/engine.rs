//! Engine identifiers and request options.
//!
//! Unknown identifiers are rejected here, at the boundary, before any
//! variant dispatch happens downstream.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Default number of frames the AI engine pushes to the GPU at once.
pub const DEFAULT_AI_BATCH_SIZE: u32 = 8;

/// An identifier in a request that does not name a known variant.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {field}: {value:?}")]
pub struct UnknownIdentifier {
    pub field: &'static str,
    pub value: String,
}

impl UnknownIdentifier {
    fn new(field: &'static str, value: &str) -> Self {
        Self {
            field,
            value: value.to_string(),
        }
    }
}

/// The closed set of processing engine families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Single-pass ffmpeg delogo filter chain
    Filter,
    /// Classical OpenCV inpainting
    Inpaint,
    /// Trained video inpainting model
    AiModel,
}

impl EngineKind {
    /// Parse the `method` request field.
    pub fn parse(value: &str) -> Result<Self, UnknownIdentifier> {
        match value.to_ascii_lowercase().as_str() {
            "filter" => Ok(EngineKind::Filter),
            "inpaint" => Ok(EngineKind::Inpaint),
            "ai" => Ok(EngineKind::AiModel),
            _ => Err(UnknownIdentifier::new("method", value)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Filter => "filter",
            EngineKind::Inpaint => "inpaint",
            EngineKind::AiModel => "ai",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classical inpainting algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum InpaintAlgorithm {
    /// Fast marching method
    Telea,
    /// Navier-Stokes, smoother but slower
    Ns,
}

impl InpaintAlgorithm {
    pub fn parse(value: &str) -> Result<Self, UnknownIdentifier> {
        match value.to_ascii_uppercase().as_str() {
            "TELEA" => Ok(InpaintAlgorithm::Telea),
            "NS" => Ok(InpaintAlgorithm::Ns),
            _ => Err(UnknownIdentifier::new("algorithm", value)),
        }
    }

    /// Wire value passed to the engine script.
    pub fn as_str(&self) -> &'static str {
        match self {
            InpaintAlgorithm::Telea => "TELEA",
            InpaintAlgorithm::Ns => "NS",
        }
    }
}

/// Pretrained video inpainting model families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModelKind {
    /// Spatial-temporal transformer
    Sttn,
    /// Large-mask inpainting with Fourier convolutions
    Lama,
    /// Propagation-based inpainting with dual-domain attention
    Propainter,
}

impl ModelKind {
    pub fn parse(value: &str) -> Result<Self, UnknownIdentifier> {
        match value.to_ascii_uppercase().as_str() {
            "STTN" => Ok(ModelKind::Sttn),
            "LAMA" => Ok(ModelKind::Lama),
            "PROPAINTER" => Ok(ModelKind::Propainter),
            _ => Err(UnknownIdentifier::new("algorithm", value)),
        }
    }

    /// Wire value passed to the engine script.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Sttn => "STTN",
            ModelKind::Lama => "LAMA",
            ModelKind::Propainter => "PROPAINTER",
        }
    }
}

/// Output quality hint, mapped to encoder parameters per encoder family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Low,
    Medium,
    #[default]
    High,
}

impl Quality {
    pub fn parse(value: &str) -> Result<Self, UnknownIdentifier> {
        match value.to_ascii_lowercase().as_str() {
            "low" => Ok(Quality::Low),
            "medium" => Ok(Quality::Medium),
            "high" => Ok(Quality::High),
            _ => Err(UnknownIdentifier::new("quality", value)),
        }
    }
}

/// A fully-resolved engine choice for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineSelection {
    Filter,
    Inpaint {
        algorithm: InpaintAlgorithm,
    },
    AiModel {
        model: ModelKind,
        batch_size: u32,
    },
}

impl EngineSelection {
    pub fn kind(&self) -> EngineKind {
        match self {
            EngineSelection::Filter => EngineKind::Filter,
            EngineSelection::Inpaint { .. } => EngineKind::Inpaint,
            EngineSelection::AiModel { .. } => EngineKind::AiModel,
        }
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        self.kind().as_str()
    }
}
