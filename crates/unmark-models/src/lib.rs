//! Shared data models for the Unmark backend.
//!
//! This crate provides Serde-serializable types for:
//! - Removal regions and their validation
//! - Engine identifiers, algorithms and quality hints
//! - Jobs and their generated artifact names
//! - Stream event schemas delivered to clients
//! - Capability snapshots produced by the prober

pub mod capability;
pub mod engine;
pub mod event;
pub mod job;
pub mod region;

// Re-export common types
pub use capability::{CapabilitySnapshot, EncoderCapability, ToolAvailability};
pub use engine::{
    EngineKind, EngineSelection, InpaintAlgorithm, ModelKind, Quality, UnknownIdentifier,
    DEFAULT_AI_BATCH_SIZE,
};
pub use event::{JobEvent, Progress, Stage};
pub use job::Job;
pub use region::{parse_regions, validate_regions, Region, RegionError};
