#![deny(unreachable_patterns)]
//! External tool orchestration for the Unmark backend.
//!
//! This crate provides:
//! - Capability probing (platform, GPUs, working encoders) with a TTL cache
//! - Subprocess execution with incremental output capture
//! - Progress normalization from heterogeneous tool output
//! - The closed set of removal engines behind one execute contract

pub mod capability;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod exec;
pub mod filter;
pub mod probe;
pub mod progress;

pub use capability::{CapabilityCache, CapabilityProbe, SystemProbe, SNAPSHOT_TTL};
pub use engine::{Engine, EngineContext, EngineOutcome, ProgressSender, RemovalEngine};
pub use error::{MediaError, MediaResult};
pub use exec::{run_streaming, OutputLine, ProcessOutput};
pub use probe::{media_info, MediaInfo};
pub use progress::{parse_engine_line, EngineMessage, FfmpegProgressParser, ProgressGate};
