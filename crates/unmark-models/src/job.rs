//! Job descriptors.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::{EngineSelection, Quality, Region};

/// One accepted removal request.
///
/// A job is identified by its generated output filename, lives only in
/// the process that accepted it, and is owned by exactly one pipeline
/// task. Backing files are removed after a terminal event plus a
/// retention delay.
#[derive(Debug, Clone)]
pub struct Job {
    /// Generated output filename, doubles as the job identifier
    pub output_name: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub engine: EngineSelection,
    pub regions: Vec<Region>,
    pub quality: Quality,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Create a job rooted in `work_dir` for an already-saved input file.
    pub fn new(
        work_dir: &Path,
        input_path: PathBuf,
        engine: EngineSelection,
        regions: Vec<Region>,
        quality: Quality,
    ) -> Self {
        let output_name = Self::generate_output_name();
        let output_path = work_dir.join(&output_name);

        Self {
            output_name,
            input_path,
            output_path,
            engine,
            regions,
            quality,
            created_at: Utc::now(),
        }
    }

    /// Generate a collision-free output filename.
    pub fn generate_output_name() -> String {
        format!("unmark_{}.mp4", Uuid::new_v4().simple())
    }
}
