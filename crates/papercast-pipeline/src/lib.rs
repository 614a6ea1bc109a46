//! Document-to-podcast orchestration.
//!
//! A request moves through [`PipelineStage`]s: the document is ingested, the
//! model asks calibration questions, the answers shape a script, and the
//! script is chunked, synthesized and stitched into one audio file.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub mod document;
pub mod error;
pub mod pipeline;
pub mod prompt;
pub mod stage;
pub mod synth;

pub use document::{DocumentError, DocumentToken};
pub use error::{PipelineError, PipelineErrorKind};
pub use pipeline::Pipeline;
pub use stage::{PipelineStage, StageTracker};

/// Result of a completed podcast run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodcastOutcome {
    pub token: DocumentToken,
    pub audio_path: PathBuf,
    pub file_name: String,
    pub title: String,
    pub transcript: String,
    pub chunk_count: usize,
    /// Chunks left out of the audio because synthesis failed.
    pub failed_chunks: Vec<usize>,
    pub duration_secs: f64,
}
