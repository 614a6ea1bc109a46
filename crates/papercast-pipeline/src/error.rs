use thiserror::Error;

use papercast_core::error::UpstreamError;
use papercast_media::StitchError;
use papercast_providers::extract::ExtractionError;

use crate::document::{DocumentError, TokenError};
use crate::stage::{PipelineStage, TransitionError};

/// Why a stage failed.
#[derive(Debug, Error)]
pub enum PipelineErrorKind {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    InvalidToken(#[from] TokenError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("every chunk failed to synthesize (chunks {failed:?}); last error: {last}")]
    Synthesis { failed: Vec<usize>, last: String },

    #[error(transparent)]
    Stitch(#[from] StitchError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl PipelineErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Document(_) => "document",
            Self::InvalidToken(_) => "invalid_token",
            Self::Extraction(_) => "extraction",
            Self::Upstream(_) => "upstream",
            Self::Synthesis { .. } => "synthesis",
            Self::Stitch(_) => "stitch",
            Self::Io(_) => "io",
            Self::Transition(_) => "transition",
        }
    }
}

/// A request failed while working towards `stage`.
#[derive(Debug, Error)]
#[error("{stage} failed: {kind}")]
pub struct PipelineError {
    pub stage: PipelineStage,
    #[source]
    pub kind: PipelineErrorKind,
}

impl PipelineError {
    pub fn new(stage: PipelineStage, kind: impl Into<PipelineErrorKind>) -> Self {
        Self {
            stage,
            kind: kind.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(&self.kind, PipelineErrorKind::Upstream(e) if e.is_timeout())
    }

    /// Raw model output, when the failure was an extraction failure.
    pub fn raw_response(&self) -> Option<&str> {
        match &self.kind {
            PipelineErrorKind::Extraction(e) => Some(&e.raw),
            _ => None,
        }
    }
}
