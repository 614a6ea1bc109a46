//! Request lifecycle stages and a tracker that only moves forward.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Uploaded,
    Extracted,
    QuestionsGenerated,
    AnswersCollected,
    ScriptGenerated,
    Chunked,
    Synthesized,
    Stitched,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 8] = [
        PipelineStage::Uploaded,
        PipelineStage::Extracted,
        PipelineStage::QuestionsGenerated,
        PipelineStage::AnswersCollected,
        PipelineStage::ScriptGenerated,
        PipelineStage::Chunked,
        PipelineStage::Synthesized,
        PipelineStage::Stitched,
    ];

    /// The stage that follows this one, `None` once stitched.
    pub fn next(self) -> Option<PipelineStage> {
        let pos = Self::ALL.iter().position(|s| *s == self)?;
        Self::ALL.get(pos + 1).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Extracted => "extracted",
            Self::QuestionsGenerated => "questions_generated",
            Self::AnswersCollected => "answers_collected",
            Self::ScriptGenerated => "script_generated",
            Self::Chunked => "chunked",
            Self::Synthesized => "synthesized",
            Self::Stitched => "stitched",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal stage transition {from} -> {to}")]
pub struct TransitionError {
    pub from: PipelineStage,
    pub to: PipelineStage,
}

/// Tracks one request's position in the lifecycle.
#[derive(Debug, Clone)]
pub struct StageTracker {
    token: String,
    current: PipelineStage,
}

impl StageTracker {
    pub fn new(token: impl Into<String>, start: PipelineStage) -> Self {
        Self {
            token: token.into(),
            current: start,
        }
    }

    pub fn current(&self) -> PipelineStage {
        self.current
    }

    /// The stage being worked towards; the last stage once stitched.
    pub fn pending(&self) -> PipelineStage {
        self.current.next().unwrap_or(self.current)
    }

    /// Move exactly one step forward.
    pub fn advance(&mut self, to: PipelineStage) -> Result<(), TransitionError> {
        if self.current.next() != Some(to) {
            warn!(token = %self.token, from = %self.current, to = %to, "Rejected stage transition");
            return Err(TransitionError {
                from: self.current,
                to,
            });
        }
        info!(token = %self.token, from = %self.current, stage = %to, "Stage complete");
        self.current = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_forward_walk() {
        let mut tracker = StageTracker::new("t", PipelineStage::Uploaded);
        for stage in &PipelineStage::ALL[1..] {
            tracker.advance(*stage).unwrap();
        }
        assert_eq!(tracker.current(), PipelineStage::Stitched);
        assert_eq!(tracker.pending(), PipelineStage::Stitched);
    }

    #[test]
    fn test_rejects_backwards_and_skips() {
        let mut tracker = StageTracker::new("t", PipelineStage::ScriptGenerated);
        let err = tracker.advance(PipelineStage::Extracted).unwrap_err();
        assert_eq!(err.from, PipelineStage::ScriptGenerated);
        assert!(tracker.advance(PipelineStage::Synthesized).is_err());
        assert!(tracker.advance(PipelineStage::ScriptGenerated).is_err());
        assert_eq!(tracker.current(), PipelineStage::ScriptGenerated);
        assert_eq!(tracker.pending(), PipelineStage::Chunked);
    }

    #[test]
    fn test_stage_serializes_snake_case() {
        let json = serde_json::to_string(&PipelineStage::QuestionsGenerated).unwrap();
        assert_eq!(json, "\"questions_generated\"");
        assert_eq!(PipelineStage::QuestionsGenerated.to_string(), "questions_generated");
    }
}
