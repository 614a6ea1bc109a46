//! Media pipeline: sentence chunking, speech synthesis and audio stitching.

pub mod chunker;
pub mod stitch;
pub mod tts;
pub mod wav;

pub use chunker::{SentenceChunker, chunk_text};
pub use stitch::{AudioStitcher, StitchError};
pub use tts::{SpeechSynthesizer, SynthesisError, VoiceConfig};
