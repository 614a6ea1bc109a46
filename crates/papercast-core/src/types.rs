use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A calibration question asked before the script is written.
///
/// Models name the question text `prompt`, `q` or `question`; when several are
/// present `prompt` wins, then `question`, then `q`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "QuestionFields")]
pub struct Question {
    pub prompt: String,
    pub options: Vec<String>,
}

#[derive(Deserialize)]
struct QuestionFields {
    prompt: Option<String>,
    question: Option<String>,
    q: Option<String>,
    #[serde(default)]
    options: Vec<String>,
}

impl TryFrom<QuestionFields> for Question {
    type Error = String;

    fn try_from(fields: QuestionFields) -> Result<Self, Self::Error> {
        let prompt = fields
            .prompt
            .or(fields.question)
            .or(fields.q)
            .ok_or_else(|| "missing field `prompt`".to_string())?;
        Ok(Self {
            prompt,
            options: fields.options,
        })
    }
}

/// Structured data recovered from a question-generation response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedPayload {
    #[serde(default)]
    pub questions: Vec<Question>,
}

/// Answers keyed the way the client form names them: `q_0`, `q_1`, ...
pub type Answers = HashMap<String, String>;

/// Key under which the answer to question `index` is submitted.
pub fn answer_key(index: usize) -> String {
    format!("q_{index}")
}

/// A bounded, sentence-aligned slice of the podcast script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    pub index: usize,
    pub text: String,
}

impl TextChunk {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleKind {
    #[default]
    Int,
    Float,
}

/// PCM format descriptor shared by every clip of one podcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    #[serde(default)]
    pub sample_format: SampleKind,
}

impl AudioFormat {
    /// 16-bit signed integer PCM.
    pub fn pcm16(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 16,
            sample_format: SampleKind::Int,
        }
    }

    /// Bytes per interleaved frame (one sample for every channel).
    pub fn frame_size(&self) -> usize {
        self.channels as usize * self.bytes_per_sample()
    }

    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample as usize).div_ceil(8)
    }

    /// Whether this descriptor names a layout the stitcher can write.
    pub fn is_supported(&self) -> bool {
        let width_ok = match self.sample_format {
            SampleKind::Int => matches!(self.bits_per_sample, 8 | 16 | 24 | 32),
            SampleKind::Float => self.bits_per_sample == 32,
        };
        width_ok && self.channels > 0 && self.sample_rate > 0
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.sample_format {
            SampleKind::Int => "int",
            SampleKind::Float => "float",
        };
        write!(
            f,
            "{}Hz/{}ch/{}-bit {kind}",
            self.sample_rate, self.channels, self.bits_per_sample
        )
    }
}

/// Synthesized audio for one chunk: interleaved little-endian PCM frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub format: AudioFormat,
    pub data: Vec<u8>,
}

impl AudioClip {
    pub fn new(format: AudioFormat, data: Vec<u8>) -> Self {
        Self { format, data }
    }

    /// Number of whole frames, or `None` if the buffer is not frame aligned.
    pub fn frame_count(&self) -> Option<usize> {
        let frame = self.format.frame_size();
        if frame == 0 || self.data.len() % frame != 0 {
            return None;
        }
        Some(self.data.len() / frame)
    }

    pub fn duration(&self) -> Duration {
        frames_to_duration(self.frame_count().unwrap_or(0), self.format.sample_rate)
    }
}

/// The concatenated podcast audio, ready to be written out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StitchedAudio {
    pub format: AudioFormat,
    pub data: Vec<u8>,
}

impl StitchedAudio {
    pub fn frame_count(&self) -> usize {
        match self.format.frame_size() {
            0 => 0,
            frame => self.data.len() / frame,
        }
    }

    pub fn duration(&self) -> Duration {
        frames_to_duration(self.frame_count(), self.format.sample_rate)
    }
}

fn frames_to_duration(frames: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(frames as f64 / sample_rate as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_accepts_short_key() {
        let q: Question =
            serde_json::from_str(r#"{"q": "What is a CNN?", "options": ["yes", "no"]}"#).unwrap();
        assert_eq!(q.prompt, "What is a CNN?");
        assert_eq!(q.options, vec!["yes", "no"]);
    }

    #[test]
    fn test_question_options_default_empty() {
        let q: Question = serde_json::from_str(r#"{"prompt": "Background?"}"#).unwrap();
        assert!(q.options.is_empty());
    }

    #[test]
    fn test_question_prefers_prompt_over_aliases() {
        let q: Question = serde_json::from_str(
            r#"{"q": "short", "question": "long form", "prompt": "canonical", "options": []}"#,
        )
        .unwrap();
        assert_eq!(q.prompt, "canonical");

        let q: Question = serde_json::from_str(r#"{"q": "short", "question": "long form"}"#).unwrap();
        assert_eq!(q.prompt, "long form");
    }

    #[test]
    fn test_question_without_text_is_error() {
        let err = serde_json::from_str::<Question>(r#"{"options": ["a"]}"#).unwrap_err();
        assert!(err.to_string().contains("prompt"), "{err}");
    }

    #[test]
    fn test_frame_size() {
        assert_eq!(AudioFormat::pcm16(16_000, 1).frame_size(), 2);
        assert_eq!(AudioFormat::pcm16(44_100, 2).frame_size(), 4);
        let f24 = AudioFormat {
            sample_rate: 48_000,
            channels: 2,
            bits_per_sample: 24,
            sample_format: SampleKind::Int,
        };
        assert_eq!(f24.frame_size(), 6);
    }

    #[test]
    fn test_clip_frame_alignment() {
        let fmt = AudioFormat::pcm16(16_000, 2);
        assert_eq!(AudioClip::new(fmt, vec![0; 8]).frame_count(), Some(2));
        assert_eq!(AudioClip::new(fmt, vec![0; 7]).frame_count(), None);
    }

    #[test]
    fn test_clip_duration() {
        let clip = AudioClip::new(AudioFormat::pcm16(16_000, 1), vec![0; 32_000]);
        assert_eq!(clip.duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_unsupported_formats() {
        let mut fmt = AudioFormat::pcm16(16_000, 1);
        assert!(fmt.is_supported());
        fmt.bits_per_sample = 12;
        assert!(!fmt.is_supported());
        fmt.bits_per_sample = 16;
        fmt.channels = 0;
        assert!(!fmt.is_supported());
    }

    #[test]
    fn test_answer_key() {
        assert_eq!(answer_key(3), "q_3");
    }
}
