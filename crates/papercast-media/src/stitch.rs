//! Concatenation of synthesized clips into one WAV file.
//!
//! Stitching happens in memory. Publishing writes to a temporary file in a
//! staging directory next to the output directory and renames it into place,
//! so the served directory only ever holds complete files.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

use papercast_core::types::{AudioClip, AudioFormat, StitchedAudio};

use crate::wav::{WavError, write_wav};

#[derive(Debug, Error)]
pub enum StitchError {
    #[error("no clips to stitch")]
    Empty,

    #[error("clip {index} is {found}, expected {expected}")]
    FormatMismatch {
        index: usize,
        expected: AudioFormat,
        found: AudioFormat,
    },

    #[error("clip {index} could not be decoded: {reason}")]
    DecodeFailure { index: usize, reason: String },

    #[error("failed to write podcast audio: {0}")]
    Io(#[from] std::io::Error),
}

impl From<WavError> for StitchError {
    fn from(err: WavError) -> Self {
        match err {
            WavError::Hound(hound::Error::IoError(io)) => StitchError::Io(io),
            other => StitchError::Io(std::io::Error::other(other.to_string())),
        }
    }
}

const STAGING_DIR: &str = ".papercast-staging";

/// Joins ordered clips and writes the result under `output_dir`.
#[derive(Debug, Clone)]
pub struct AudioStitcher {
    output_dir: PathBuf,
}

impl AudioStitcher {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Sibling of `output_dir` holding in-progress writes. It shares the
    /// output directory's filesystem so the final rename stays atomic.
    pub fn staging_dir(&self) -> PathBuf {
        match self.output_dir.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.join(STAGING_DIR),
            Some(_) => PathBuf::from(STAGING_DIR),
            None => self.output_dir.join(STAGING_DIR),
        }
    }

    /// Concatenate `clips` in order. Every clip must share the first clip's format.
    pub fn stitch(&self, clips: &[AudioClip]) -> Result<StitchedAudio, StitchError> {
        let first = clips.first().ok_or(StitchError::Empty)?;
        let format = first.format;

        let mut total = 0;
        for (index, clip) in clips.iter().enumerate() {
            if clip.format != format {
                return Err(StitchError::FormatMismatch {
                    index,
                    expected: format,
                    found: clip.format,
                });
            }
            if !clip.format.is_supported() {
                return Err(StitchError::DecodeFailure {
                    index,
                    reason: format!("unsupported PCM layout {}", clip.format),
                });
            }
            if clip.frame_count().is_none() {
                return Err(StitchError::DecodeFailure {
                    index,
                    reason: format!(
                        "{} bytes is not a whole number of {}-byte frames",
                        clip.data.len(),
                        format.frame_size()
                    ),
                });
            }
            total += clip.data.len();
        }

        let mut data = Vec::with_capacity(total);
        for clip in clips {
            data.extend_from_slice(&clip.data);
        }

        let stitched = StitchedAudio { format, data };
        debug!(
            clips = clips.len(),
            frames = stitched.frame_count(),
            %format,
            "Stitched clips"
        );
        Ok(stitched)
    }

    /// Write `audio` as `output_dir/file_name`, replacing any previous file atomically.
    pub fn publish(&self, audio: &StitchedAudio, file_name: &str) -> Result<PathBuf, StitchError> {
        let staging = self.staging_dir();
        std::fs::create_dir_all(&self.output_dir)?;
        std::fs::create_dir_all(&staging)?;
        let target = self.output_dir.join(file_name);

        let mut tmp = NamedTempFile::new_in(&staging)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            write_wav(&mut writer, &audio.format, &audio.data)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| StitchError::Io(e.error))?;

        info!(
            path = %target.display(),
            duration_secs = audio.duration().as_secs_f64(),
            "Podcast audio written"
        );
        Ok(target)
    }

    /// Stitch and publish in one step.
    pub fn stitch_to_file(&self, clips: &[AudioClip], file_name: &str) -> Result<PathBuf, StitchError> {
        let audio = self.stitch(clips)?;
        self.publish(&audio, file_name)
    }
}
