//! WAV container encode/decode between hound and raw little-endian PCM frames.

use std::io::{Read, Seek, Write};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use thiserror::Error;

use papercast_core::types::{AudioClip, AudioFormat, SampleKind};

#[derive(Debug, Error)]
pub enum WavError {
    #[error("WAV error: {0}")]
    Hound(#[from] hound::Error),

    #[error("unsupported PCM layout: {0}")]
    Unsupported(AudioFormat),

    #[error("PCM buffer of {len} bytes is not a whole number of {frame}-byte frames")]
    Misaligned { len: usize, frame: usize },
}

pub fn spec_to_format(spec: WavSpec) -> AudioFormat {
    AudioFormat {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        bits_per_sample: spec.bits_per_sample,
        sample_format: match spec.sample_format {
            SampleFormat::Int => SampleKind::Int,
            SampleFormat::Float => SampleKind::Float,
        },
    }
}

pub fn format_to_spec(format: &AudioFormat) -> WavSpec {
    WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: format.bits_per_sample,
        sample_format: match format.sample_format {
            SampleKind::Int => SampleFormat::Int,
            SampleKind::Float => SampleFormat::Float,
        },
    }
}

/// Decode a WAV container into a clip of raw frames.
pub fn decode_wav<R: Read>(reader: R) -> Result<AudioClip, WavError> {
    let mut wav = WavReader::new(reader)?;
    let format = spec_to_format(wav.spec());
    if !format.is_supported() {
        return Err(WavError::Unsupported(format));
    }

    let mut data = Vec::with_capacity(wav.len() as usize * format.bytes_per_sample());
    match (format.sample_format, format.bits_per_sample) {
        (SampleKind::Float, _) => {
            for sample in wav.samples::<f32>() {
                data.extend_from_slice(&sample?.to_le_bytes());
            }
        }
        (SampleKind::Int, 8) => {
            for sample in wav.samples::<i8>() {
                data.extend_from_slice(&sample?.to_le_bytes());
            }
        }
        (SampleKind::Int, 16) => {
            for sample in wav.samples::<i16>() {
                data.extend_from_slice(&sample?.to_le_bytes());
            }
        }
        (SampleKind::Int, bits) => {
            let width = bits as usize / 8;
            for sample in wav.samples::<i32>() {
                data.extend_from_slice(&sample?.to_le_bytes()[..width]);
            }
        }
    }

    Ok(AudioClip::new(format, data))
}

/// Write raw frames as a WAV container.
pub fn write_wav<W: Write + Seek>(
    writer: W,
    format: &AudioFormat,
    data: &[u8],
) -> Result<(), WavError> {
    if !format.is_supported() {
        return Err(WavError::Unsupported(*format));
    }
    let frame = format.frame_size();
    if data.len() % frame != 0 {
        return Err(WavError::Misaligned {
            len: data.len(),
            frame,
        });
    }

    let mut wav = WavWriter::new(writer, format_to_spec(format))?;
    let width = format.bytes_per_sample();
    for bytes in data.chunks_exact(width) {
        match (format.sample_format, width) {
            (SampleKind::Float, _) => {
                wav.write_sample(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))?
            }
            (SampleKind::Int, 1) => wav.write_sample(bytes[0] as i8)?,
            (SampleKind::Int, 2) => wav.write_sample(i16::from_le_bytes([bytes[0], bytes[1]]))?,
            (SampleKind::Int, 3) => {
                // Sign-extend the 24-bit sample.
                let value = i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8;
                wav.write_sample(value)?
            }
            (SampleKind::Int, _) => {
                wav.write_sample(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))?
            }
        }
    }
    wav.finalize()?;
    Ok(())
}

/// Encode frames into an in-memory WAV file.
pub fn encode_wav(format: &AudioFormat, data: &[u8]) -> Result<Vec<u8>, WavError> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    write_wav(&mut cursor, format, data)?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn make_wav_data(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_decode_pcm16_mono() {
        let wav = make_wav_data(16_000, 1, &[100, -200, 300]);
        let clip = decode_wav(Cursor::new(wav)).unwrap();
        assert_eq!(clip.format, AudioFormat::pcm16(16_000, 1));
        assert_eq!(clip.data, vec![100, 0, 0x38, 0xff, 0x2c, 0x01]);
    }

    #[test]
    fn test_decode_keeps_stereo_interleaving() {
        let wav = make_wav_data(24_000, 2, &[1, 2, 3, 4]);
        let clip = decode_wav(Cursor::new(wav)).unwrap();
        assert_eq!(clip.format.channels, 2);
        assert_eq!(clip.frame_count(), Some(2));
    }

    #[test]
    fn test_invalid_wav_rejected() {
        assert!(matches!(
            decode_wav(Cursor::new(vec![0u8, 1, 2, 3, 4, 5])),
            Err(WavError::Hound(_))
        ));
    }

    #[test]
    fn test_encode_then_read_samples() {
        let format = AudioFormat::pcm16(22_050, 1);
        let data: Vec<u8> = [5i16, -5, 1000]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let bytes = encode_wav(&format, &data).unwrap();
        let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, 22_050);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![5, -5, 1000]);
    }

    #[test]
    fn test_24_bit_sign_extension() {
        let format = AudioFormat {
            sample_rate: 48_000,
            channels: 1,
            bits_per_sample: 24,
            sample_format: SampleKind::Int,
        };
        let data: Vec<u8> = [-1_000_000i32, 8_000_000]
            .iter()
            .flat_map(|s| s.to_le_bytes()[..3].to_vec())
            .collect();
        let bytes = encode_wav(&format, &data).unwrap();
        let clip = decode_wav(Cursor::new(bytes)).unwrap();
        assert_eq!(clip.data, data);
    }

    #[test]
    fn test_misaligned_buffer_rejected() {
        let err = encode_wav(&AudioFormat::pcm16(16_000, 1), &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, WavError::Misaligned { len: 3, frame: 2 }));
    }
}
