//! Speech synthesis: one bounded text chunk in, one audio clip out.
//!
//! Implementations make exactly one request per call; retries are the
//! caller's decision.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use papercast_core::config::TtsConfig;
use papercast_core::error::UpstreamError;
use papercast_core::types::{AudioClip, AudioFormat, TextChunk};

use crate::wav::decode_wav;

const GOOGLE_BASE_URL: &str = "https://texttospeech.googleapis.com";
const GOOGLE_DEFAULT_VOICE: &str = "en-US-Neural2-D";
const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";
const ELEVENLABS_DEFAULT_VOICE: &str = "21m00Tcm4TlvDq8ikWAM"; // ElevenLabs "Rachel"
const ELEVENLABS_DEFAULT_MODEL: &str = "eleven_multilingual_v2";

/// Voice selection for one podcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceConfig {
    pub language_code: String,
    pub voice_id: Option<String>,
    pub sample_rate: u32,
}

impl VoiceConfig {
    pub fn from_config(config: &TtsConfig) -> Self {
        Self {
            language_code: config.language_code.clone(),
            voice_id: config.voice.clone(),
            sample_rate: config.sample_rate,
        }
    }
}

/// Synthesis of one chunk failed.
#[derive(Debug, Clone, Error)]
#[error("synthesis of chunk {index} failed: {source}")]
pub struct SynthesisError {
    pub index: usize,
    #[source]
    pub source: UpstreamError,
}

impl SynthesisError {
    pub fn new(index: usize, source: UpstreamError) -> Self {
        Self { index, source }
    }
}

/// Converts one bounded text chunk into a single audio clip.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Provider identifier (e.g., "google", "elevenlabs").
    fn id(&self) -> &str;

    async fn synthesize(
        &self,
        chunk: &TextChunk,
        voice: &VoiceConfig,
    ) -> Result<AudioClip, SynthesisError>;
}

/// Build the synthesizer named in config.
pub fn synthesizer_from_config(config: &TtsConfig) -> Result<Arc<dyn SpeechSynthesizer>, UpstreamError> {
    let api_key = config.resolve_api_key();
    match config.provider.as_str() {
        "google" => Ok(Arc::new(GoogleTts::new(config.base_url.as_deref(), api_key))),
        "elevenlabs" => Ok(Arc::new(ElevenLabsTts::from_config(config))),
        other => Err(UpstreamError::invalid(other, "unsupported TTS provider")),
    }
}

async fn error_for_status(
    service: &str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, UpstreamError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(UpstreamError::Status {
        service: service.to_string(),
        status,
        body,
    })
}

// --- Google Cloud Text-to-Speech ---

/// Google Cloud TTS, `LINEAR16` output (a WAV container, base64 encoded).
pub struct GoogleTts {
    pub base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleSynthesizeResponse {
    audio_content: String,
}

impl GoogleTts {
    const SERVICE: &'static str = "google-tts";

    pub fn new(base_url: Option<&str>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(GOOGLE_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn request_body(chunk: &TextChunk, voice: &VoiceConfig) -> serde_json::Value {
        json!({
            "input": { "text": chunk.text },
            "voice": google_voice(voice),
            "audioConfig": {
                "audioEncoding": "LINEAR16",
                "sampleRateHertz": voice.sample_rate,
            }
        })
    }

    async fn request(&self, chunk: &TextChunk, voice: &VoiceConfig) -> Result<AudioClip, UpstreamError> {
        let api_key = self.api_key.as_ref().ok_or_else(|| UpstreamError::MissingCredentials {
            service: Self::SERVICE.into(),
        })?;

        let url = format!("{}/v1/text:synthesize?key={api_key}", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&Self::request_body(chunk, voice))
            .send()
            .await
            .map_err(|e| UpstreamError::transport(Self::SERVICE, e))?;
        let resp = error_for_status(Self::SERVICE, resp).await?;

        let body: GoogleSynthesizeResponse = resp
            .json()
            .await
            .map_err(|e| UpstreamError::invalid(Self::SERVICE, e.to_string()))?;
        decode_google_audio(&body.audio_content)
    }
}

/// Voice selection for Google. Without an explicit voice only the language is
/// sent and Google picks a voice for it; the built-in default only applies to
/// its own language.
fn google_voice(voice: &VoiceConfig) -> serde_json::Value {
    let name = voice.voice_id.as_deref().or_else(|| {
        GOOGLE_DEFAULT_VOICE
            .starts_with(&format!("{}-", voice.language_code))
            .then_some(GOOGLE_DEFAULT_VOICE)
    });
    match name {
        Some(name) => json!({ "languageCode": voice.language_code, "name": name }),
        None => json!({ "languageCode": voice.language_code }),
    }
}

fn decode_google_audio(audio_content: &str) -> Result<AudioClip, UpstreamError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(audio_content)
        .map_err(|e| UpstreamError::invalid(GoogleTts::SERVICE, format!("bad base64 audio: {e}")))?;
    decode_wav(std::io::Cursor::new(bytes))
        .map_err(|e| UpstreamError::invalid(GoogleTts::SERVICE, e.to_string()))
}

#[async_trait]
impl SpeechSynthesizer for GoogleTts {
    fn id(&self) -> &str {
        "google"
    }

    async fn synthesize(
        &self,
        chunk: &TextChunk,
        voice: &VoiceConfig,
    ) -> Result<AudioClip, SynthesisError> {
        debug!(index = chunk.index, text_len = chunk.text.len(), "Google TTS request");
        self.request(chunk, voice)
            .await
            .map_err(|e| SynthesisError::new(chunk.index, e))
    }
}

// --- ElevenLabs ---

/// ElevenLabs TTS with raw `pcm_<rate>` output (16-bit mono).
pub struct ElevenLabsTts {
    pub base_url: String,
    api_key: Option<String>,
    model_id: String,
    client: reqwest::Client,
}

impl ElevenLabsTts {
    const SERVICE: &'static str = "elevenlabs";

    pub fn new(base_url: Option<&str>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(ELEVENLABS_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model_id: ELEVENLABS_DEFAULT_MODEL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Client for `config`, honouring `tts.model` when set.
    pub fn from_config(config: &TtsConfig) -> Self {
        let tts = Self::new(config.base_url.as_deref(), config.resolve_api_key());
        match &config.model {
            Some(model) => tts.with_model(model.clone()),
            None => tts,
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Build the ElevenLabs TTS request URL for a given voice and sample rate.
    pub fn build_url(&self, voice: &str, sample_rate: u32) -> String {
        format!(
            "{}/v1/text-to-speech/{voice}?output_format=pcm_{sample_rate}",
            self.base_url
        )
    }

    async fn request(&self, chunk: &TextChunk, voice: &VoiceConfig) -> Result<AudioClip, UpstreamError> {
        let api_key = self.api_key.as_ref().ok_or_else(|| UpstreamError::MissingCredentials {
            service: Self::SERVICE.into(),
        })?;
        let voice_id = voice.voice_id.as_deref().unwrap_or(ELEVENLABS_DEFAULT_VOICE);

        let resp = self
            .client
            .post(self.build_url(voice_id, voice.sample_rate))
            .header("xi-api-key", api_key)
            .header("Content-Type", "application/json")
            .json(&json!({
                "text": chunk.text,
                "model_id": self.model_id,
                "language_code": voice.language_code.split('-').next().unwrap_or("en"),
                "voice_settings": {
                    "stability": 0.5,
                    "similarity_boost": 0.75
                }
            }))
            .send()
            .await
            .map_err(|e| UpstreamError::transport(Self::SERVICE, e))?;
        let resp = error_for_status(Self::SERVICE, resp).await?;

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| UpstreamError::transport(Self::SERVICE, e))?;
        Ok(AudioClip::new(
            AudioFormat::pcm16(voice.sample_rate, 1),
            bytes.to_vec(),
        ))
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsTts {
    fn id(&self) -> &str {
        "elevenlabs"
    }

    async fn synthesize(
        &self,
        chunk: &TextChunk,
        voice: &VoiceConfig,
    ) -> Result<AudioClip, SynthesisError> {
        debug!(index = chunk.index, text_len = chunk.text.len(), "ElevenLabs TTS request");
        self.request(chunk, voice)
            .await
            .map_err(|e| SynthesisError::new(chunk.index, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wav::encode_wav;

    fn chunk(index: usize, text: &str) -> TextChunk {
        TextChunk {
            index,
            text: text.into(),
        }
    }

    fn voice() -> VoiceConfig {
        VoiceConfig {
            language_code: "en-GB".into(),
            voice_id: None,
            sample_rate: 16_000,
        }
    }

    #[test]
    fn test_google_request_body() {
        let body = GoogleTts::request_body(&chunk(0, "Hello there."), &voice());
        assert_eq!(body["input"]["text"], "Hello there.");
        assert_eq!(body["voice"]["languageCode"], "en-GB");
        assert!(body["voice"].get("name").is_none());
        assert_eq!(body["audioConfig"]["audioEncoding"], "LINEAR16");
        assert_eq!(body["audioConfig"]["sampleRateHertz"], 16_000);
    }

    #[test]
    fn test_google_default_voice_matches_language() {
        let us = VoiceConfig {
            language_code: "en-US".into(),
            ..voice()
        };
        assert_eq!(google_voice(&us)["name"], GOOGLE_DEFAULT_VOICE);

        let chosen = VoiceConfig {
            voice_id: Some("en-GB-Neural2-B".into()),
            ..voice()
        };
        assert_eq!(google_voice(&chosen)["name"], "en-GB-Neural2-B");
    }

    #[test]
    fn test_google_audio_decoding() {
        let format = AudioFormat::pcm16(16_000, 1);
        let wav = encode_wav(&format, &[1, 0, 2, 0]).unwrap();
        let encoded = base64::engine::general_purpose::STANDARD.encode(wav);
        let clip = decode_google_audio(&encoded).unwrap();
        assert_eq!(clip.format, format);
        assert_eq!(clip.data, vec![1, 0, 2, 0]);
    }

    #[test]
    fn test_google_garbage_audio_is_invalid_response() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"not a wav");
        assert!(matches!(
            decode_google_audio(&encoded),
            Err(UpstreamError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_elevenlabs_url() {
        let tts = ElevenLabsTts::new(None, None);
        let url = tts.build_url("Rachel", 24_000);
        assert!(url.starts_with("https://api.elevenlabs.io"));
        assert!(url.contains("/text-to-speech/Rachel"));
        assert!(url.ends_with("output_format=pcm_24000"));
    }

    #[test]
    fn test_elevenlabs_model_from_config() {
        let mut config = TtsConfig {
            provider: "elevenlabs".into(),
            ..TtsConfig::default()
        };
        assert_eq!(ElevenLabsTts::from_config(&config).model_id, ELEVENLABS_DEFAULT_MODEL);
        config.model = Some("eleven_turbo_v2_5".into());
        assert_eq!(ElevenLabsTts::from_config(&config).model_id, "eleven_turbo_v2_5");
    }

    #[tokio::test]
    async fn test_missing_key_reports_chunk_index() {
        let tts = ElevenLabsTts::new(Some("http://127.0.0.1:9"), None);
        let err = tts.synthesize(&chunk(4, "Hi."), &voice()).await.unwrap_err();
        assert_eq!(err.index, 4);
        assert!(matches!(err.source, UpstreamError::MissingCredentials { .. }));
    }

    #[test]
    fn test_synthesizer_from_config() {
        let mut config = TtsConfig::default();
        assert_eq!(synthesizer_from_config(&config).unwrap().id(), "google");
        config.provider = "elevenlabs".into();
        assert_eq!(synthesizer_from_config(&config).unwrap().id(), "elevenlabs");
        config.provider = "espeak".into();
        assert!(synthesizer_from_config(&config).is_err());
    }
}
