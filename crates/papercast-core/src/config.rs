//! Configuration loading and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Top-level Papercast configuration.
///
/// Built once at startup and shared read-only (`Arc<Config>`) by every request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts: Option<TtsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub podcast: Option<PodcastConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

// --- Generative model ---

/// Configuration for the generative model used for questions and scripts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider id (default: "google").
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Env var holding the key (default: `GEMINI_API_KEY`).
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_llm_provider() -> String {
    "google".into()
}

fn default_llm_key_env() -> Option<String> {
    Some("GEMINI_API_KEY".into())
}

fn default_llm_model() -> String {
    "gemini-2.5-pro-exp-03-25".into()
}

fn default_llm_timeout() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            api_key: None,
            api_key_env: default_llm_key_env(),
            base_url: None,
            model: default_llm_model(),
            temperature: None,
            max_output_tokens: None,
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl LlmConfig {
    /// Resolve the API key: check `api_key` field first, then `api_key_env` environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// --- Speech synthesis ---

/// What to do with a single sentence longer than the chunk budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OversizePolicy {
    /// Emit the sentence as its own oversized chunk.
    #[default]
    PassThrough,
    /// Split the sentence on whitespace at the budget boundary.
    HardSplit,
}

/// Text-to-speech (TTS) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    /// TTS provider: "google" (default) or "elevenlabs".
    #[serde(default = "default_tts_provider")]
    pub provider: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Voice id or name (provider specific).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    /// Synthesis model, for providers that offer several (ElevenLabs `model_id`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// BCP-47 language code (default: "en-US").
    #[serde(default = "default_language_code")]
    pub language_code: String,

    /// Requested output sample rate in Hz (default: 24000).
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Maximum characters sent in one synthesis request (default: 4500).
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    #[serde(default)]
    pub oversize_policy: OversizePolicy,

    /// Concurrent synthesis requests per podcast (default: 4).
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Extra attempts per failed chunk (default: 0).
    #[serde(default)]
    pub retries: u32,

    #[serde(default = "default_tts_timeout")]
    pub timeout_secs: u64,
}

fn default_tts_provider() -> String {
    "google".into()
}

fn default_language_code() -> String {
    "en-US".into()
}

fn default_sample_rate() -> u32 {
    24_000
}

fn default_max_chars() -> usize {
    4_500
}

fn default_max_concurrency() -> usize {
    4
}

fn default_tts_timeout() -> u64 {
    60
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            provider: default_tts_provider(),
            api_key: None,
            api_key_env: None,
            base_url: None,
            voice: None,
            model: None,
            language_code: default_language_code(),
            sample_rate: default_sample_rate(),
            max_chars: default_max_chars(),
            oversize_policy: OversizePolicy::default(),
            max_concurrency: default_max_concurrency(),
            retries: 0,
            timeout_secs: default_tts_timeout(),
        }
    }
}

impl TtsConfig {
    /// Resolve the API key, falling back to the provider's conventional env var.
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env).or_else(|| {
            let fallback = match self.provider.as_str() {
                "elevenlabs" => "ELEVENLABS_API_KEY",
                _ => "GOOGLE_TTS_API_KEY",
            };
            resolve_secret_field(&None, &Some(fallback.to_string()))
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// --- HTTP gateway ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    /// Largest accepted upload in bytes (default: 25 MiB).
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_port() -> u16 {
    5000
}

fn default_max_upload_bytes() -> usize {
    25 * 1024 * 1024
}

// --- Storage ---

/// Where transient request files and published audio live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,

    #[serde(default = "default_audio_dir")]
    pub audio_dir: String,

    /// URL prefix under which `audio_dir` is served (default: "/audio").
    #[serde(default = "default_public_audio_path")]
    pub public_audio_path: String,
}

fn default_upload_dir() -> String {
    "uploads".into()
}

fn default_audio_dir() -> String {
    "uploads/audio".into()
}

fn default_public_audio_path() -> String {
    "/audio".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            audio_dir: default_audio_dir(),
            public_audio_path: default_public_audio_path(),
        }
    }
}

// --- Podcast shaping ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodcastConfig {
    /// Number of calibration questions requested (default: 5).
    #[serde(default = "default_question_count")]
    pub question_count: usize,

    /// Document characters included in prompts; longer documents are truncated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_document_chars: Option<usize>,
}

fn default_question_count() -> usize {
    5
}

impl Default for PodcastConfig {
    fn default() -> Self {
        Self {
            question_count: default_question_count(),
            max_document_chars: None,
        }
    }
}

// --- Logging ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "papercast_pipeline=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static pattern");
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .into_owned()
}

fn expand_dir(dir: &str) -> PathBuf {
    let expanded = shellexpand::tilde(dir);
    PathBuf::from(expanded.as_ref())
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(crate::error::PapercastError::Io)?;

        // Substitute ${ENV_VAR} references before parsing
        let substituted = substitute_env_vars(&raw);

        let config: Config = json5::from_str(&substituted)
            .map_err(|e| crate::error::PapercastError::Config(e.to_string()))?;

        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Default config file location.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    /// Effective generative-model settings.
    pub fn llm(&self) -> LlmConfig {
        self.llm.clone().unwrap_or_default()
    }

    /// Effective speech-synthesis settings.
    pub fn tts(&self) -> TtsConfig {
        self.tts.clone().unwrap_or_default()
    }

    pub fn storage(&self) -> StorageConfig {
        self.storage.clone().unwrap_or_default()
    }

    pub fn podcast(&self) -> PodcastConfig {
        self.podcast.clone().unwrap_or_default()
    }

    /// Gateway port.
    pub fn gateway_port(&self) -> u16 {
        self.gateway.as_ref().map(|g| g.port).unwrap_or_else(default_port)
    }

    /// Gateway bind address.
    pub fn gateway_bind(&self) -> String {
        self.gateway
            .as_ref()
            .and_then(|g| g.bind.clone())
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.gateway
            .as_ref()
            .map(|g| g.max_upload_bytes)
            .unwrap_or_else(default_max_upload_bytes)
    }

    /// Directory holding extracted document text.
    pub fn upload_dir(&self) -> PathBuf {
        expand_dir(&self.storage().upload_dir)
    }

    /// Directory holding published podcast audio.
    pub fn audio_dir(&self) -> PathBuf {
        expand_dir(&self.storage().audio_dir)
    }

    /// URL prefix for published audio with one leading `/` and no trailing
    /// ones. `None` when the configured prefix is empty or the root.
    pub fn audio_prefix(&self) -> Option<String> {
        let path = self.storage().public_audio_path;
        let trimmed = path.trim().trim_matches('/');
        (!trimmed.is_empty()).then(|| format!("/{trimmed}"))
    }

    /// Public URL for a published audio file.
    pub fn audio_url(&self, file_name: &str) -> String {
        let prefix = self.audio_prefix().unwrap_or_else(default_public_audio_path);
        format!("{prefix}/{file_name}")
    }

    /// Get a config value by dotted path (e.g. "gateway.port", "tts.voice").
    pub fn get_path(&self, path: &str) -> Option<serde_json::Value> {
        let json = serde_json::to_value(self).ok()?;
        let mut current = &json;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        let llm = self.llm();
        if llm.resolve_api_key().is_none() {
            warnings.push(format!("LLM provider '{}' has no API key configured", llm.provider));
        }
        if llm.provider != "google" {
            errors.push(format!("Unsupported LLM provider: {}", llm.provider));
        }

        let tts = self.tts();
        if tts.resolve_api_key().is_none() {
            warnings.push(format!("TTS provider '{}' has no API key configured", tts.provider));
        }
        if !matches!(tts.provider.as_str(), "google" | "elevenlabs") {
            errors.push(format!("Unsupported TTS provider: {}", tts.provider));
        }
        if tts.max_chars == 0 {
            errors.push("tts.max_chars must be greater than 0".to_string());
        }
        if tts.max_concurrency == 0 {
            errors.push("tts.max_concurrency must be greater than 0".to_string());
        }
        if tts.sample_rate == 0 {
            errors.push("tts.sample_rate must be greater than 0".to_string());
        }

        if self.audio_prefix().is_none() {
            errors.push(format!(
                "storage.public_audio_path must be a non-root URL path, got '{}'",
                self.storage().public_audio_path
            ));
        }

        // Check port is non-zero
        if let Some(gw) = &self.gateway {
            if gw.port == 0 {
                errors.push("Gateway port cannot be 0".to_string());
            }
        }

        (warnings, errors)
    }

    /// Save config to a file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Base directory for Papercast data: `~/.papercast/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".papercast")
}
