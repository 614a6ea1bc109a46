//! Generative model providers.
//!
//! Each provider implements the [`LlmProvider`] trait, turning a prompt into a
//! raw, unstructured text response. [`extract`] recovers structured data from
//! that text.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use papercast_core::config::LlmConfig;
use papercast_core::error::UpstreamError;

pub mod extract;
#[cfg(feature = "google")]
pub mod google;

/// Opaque text returned by a generative-model call.
pub type RawModelResponse = String;

/// Credentials for authenticating with an LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Credentials {
    #[serde(rename = "api_key")]
    ApiKey { api_key: String },
    #[serde(rename = "none")]
    None,
}

/// A single-turn generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: Option<f64>,
    pub max_output_tokens: Option<u32>,
}

impl GenerateRequest {
    /// Build a request for `prompt` using the configured model settings.
    pub fn from_config(config: &LlmConfig, prompt: String) -> Self {
        Self {
            model: config.model.clone(),
            prompt,
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        }
    }
}

/// The core LLM provider trait.
///
/// No contract on latency or determinism: callers bound every call with a
/// timeout and treat the response as possibly malformed.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider identifier (e.g., "google").
    fn id(&self) -> &str;

    /// Generate a complete response for the request.
    async fn generate(
        &self,
        request: &GenerateRequest,
        credentials: &Credentials,
    ) -> Result<RawModelResponse, UpstreamError>;
}

/// Build the provider named in config.
pub fn provider_from_config(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, UpstreamError> {
    match config.provider.as_str() {
        #[cfg(feature = "google")]
        "google" => Ok(Arc::new(google::GeminiProvider::new(config.base_url.as_deref()))),
        other => Err(UpstreamError::invalid(other, "unsupported LLM provider")),
    }
}

/// Resolve credentials for the configured provider.
pub fn credentials_from_config(config: &LlmConfig) -> Credentials {
    match config.resolve_api_key() {
        Some(api_key) => Credentials::ApiKey { api_key },
        None => Credentials::None,
    }
}
