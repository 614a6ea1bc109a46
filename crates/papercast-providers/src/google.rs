//! Google Generative AI (Gemini) provider.
//!
//! Uses the non-streaming `generateContent` endpoint. Auth is via API key in
//! query parameter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, trace};

use papercast_core::error::UpstreamError;

use crate::{Credentials, GenerateRequest, LlmProvider, RawModelResponse};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const SERVICE: &str = "gemini";

pub struct GeminiProvider {
    pub base_url: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(base_url: Option<&str>) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, model: &str, api_key: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, model, api_key
        )
    }
}

// --- Gemini request/response types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

fn build_body(request: &GenerateRequest) -> GeminiRequest {
    GeminiRequest {
        contents: vec![json!({
            "role": "user",
            "parts": [{ "text": request.prompt }],
        })],
        generation_config: Some(GenerationConfig {
            max_output_tokens: request.max_output_tokens,
            temperature: request.temperature,
        }),
    }
}

/// Concatenate the text parts of the first candidate.
fn response_text(response: GeminiResponse) -> Result<RawModelResponse, UpstreamError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(UpstreamError::invalid(SERVICE, "response has no candidates"));
    };

    if let Some(ref reason) = candidate.finish_reason {
        if reason != "STOP" {
            trace!(reason, "Gemini finish reason");
        }
    }

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(UpstreamError::invalid(
            SERVICE,
            format!(
                "candidate has no text (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            ),
        ));
    }
    Ok(text)
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn id(&self) -> &str {
        "google"
    }

    async fn generate(
        &self,
        request: &GenerateRequest,
        credentials: &Credentials,
    ) -> Result<RawModelResponse, UpstreamError> {
        let api_key = match credentials {
            Credentials::ApiKey { api_key } => api_key.clone(),
            Credentials::None => {
                return Err(UpstreamError::MissingCredentials {
                    service: SERVICE.into(),
                });
            }
        };

        debug!(model = %request.model, prompt_len = request.prompt.len(), "Calling Gemini API");

        let response = self
            .client
            .post(self.endpoint(&request.model, &api_key))
            .header("content-type", "application/json")
            .json(&build_body(request))
            .send()
            .await
            .map_err(|e| UpstreamError::transport(SERVICE, e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                service: SERVICE.into(),
                status,
                body,
            });
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::invalid(SERVICE, e.to_string()))?;

        if let Some(ref usage) = parsed.usage_metadata {
            debug!(
                input_tokens = usage.prompt_token_count,
                output_tokens = usage.candidates_token_count,
                "Gemini usage"
            );
        }

        response_text(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gemini_provider_creation() {
        let provider = GeminiProvider::new(None);
        assert_eq!(provider.id(), "google");
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);

        let custom = GeminiProvider::new(Some("http://localhost:9999/"));
        assert_eq!(custom.base_url, "http://localhost:9999");
    }

    #[test]
    fn test_endpoint_includes_model_and_key() {
        let provider = GeminiProvider::new(None);
        let url = provider.endpoint("gemini-2.0-flash", "k123");
        assert!(url.ends_with("/v1beta/models/gemini-2.0-flash:generateContent?key=k123"));
    }

    #[test]
    fn test_request_body_shape() {
        let req = GenerateRequest {
            model: "m".into(),
            prompt: "Paper text".into(),
            temperature: Some(0.2),
            max_output_tokens: None,
        };
        let body = serde_json::to_value(build_body(&req)).unwrap();
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Paper text");
        assert_eq!(body["generationConfig"]["temperature"], 0.2);
        assert!(body["generationConfig"].get("maxOutputTokens").is_none());
    }

    #[test]
    fn test_response_text_joins_parts() {
        let json = r#"{"candidates":[{"content":{"parts":[{"text":"Hello"},{"text":" world"}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":10,"candidatesTokenCount":5}}"#;
        let parsed: GeminiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.usage_metadata.as_ref().unwrap().prompt_token_count, 10);
        assert_eq!(response_text(parsed).unwrap(), "Hello world");
    }

    #[test]
    fn test_response_without_candidates_is_error() {
        let parsed: GeminiResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(matches!(
            response_text(parsed),
            Err(UpstreamError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_blocked_response_is_error() {
        let parsed: GeminiResponse =
            serde_json::from_str(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap();
        let err = response_text(parsed).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let provider = GeminiProvider::new(Some("http://127.0.0.1:9"));
        let req = GenerateRequest {
            model: "m".into(),
            prompt: "p".into(),
            temperature: None,
            max_output_tokens: None,
        };
        let err = provider.generate(&req, &Credentials::None).await.unwrap_err();
        assert!(matches!(err, UpstreamError::MissingCredentials { .. }));
    }
}
