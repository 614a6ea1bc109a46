use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PapercastError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PapercastError>;

/// Failure talking to an external collaborator (generative model or TTS service).
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("{service} did not respond within {}s", .after.as_secs_f32())]
    Timeout { service: String, after: Duration },

    #[error("{service} returned {status}: {body}")]
    Status {
        service: String,
        status: u16,
        body: String,
    },

    #[error("{service} transport error: {message}")]
    Transport { service: String, message: String },

    #[error("{service} has no API key configured")]
    MissingCredentials { service: String },

    #[error("{service} returned an unusable response: {message}")]
    InvalidResponse { service: String, message: String },
}

impl UpstreamError {
    pub fn transport(service: &str, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            service: service.to_string(),
            message: err.to_string(),
        }
    }

    pub fn invalid(service: &str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            service: service.to_string(),
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Run `fut` with a deadline, mapping expiry to [`UpstreamError::Timeout`].
pub async fn with_timeout<T, F>(
    service: &str,
    after: Duration,
    fut: F,
) -> std::result::Result<T, UpstreamError>
where
    F: std::future::Future<Output = std::result::Result<T, UpstreamError>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(res) => res,
        Err(_) => Err(UpstreamError::Timeout {
            service: service.to_string(),
            after,
        }),
    }
}
