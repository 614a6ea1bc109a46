//! HTTP API handlers for the upload, questionnaire and podcast flow.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use papercast_core::types::{Answers, Question};
use papercast_pipeline::{DocumentToken, PipelineError, PipelineErrorKind};

use crate::state::GatewayState;

/// An error response: status plus JSON body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: Value,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: json!({ "success": false, "error": message.into() }),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let status = match &err.kind {
            PipelineErrorKind::Document(_) | PipelineErrorKind::InvalidToken(_) => {
                StatusCode::BAD_REQUEST
            }
            PipelineErrorKind::Upstream(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            PipelineErrorKind::Upstream(_) | PipelineErrorKind::Synthesis { .. } => {
                StatusCode::BAD_GATEWAY
            }
            PipelineErrorKind::Extraction(_)
            | PipelineErrorKind::Stitch(_)
            | PipelineErrorKind::Io(_)
            | PipelineErrorKind::Transition(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        #[cfg(feature = "metrics")]
        crate::metrics::record_pipeline_failure(err.stage.as_str(), err.kind.name());

        let mut body = json!({
            "success": false,
            "error": err.kind.to_string(),
            "stage": err.stage,
            "kind": err.kind.name(),
        });
        if let Some(raw) = err.raw_response() {
            body["raw"] = Value::String(raw.to_string());
        }
        if let PipelineErrorKind::Synthesis { failed, .. } = &err.kind {
            body["failedChunks"] = json!(failed);
        }
        Self { status, body }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn observe(route: &str, started: Instant, status: StatusCode) {
    #[cfg(feature = "metrics")]
    crate::metrics::record_request(route, status.as_u16(), started.elapsed().as_secs_f64());
    #[cfg(not(feature = "metrics"))]
    let _ = (route, started, status);
}

fn finish<T: Serialize>(route: &str, started: Instant, result: Result<T, ApiError>) -> Response {
    match result {
        Ok(body) => {
            observe(route, started, StatusCode::OK);
            Json(body).into_response()
        }
        Err(err) => {
            observe(route, started, err.status);
            warn!(route, status = err.status.as_u16(), error = %err.body["error"], "Request failed");
            err.into_response()
        }
    }
}

fn parse_token(raw: Option<&str>) -> Result<DocumentToken, ApiError> {
    let raw = raw
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("No token"))?;
    DocumentToken::parse(raw).map_err(|e| ApiError::bad_request(e.to_string()))
}

// --- POST /api/upload ---

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub token: DocumentToken,
    pub temp_txt_filename: String,
}

pub async fn upload(State(state): State<Arc<GatewayState>>, multipart: Multipart) -> Response {
    let started = Instant::now();
    finish("/api/upload", started, handle_upload(&state, multipart).await)
}

async fn handle_upload(
    state: &GatewayState,
    mut multipart: Multipart,
) -> Result<UploadResponse, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        if !matches!(field.name(), Some("pdf" | "file")) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        if file_name.trim().is_empty() {
            return Err(ApiError::bad_request("No selected file"));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;

        let token = state.pipeline.ingest(&file_name, bytes.to_vec()).await?;
        return Ok(UploadResponse {
            token,
            temp_txt_filename: token.text_file_name(),
        });
    }
    Err(ApiError::bad_request("No file part"))
}

// --- POST /api/questions ---

#[derive(Debug, Deserialize)]
pub struct QuestionsRequest {
    #[serde(default, alias = "temp_txt_filename")]
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QuestionsResponse {
    pub questions: Vec<Question>,
}

pub async fn questions(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<QuestionsRequest>,
) -> Response {
    let started = Instant::now();
    let result = async {
        let token = parse_token(req.token.as_deref())?;
        let questions = state.pipeline.generate_questions(&token).await?;
        Ok::<_, ApiError>(QuestionsResponse { questions })
    }
    .await;
    finish("/api/questions", started, result)
}

// --- POST /api/submit ---

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    #[serde(default, alias = "temp_txt_filename")]
    pub token: Option<String>,
    #[serde(default)]
    pub answers: Answers,
    #[serde(default)]
    pub questions: Vec<Question>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub success: bool,
    pub audio_url: String,
    pub title: String,
    pub transcript: String,
    pub failed_chunks: Vec<usize>,
    pub duration_secs: f64,
}

pub async fn submit(State(state): State<Arc<GatewayState>>, Json(req): Json<SubmitRequest>) -> Response {
    let started = Instant::now();
    let result = async {
        let token = parse_token(req.token.as_deref())?;
        info!(
            %token,
            questions = req.questions.len(),
            answers = req.answers.len(),
            "Answers submitted"
        );
        let outcome = state
            .pipeline
            .produce_podcast(&token, &req.questions, &req.answers)
            .await?;

        #[cfg(feature = "metrics")]
        crate::metrics::record_chunks(
            outcome.chunk_count - outcome.failed_chunks.len(),
            outcome.failed_chunks.len(),
        );

        Ok::<_, ApiError>(SubmitResponse {
            success: true,
            audio_url: state.config.audio_url(&outcome.file_name),
            title: outcome.title,
            transcript: outcome.transcript,
            failed_chunks: outcome.failed_chunks,
            duration_secs: outcome.duration_secs,
        })
    }
    .await;
    finish("/api/submit", started, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use papercast_core::error::UpstreamError;
    use papercast_pipeline::PipelineStage;
    use papercast_pipeline::document::DocumentError;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                PipelineError::new(PipelineStage::Extracted, DocumentError::Empty),
                StatusCode::BAD_REQUEST,
            ),
            (
                PipelineError::new(
                    PipelineStage::QuestionsGenerated,
                    UpstreamError::Timeout {
                        service: "gemini".into(),
                        after: Duration::from_secs(120),
                    },
                ),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                PipelineError::new(
                    PipelineStage::QuestionsGenerated,
                    UpstreamError::Status {
                        service: "gemini".into(),
                        status: 429,
                        body: "quota".into(),
                    },
                ),
                StatusCode::BAD_GATEWAY,
            ),
            (
                PipelineError::new(
                    PipelineStage::Synthesized,
                    PipelineErrorKind::Synthesis {
                        failed: vec![0, 1],
                        last: "boom".into(),
                    },
                ),
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn test_error_body_names_stage() {
        let err = ApiError::from(PipelineError::new(
            PipelineStage::Synthesized,
            PipelineErrorKind::Synthesis {
                failed: vec![2],
                last: "boom".into(),
            },
        ));
        assert_eq!(err.body["success"], false);
        assert_eq!(err.body["stage"], "synthesized");
        assert_eq!(err.body["kind"], "synthesis");
        assert_eq!(err.body["failedChunks"], json!([2]));
    }

    #[test]
    fn test_parse_token() {
        assert_eq!(parse_token(None).unwrap_err().status, StatusCode::BAD_REQUEST);
        assert!(parse_token(Some("  ")).is_err());
        assert!(parse_token(Some("../../etc/passwd")).is_err());
        let token = DocumentToken::generate();
        assert_eq!(parse_token(Some(&token.text_file_name())).unwrap(), token);
    }

    #[test]
    fn test_questions_request_accepts_legacy_field() {
        let req: QuestionsRequest =
            serde_json::from_str(r#"{"temp_txt_filename": "extracted_x.txt"}"#).unwrap();
        assert_eq!(req.token.as_deref(), Some("extracted_x.txt"));
    }
}
