//! Document text extraction and request tokens.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("unsupported document type: {0}")]
    Unsupported(String),

    #[error("could not read PDF: {0}")]
    Pdf(String),

    #[error("document is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("document contains no extractable text")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Text,
}

impl DocumentKind {
    /// Classify by file extension, falling back to the PDF magic bytes.
    pub fn detect(file_name: &str, bytes: &[u8]) -> Result<Self, DocumentError> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("pdf") => Ok(Self::Pdf),
            Some("txt" | "md" | "markdown") => Ok(Self::Text),
            _ if bytes.starts_with(b"%PDF-") => Ok(Self::Pdf),
            Some(other) => Err(DocumentError::Unsupported(format!(".{other}"))),
            None => Err(DocumentError::Unsupported(file_name.to_string())),
        }
    }
}

/// Extract plain text from an uploaded document. Blocking for PDFs.
pub fn extract_document_text(file_name: &str, bytes: &[u8]) -> Result<String, DocumentError> {
    let text = match DocumentKind::detect(file_name, bytes)? {
        DocumentKind::Pdf => {
            pdf_extract::extract_text_from_mem(bytes).map_err(|e| DocumentError::Pdf(e.to_string()))?
        }
        DocumentKind::Text => String::from_utf8(bytes.to_vec())?,
    };

    let text = text.trim();
    if text.is_empty() {
        return Err(DocumentError::Empty);
    }
    Ok(text.to_string())
}

/// Run [`extract_document_text`] off the async runtime. A panic inside the
/// PDF parser is reported as a PDF error.
pub async fn read_document(file_name: String, bytes: Vec<u8>) -> Result<String, DocumentError> {
    tokio::task::spawn_blocking(move || extract_document_text(&file_name, &bytes))
        .await
        .map_err(|e| DocumentError::Pdf(format!("extractor aborted: {e}")))?
}

/// Identifies one request's transient files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentToken(Uuid);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid document token: {0:?}")]
pub struct TokenError(pub String);

impl DocumentToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Accepts a bare UUID or the `extracted_<uuid>.txt` file name.
    pub fn parse(raw: &str) -> Result<Self, TokenError> {
        let trimmed = raw.trim();
        let inner = trimmed
            .strip_prefix("extracted_")
            .and_then(|s| s.strip_suffix(".txt"))
            .unwrap_or(trimmed);
        Uuid::parse_str(inner)
            .map(Self)
            .map_err(|_| TokenError(raw.to_string()))
    }

    pub fn text_file_name(&self) -> String {
        format!("extracted_{}.txt", self.0)
    }

    pub fn audio_file_name(&self) -> String {
        format!("podcast_{}.wav", self.0)
    }
}

impl std::fmt::Display for DocumentToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for DocumentToken {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
