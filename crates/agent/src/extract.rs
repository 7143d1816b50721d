//! Text extraction for uploaded owner resources.
//!
//! Dispatch is on the declared content type. Plain text passes through,
//! JSON is re-serialized pretty-printed so chunk boundaries fall on
//! readable lines, and PDFs go through `pdf-extract`.

use relaydesk_core::SourceType;
use std::path::Path;
use thiserror::Error;

pub const MIME_TEXT: &str = "text/plain";
pub const MIME_JSON: &str = "application/json";
pub const MIME_PDF: &str = "application/pdf";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Content is not valid UTF-8")]
    InvalidUtf8,
}

/// Extracted text plus the source type it will be indexed under.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub text: String,
    pub source_type: SourceType,
}

/// Extract indexable text from `bytes` according to `content_type`.
///
/// Parameters such as `; charset=utf-8` are ignored. `text/*` types other
/// than `text/plain` (markdown, csv) are treated as plain text.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<Extracted, ExtractError> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        MIME_PDF => {
            let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;
            Ok(Extracted { text, source_type: SourceType::Pdf })
        }
        MIME_JSON => {
            let value: serde_json::Value =
                serde_json::from_slice(bytes).map_err(|e| ExtractError::InvalidJson(e.to_string()))?;
            let text = serde_json::to_string_pretty(&value).map_err(|e| ExtractError::InvalidJson(e.to_string()))?;
            Ok(Extracted { text, source_type: SourceType::Json })
        }
        m if m.starts_with("text/") => {
            let text = std::str::from_utf8(bytes).map_err(|_| ExtractError::InvalidUtf8)?;
            Ok(Extracted { text: text.to_string(), source_type: SourceType::Text })
        }
        _ => Err(ExtractError::UnsupportedContentType(content_type.to_string())),
    }
}

/// Guess a content type from a file extension, for CLI uploads.
pub fn content_type_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some(MIME_PDF),
        "json" => Some(MIME_JSON),
        "txt" | "md" | "markdown" | "csv" => Some(MIME_TEXT),
        _ => None,
    }
}
