//! Error types for PDF Form MCP Server

use thiserror::Error;

/// Result type alias for PDF Form MCP Server
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for PDF Form MCP Server
#[derive(Error, Debug)]
pub enum Error {
    /// PDF file not found
    #[error("PDF not found: {path}")]
    PdfNotFound { path: String },

    /// Invalid PDF file
    #[error("Invalid PDF file: {reason}")]
    InvalidPdf { reason: String },

    /// Source resolution error
    #[error("Failed to resolve source: {reason}")]
    SourceResolution { reason: String },

    /// Base64 decode error
    #[error("Invalid base64 data: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Underlying PDF library error
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// XFA packet could not be read or parsed
    #[error("XFA error: {reason}")]
    Xfa { reason: String },

    /// Value application or export attempted before a successful load
    #[error("No document loaded")]
    NoDocumentLoaded,

    /// The mutated document could not be re-encoded
    #[error("Serialization failed: {reason}")]
    SerializationFailed { reason: String },

    /// Form session key not found (expired or never created)
    #[error("Session not found: {key}")]
    SessionNotFound { key: String },

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Path access denied (outside allowed resource directories)
    #[error("Path access denied: {path}")]
    PathAccessDenied { path: String },

    /// SSRF blocked (URL resolves to private/reserved IP)
    #[error("SSRF blocked: {url}")]
    SsrfBlocked { url: String },

    /// Download too large
    #[error("Download too large: {size} bytes (max: {max_size} bytes)")]
    DownloadTooLarge { size: u64, max_size: u64 },
}

impl Error {
    /// Return a sanitized error message safe to send to clients.
    /// Internal details (paths, library errors, file sizes) are omitted.
    /// Full details should be logged via tracing before calling this.
    pub fn client_message(&self) -> String {
        match self {
            Error::PdfNotFound { .. } => "PDF not found".to_string(),
            Error::InvalidPdf { .. } => "Invalid PDF file".to_string(),
            Error::SourceResolution { .. } => "Failed to resolve PDF source".to_string(),
            Error::Base64Decode(_) => "Invalid base64 data".to_string(),
            Error::HttpRequest(_) => "HTTP request failed".to_string(),
            Error::Io(_) => "I/O error".to_string(),
            Error::Pdf(_) => "PDF processing error".to_string(),
            Error::Xfa { .. } => "XFA form processing error".to_string(),
            Error::NoDocumentLoaded => "No document loaded".to_string(),
            Error::SerializationFailed { .. } => "Failed to serialize the filled PDF".to_string(),
            Error::SessionNotFound { key } => format!("Session not found: {}", key),
            Error::Json(_) => "Serialization error".to_string(),
            Error::PathAccessDenied { .. } => "Access denied".to_string(),
            Error::SsrfBlocked { .. } => "URL not allowed".to_string(),
            Error::DownloadTooLarge { max_size, .. } => {
                format!("Download exceeds maximum size of {} bytes", max_size)
            }
        }
    }
}
