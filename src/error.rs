//! Error types for the pliego-analyzer library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`AnalysisError`] — **Fatal for the request**: the document cannot be
//!   analysed at all (not a PDF, corrupt file, provider not configured).
//!   Returned as `Err(AnalysisError)` from [`crate::Analyzer`] and shown to
//!   the user; no generation attempt is made.
//!
//! * [`ServiceError`] — **Transient**: a single generation attempt failed
//!   (network, HTTP status, undecodable payload). Consumed by the retry loop
//!   in [`crate::pipeline::generate`] and only ever surfaced as a warning.
//!
//! Exhausting every attempt is not an error at all: the caller receives the
//! fallback string (see [`crate::pipeline::generate::FALLBACK_RESPONSE`]).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::path::PathBuf;
use thiserror::Error;

/// All request-fatal errors returned by the pliego-analyzer library.
#[derive(Debug, Error)]
pub enum AnalysisError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The upload contained no bytes.
    #[error("The uploaded file '{filename}' is empty")]
    EmptyUpload { filename: String },

    /// The upload request carried no `file` field.
    #[error("No PDF file was provided in the upload")]
    MissingUpload,

    /// The upload is larger than the configured cap.
    #[error("The uploaded file exceeds the maximum size of {limit} bytes")]
    UploadTooLarge { limit: usize },

    /// The multipart body could not be read.
    #[error("Failed to read upload: {0}")]
    UploadRead(String),

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The bytes were read, but they are not a PDF.
    #[error("'{filename}' is not a valid PDF (first bytes: {magic:?})")]
    NotAPdf { filename: String, magic: Vec<u8> },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{filename}' is corrupt: {detail}")]
    CorruptPdf { filename: String, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{filename}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { filename: String },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{filename}'")]
    WrongPassword { filename: String },

    /// pdfium returned an error while reading a specific page's text.
    #[error("Text extraction failed for page {page}: {detail}")]
    PageTextFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDFium is normally downloaded automatically on first run.\n\
If the auto-download failed, you can:\n\
  • Check your internet connection and try again.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Provider errors ───────────────────────────────────────────────────
    /// The configured provider could not be initialised.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// No API credential was found in the secrets file or the environment.
    #[error("Missing API credential: set GENAI_API_KEY in {secrets_path:?} or the environment")]
    MissingCredential { secrets_path: PathBuf },

    /// The secrets file exists but could not be read or parsed.
    #[error("Failed to read secrets file '{path}': {detail}")]
    SecretsUnreadable { path: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AnalysisError {
    /// Whether this error means the uploaded document itself is unusable.
    ///
    /// These are the errors shown to the user as "could not process the
    /// PDF"; everything else is a server-side or request-shape problem.
    pub fn is_extraction_error(&self) -> bool {
        matches!(
            self,
            AnalysisError::EmptyUpload { .. }
                | AnalysisError::NotAPdf { .. }
                | AnalysisError::CorruptPdf { .. }
                | AnalysisError::PasswordRequired { .. }
                | AnalysisError::WrongPassword { .. }
                | AnalysisError::PageTextFailed { .. }
        )
    }

    /// HTTP status used when this error is returned from the web surface.
    pub fn status_code(&self) -> StatusCode {
        match self {
            _ if self.is_extraction_error() => StatusCode::UNPROCESSABLE_ENTITY,
            AnalysisError::MissingUpload | AnalysisError::UploadRead(_) => StatusCode::BAD_REQUEST,
            AnalysisError::UploadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AnalysisError::FileNotFound { .. } => StatusCode::NOT_FOUND,
            AnalysisError::DownloadFailed { .. } | AnalysisError::DownloadTimeout { .. } => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AnalysisError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Analysis failed: {}", self);
        } else {
            tracing::debug!("Client error: {}", self);
        }
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// A transient failure of a single generation attempt.
///
/// Never returned from the retry client; each one is logged as a warning and
/// the next attempt proceeds.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// The request never produced a response (DNS, TLS, connection reset, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with a non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body was not the JSON document the adapter expects.
    #[error("undecodable response: {0}")]
    Decode(String),

    /// The provider library reported an error.
    #[error("provider error: {0}")]
    Provider(String),
}
