//! Error types for the ipo-vc-extract library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`VcExtractError`] — **Fatal**: the run cannot proceed at all
//!   (results file locked, input directory missing, pdfium not bound).
//!   Returned as `Err(VcExtractError)` from [`crate::process::run`].
//!
//! * [`ExtractionError`] — **Non-fatal, file skipped**: one prospectus could
//!   not be turned into text (encrypted, corrupt, scanned without a text
//!   layer). The file produces no row; the batch continues.
//!
//! * [`RefinementError`] — **Non-fatal, row degraded**: the LLM pass failed
//!   for one file. The row is still written from the rule-engine guess.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the ipo-vc-extract library.
#[derive(Debug, Error)]
pub enum VcExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The input directory does not exist.
    #[error("Input directory not found: '{path}'\nCreate it and put the prospectus PDFs inside.")]
    InputDirNotFound { path: PathBuf },

    /// The input directory exists but could not be listed.
    #[error("Failed to list input directory '{path}': {source}")]
    InputDirUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Sink errors ───────────────────────────────────────────────────────
    /// The results file is held open by another process.
    #[error(
        "Cannot write '{path}': the file is locked or read-only.\n\
Close any program using it (e.g. Excel) and rerun."
    )]
    SinkLocked { path: PathBuf },

    /// Creating, writing or flushing the results file failed.
    #[error("Failed to write results file '{path}': {detail}")]
    SinkWriteFailed { path: PathBuf, detail: String },

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Text extraction needs the pdfium shared library. You can:\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium (file or directory).\n\
  • Place libpdfium next to the working directory.\n\
  • Install pdfium system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error that causes one input file to be skipped.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ExtractionError {
    /// The file vanished between listing and opening.
    #[error("File not found: '{path}'")]
    NotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The file is not a PDF (wrong magic bytes).
    #[error("Not a PDF: '{path}' (first bytes: {magic:?})")]
    NotAPdf { path: PathBuf, magic: Vec<u8> },

    /// The PDF is password protected.
    #[error("PDF '{path}' is encrypted")]
    Encrypted { path: PathBuf },

    /// pdfium could not parse the document.
    #[error("PDF '{path}' is corrupt: {detail}")]
    Corrupt { path: PathBuf, detail: String },

    /// Text extraction failed for a single page.
    #[error("Page {page}: text extraction failed: {detail}")]
    PageText { page: usize, detail: String },

    /// The document opened fine but contains no extractable text
    /// (typically a scanned prospectus without an OCR layer).
    #[error("PDF '{path}' yielded no extractable text across {pages} pages")]
    NoText { path: PathBuf, pages: usize },
}

/// A non-fatal error from the LLM refinement pass.
///
/// The pipeline falls back to the rule-engine guess for the affected file.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum RefinementError {
    /// The endpoint answered with a non-success HTTP status.
    #[error("LLM endpoint returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Connection, TLS or body-read failure.
    #[error("LLM request failed: {detail}")]
    Network { detail: String },

    /// The request exceeded the configured timeout.
    #[error("LLM request timed out")]
    Timeout,

    /// A streamed event could not be decoded.
    #[error("Malformed stream event: {detail}")]
    Stream { detail: String },

    /// The model produced no content at all.
    #[error("LLM returned an empty response")]
    EmptyResponse,

    /// The response does not look like JSON.
    #[error("LLM response is not JSON: {snippet}")]
    NotJson { snippet: String },

    /// The response looks like JSON but does not parse as one object
    /// (syntax error, trailing data or several objects).
    #[error("LLM response is malformed JSON: {detail}")]
    MalformedJson { detail: String },

    /// The response parsed, but the top-level value is not an object.
    #[error("LLM response is JSON but not an object")]
    NotAnObject,
}

impl RefinementError {
    /// Classify a transport error from reqwest.
    pub fn from_transport(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            RefinementError::Timeout
        } else {
            RefinementError::Network {
                detail: e.to_string(),
            }
        }
    }
}
