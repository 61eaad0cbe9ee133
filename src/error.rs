//! Error types for the receipt-vision library.
//!
//! Every pipeline stage returns `Result<_, ExtractError>`. A failure is
//! terminal for the current extraction call only: the [`crate::Extractor`]
//! keeps no state between calls, so the next request starts clean.
//!
//! The transport layer (the `receipt2json` binary, or an HTTP handler built on
//! top of this crate) translates an error into a response in exactly one place:
//! [`ExtractError::status_code`] plus the `Display` message as the detail.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the receipt-vision library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The payload has zero bytes.
    #[error("Input is empty: no bytes were received")]
    EmptyInput,

    /// The payload is larger than the configured cap.
    #[error("Input is {size} bytes, which exceeds the {limit}-byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    /// A base64 payload could not be decoded.
    #[error("Invalid base64 payload: {detail}")]
    InvalidBase64 { detail: String },

    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// Input file exists but could not be read.
    #[error("Failed to read '{path}': {source}")]
    InputReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// The PDF is corrupt, encrypted, or not a PDF despite its signature.
    #[error("Could not open the PDF: {detail}")]
    PdfOpen { detail: String },

    /// The PDF parsed but has no pages.
    #[error("The PDF contains no pages")]
    EmptyDocument,

    /// The first page rendered to an empty raster.
    #[error("The first PDF page is invalid or empty: {detail}")]
    InvalidPage { detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Vision provider errors ────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The provider refused the request as malformed or unsupported (image
    /// format, size limit, token limit). `diagnostic` is whatever the provider
    /// returned.
    #[error("The vision provider rejected the file: {diagnostic}")]
    ProviderRejected { diagnostic: String },

    /// The provider could not be reached or failed on its side (network,
    /// rate limiting, server error). Nothing was wrong with the document.
    #[error("The vision provider is unavailable: {diagnostic}")]
    ProviderUnavailable { diagnostic: String },

    /// The provider did not answer within the configured timeout.
    #[error("The vision provider did not answer within {secs}s")]
    ProviderTimeout { secs: u64 },

    /// The provider answered with empty or whitespace-only text.
    #[error("The vision model produced no usable response")]
    EmptyModelResponse,

    // ── Reply errors ──────────────────────────────────────────────────────
    /// Neither a fenced block nor the whole reply parsed as JSON.
    #[error("Could not interpret the model response: {raw}")]
    UnparsableResponse { raw: String },

    /// The reply parsed but carried no structured fields.
    #[error("The vision model could not structure the receipt information")]
    UnstructuredResult,

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    /// HTTP-style status code for the transport boundary.
    ///
    /// Everything caused by the submitted document or the model's reply is a
    /// client error (400); an oversized payload is 413; an unreachable
    /// provider is 502 and a provider timeout 504; broken local setup (no
    /// provider, bad credentials, no pdfium, bad config) is 500.
    pub fn status_code(&self) -> u16 {
        match self {
            ExtractError::PayloadTooLarge { .. } => 413,
            ExtractError::ProviderUnavailable { .. } => 502,
            ExtractError::ProviderTimeout { .. } => 504,
            ExtractError::PdfiumBindingFailed(_)
            | ExtractError::ProviderNotConfigured { .. }
            | ExtractError::InvalidConfig(_)
            | ExtractError::Internal(_) => 500,
            _ => 400,
        }
    }

    /// The raw model reply, when the failure was caused by it.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            ExtractError::UnparsableResponse { raw } => Some(raw),
            _ => None,
        }
    }
}
