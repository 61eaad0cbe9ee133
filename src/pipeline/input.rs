//! Input resolution: turn whatever the transport delivered into an
//! [`ExtractionInput`].
//!
//! Transports hand us raw upload bytes, a base64 JSON field, a local path or a
//! URL. All four end up as the same immutable value: the payload plus an
//! optional file name used as a format hint. The bytes are held in an
//! `Arc<[u8]>` so the rasteriser can take them onto a blocking thread without
//! copying.

use crate::error::ExtractError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// One document submitted for extraction. Immutable once built.
#[derive(Debug, Clone)]
pub struct ExtractionInput {
    bytes: Arc<[u8]>,
    file_name: Option<String>,
}

impl ExtractionInput {
    /// Wrap raw bytes, e.g. a multipart upload.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>, file_name: Option<String>) -> Self {
        Self {
            bytes: Arc::from(bytes.into()),
            file_name,
        }
    }

    /// Decode a base64 payload, e.g. the `fileBase64` field of a JSON body.
    ///
    /// Surrounding whitespace and a `data:<mime>;base64,` prefix are ignored.
    /// The decoded size is estimated before decoding so an oversized payload
    /// is rejected without allocating it.
    pub fn from_base64(
        encoded: &str,
        file_name: Option<String>,
        max_bytes: usize,
    ) -> Result<Self, ExtractError> {
        let payload = strip_data_uri_prefix(encoded.trim());
        let payload: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();

        if payload.is_empty() {
            return Err(ExtractError::InvalidBase64 {
                detail: "payload is empty".into(),
            });
        }

        let estimated = payload.len() / 4 * 3;
        if estimated > max_bytes.saturating_add(2) {
            return Err(ExtractError::PayloadTooLarge {
                size: estimated,
                limit: max_bytes,
            });
        }

        let bytes = STANDARD
            .decode(payload.as_bytes())
            .map_err(|e| ExtractError::InvalidBase64 {
                detail: e.to_string(),
            })?;
        debug!("Decoded base64 payload → {} bytes", bytes.len());

        Ok(Self::from_bytes(bytes, file_name))
    }

    /// Read a local file, keeping its file name as the format hint.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ExtractError::InputNotFound {
                path: path.to_path_buf(),
            },
            _ => ExtractError::InputReadFailed {
                path: path.to_path_buf(),
                source: e,
            },
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());

        debug!("Read local input: {} ({} bytes)", path.display(), bytes.len());
        Ok(Self::from_bytes(bytes, file_name))
    }

    /// Download a document over HTTP(S).
    pub async fn from_url(
        url: &str,
        timeout_secs: u64,
        max_bytes: usize,
    ) -> Result<Self, ExtractError> {
        info!("Downloading document from: {}", url);

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ExtractError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let download_err = |e: reqwest::Error| {
            if e.is_timeout() {
                ExtractError::DownloadTimeout {
                    url: url.to_string(),
                    secs: timeout_secs,
                }
            } else {
                ExtractError::DownloadFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        };

        let mut response = client.get(url).send().await.map_err(download_err)?;

        if !response.status().is_success() {
            return Err(ExtractError::DownloadFailed {
                url: url.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        if let Some(len) = response.content_length() {
            if len as usize > max_bytes {
                return Err(ExtractError::PayloadTooLarge {
                    size: len as usize,
                    limit: max_bytes,
                });
            }
        }

        // Content-Length is optional (chunked bodies); enforce the cap as we go.
        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(download_err)? {
            let size = bytes.len() + chunk.len();
            if size > max_bytes {
                return Err(ExtractError::PayloadTooLarge {
                    size,
                    limit: max_bytes,
                });
            }
            bytes.extend_from_slice(&chunk);
        }
        info!("Downloaded {} bytes", bytes.len());

        Ok(Self::from_bytes(bytes, file_name_from_url(url)))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Cheap shared handle to the payload.
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

fn strip_data_uri_prefix(s: &str) -> &str {
    if s.starts_with("data:") {
        if let Some(idx) = s.find(";base64,") {
            return &s[idx + ";base64,".len()..];
        }
    }
    s
}

/// Last path segment of a URL when it looks like a file name.
fn file_name_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    if !last.is_empty() && last.contains('.') {
        Some(last.to_string())
    } else {
        None
    }
}

/// Resolve a CLI-style input string (path or URL).
pub async fn resolve_input(
    input: &str,
    timeout_secs: u64,
    max_bytes: usize,
) -> Result<ExtractionInput, ExtractError> {
    if is_url(input) {
        ExtractionInput::from_url(input, timeout_secs, max_bytes).await
    } else {
        ExtractionInput::from_path(PathBuf::from(input)).await
    }
}
