//! Format detection: PDF or image, and which MIME type to declare.
//!
//! Uploads arrive with unreliable names (`blob`, `image`, no extension at all)
//! and sometimes with none. Detection therefore combines the file-name hint
//! with content sniffing and always lands on a usable MIME type: a vision
//! provider needs one in the data-URI, and a wrong-but-plausible `image/jpeg`
//! is better than refusing the document outright.

use crate::error::ExtractError;
use image::ImageFormat;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;
use tracing::debug;

/// MIME type declared for PDF input.
pub const PDF_MIME: &str = "application/pdf";

/// MIME type used when neither the name nor the content identifies the image.
pub const FALLBACK_IMAGE_MIME: &str = "image/jpeg";

const PDF_MAGIC: &[u8] = b"%PDF";

/// Result of [`detect_format`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DetectedFormat {
    pub is_pdf: bool,
    pub mime_type: &'static str,
}

/// Classify `bytes` as PDF or image and resolve a MIME type.
///
/// * PDF when the name ends in `.pdf` or the content starts with `%PDF`.
/// * Image MIME: file extension, then header sniffing, then `image/jpeg`.
///
/// Only an empty payload is an error.
pub fn detect_format(bytes: &[u8], file_name: Option<&str>) -> Result<DetectedFormat, ExtractError> {
    if bytes.is_empty() {
        return Err(ExtractError::EmptyInput);
    }

    let ext = file_name.and_then(extension_of);
    let is_pdf = ext.as_deref() == Some("pdf") || bytes.starts_with(PDF_MAGIC);

    let mime_type = if is_pdf {
        PDF_MIME
    } else {
        ext.as_deref()
            .and_then(ImageFormat::from_extension)
            .or_else(|| image::guess_format(bytes).ok())
            .map(|f| f.to_mime_type())
            .unwrap_or(FALLBACK_IMAGE_MIME)
    };

    debug!(
        "Detected {} ({} bytes, header {})",
        mime_type,
        bytes.len(),
        header_hex(bytes)
    );

    Ok(DetectedFormat { is_pdf, mime_type })
}

fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// First 8 bytes as lowercase hex, for logs.
fn header_hex(bytes: &[u8]) -> String {
    bytes.iter().take(8).fold(String::with_capacity(16), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
    const JPEG_HEADER: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F'];

    #[test]
    fn empty_input_fails() {
        assert!(matches!(detect_format(&[], None), Err(ExtractError::EmptyInput)));
        assert!(matches!(
            detect_format(&[], Some("ticket.pdf")),
            Err(ExtractError::EmptyInput)
        ));
    }

    #[test]
    fn pdf_by_signature_without_name() {
        let f = detect_format(b"%PDF-1.4\n...", None).unwrap();
        assert!(f.is_pdf);
        assert_eq!(f.mime_type, PDF_MIME);
    }

    #[test]
    fn pdf_by_extension_case_insensitive() {
        let f = detect_format(b"garbage", Some("Factura.PDF")).unwrap();
        assert!(f.is_pdf);
    }

    #[test]
    fn signature_wins_over_misleading_name() {
        let f = detect_format(b"%PDF-1.7", Some("upload.png")).unwrap();
        assert!(f.is_pdf);
    }

    #[test]
    fn image_mime_from_extension_first() {
        // PNG bytes, but the name says JPEG: the name is trusted first.
        let f = detect_format(PNG_HEADER, Some("ticket.jpg")).unwrap();
        assert!(!f.is_pdf);
        assert_eq!(f.mime_type, "image/jpeg");

        let f = detect_format(JPEG_HEADER, Some("ticket.webp")).unwrap();
        assert_eq!(f.mime_type, "image/webp");
    }

    #[test]
    fn image_mime_sniffed_when_name_is_unhelpful() {
        assert_eq!(detect_format(PNG_HEADER, None).unwrap().mime_type, "image/png");
        assert_eq!(
            detect_format(PNG_HEADER, Some("blob")).unwrap().mime_type,
            "image/png"
        );
        assert_eq!(
            detect_format(PNG_HEADER, Some("scan.unknownext")).unwrap().mime_type,
            "image/png"
        );
        assert_eq!(
            detect_format(JPEG_HEADER, Some("upload.bin")).unwrap().mime_type,
            "image/jpeg"
        );
    }

    #[test]
    fn unknown_content_defaults_to_jpeg() {
        let f = detect_format(&[0x00, 0x01, 0x02], None).unwrap();
        assert!(!f.is_pdf);
        assert_eq!(f.mime_type, FALLBACK_IMAGE_MIME);
    }

    #[test]
    fn mime_is_never_empty() {
        let samples: [&[u8]; 5] = [b"x", b"%PD", PNG_HEADER, JPEG_HEADER, &[0xFF; 64]];
        for bytes in samples {
            for name in [None, Some("a"), Some("a.pdf"), Some("a.gif"), Some(".hidden")] {
                let f = detect_format(bytes, name).unwrap();
                assert!(!f.mime_type.is_empty(), "{bytes:?} / {name:?}");
            }
        }
    }

    #[test]
    fn header_hex_truncates_to_eight_bytes() {
        assert_eq!(header_hex(PNG_HEADER), "89504e470d0a1a0a");
        assert_eq!(header_hex(&[0xab]), "ab");
    }
}
