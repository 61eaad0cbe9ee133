//! Image encoding: raw image bytes → base64 `ImageData`.
//!
//! VLM APIs (OpenAI, Anthropic, Gemini) accept images as base64 data-URIs
//! embedded in the JSON request body; there is no separate upload step. A full
//! 2× page therefore travels inline, roughly a third larger than the PNG.
//! `detail: "high"` instructs GPT-4-class models to use the full image tile
//! budget; without it the small print on a receipt is lost.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use tracing::debug;

/// Wrap `bytes` as base64 image data declared with `mime_type`.
pub fn encode_image(bytes: &[u8], mime_type: &str) -> ImageData {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded {} image → {} bytes base64", mime_type, b64.len());

    ImageData::new(b64, mime_type).with_detail("high")
}
