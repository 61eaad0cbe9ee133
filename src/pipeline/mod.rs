//! Pipeline stages for receipt extraction.
//!
//! Each submodule implements exactly one transformation step, so each is
//! independently testable and the rendering backend or the vision provider
//! can be swapped behind its trait without touching the other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ detect ──▶ [render] ──▶ encode ──▶ llm ──▶ parse
//! (bytes)   (mime)     (pdfium)     (base64)   (VLM)   (JSON repair)
//! ```
//!
//! 1. [`input`]  : accept bytes, base64, a local file or a URL
//! 2. [`detect`] : classify PDF vs image and resolve the MIME type
//! 3. [`render`] : rasterise page 1 of a PDF; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 4. [`encode`] : base64-wrap the image for the multimodal request body
//! 5. [`llm`]    : the single VLM call; the only stage with network I/O
//! 6. [`parse`]  : pull a JSON object out of the free-form reply and
//!    normalise it to `{text, structured}`

pub mod detect;
pub mod encode;
pub mod input;
pub mod llm;
pub mod parse;
pub mod render;
