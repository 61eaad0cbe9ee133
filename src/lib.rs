//! # receipt-vision
//!
//! Turn a photo or PDF of a receipt, ticket or invoice into a transcription
//! plus structured fields (total, date, line items, tip, tax, subtotal) using
//! Vision Language Models (VLMs).
//!
//! ## Why this crate?
//!
//! Template OCR breaks on every new shop layout, crumpled paper and thermal
//! print. A VLM reads a receipt the way a person does. What it does *not* do
//! reliably is answer in a strict format, so the interesting engineering here
//! is on both sides of the model: normalising whatever the user uploaded into
//! one image, and repairing whatever text the model sends back into one
//! predictable JSON shape.
//!
//! ## Pipeline Overview
//!
//! ```text
//! bytes / base64 / path / URL
//!  │
//!  ├─ 1. Input   build an immutable ExtractionInput (size-capped)
//!  ├─ 2. Detect  PDF or image? which MIME type?
//!  ├─ 3. Render  PDF page 1 → PNG at 2× via pdfium (spawn_blocking)
//!  ├─ 4. VLM     one call: prompt + base64 image, bounded output tokens
//!  ├─ 5. Parse   fenced-or-bare JSON → {text, structured}
//!  └─ 6. Check   empty `structured` is a failure
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use receipt_vision::{ExtractionConfig, ExtractionInput, Extractor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let extractor = Extractor::from_config(&ExtractionConfig::default())?;
//!     let input = ExtractionInput::from_path("ticket.pdf").await?;
//!     let result = extractor.extract(&input).await?;
//!     println!("{}", serde_json::to_string_pretty(&result)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `receipt2json` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use error::ExtractError;
pub use extract::{resolve_provider, Extractor};
pub use output::ExtractionResult;
pub use pipeline::detect::{detect_format, DetectedFormat};
pub use pipeline::input::ExtractionInput;
pub use pipeline::llm::{LlmVisionProvider, VisionClient, VisionProvider, VisionReply, VisionRequest};
pub use pipeline::parse::parse_reply;
pub use pipeline::render::{live_raster_artifacts, PageRasterizer, PdfiumRasterizer, RasterArtifact};
pub use prompts::{build_prompt, OutputSchema, RECEIPT_SCHEMA};
