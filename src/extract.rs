//! The extraction pipeline: one document in, one [`ExtractionResult`] out.
//!
//! ```text
//! Received ─▶ Detect ─▶ [PDF? ─▶ Rasterize] ─▶ Submit ─▶ Parse ─▶ Done
//!     └──────────┴──────────────┴───────────────┴─────────┴──▶ Failed(kind)
//! ```
//!
//! An [`Extractor`] is built once at startup from an [`ExtractionConfig`] and
//! then shared (`&Extractor` or `Arc<Extractor>`) by every request. It holds
//! only read-only settings, so concurrent calls need no locking and one failed
//! call never affects the next.
//!
//! ## Raster lifetime
//!
//! For PDF input the rendered page is a [`RasterArtifact`] owned by the call's
//! stack frame. It is released by `Drop` on every exit: success, any error
//! after rendering, a provider timeout, or the caller dropping the future
//! mid-flight.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::output::ExtractionResult;
use crate::pipeline::detect;
use crate::pipeline::input::ExtractionInput;
use crate::pipeline::llm::{LlmVisionProvider, VisionClient, VisionProvider};
use crate::pipeline::parse;
use crate::pipeline::render::{PageRasterizer, PdfiumRasterizer, RasterArtifact};
use crate::prompts::{build_prompt, RECEIPT_SCHEMA};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Runs the extraction pipeline.
///
/// The vision provider and the PDF renderer are type parameters so tests and
/// embedders can substitute their own; [`Extractor::from_config`] wires the
/// production pair.
pub struct Extractor<P = LlmVisionProvider, R = PdfiumRasterizer> {
    vision: VisionClient<P>,
    rasterizer: Arc<R>,
    max_payload_bytes: usize,
}

impl Extractor {
    /// Resolve the LLM provider and bind the pdfium renderer described by
    /// `config`.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ExtractError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(
            config,
            LlmVisionProvider::new(provider),
            PdfiumRasterizer::new(config.pdfium_lib_path.clone()),
        ))
    }
}

impl<P, R> Extractor<P, R>
where
    P: VisionProvider,
    R: PageRasterizer + 'static,
{
    /// Assemble an extractor from explicit parts.
    ///
    /// A config assembled by hand skips the builder's checks, so the limits
    /// are floored at 1 here.
    pub fn new(config: &ExtractionConfig, provider: P, rasterizer: R) -> Self {
        let prompt = config
            .prompt
            .clone()
            .unwrap_or_else(|| build_prompt(&RECEIPT_SCHEMA));

        Self {
            vision: VisionClient::new(
                provider,
                prompt,
                config.max_tokens.max(1),
                config.temperature.clamp(0.0, 2.0),
                Duration::from_secs(config.api_timeout_secs.max(1)),
            ),
            rasterizer: Arc::new(rasterizer),
            max_payload_bytes: config.max_payload_bytes.max(1),
        }
    }

    /// The instruction text sent with every image.
    pub fn prompt(&self) -> &str {
        self.vision.prompt()
    }

    /// The vision provider requests are sent to.
    pub fn provider(&self) -> &P {
        self.vision.provider()
    }

    /// Extract `{text, structured}` from one receipt image or PDF.
    ///
    /// # Errors
    /// Any [`ExtractError`]; all are terminal for this call only.
    pub async fn extract(&self, input: &ExtractionInput) -> Result<ExtractionResult, ExtractError> {
        let start = Instant::now();

        // ── Step 1: Enforce payload cap ──────────────────────────────────────
        if input.len() > self.max_payload_bytes {
            return Err(ExtractError::PayloadTooLarge {
                size: input.len(),
                limit: self.max_payload_bytes,
            });
        }

        // ── Step 2: Detect format ────────────────────────────────────────────
        let format = detect::detect_format(input.bytes(), input.file_name())?;
        info!(
            "Processing input {} as {} ({} bytes)",
            input.file_name().unwrap_or("<unnamed>"),
            format.mime_type,
            input.len()
        );

        // ── Step 3: Rasterise PDFs ───────────────────────────────────────────
        let raster = if format.is_pdf {
            Some(self.rasterize(input).await?)
        } else {
            None
        };

        let (image, mime_type) = match &raster {
            Some(artifact) => (artifact.bytes(), artifact.mime_type()),
            None => (input.bytes(), format.mime_type),
        };

        // ── Step 4: Submit to the VLM ────────────────────────────────────────
        let reply = self.vision.describe(image, mime_type).await?;
        drop(raster);

        // ── Step 5: Parse and validate ───────────────────────────────────────
        let result = parse::parse_reply(reply)?;
        if result.structured.is_empty() {
            return Err(ExtractError::UnstructuredResult);
        }

        info!(
            "Extraction complete: {} structured fields, {} chars of text, {}ms",
            result.structured.len(),
            result.text.len(),
            start.elapsed().as_millis()
        );

        Ok(result)
    }

    /// Synchronous wrapper around [`Extractor::extract`].
    ///
    /// Creates a temporary tokio runtime internally; do not call from inside
    /// an async context.
    pub fn extract_sync(&self, input: &ExtractionInput) -> Result<ExtractionResult, ExtractError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.extract(input))
    }

    /// Render page 1 on the blocking pool.
    async fn rasterize(&self, input: &ExtractionInput) -> Result<RasterArtifact, ExtractError> {
        let render_start = Instant::now();
        let pdf = input.shared_bytes();
        let rasterizer = Arc::clone(&self.rasterizer);

        let artifact = tokio::task::spawn_blocking(move || rasterizer.rasterize_first_page(&pdf))
            .await
            .map_err(|e| ExtractError::Internal(format!("Render task panicked: {}", e)))??;

        info!(
            "PDF converted to PNG: {}x{} px, {} bytes in {}ms",
            artifact.width(),
            artifact.height(),
            artifact.bytes().len(),
            render_start.elapsed().as_millis()
        );
        Ok(artifact)
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Instantiate a named provider with the given model.
fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ExtractError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`): used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model`.
/// 3. **OpenAI key present** (`OPENAI_API_KEY`): openai with `config.model`.
/// 4. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model_name();

    if let Some(ref name) = config.provider_name {
        debug!("Using provider '{}' with model '{}'", name, model);
        return create_vision_provider(name, model);
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            debug!("OPENAI_API_KEY set; using openai with model '{}'", model);
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ExtractError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
