//! PDF rasterisation: render page 1 of a PDF to a PNG [`RasterArtifact`].
//!
//! ## Why only page 1?
//!
//! A receipt or invoice is one page. Multi-page uploads are almost always a
//! receipt followed by terms and conditions, and sending those pages would
//! only burn tokens and confuse the field extraction.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! The orchestrator runs [`PageRasterizer::rasterize_first_page`] on the
//! blocking pool so Tokio worker threads never stall on CPU-heavy rendering.
//!
//! ## Why a fixed 2× scale?
//!
//! Receipts are narrow and printed in small type. Doubling the page's natural
//! size keeps totals and line items legible to the VLM while a single page
//! stays far below provider upload limits.

use crate::error::ExtractError;
use image::{DynamicImage, ImageFormat};
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

/// Zoom applied to the page's natural size.
pub const RENDER_SCALE: f32 = 2.0;

/// MIME type of every raster artifact.
pub const RASTER_MIME: &str = "image/png";

static LIVE_ARTIFACTS: AtomicUsize = AtomicUsize::new(0);

/// Number of [`RasterArtifact`]s currently alive in this process.
///
/// Every extraction releases its artifact before returning, so outside of an
/// in-flight call this is zero.
pub fn live_raster_artifacts() -> usize {
    LIVE_ARTIFACTS.load(Ordering::SeqCst)
}

/// A rendered page held in memory as PNG bytes.
///
/// Owned by exactly one extraction call and released when dropped.
#[derive(Debug)]
pub struct RasterArtifact {
    png: Vec<u8>,
    width: u32,
    height: u32,
}

impl RasterArtifact {
    /// Flatten `image` to RGB and encode it as PNG.
    ///
    /// Fails with [`ExtractError::InvalidPage`] when the image has no pixels
    /// or the encoder yields no bytes.
    pub fn from_image(image: &DynamicImage) -> Result<Self, ExtractError> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(ExtractError::InvalidPage {
                detail: format!("rendered raster is {width}x{height}"),
            });
        }

        let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
        let mut png = Vec::new();
        rgb.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| ExtractError::InvalidPage {
                detail: format!("PNG encoding failed: {e}"),
            })?;

        if png.is_empty() {
            return Err(ExtractError::InvalidPage {
                detail: "PNG encoding produced no bytes".into(),
            });
        }

        LIVE_ARTIFACTS.fetch_add(1, Ordering::SeqCst);
        Ok(Self { png, width, height })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.png
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn mime_type(&self) -> &'static str {
        RASTER_MIME
    }
}

impl Drop for RasterArtifact {
    fn drop(&mut self) {
        LIVE_ARTIFACTS.fetch_sub(1, Ordering::SeqCst);
        debug!(
            "Released raster artifact {}x{} ({} bytes)",
            self.width,
            self.height,
            self.png.len()
        );
    }
}

/// Renders the first page of a PDF.
///
/// Called from `spawn_blocking`, so implementations may block.
pub trait PageRasterizer: Send + Sync {
    fn rasterize_first_page(&self, pdf: &[u8]) -> Result<RasterArtifact, ExtractError>;
}

/// [`PageRasterizer`] backed by the pdfium library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    lib_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    /// `lib_path` overrides `PDFIUM_LIB_PATH` and the system library.
    pub fn new(lib_path: Option<PathBuf>) -> Self {
        Self { lib_path }
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn rasterize_first_page(&self, pdf: &[u8]) -> Result<RasterArtifact, ExtractError> {
        let pdfium = bind_pdfium(self.lib_path.as_deref())?;

        // `document` closes when it goes out of scope, on every return path.
        let document = pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(|e| ExtractError::PdfOpen {
                detail: format!("{:?}", e),
            })?;

        let pages = document.pages();
        let total_pages = pages.len();
        if total_pages == 0 {
            return Err(ExtractError::EmptyDocument);
        }
        info!("PDF loaded: {} pages, rendering page 1", total_pages);

        let page = pages.get(0).map_err(|e| ExtractError::InvalidPage {
            detail: format!("{:?}", e),
        })?;

        let render_config = PdfRenderConfig::new().scale_page_by_factor(RENDER_SCALE);
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| ExtractError::InvalidPage {
                detail: format!("{:?}", e),
            })?;

        let artifact = RasterArtifact::from_image(&bitmap.as_image())?;
        debug!(
            "Rendered page 1 → {}x{} px, {} bytes PNG",
            artifact.width(),
            artifact.height(),
            artifact.bytes().len()
        );

        Ok(artifact)
    }
}

/// Bind to pdfium: explicit path, then `PDFIUM_LIB_PATH`, then the system
/// library.
///
/// A path may name the library file itself or the directory holding it.
fn bind_pdfium(lib_path: Option<&Path>) -> Result<Pdfium, ExtractError> {
    let env_path = std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from);
    let candidate = lib_path.map(Path::to_path_buf).or(env_path);

    let bindings = match candidate {
        Some(path) => {
            let file = if path.is_dir() {
                path.join(platform_library_name())
            } else {
                path
            };
            debug!("Binding pdfium from {}", file.display());
            Pdfium::bind_to_library(&file)
        }
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| ExtractError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// `libpdfium.so`, `libpdfium.dylib` or `pdfium.dll`.
fn platform_library_name() -> String {
    format!(
        "{}pdfium{}",
        std::env::consts::DLL_PREFIX,
        std::env::consts::DLL_SUFFIX
    )
}
