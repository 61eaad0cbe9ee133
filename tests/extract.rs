//! Pipeline tests with an in-process vision provider and PDF renderer.
//!
//! No network, no API key and no pdfium library are needed: the provider and
//! the rasterizer are swapped for fakes through the `Extractor` type
//! parameters.

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use receipt_vision::{
    ExtractError, ExtractionConfig, ExtractionInput, Extractor, PageRasterizer, RasterArtifact,
    VisionProvider, VisionRequest,
};
use serde_json::json;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Fakes ────────────────────────────────────────────────────────────────────

const RECEIPT_REPLY: &str = r#"{
  "text": "CAFE CENTRAL\n2 x Cortado 3.000\nTOTAL 6.600",
  "structured": {
    "amount": 6600,
    "fecha": "2024-03-14",
    "items": [{"descripcion": "Cortado", "cantidad": 2, "monto": 6000}],
    "propina": 600,
    "iva": null,
    "subtotal": 6000
  }
}"#;

enum Reply {
    Text(&'static str),
    /// Yields to the runtime once before answering.
    Deferred(&'static str),
    Reject(&'static str),
    Hang,
}

/// Records every request and answers with a fixed [`Reply`].
struct FakeProvider {
    reply: Reply,
    seen: Mutex<Vec<SeenRequest>>,
}

#[derive(Debug, Clone)]
struct SeenRequest {
    prompt: String,
    mime_type: String,
    max_tokens: usize,
}

impl FakeProvider {
    fn new(reply: Reply) -> Self {
        Self {
            reply,
            seen: Mutex::new(Vec::new()),
        }
    }

    fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

impl VisionProvider for FakeProvider {
    async fn submit(&self, request: &VisionRequest<'_>) -> Result<String, ExtractError> {
        self.seen.lock().unwrap().push(SeenRequest {
            prompt: request.prompt.to_string(),
            mime_type: request.image.mime_type.clone(),
            max_tokens: request.max_tokens,
        });

        match self.reply {
            Reply::Text(text) => Ok(text.to_string()),
            Reply::Deferred(text) => {
                tokio::task::yield_now().await;
                Ok(text.to_string())
            }
            Reply::Reject(diagnostic) => Err(ExtractError::ProviderRejected {
                diagnostic: diagnostic.to_string(),
            }),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(String::new())
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Render {
    Page,
    Corrupt,
    NoPages,
}

/// Produces a small white page, or a fixed failure.
struct FakeRasterizer {
    mode: Render,
}

impl FakeRasterizer {
    fn new(mode: Render) -> Self {
        Self { mode }
    }
}

impl PageRasterizer for FakeRasterizer {
    fn rasterize_first_page(&self, pdf: &[u8]) -> Result<RasterArtifact, ExtractError> {
        assert!(!pdf.is_empty());
        match self.mode {
            Render::Page => {
                let page = RgbImage::from_pixel(40, 80, Rgb([255, 255, 255]));
                RasterArtifact::from_image(&DynamicImage::ImageRgb8(page))
            }
            Render::Corrupt => Err(ExtractError::PdfOpen {
                detail: "FormatError".into(),
            }),
            Render::NoPages => Err(ExtractError::EmptyDocument),
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn config() -> ExtractionConfig {
    ExtractionConfig::builder()
        .api_timeout_secs(5)
        .build()
        .expect("valid config")
}

fn extractor(reply: Reply) -> Extractor<FakeProvider, FakeRasterizer> {
    Extractor::new(
        &config(),
        FakeProvider::new(reply),
        FakeRasterizer::new(Render::Page),
    )
}

fn png_bytes() -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([0, 0, 0])));
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

fn pdf_bytes() -> Vec<u8> {
    b"%PDF-1.4\n1 0 obj << /Type /Catalog >> endobj\n%%EOF".to_vec()
}

// ── Happy paths ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn photo_is_sent_as_is_with_sniffed_mime() {
    let ex = extractor(Reply::Text(RECEIPT_REPLY));
    let input = ExtractionInput::from_bytes(png_bytes(), None);

    let result = ex.extract(&input).await.unwrap();

    assert!(result.text.contains("CAFE CENTRAL"));
    assert_eq!(result.structured["amount"], json!(6600));
    assert_eq!(result.items().map(Vec::len), Some(1));
    assert!(result.field("iva").is_none());

    let seen = ex_provider_seen(&ex);
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].mime_type, "image/png");
    assert_eq!(seen[0].max_tokens, 700);
}

#[tokio::test]
async fn extension_wins_over_content_for_images() {
    let ex = extractor(Reply::Text(RECEIPT_REPLY));
    let input = ExtractionInput::from_bytes(png_bytes(), Some("scan.JPG".into()));

    ex.extract(&input).await.unwrap();

    assert_eq!(ex_provider_seen(&ex)[0].mime_type, "image/jpeg");
}

#[tokio::test]
async fn pdf_is_rendered_and_sent_as_png() {
    let ex = extractor(Reply::Text(RECEIPT_REPLY));
    let input = ExtractionInput::from_bytes(pdf_bytes(), Some("factura.pdf".into()));

    let result = ex.extract(&input).await.unwrap();

    assert_eq!(result.structured["subtotal"], json!(6000));
    assert_eq!(ex_provider_seen(&ex)[0].mime_type, "image/png");
}

#[tokio::test]
async fn pdf_detected_by_magic_without_name() {
    let ex = extractor(Reply::Text(RECEIPT_REPLY));
    let input = ExtractionInput::from_bytes(pdf_bytes(), Some("upload.bin".into()));

    ex.extract(&input).await.unwrap();

    assert_eq!(ex_provider_seen(&ex)[0].mime_type, "image/png");
}

#[tokio::test]
async fn fenced_reply_with_commentary() {
    let ex = extractor(Reply::Text(
        "Sure! Here it is:\n```json\n{\"text\": \"A\", \"structured\": {\"amount\": 5}}\n```",
    ));
    let input = ExtractionInput::from_bytes(png_bytes(), None);

    let result = ex.extract(&input).await.unwrap();

    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        json!({"text": "A", "structured": {"amount": 5}})
    );
}

#[tokio::test]
async fn flat_reply_becomes_structured() {
    let ex = extractor(Reply::Text(r#"{"amount": 5, "fecha": null}"#));
    let input = ExtractionInput::from_bytes(png_bytes(), None);

    let result = ex.extract(&input).await.unwrap();

    assert_eq!(result.text, "");
    assert_eq!(result.structured["amount"], json!(5));
}

#[tokio::test]
async fn prompt_lists_receipt_fields() {
    let ex = extractor(Reply::Text(RECEIPT_REPLY));
    ex.extract(&ExtractionInput::from_bytes(png_bytes(), None))
        .await
        .unwrap();

    let prompt = &ex_provider_seen(&ex)[0].prompt;
    assert_eq!(prompt, ex.prompt());
    for field in ["amount", "fecha", "items", "descripcion", "cantidad", "monto", "propina", "iva", "subtotal"] {
        assert!(prompt.contains(field), "prompt is missing `{field}`");
    }
}

#[tokio::test]
async fn custom_prompt_replaces_default() {
    let config = ExtractionConfig::builder()
        .prompt("Return {\"text\": ..., \"structured\": {\"total\": ...}}")
        .build()
        .unwrap();
    let ex = Extractor::new(
        &config,
        FakeProvider::new(Reply::Text(RECEIPT_REPLY)),
        FakeRasterizer::new(Render::Page),
    );

    ex.extract(&ExtractionInput::from_bytes(png_bytes(), None))
        .await
        .unwrap();

    assert!(ex_provider_seen(&ex)[0].prompt.contains("\"total\""));
}

// ── Failure kinds ────────────────────────────────────────────────────────────

#[tokio::test]
async fn empty_structured_is_unstructured_result() {
    let ex = extractor(Reply::Text(r#"{"text": "x", "structured": {}}"#));
    let err = ex
        .extract(&ExtractionInput::from_bytes(png_bytes(), None))
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractError::UnstructuredResult), "{err}");
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn prose_reply_is_unparsable_with_raw_text() {
    let ex = extractor(Reply::Text("I cannot read this receipt."));
    let err = ex
        .extract(&ExtractionInput::from_bytes(png_bytes(), None))
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractError::UnparsableResponse { .. }), "{err}");
    assert_eq!(err.raw_response(), Some("I cannot read this receipt."));
}

#[tokio::test]
async fn blank_reply_is_empty_model_response() {
    let ex = extractor(Reply::Text("   \n"));
    let err = ex
        .extract(&ExtractionInput::from_bytes(png_bytes(), None))
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractError::EmptyModelResponse), "{err}");
}

#[tokio::test]
async fn provider_rejection_keeps_diagnostic() {
    let ex = extractor(Reply::Reject("unsupported image format"));
    let err = ex
        .extract(&ExtractionInput::from_bytes(vec![0x00, 0x01, 0x02], None))
        .await
        .unwrap_err();

    match &err {
        ExtractError::ProviderRejected { diagnostic } => {
            assert_eq!(diagnostic, "unsupported image format")
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("unsupported image format"));
    // Unknown content still goes out, labelled with the fallback type.
    assert_eq!(ex_provider_seen(&ex)[0].mime_type, "image/jpeg");
}

#[tokio::test(start_paused = true)]
async fn slow_provider_times_out() {
    let config = ExtractionConfig::builder()
        .api_timeout_secs(2)
        .build()
        .unwrap();
    let ex = Extractor::new(
        &config,
        FakeProvider::new(Reply::Hang),
        FakeRasterizer::new(Render::Page),
    );

    let err = ex
        .extract(&ExtractionInput::from_bytes(png_bytes(), None))
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractError::ProviderTimeout { secs: 2 }), "{err}");
    assert_eq!(err.status_code(), 504);
}

#[tokio::test(start_paused = true)]
async fn hand_built_config_with_zero_timeout_still_waits() {
    let config = ExtractionConfig {
        api_timeout_secs: 0,
        max_tokens: 0,
        ..ExtractionConfig::default()
    };
    let ex = Extractor::new(
        &config,
        FakeProvider::new(Reply::Deferred(RECEIPT_REPLY)),
        FakeRasterizer::new(Render::Page),
    );

    let result = ex
        .extract(&ExtractionInput::from_bytes(png_bytes(), None))
        .await
        .unwrap();

    assert_eq!(result.structured["amount"], json!(6600));
    assert_eq!(ex_provider_seen(&ex)[0].max_tokens, 1);
}

#[tokio::test]
async fn empty_input_never_reaches_provider() {
    let ex = extractor(Reply::Text(RECEIPT_REPLY));
    let err = ex
        .extract(&ExtractionInput::from_bytes(Vec::new(), Some("a.pdf".into())))
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractError::EmptyInput), "{err}");
    assert!(ex_provider_seen(&ex).is_empty());
}

#[tokio::test]
async fn oversized_input_is_rejected_up_front() {
    let config = ExtractionConfig::builder()
        .max_payload_bytes(16)
        .build()
        .unwrap();
    let ex = Extractor::new(
        &config,
        FakeProvider::new(Reply::Text(RECEIPT_REPLY)),
        FakeRasterizer::new(Render::Page),
    );

    let err = ex
        .extract(&ExtractionInput::from_bytes(vec![0xFF; 17], None))
        .await
        .unwrap_err();

    assert!(
        matches!(err, ExtractError::PayloadTooLarge { size: 17, limit: 16 }),
        "{err}"
    );
    assert_eq!(err.status_code(), 413);
    assert!(ex_provider_seen(&ex).is_empty());
}

#[tokio::test]
async fn corrupt_pdf_is_reported_before_any_model_call() {
    let ex = Extractor::new(
        &config(),
        FakeProvider::new(Reply::Text(RECEIPT_REPLY)),
        FakeRasterizer::new(Render::Corrupt),
    );

    let err = ex
        .extract(&ExtractionInput::from_bytes(pdf_bytes(), None))
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractError::PdfOpen { .. }), "{err}");
    assert!(ex_provider_seen(&ex).is_empty());
}

#[tokio::test]
async fn pdf_without_pages_is_empty_document() {
    let ex = Extractor::new(
        &config(),
        FakeProvider::new(Reply::Text(RECEIPT_REPLY)),
        FakeRasterizer::new(Render::NoPages),
    );

    let err = ex
        .extract(&ExtractionInput::from_bytes(pdf_bytes(), Some("x.pdf".into())))
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractError::EmptyDocument), "{err}");
}

#[tokio::test]
async fn base64_input_round_trips_through_pipeline() {
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    let ex = extractor(Reply::Text(RECEIPT_REPLY));
    let encoded = format!("data:image/png;base64,{}", STANDARD.encode(png_bytes()));
    let input = ExtractionInput::from_base64(&encoded, None, 1024 * 1024).unwrap();

    ex.extract(&input).await.unwrap();

    assert_eq!(ex_provider_seen(&ex)[0].mime_type, "image/png");
}

// ── Concurrency ──────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_calls_are_independent() {
    let ex = Arc::new(extractor(Reply::Text(RECEIPT_REPLY)));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let ex = Arc::clone(&ex);
            tokio::spawn(async move {
                let bytes = if i % 2 == 0 { pdf_bytes() } else { png_bytes() };
                ex.extract(&ExtractionInput::from_bytes(bytes, None)).await
            })
        })
        .collect();

    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.structured["amount"], json!(6600));
    }

    assert_eq!(ex_provider_seen(&ex).len(), 8);
}

#[test]
fn extract_sync_outside_runtime() {
    let ex = extractor(Reply::Text(RECEIPT_REPLY));
    let result = ex
        .extract_sync(&ExtractionInput::from_bytes(pdf_bytes(), None))
        .unwrap();
    assert_eq!(result.structured["propina"], json!(600));
}

fn ex_provider_seen(ex: &Extractor<FakeProvider, FakeRasterizer>) -> Vec<SeenRequest> {
    ex.provider().seen()
}
