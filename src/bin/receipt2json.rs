//! CLI binary for receipt-vision.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, reads the document and prints the JSON result. It plays
//! the role of the transport layer: library errors are turned into a
//! `{"status", "detail"}` body in one place, [`error_body`].

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use receipt_vision::pipeline::input::resolve_input;
use receipt_vision::{
    detect_format, ExtractError, ExtractionConfig, ExtractionInput, ExtractionResult, Extractor,
};
use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Photo of a ticket
  receipt2json ticket.jpg

  # PDF invoice (page 1 only), result to a file
  receipt2json factura.pdf -o factura.json

  # Base64 payload from another service, with its original file name
  cat payload.b64 | receipt2json --base64 --file-name scan.pdf -

  # Check what the pipeline would send, without an API key
  receipt2json --detect-only upload.bin

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  OCR_VISION_MODEL        Vision model ID (default: gpt-4o-mini)
  RECEIPT2JSON_PROVIDER   Provider name (openai, anthropic, gemini, ollama, …)
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)

EXIT STATUS:
  0  extraction succeeded
  1  usage or I/O error
  2  the document could not be extracted; a {"status", "detail"} body is
     printed on stdout
"#;

/// Extract structured data from receipt and invoice images or PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "receipt2json",
    version,
    about = "Extract structured data from receipt and invoice images or PDFs using Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Image or PDF path, HTTP/HTTPS URL, or `-` for stdin.
    input: String,

    /// Treat the input content as a base64 payload.
    #[arg(long)]
    base64: bool,

    /// Original file name, used as a format hint (stdin/base64 inputs).
    #[arg(long)]
    file_name: Option<String>,

    /// Write JSON to this file instead of stdout.
    #[arg(short, long, env = "RECEIPT2JSON_OUTPUT")]
    output: Option<PathBuf>,

    /// Vision model ID.
    #[arg(long, env = "OCR_VISION_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "RECEIPT2JSON_PROVIDER")]
    provider: Option<String>,

    /// Max output tokens for the model reply.
    #[arg(long, env = "RECEIPT2JSON_MAX_TOKENS", default_value_t = 700)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "RECEIPT2JSON_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Vision call timeout in seconds.
    #[arg(long, env = "RECEIPT2JSON_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// HTTP download timeout in seconds (URL inputs).
    #[arg(long, env = "RECEIPT2JSON_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Largest accepted document, in MiB.
    #[arg(long, env = "RECEIPT2JSON_MAX_PAYLOAD_MB", default_value_t = 20,
          value_parser = clap::value_parser!(u64).range(1..=512))]
    max_payload_mb: u64,

    /// Path to libpdfium (file or directory).
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Path to a text file replacing the built-in receipt prompt.
    #[arg(long, env = "RECEIPT2JSON_PROMPT")]
    prompt_file: Option<PathBuf>,

    /// Print the detected format only; no model call.
    #[arg(long)]
    detect_only: bool,

    /// Single-line JSON instead of pretty-printed.
    #[arg(long)]
    compact: bool,

    /// Disable the spinner.
    #[arg(long, env = "RECEIPT2JSON_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "RECEIPT2JSON_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "RECEIPT2JSON_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner is the feedback while waiting on the model; keep library
    // INFO logs from scribbling over it.
    let show_progress =
        !cli.quiet && !cli.no_progress && !cli.detect_only && io::stderr().is_terminal();
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli).await?;

    // ── Read the document ────────────────────────────────────────────────
    let input = match read_input(&cli, &config).await? {
        Ok(input) => input,
        Err(e) => return report_failure(&cli, &e),
    };

    // ── Detect-only mode ─────────────────────────────────────────────────
    if cli.detect_only {
        return match detect_format(input.bytes(), input.file_name()) {
            Ok(format) => {
                let body = serde_json::json!({
                    "is_pdf": format.is_pdf,
                    "mime_type": format.mime_type,
                    "bytes": input.len(),
                });
                emit(&cli, &body)?;
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => report_failure(&cli, &e),
        };
    }

    // ── Run extraction ───────────────────────────────────────────────────
    let extractor = Extractor::from_config(&config).context("Failed to set up the vision provider")?;

    let spinner = show_progress.then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Reading");
        bar.set_message(format!("{} with {}", display_name(&cli, &input), config.model_name()));
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    });

    let outcome = extractor.extract(&input).await;

    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }

    match outcome {
        Ok(result) => {
            emit(&cli, &result)?;
            if !cli.quiet {
                eprintln!("{} {}", green("✔"), summary(&result));
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => report_failure(&cli, &e),
    }
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout)
        .max_payload_bytes(cli.max_payload_mb as usize * 1024 * 1024);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref path) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(path);
    }
    if let Some(ref path) = cli.prompt_file {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
        builder = builder.prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}

/// Build the `ExtractionInput`.
///
/// The outer `Result` is CLI plumbing (stdin); the inner one is a document
/// problem reported through the error body.
async fn read_input(
    cli: &Cli,
    config: &ExtractionConfig,
) -> Result<Result<ExtractionInput, ExtractError>> {
    let limit = config.max_payload_bytes;

    if cli.input == "-" {
        let mut buf = Vec::new();
        io::stdin()
            .read_to_end(&mut buf)
            .context("Failed to read stdin")?;
        return Ok(if cli.base64 {
            let text = String::from_utf8_lossy(&buf);
            ExtractionInput::from_base64(&text, cli.file_name.clone(), limit)
        } else {
            Ok(ExtractionInput::from_bytes(buf, cli.file_name.clone()))
        });
    }

    let input = match resolve_input(&cli.input, config.download_timeout_secs, limit).await {
        Ok(input) => input,
        Err(e) => return Ok(Err(e)),
    };

    if cli.base64 {
        let text = String::from_utf8_lossy(input.bytes());
        let name = cli.file_name.clone();
        return Ok(ExtractionInput::from_base64(&text, name, limit));
    }

    Ok(Ok(match cli.file_name {
        Some(ref name) => ExtractionInput::from_bytes(input.bytes().to_vec(), Some(name.clone())),
        None => input,
    }))
}

/// The transport-level error body.
fn error_body(e: &ExtractError) -> serde_json::Value {
    serde_json::json!({
        "status": e.status_code(),
        "detail": e.to_string(),
    })
}

fn report_failure(cli: &Cli, e: &ExtractError) -> Result<ExitCode> {
    emit(cli, &error_body(e))?;
    if !cli.quiet {
        eprintln!("{} {}", red("✘"), e);
    }
    Ok(ExitCode::from(2))
}

/// Write a JSON document to `--output` or stdout.
fn emit<T: serde::Serialize>(cli: &Cli, value: &T) -> Result<()> {
    let json = if cli.compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    }
    .context("Failed to serialise output")?;

    match cli.output {
        Some(ref path) => std::fs::write(path, format!("{json}\n"))
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            writeln!(handle, "{json}").context("Failed to write to stdout")
        }
    }
}

fn display_name(cli: &Cli, input: &ExtractionInput) -> String {
    input
        .file_name()
        .map(str::to_string)
        .unwrap_or_else(|| cli.input.clone())
}

fn summary(result: &ExtractionResult) -> String {
    let items = result.items().map(Vec::len).unwrap_or(0);
    let amount = result
        .field("amount")
        .map(|v| v.to_string())
        .unwrap_or_else(|| "?".into());
    format!(
        "{} fields, {} items, amount {}  {}",
        result.structured.len(),
        items,
        amount,
        dim(&format!("{} chars of text", result.text.len())),
    )
}
