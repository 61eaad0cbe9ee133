//! Configuration types for receipt extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. The config is read once when an
//! [`crate::Extractor`] is constructed and never mutated afterwards, so one
//! extractor can serve concurrent requests without locking.

use crate::error::ExtractError;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default vision model when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default cap on the decoded payload size: 20 MiB.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Configuration for receipt extraction.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use receipt_vision::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .model("gpt-4o-mini")
///     .max_tokens(700)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// LLM model identifier, e.g. "gpt-4o-mini". If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for the completion. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate per receipt. Default: 700.
    ///
    /// Extremely long receipts may be truncated at this ceiling; the reply
    /// parser then fails with [`ExtractError::UnparsableResponse`].
    pub max_tokens: usize,

    /// Timeout for the single vision call, in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Largest accepted payload in bytes. Default: 20 MiB.
    pub max_payload_bytes: usize,

    /// Explicit pdfium shared library. Falls back to `PDFIUM_LIB_PATH`, then
    /// the system library.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Custom instruction text. If None, uses [`crate::prompts::build_prompt`]
    /// with the receipt schema.
    pub prompt: Option<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 700,
            api_timeout_secs: 60,
            download_timeout_secs: 120,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            pdfium_lib_path: None,
            prompt: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("max_payload_bytes", &self.max_payload_bytes)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field("prompt", &self.prompt.as_ref().map(|p| p.len()))
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model name that will be requested.
    pub fn model_name(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn max_payload_bytes(mut self, n: usize) -> Self {
        self.config.max_payload_bytes = n;
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = Some(prompt.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(ExtractError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(ExtractError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.max_payload_bytes == 0 {
            return Err(ExtractError::InvalidConfig(
                "max_payload_bytes must be ≥ 1".into(),
            ));
        }
        if let Some(ref p) = c.prompt {
            if p.trim().is_empty() {
                return Err(ExtractError::InvalidConfig("prompt must not be blank".into()));
            }
        }
        Ok(self.config)
    }
}
