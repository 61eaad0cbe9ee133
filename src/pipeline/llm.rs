//! VLM interaction: send one receipt image plus the prompt, get text back.
//!
//! This module is intentionally thin. All prompt engineering lives in
//! [`crate::prompts`] and all tolerance for sloppy replies lives in
//! [`crate::pipeline::parse`]; here we only build the request, enforce the
//! timeout and reject replies that carry no text at all.
//!
//! ## No retries
//!
//! Exactly one attempt is made per extraction. Whether a rejected or timed-out
//! receipt should be retried is a policy decision for the caller, who knows
//! whether the user is still waiting.

use crate::error::ExtractError;
use crate::pipeline::encode;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, LlmError};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// One multimodal request.
#[derive(Debug, Clone)]
pub struct VisionRequest<'a> {
    pub prompt: &'a str,
    pub image: ImageData,
    pub max_tokens: usize,
    pub temperature: f32,
    /// Deadline the caller enforces; reported when the provider times out
    /// on its own.
    pub timeout: Duration,
}

/// The external vision capability: image + prompt in, text out.
///
/// Implementations report a refused request as
/// [`ExtractError::ProviderRejected`] with the provider's own diagnostic text,
/// and keep transport or account problems out of that kind.
pub trait VisionProvider: Send + Sync {
    fn submit(
        &self,
        request: &VisionRequest<'_>,
    ) -> impl Future<Output = Result<String, ExtractError>> + Send;
}

/// [`VisionProvider`] backed by any `edgequake_llm` provider.
#[derive(Clone)]
pub struct LlmVisionProvider {
    provider: Arc<dyn LLMProvider>,
}

impl LlmVisionProvider {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }
}

impl VisionProvider for LlmVisionProvider {
    async fn submit(&self, request: &VisionRequest<'_>) -> Result<String, ExtractError> {
        // Prompt and image travel in the same user turn.
        let messages = vec![ChatMessage::user_with_images(
            request.prompt,
            vec![request.image.clone()],
        )];
        let options = build_options(request);

        match self.provider.chat(&messages, Some(&options)).await {
            Ok(response) => {
                debug!(
                    "Vision call: {} input tokens, {} output tokens",
                    response.prompt_tokens, response.completion_tokens
                );
                Ok(response.content)
            }
            Err(e) => {
                warn!("Vision call to '{}' failed: {}", self.provider.name(), e);
                Err(classify_llm_error(e, self.provider.name(), request.timeout))
            }
        }
    }
}

/// Map a provider failure onto the extraction error taxonomy.
///
/// Only a refusal of the request itself is blamed on the document; credentials
/// and model selection are local setup, everything else is the provider's side.
fn classify_llm_error(e: LlmError, provider: &str, timeout: Duration) -> ExtractError {
    match e {
        LlmError::InvalidRequest(_)
        | LlmError::NotSupported(_)
        | LlmError::TokenLimitExceeded { .. }
        | LlmError::ApiError(_) => ExtractError::ProviderRejected {
            diagnostic: e.to_string(),
        },
        LlmError::Timeout => ExtractError::ProviderTimeout {
            secs: timeout.as_secs(),
        },
        LlmError::AuthError(_) | LlmError::ConfigError(_) | LlmError::ModelNotFound(_) => {
            ExtractError::ProviderNotConfigured {
                provider: provider.to_string(),
                hint: e.to_string(),
            }
        }
        other => ExtractError::ProviderUnavailable {
            diagnostic: other.to_string(),
        },
    }
}

/// Build `CompletionOptions` from the request.
fn build_options(request: &VisionRequest<'_>) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(request.temperature),
        max_tokens: Some(request.max_tokens),
        ..Default::default()
    }
}

/// Raw text of one model reply. Consumed once by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisionReply(String);

impl VisionReply {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Submits receipt images to a [`VisionProvider`] with fixed settings.
pub struct VisionClient<P> {
    provider: P,
    prompt: String,
    max_tokens: usize,
    temperature: f32,
    timeout: Duration,
}

impl<P: VisionProvider> VisionClient<P> {
    pub fn new(
        provider: P,
        prompt: impl Into<String>,
        max_tokens: usize,
        temperature: f32,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            prompt: prompt.into(),
            max_tokens,
            temperature,
            timeout,
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Send `image` to the model and return its trimmed, non-empty reply.
    pub async fn describe(&self, image: &[u8], mime_type: &str) -> Result<VisionReply, ExtractError> {
        let start = Instant::now();
        let request = VisionRequest {
            prompt: &self.prompt,
            image: encode::encode_image(image, mime_type),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout: self.timeout,
        };

        let reply = tokio::time::timeout(self.timeout, self.provider.submit(&request))
            .await
            .map_err(|_| {
                warn!("Vision call timed out after {:?}", self.timeout);
                ExtractError::ProviderTimeout {
                    secs: self.timeout.as_secs(),
                }
            })??;

        let text = reply.trim();
        if text.is_empty() {
            return Err(ExtractError::EmptyModelResponse);
        }

        debug!(
            "Vision reply: {} chars in {:?}",
            text.len(),
            start.elapsed()
        );
        Ok(VisionReply::new(text))
    }
}
