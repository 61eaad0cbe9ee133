//! Reply parsing: pull one JSON object out of free-form VLM text and
//! normalise it to [`ExtractionResult`].
//!
//! ## Why is this necessary?
//!
//! The prompt asks for a bare JSON object, but a text generator does not
//! always comply. Replies seen in practice include:
//!
//! - the object wrapped in ` ```json ... ``` ` fences, sometimes with a
//!   sentence of commentary before or after
//! - the transcription/structure split ignored, with receipt fields at the
//!   top level
//! - `structured` set to a string such as `"n/a"` or to a list of items
//!
//! Every such shape is repaired here so the rest of the pipeline only ever
//! sees `{text: String, structured: Map}`. No parsed value is discarded: a
//! field either lands in `structured` or under its `value` key.

use crate::error::ExtractError;
use crate::output::ExtractionResult;
use crate::pipeline::llm::VisionReply;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

/// Key used to wrap a non-object `structured` value.
pub const WRAPPED_VALUE_KEY: &str = "value";

/// Parse and normalise a model reply.
///
/// Strategies, in order:
/// 1. the first fenced block (optionally tagged `json`) holding an object
/// 2. the whole reply
///
/// Fails with [`ExtractError::UnparsableResponse`] carrying the original
/// reply when neither is valid JSON.
pub fn parse_reply(reply: VisionReply) -> Result<ExtractionResult, ExtractError> {
    let raw = reply.into_inner();

    let parsed = fenced_json(&raw).or_else(|| serde_json::from_str::<Value>(raw.trim()).ok());

    match parsed {
        Some(value) => Ok(normalize(value)),
        None => Err(ExtractError::UnparsableResponse { raw }),
    }
}

// ── Strategy 1: fenced block ─────────────────────────────────────────────────

static RE_FENCED_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```(?:json)?\s*(\{.*?\})\s*```").unwrap());

fn fenced_json(raw: &str) -> Option<Value> {
    let caps = RE_FENCED_OBJECT.captures(raw)?;
    match serde_json::from_str::<Value>(&caps[1]) {
        Ok(v) => {
            debug!("Parsed JSON from fenced block");
            Some(v)
        }
        Err(e) => {
            debug!("Fenced block is not valid JSON ({}); trying whole reply", e);
            None
        }
    }
}

// ── Normalisation ────────────────────────────────────────────────────────────

/// Bring any JSON value to the `{text, structured}` shape.
pub fn normalize(value: Value) -> ExtractionResult {
    let mut top = match value {
        Value::Object(map) => map,
        other => {
            return ExtractionResult {
                text: String::new(),
                structured: wrap(other),
            }
        }
    };

    let Some(structured) = top.remove("structured") else {
        // No split: the whole object is the payload, `text` included.
        let text = text_of(top.get("text"));
        return ExtractionResult {
            text,
            structured: top,
        };
    };

    let text = text_of(top.remove("text").as_ref());
    let mut structured = match structured {
        Value::Object(map) => map,
        other => wrap(other),
    };

    // Stray top-level keys next to `structured` are kept, never overwriting.
    for (key, value) in top {
        structured.entry(key).or_insert(value);
    }

    ExtractionResult { text, structured }
}

fn wrap(value: Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(WRAPPED_VALUE_KEY.to_string(), value);
    map
}

fn text_of(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
