//! Output types for receipt extraction.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The final contract returned to the caller.
///
/// `structured` is a JSON object by construction; the parser wraps anything
/// else as `{"value": ...}`. For the default receipt prompt it carries
/// `amount`, `fecha`, `items`, `propina`, `iva` and `subtotal`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Human-readable transcription of the document.
    #[serde(default)]
    pub text: String,
    /// Extracted fields.
    #[serde(default)]
    pub structured: Map<String, Value>,
}

impl ExtractionResult {
    /// Line items (`structured.items`) when the model returned a list.
    pub fn items(&self) -> Option<&Vec<Value>> {
        self.structured.get("items").and_then(Value::as_array)
    }

    /// A structured field, treating JSON `null` as absent.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.structured.get(name).filter(|v| !v.is_null())
    }
}
