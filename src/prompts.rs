//! Instruction text sent with every receipt image.
//!
//! The prompt is a pure function of an [`OutputSchema`]: the same schema
//! always yields the same text, so it can be built once at startup and
//! inspected in unit tests without a VLM. Pointing the pipeline at a different
//! document domain means supplying a different schema (or a whole prompt via
//! [`crate::config::ExtractionConfig::prompt`]), never changing pipeline code.

/// Shape of the `structured` object the model is asked to return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSchema {
    /// What kind of document the model is looking at.
    pub document_kind: &'static str,
    /// Scalar fields of `structured`, in prompt order.
    pub fields: &'static [&'static str],
    /// Name of the line-item list inside `structured`.
    pub items_field: &'static str,
    /// Keys of each line item.
    pub item_fields: &'static [&'static str],
}

/// Receipts, tickets and invoices (Spanish field names).
pub const RECEIPT_SCHEMA: OutputSchema = OutputSchema {
    document_kind: "receipts, tickets and invoices",
    fields: &["amount", "fecha", "propina", "iva", "subtotal"],
    items_field: "items",
    item_fields: &["descripcion", "cantidad", "monto"],
};

impl Default for OutputSchema {
    fn default() -> Self {
        RECEIPT_SCHEMA
    }
}

/// Build the instruction text for `schema`.
pub fn build_prompt(schema: &OutputSchema) -> String {
    let quoted = |names: &[&str]| {
        names
            .iter()
            .map(|n| format!("'{n}'"))
            .collect::<Vec<_>>()
            .join(", ")
    };

    // `fields[0]` (the total) goes first, then the item list, then the rest.
    let (lead, rest) = schema.fields.split_at(schema.fields.len().min(1));

    let mut structured = quoted(lead);
    if !structured.is_empty() {
        structured.push_str(", ");
    }
    structured.push_str(&format!(
        "'{}' (a list of objects with {})",
        schema.items_field,
        quoted(schema.item_fields)
    ));
    if !rest.is_empty() {
        structured.push_str(", ");
        structured.push_str(&quoted(rest));
    }

    format!(
        "You are an expert reader of {kind}. Analyse the attached document and reply \
EXCLUSIVELY with one JSON object shaped {{\"text\": string, \"structured\": {{ ... }}}}.\n\
In 'text' put a human-readable transcription of the document.\n\
In 'structured' include the fields: {structured}.\n\
If a value cannot be determined, set it to null; never omit a field.\n\
Make sure the JSON is valid and add nothing before or after it.",
        kind = schema.document_kind,
    )
}
