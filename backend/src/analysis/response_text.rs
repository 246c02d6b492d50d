//! Adapter for vendor text that wraps JSON in Markdown code fences

const JSON_FENCE: &str = "```json";
const FENCE: &str = "```";

/// Strips surrounding whitespace and an optional Markdown code fence
///
/// Idempotent: normalizing an already normalized string is a no-op.
#[must_use]
pub fn normalize_response_text(raw: &str) -> &str {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix(JSON_FENCE) {
        text = rest;
    } else if let Some(rest) = text.strip_prefix(FENCE) {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix(FENCE) {
        text = rest;
    }

    text.trim()
}
