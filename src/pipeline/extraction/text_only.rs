//! Text-only extraction for text-like media types.
//!
//! Binary formats (PDF, DOCX, images) return `UnsupportedFormat`; callers
//! degrade to a raw decode through `extract_with_fallback`.

use std::sync::LazyLock;

use regex::Regex;

use super::sanitize::sanitize_extracted_text;
use super::{ExtractionError, TextExtractor};

/// Media types read as UTF-8 text in addition to `text/*`.
const TEXT_LIKE: &[&str] = &[
    "application/json",
    "application/xml",
    "application/x-yaml",
    "application/yaml",
    "application/x-ndjson",
];

/// Reads plain text, Markdown, CSV, JSON, XML and HTML without a model.
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    pub fn supports(media_type: &str) -> bool {
        let essence = essence(media_type);
        essence.starts_with("text/") || TEXT_LIKE.contains(&essence.as_str())
    }
}

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8], media_type: &str) -> Result<String, ExtractionError> {
        if !Self::supports(media_type) {
            return Err(ExtractionError::UnsupportedFormat(media_type.to_string()));
        }

        let text = std::str::from_utf8(bytes)
            .map_err(|e| ExtractionError::EncodingError(e.to_string()))?;

        let text = if essence(media_type) == "text/html" {
            strip_html(text)
        } else {
            text.to_string()
        };

        Ok(sanitize_extracted_text(&text))
    }
}

/// `text/plain; charset=utf-8` → `text/plain`
fn essence(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn strip_html(html: &str) -> String {
    static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").expect("valid regex")
    });
    static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)<(br|/p|/div|/li|/h[1-6]|/tr)[^>]*>").expect("valid regex")
    });
    static TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

    let text = SCRIPT_RE.replace_all(html, " ");
    let text = BLOCK_RE.replace_all(&text, "\n");
    let text = TAG_RE.replace_all(&text, " ");
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
}
