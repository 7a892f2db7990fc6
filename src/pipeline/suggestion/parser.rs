//! Lenient parsing of completion output into candidate objects.
//!
//! Models wrap arrays in objects, fence them in Markdown, or answer in
//! prose. Parsing never fails: anything unrecognised is `Unparseable`.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum ParseResult {
    /// Top-level JSON array.
    Array(Vec<Value>),
    /// Object whose first array-valued field held the items.
    Wrapped { key: String, items: Vec<Value> },
    Unparseable,
}

impl ParseResult {
    pub fn into_items(self) -> Vec<Value> {
        match self {
            Self::Array(items) | Self::Wrapped { items, .. } => items,
            Self::Unparseable => Vec::new(),
        }
    }

    pub fn is_unparseable(&self) -> bool {
        matches!(self, Self::Unparseable)
    }
}

/// Parse raw completion text:
/// 1. as JSON, expecting an array;
/// 2. an object yields its first array-valued field;
/// 3. if (1) fails to parse, strip a fenced code block and retry once.
pub fn parse_completion(raw: &str) -> ParseResult {
    let cleaned = strip_model_artifacts(raw);

    match classify(&cleaned) {
        Some(result) => result,
        None => strip_code_fence(&cleaned)
            .and_then(classify)
            .unwrap_or(ParseResult::Unparseable),
    }
}

/// `None` when `text` is not JSON at all; `Some(Unparseable)` when it is
/// JSON but holds no array.
fn classify(text: &str) -> Option<ParseResult> {
    let value: Value = serde_json::from_str(text.trim()).ok()?;
    Some(match value {
        Value::Array(items) => ParseResult::Array(items),
        Value::Object(map) => map
            .into_iter()
            .find_map(|(key, v)| match v {
                Value::Array(items) => Some(ParseResult::Wrapped { key, items }),
                _ => None,
            })
            .unwrap_or(ParseResult::Unparseable),
        _ => ParseResult::Unparseable,
    })
}

/// Inner text of the first ```` ``` ```` fenced block, language tag dropped.
fn strip_code_fence(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_open = &text[open + 3..];
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_open[body_start..];
    let close = body.find("```").unwrap_or(body.len());
    Some(body[..close].trim())
}

/// Drop thinking blocks and stray special tokens some models emit before
/// the answer.
pub fn strip_model_artifacts(raw: &str) -> String {
    static THINK_BLOCK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"));
    static UNUSED_TOKEN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<unused\d+>").expect("valid regex"));

    let mut text = THINK_BLOCK_RE.replace_all(raw, "").into_owned();

    // `<unusedN>thought\n...` prefixes reasoning up to the answer.
    if let Some(idx) = text.find("<unused") {
        if let Some(offset) = text[idx..].find("thought\n") {
            text = text[idx + offset + "thought\n".len()..].to_string();
        }
    }

    UNUSED_TOKEN_RE.replace_all(&text, "").trim().to_string()
}
