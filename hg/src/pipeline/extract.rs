//! JSON payload extraction from free-form model output

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z]*[ \t]*\n?(.*?)```").expect("Invalid regex pattern for fenced blocks"));

/// Why no payload could be extracted
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Model reply is empty")]
    Empty,

    #[error("No JSON payload found in model reply")]
    NoJson,

    #[error("Model reply contains {0} different JSON blocks")]
    Ambiguous(usize),
}

/// Extract exactly one JSON payload from a model reply
///
/// Tried in order: the whole text, the fenced code blocks (exactly one
/// distinct parseable block is accepted), then the span from the first `{`
/// to the last `}`.
pub fn extract_json(text: &str) -> Result<Value, ExtractError> {
    debug!(text_len = text.len(), "extract_json: called");
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ExtractError::Empty);
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        debug!("extract_json: whole reply is JSON");
        return Ok(value);
    }

    let mut blocks: Vec<Value> = Vec::new();
    for capture in FENCED_BLOCK.captures_iter(trimmed) {
        if let Some(body) = capture.get(1)
            && let Ok(value) = serde_json::from_str::<Value>(body.as_str().trim())
            && !blocks.contains(&value)
        {
            blocks.push(value);
        }
    }
    match blocks.len() {
        0 => {}
        1 => {
            debug!("extract_json: using fenced block");
            return Ok(blocks.remove(0));
        }
        n => {
            debug!(blocks = n, "extract_json: ambiguous fenced blocks");
            return Err(ExtractError::Ambiguous(n));
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && start < end
        && let Ok(value) = serde_json::from_str::<Value>(&trimmed[start..=end])
    {
        debug!("extract_json: using brace span");
        return Ok(value);
    }

    debug!("extract_json: no JSON found");
    Err(ExtractError::NoJson)
}
