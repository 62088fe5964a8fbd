//! Pulls the JSON payload out of free-form AI text.
//!
//! The model is asked for a bare JSON object but regularly wraps it in a
//! markdown code fence. Anything that does not parse is reported as
//! [`ExtractError::Malformed`] and nothing from that response is ingested.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

static FENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:[A-Za-z0-9_-]+)?[ \t]*\r?\n?(.*?)```").expect("valid fence regex")
});

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("malformed AI response: {0}")]
    Malformed(String),
}

/// Returns the inside of the first fenced block, or the text unchanged.
pub fn strip_code_fence(text: &str) -> &str {
    FENCE_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|inner| inner.as_str().trim())
        .unwrap_or(text)
}

pub fn parse_response(text: &str) -> Result<Value, ExtractError> {
    let body = strip_code_fence(text).trim();
    serde_json::from_str(body).map_err(|err| ExtractError::Malformed(err.to_string()))
}

/// Reads `field` of the response object as a list of `T`.
///
/// A missing or null field is an empty list. Items that do not fit `T` are
/// skipped with a warning instead of failing the whole response.
pub fn list_field<T: DeserializeOwned>(response: &Value, field: &str) -> Result<Vec<T>, ExtractError> {
    let items = match response.get(field) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(ExtractError::Malformed(format!(
                "'{field}' should be a list, got {}",
                kind(other)
            )))
        }
    };

    let mut out = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match serde_json::from_value::<T>(item.clone()) {
            Ok(parsed) => out.push(parsed),
            Err(err) => log::warn!("skipping {field}[{index}]: {err}"),
        }
    }
    Ok(out)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
