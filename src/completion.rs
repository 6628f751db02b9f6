//! Completion capability interface and tolerant JSON extraction
//!
//! LLM arbitration replies rarely arrive as clean JSON: they show up inside
//! code fences, wrapped in prose, or with explanatory text on both sides.
//! `complete_json` extracts the first balanced, valid JSON object from the
//! reply and deserializes it, returning `None` when no usable object exists
//! so callers can take their default path instead of failing.

use serde::de::DeserializeOwned;

use crate::error::Result;

/// Trait for text completion backends
pub trait Completion: Send + Sync {
    /// Run a completion for the given prompt
    ///
    /// Backend failures surface as `MnemonError::Capability`.
    fn complete(&self, prompt: &str) -> Result<String>;
}

/// Complete a prompt and parse the reply as `T`
///
/// Returns `Ok(None)` when the reply contains no balanced JSON object that
/// deserializes into `T`. Transport/backend errors still propagate as `Err`.
pub fn complete_json<T: DeserializeOwned>(
    completion: &dyn Completion,
    prompt: &str,
) -> Result<Option<T>> {
    let reply = completion.complete(prompt)?;
    Ok(extract_json(&reply))
}

/// Extract the first balanced JSON object from arbitrary text that
/// deserializes into `T`
///
/// Tries successive brace-delimited candidate spans left to right rather than
/// failing on the first invalid one, and tracks string/escape state so braces
/// inside string values do not confuse the balance count.
pub fn extract_json<T: DeserializeOwned>(text: &str) -> Option<T> {
    let bytes = text.as_bytes();
    let mut start = 0;

    while let Some(open) = find_byte(bytes, start, b'{') {
        if let Some(end) = balanced_span(bytes, open) {
            let span = &text[open..=end];
            if let Ok(value) = serde_json::from_str::<T>(span) {
                return Some(value);
            }
        }
        start = open + 1;
    }

    None
}

fn find_byte(bytes: &[u8], from: usize, needle: u8) -> Option<usize> {
    bytes[from..].iter().position(|&b| b == needle).map(|p| from + p)
}

/// Index of the `}` closing the object opened at `open`, or `None` if the
/// text ends before the braces balance
fn balanced_span(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}
