//! `extractJSON(content)` (`spec.md` §9 REDESIGN FLAGS): replaces the
//! original's ad-hoc regex-for-fenced-code-blocks approach with a small
//! chain of well-defined strategies and a typed failure on exhaustion.

use forge_core::error::{ForgeError, ForgeErrorKind};
use once_cell::sync::Lazy;
use regex::Regex;

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").unwrap());

/// Try, in order: a fenced ```json code block, then the first balanced
/// `{...}` or `[...]` substring, else fail with `ParseFailure`.
pub fn extract_json(content: &str) -> Result<serde_json::Value, ForgeError> {
    if let Some(caps) = FENCED_BLOCK.captures(content) {
        if let Ok(value) = serde_json::from_str(&caps[1]) {
            return Ok(value);
        }
    }

    if let Some(value) = first_balanced(content) {
        return Ok(value);
    }

    Err(ForgeError::new(ForgeErrorKind::ParseFailure {
        reason: "no JSON object or array found in model output".to_string(),
    }))
}

/// Scans for the first syntactically balanced `{...}`/`[...]` span,
/// ignoring braces/brackets inside string literals, and returns it parsed.
fn first_balanced(content: &str) -> Option<serde_json::Value> {
    let bytes = content.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let open = bytes[i];
        if open == b'{' || open == b'[' {
            let close = if open == b'{' { b'}' } else { b']' };
            if let Some(end) = matching_close(bytes, i, open, close) {
                if let Ok(value) = serde_json::from_str(&content[i..=end]) {
                    return Some(value);
                }
            }
        }
        i += 1;
    }
    None
}

fn matching_close(bytes: &[u8], start: usize, open: u8, close: u8) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;
    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escape {
                escape = false;
            } else if byte == b'\\' {
                escape = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b if b == open => depth += 1,
            b if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}
