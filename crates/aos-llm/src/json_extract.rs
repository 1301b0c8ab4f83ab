use aos_error::{AosError, AosResult, ErrorCode};
use serde_json::Value;

/// Locates the first `{` in `text`, then uses balanced-brace counting to
/// find its match, and parses the slice in between (§4.4).
///
/// Braces inside JSON string literals are ignored so a `}` embedded in a
/// quoted string does not end the scan early.
pub fn extract_json_block(text: &str) -> AosResult<Value> {
    let start = text
        .find('{')
        .ok_or_else(|| AosError::new(ErrorCode::ParseFailure, "no JSON object start '{' found"))?;

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    let bytes = text.as_bytes();
    let mut end = None;

    let mut i = start;
    while i < bytes.len() {
        let ch = text[i..].chars().next().unwrap();
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
        } else {
            match ch {
                '"' => in_string = true,
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(i + ch.len_utf8());
                        break;
                    }
                }
                _ => {}
            }
        }
        i += ch.len_utf8();
    }

    let end = end.ok_or_else(|| {
        AosError::new(ErrorCode::ParseFailure, "no matching '}' found for JSON object")
    })?;

    let slice = &text[start..end];
    serde_json::from_str(slice)
        .map_err(|e| AosError::new(ErrorCode::ParseFailure, "extracted block is not valid JSON").with_source(e))
}
