use serde_json::Value;

const SECRET_MARKER: &str = "sk-";
const SECRET_REPLACEMENT: &str = "sk-***";
const MAX_STRING_LEN: usize = 4096;
const TRUNCATED_HEAD: usize = 1024;
const TRUNCATED_TAIL: usize = 256;
const TRUNCATION_MARKER: &str = "\n...[truncated]...\n";

/// Recursively redacts a payload before it reaches storage (§4.2).
///
/// Redaction is idempotent: redacting an already-redacted value returns it
/// unchanged.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(redact_string(s)),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        Value::Object(map) => {
            Value::Object(map.iter().map(|(k, v)| (k.clone(), redact(v))).collect())
        }
        other => other.clone(),
    }
}

fn redact_string(s: &str) -> String {
    let masked = mask_secrets(s);
    truncate_long(&masked)
}

/// Replaces every `sk-<token>` run of non-whitespace characters with
/// `sk-***`, masking bearer-like API keys while leaving surrounding prose
/// intact.
fn mask_secrets(s: &str) -> String {
    if !s.contains(SECRET_MARKER) {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if s[i..].starts_with(SECRET_MARKER) {
            out.push_str(SECRET_REPLACEMENT);
            i += SECRET_MARKER.len();
            while i < bytes.len() && !s[i..].starts_with(char::is_whitespace) {
                // Advance by one char, not one byte, to stay on UTF-8 boundaries.
                let ch = s[i..].chars().next().unwrap();
                i += ch.len_utf8();
            }
        } else {
            let ch = s[i..].chars().next().unwrap();
            out.push(ch);
            i += ch.len_utf8();
        }
    }
    out
}

fn truncate_long(s: &str) -> String {
    let char_count = s.chars().count();
    if char_count <= MAX_STRING_LEN {
        return s.to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    let head: String = chars[..TRUNCATED_HEAD].iter().collect();
    let tail: String = chars[chars.len() - TRUNCATED_TAIL..].iter().collect();
    format!("{head}{TRUNCATION_MARKER}{tail}")
}
