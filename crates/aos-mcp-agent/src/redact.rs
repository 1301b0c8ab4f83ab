use serde_json::{Map, Value};

const SENSITIVE_SUBSTRINGS: &[&str] = &["token", "key", "secret", "pwd", "password", "authorization", "api_key"];
const MAX_PREVIEW_KEYS: usize = 8;
const MAX_VALUE_CHARS: usize = 80;

/// Builds a redacted, length-capped one-line preview of a tool-call
/// argument object for progress logs (§4.7): keys whose lower-cased name
/// contains a sensitive substring are replaced with `"<redacted>"`; long
/// string values are truncated; only the first 8 keys are kept, with a
/// `"…": "+N keys"` marker for the rest.
pub fn redact_args_preview(args: &Value) -> String {
    let Some(map) = args.as_object() else {
        return "<non-object>".to_string();
    };

    let mut preview = Map::new();
    let total = map.len();
    for (idx, (key, value)) in map.iter().enumerate() {
        if idx >= MAX_PREVIEW_KEYS {
            preview.insert("…".to_string(), Value::String(format!("+{} keys", total - idx)));
            break;
        }
        let key_lower = key.to_lowercase();
        if SENSITIVE_SUBSTRINGS.iter().any(|s| key_lower.contains(s)) {
            preview.insert(key.clone(), Value::String("<redacted>".to_string()));
            continue;
        }
        match value {
            Value::Number(_) | Value::Null => {
                preview.insert(key.clone(), value.clone());
            }
            Value::String(s) if s.chars().count() > MAX_VALUE_CHARS => {
                let truncated: String = s.chars().take(MAX_VALUE_CHARS - 3).collect();
                preview.insert(key.clone(), Value::String(format!("{truncated}...")));
            }
            other => {
                preview.insert(key.clone(), Value::String(stringify(other)));
            }
        }
    }
    Value::Object(preview).to_string()
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_keys_containing_sensitive_substrings_case_insensitively() {
        let args = json!({"API_KEY": "sk-abc", "password": "hunter2", "path": "reports/x.md"});
        let preview = redact_args_preview(&args);
        assert!(preview.contains("\"API_KEY\":\"<redacted>\""));
        assert!(preview.contains("\"password\":\"<redacted>\""));
        assert!(preview.contains("reports/x.md"));
    }

    #[test]
    fn truncates_long_string_values() {
        let long = "x".repeat(200);
        let args = json!({"text": long});
        let preview = redact_args_preview(&args);
        assert!(preview.contains("..."));
        assert!(preview.len() < 200);
    }

    #[test]
    fn caps_preview_at_eight_keys_with_remainder_marker() {
        let mut map = Map::new();
        for i in 0..12 {
            map.insert(format!("k{i}"), json!(i));
        }
        let preview = redact_args_preview(&Value::Object(map));
        assert!(preview.contains("+4 keys"));
    }

    #[test]
    fn non_object_args_yield_sentinel() {
        assert_eq!(redact_args_preview(&json!("not an object")), "<non-object>");
    }

    #[test]
    fn numbers_and_null_pass_through_unredacted() {
        let args = json!({"n": 42, "nothing": null});
        let preview = redact_args_preview(&args);
        assert!(preview.contains("\"n\":42"));
        assert!(preview.contains("\"nothing\":null"));
    }
}
