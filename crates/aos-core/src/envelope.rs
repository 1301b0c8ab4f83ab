use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The canonical unit written to the Outbox (§3).
///
/// Construction and validation live in `aos-envelope`; this type is the pure
/// data shape shared by every crate that reads or writes envelopes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    /// Unique-per-event identifier.
    pub msg_id: String,
    /// Stable identifier of the episode this event belongs to.
    pub trace_id: String,
    /// Envelope schema version, currently always `"v0"`.
    pub schema_ver: String,
    /// ISO-8601 UTC timestamp with a trailing `Z`.
    pub ts: String,
    /// Dotted-namespace event type, e.g. `"plan.generated"`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Redacted event payload.
    pub payload: Value,
    /// Optional budget context snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_ctx: Option<Value>,
    /// Optional authorization context; `caps`, if present, is a list of strings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authz: Option<Value>,
    /// Optional free-form labels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Value>,
    /// Optional incremental cost attributed to this event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_fields_are_omitted_when_absent() {
        let env = Envelope {
            msg_id: "m1".to_string(),
            trace_id: "t-abc".to_string(),
            schema_ver: "v0".to_string(),
            ts: "2026-07-27T00:00:00.000Z".to_string(),
            event_type: "sense.srs_loaded".to_string(),
            payload: serde_json::json!({}),
            budget_ctx: None,
            authz: None,
            labels: None,
            cost: None,
        };
        let json = serde_json::to_value(&env).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("budget_ctx"));
        assert!(!obj.contains_key("authz"));
        assert!(!obj.contains_key("labels"));
        assert!(!obj.contains_key("cost"));
        assert!(obj.contains_key("type"));
    }

    #[test]
    fn type_field_serializes_as_reserved_word() {
        let env = Envelope {
            msg_id: "m1".to_string(),
            trace_id: "t-abc".to_string(),
            schema_ver: "v0".to_string(),
            ts: "2026-07-27T00:00:00.000Z".to_string(),
            event_type: "plan.generated".to_string(),
            payload: Value::Null,
            budget_ctx: None,
            authz: None,
            labels: None,
            cost: None,
        };
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains("\"type\":\"plan.generated\""));
    }
}
