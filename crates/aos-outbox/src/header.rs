use aos_core::{Envelope, Header};
use serde_json::Value;
use std::collections::BTreeMap;

/// Derives an episode [`Header`] by scanning `events` for embedded `llm`
/// metadata, per §4.3.
///
/// `provider`/`model`/`request_id`/`temperature` are picked from the
/// *last* event that carries each field (a reverse scan with
/// first-wins-per-field fills earlier gaps only for fields the last event
/// didn't set). `attempts` is the max across all events (default `1`);
/// `usage` is a componentwise sum; `cost` sums the envelope-level `cost`
/// field across every event.
pub fn derive_header(events: &[Envelope]) -> Header {
    let mut header = Header::default();

    for env in events.iter().rev() {
        let Some(llm) = env.payload.get("llm").and_then(Value::as_object) else {
            continue;
        };
        if header.provider.is_none() {
            header.provider = llm.get("provider").and_then(Value::as_str).map(String::from);
        }
        if header.model.is_none() {
            header.model = llm.get("model").and_then(Value::as_str).map(String::from);
        }
        if header.request_id.is_none() {
            header.request_id = llm.get("request_id").and_then(Value::as_str).map(String::from);
        }
        if header.temperature.is_none() {
            header.temperature = llm.get("temperature").and_then(Value::as_f64);
        }
    }

    let mut attempts_max = 1u32;
    let mut usage_sum: BTreeMap<String, f64> = BTreeMap::new();
    let mut cost_sum = 0.0f64;

    for env in events {
        if let Some(llm) = env.payload.get("llm").and_then(Value::as_object) {
            if let Some(a) = llm.get("attempts").and_then(Value::as_u64) {
                attempts_max = attempts_max.max(a as u32);
            }
            if let Some(usage) = llm.get("usage").and_then(Value::as_object) {
                for (k, v) in usage {
                    if let Some(n) = v.as_f64() {
                        *usage_sum.entry(k.clone()).or_insert(0.0) += n;
                    }
                }
            }
        }
        if let Some(cost) = env.cost {
            cost_sum += cost;
        }
    }

    header.attempts = attempts_max;
    if !usage_sum.is_empty() {
        for v in usage_sum.values_mut() {
            *v = round_to(*v, 4);
        }
        header.usage = Some(usage_sum);
    }
    header.cost = round_to(cost_sum, 6);
    header
}

/// Returns the payload value at `key` from the last event of type
/// `event_type`, or `None` if no such event exists.
pub fn extract_last(events: &[Envelope], event_type: &str, key: &str) -> Option<Value> {
    events
        .iter()
        .rev()
        .find(|e| e.event_type == event_type)
        .and_then(|e| e.payload.get(key))
        .cloned()
}

fn round_to(x: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (x * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use aos_core::new_msg_id;

    fn env(trace_id: &str, event_type: &str, payload: Value, cost: Option<f64>) -> Envelope {
        Envelope {
            msg_id: new_msg_id(),
            trace_id: trace_id.to_string(),
            schema_ver: "v0".to_string(),
            ts: "2026-07-27T00:00:00.000Z".to_string(),
            event_type: event_type.to_string(),
            payload,
            budget_ctx: None,
            authz: None,
            labels: None,
            cost,
        }
    }

    #[test]
    fn attempts_is_max_across_events() {
        let events = vec![
            env("t", "plan.generated", serde_json::json!({"llm": {"attempts": 1}}), None),
            env("t", "exec.output", serde_json::json!({"llm": {"attempts": 3}}), None),
            env("t", "review.scored", serde_json::json!({"llm": {"attempts": 2}}), None),
        ];
        assert_eq!(derive_header(&events).attempts, 3);
    }

    #[test]
    fn cost_sums_across_events() {
        let events = vec![
            env("t", "a", Value::Null, Some(0.001)),
            env("t", "b", Value::Null, Some(0.002)),
        ];
        assert_eq!(derive_header(&events).cost, 0.003);
    }

    #[test]
    fn usage_sums_componentwise() {
        let events = vec![
            env(
                "t",
                "a",
                serde_json::json!({"llm": {"usage": {"prompt_tokens": 10, "completion_tokens": 5}}}),
                None,
            ),
            env(
                "t",
                "b",
                serde_json::json!({"llm": {"usage": {"prompt_tokens": 3}}}),
                None,
            ),
        ];
        let header = derive_header(&events);
        let usage = header.usage.unwrap();
        assert_eq!(usage["prompt_tokens"], 13.0);
        assert_eq!(usage["completion_tokens"], 5.0);
    }

    #[test]
    fn last_event_field_wins_over_earlier_events() {
        let events = vec![
            env("t", "a", serde_json::json!({"llm": {"provider": "openai", "model": "gpt"}}), None),
            env("t", "b", serde_json::json!({"llm": {"provider": "openrouter"}}), None),
        ];
        let header = derive_header(&events);
        assert_eq!(header.provider.as_deref(), Some("openrouter"));
        assert_eq!(header.model.as_deref(), Some("gpt"));
    }

    #[test]
    fn no_llm_events_yields_default_header() {
        let events = vec![env("t", "sense.srs_loaded", serde_json::json!({"srs": {}}), None)];
        let header = derive_header(&events);
        assert_eq!(header.attempts, 1);
        assert_eq!(header.cost, 0.0);
        assert!(header.usage.is_none());
        assert!(header.provider.is_none());
    }

    #[test]
    fn extract_last_finds_most_recent_matching_event() {
        let events = vec![
            env("t", "plan.generated", serde_json::json!({"plan": {"id": "p1"}}), None),
            env("t", "plan.generated", serde_json::json!({"plan": {"id": "p2"}}), None),
        ];
        let plan = extract_last(&events, "plan.generated", "plan").unwrap();
        assert_eq!(plan["id"], "p2");
    }

    #[test]
    fn extract_last_returns_none_when_absent() {
        let events = vec![env("t", "sense.srs_loaded", serde_json::json!({}), None)];
        assert!(extract_last(&events, "plan.generated", "plan").is_none());
    }
}
