use aos_core::Envelope;
use aos_error::{AosError, ErrorCode};
use serde_json::Value;

/// Validates the optional-field type contract of §4.2/§4.3.
///
/// `budget_ctx` and `labels`, when present, must be JSON objects. `authz`,
/// when present, must be a JSON object, and its `caps` key, when present,
/// must be an array of strings. `cost` is already `Option<f64>` in
/// [`Envelope`], so it needs no further runtime check — Rust's type system
/// enforces numeric-or-absent at construction.
pub fn validate_optional_shapes(envelope: &Envelope) -> Result<(), AosError> {
    if let Some(ref budget_ctx) = envelope.budget_ctx {
        if !budget_ctx.is_object() {
            return Err(AosError::new(
                ErrorCode::SchemaValidation,
                "budget_ctx must be a JSON object",
            )
            .with_context("trace_id", &envelope.trace_id));
        }
    }

    if let Some(ref authz) = envelope.authz {
        if !authz.is_object() {
            return Err(AosError::new(
                ErrorCode::SchemaValidation,
                "authz must be a JSON object",
            )
            .with_context("trace_id", &envelope.trace_id));
        }
        if let Some(caps) = authz.get("caps") {
            validate_caps(caps, &envelope.trace_id)?;
        }
    }

    if let Some(ref labels) = envelope.labels {
        if !labels.is_object() {
            return Err(AosError::new(
                ErrorCode::SchemaValidation,
                "labels must be a JSON object",
            )
            .with_context("trace_id", &envelope.trace_id));
        }
    }

    Ok(())
}

fn validate_caps(caps: &Value, trace_id: &str) -> Result<(), AosError> {
    let Some(items) = caps.as_array() else {
        return Err(
            AosError::new(ErrorCode::SchemaValidation, "authz.caps must be a list")
                .with_context("trace_id", trace_id),
        );
    };
    if items.iter().any(|item| !item.is_string()) {
        return Err(AosError::new(
            ErrorCode::SchemaValidation,
            "authz.caps must be a list of strings",
        )
        .with_context("trace_id", trace_id));
    }
    Ok(())
}

/// Validates that the required fields of an [`Envelope`] are present and
/// non-empty where emptiness would be nonsensical (`msg_id`, `trace_id`,
/// `type`, `schema_ver`).
///
/// Type-correctness of required fields is already guaranteed by `Envelope`'s
/// Rust types; this only checks the content-level invariants serde cannot.
pub fn validate_required_fields(envelope: &Envelope) -> Result<(), AosError> {
    if envelope.msg_id.is_empty() {
        return Err(AosError::new(ErrorCode::SchemaValidation, "msg_id must not be empty"));
    }
    if envelope.trace_id.is_empty() {
        return Err(AosError::new(ErrorCode::SchemaValidation, "trace_id must not be empty"));
    }
    if envelope.event_type.is_empty() {
        return Err(AosError::new(ErrorCode::SchemaValidation, "type must not be empty"));
    }
    if envelope.schema_ver != aos_core::SCHEMA_VERSION {
        return Err(AosError::new(
            ErrorCode::SchemaValidation,
            format!("unsupported schema_ver {:?}", envelope.schema_ver),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_envelope() -> Envelope {
        Envelope {
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
        }
    }

    #[test]
    fn rejects_non_object_budget_ctx() {
        let mut env = base_envelope();
        env.budget_ctx = Some(serde_json::json!("not-an-object"));
        assert_eq!(
            validate_optional_shapes(&env).unwrap_err().code,
            ErrorCode::SchemaValidation
        );
    }

    #[test]
    fn rejects_non_string_caps_entries() {
        let mut env = base_envelope();
        env.authz = Some(serde_json::json!({"caps": [1, 2]}));
        assert!(validate_optional_shapes(&env).is_err());
    }

    #[test]
    fn accepts_well_formed_authz() {
        let mut env = base_envelope();
        env.authz = Some(serde_json::json!({"caps": ["read", "write"]}));
        assert!(validate_optional_shapes(&env).is_ok());
    }

    #[test]
    fn rejects_non_object_labels() {
        let mut env = base_envelope();
        env.labels = Some(serde_json::json!(123));
        assert!(validate_optional_shapes(&env).is_err());
    }

    #[test]
    fn rejects_empty_msg_id() {
        let mut env = base_envelope();
        env.msg_id = String::new();
        assert!(validate_required_fields(&env).is_err());
    }

    #[test]
    fn rejects_unsupported_schema_version() {
        let mut env = base_envelope();
        env.schema_ver = "v99".to_string();
        assert!(validate_required_fields(&env).is_err());
    }
}
