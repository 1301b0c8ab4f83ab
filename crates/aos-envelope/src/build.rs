use crate::redact::redact;
use crate::validate::{validate_optional_shapes, validate_required_fields};
use aos_core::{new_msg_id, now_iso8601, Envelope, SCHEMA_VERSION};
use aos_error::AosResult;
use serde_json::Value;

/// Optional fields accepted by [`build_envelope`], mirroring the Outbox
/// `append` contract's keyword options (§3, §4.2).
#[derive(Debug, Clone, Default)]
pub struct EnvelopeOptions {
    /// Budget context snapshot to attach.
    pub budget_ctx: Option<Value>,
    /// Authorization context to attach.
    pub authz: Option<Value>,
    /// Free-form labels to attach.
    pub labels: Option<Value>,
    /// Incremental cost to attribute to this event.
    pub cost: Option<f64>,
}

/// Builds, redacts, and validates a single [`Envelope`] for `trace_id`.
///
/// The raw `payload` MUST NOT reach storage: this function always returns
/// the redacted form. Validation runs after redaction has run over the
/// payload and before the caller appends the result, so no unredacted or
/// ill-typed envelope is ever persisted.
pub fn build_envelope(
    trace_id: &str,
    event_type: &str,
    payload: Value,
    opts: EnvelopeOptions,
) -> AosResult<Envelope> {
    let envelope = Envelope {
        msg_id: new_msg_id(),
        trace_id: trace_id.to_string(),
        schema_ver: SCHEMA_VERSION.to_string(),
        ts: now_iso8601(),
        event_type: event_type.to_string(),
        payload: redact(&payload),
        budget_ctx: opts.budget_ctx.map(|v| redact(&v)),
        authz: opts.authz.map(|v| redact(&v)),
        labels: opts.labels.map(|v| redact(&v)),
        cost: opts.cost,
    };

    validate_required_fields(&envelope)?;
    validate_optional_shapes(&envelope)?;

    Ok(envelope)
}
