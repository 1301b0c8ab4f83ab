//! Envelope construction, redaction, and schema validation (§4.2).
//!
//! Every call into the Outbox (`aos-outbox`) goes through [`build_envelope`]
//! first, which redacts the payload and validates the optional-field type
//! contract before a single byte reaches storage.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod build;
mod redact;
mod validate;

pub use build::{build_envelope, EnvelopeOptions};
pub use redact::redact;
pub use validate::{validate_optional_shapes, validate_required_fields};
