//! Replay Engine: resolves a trace id or unambiguous prefix to a saved
//! episode and either reports its last review verdict or re-executes its
//! saved plan offline against local skill primitives only (§4.5).

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod engine;
mod prefix;
mod source;

pub use engine::{rerun, review_only, RerunOutcome, ReviewOnlyOutcome};
pub use prefix::resolve_trace_id;
pub use source::ReplaySource;
