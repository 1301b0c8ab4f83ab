//! The closed-loop Plan -> Execute -> Review -> (Revise) orchestrator (§2 C7,
//! §4.1), plus the deterministic rule-based role quartet used as its default,
//! network-free implementation.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod csv_source;
mod pipeline;
pub mod rules;

pub use csv_source::{read_csv_rows, sample_csv_text, sample_csv_value};
pub use pipeline::{run, PipelineConfig, RunOutcome};
