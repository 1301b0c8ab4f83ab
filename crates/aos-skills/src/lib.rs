//! Pure leaf transforms used by the rule-based Executor, plus the
//! hash-pinned skill registry that guards them (§2 C1).
//!
//! These functions are deterministic and network-free, which is what makes
//! the Replay Engine's rerun mode (`aos-replay`) able to reproduce a trace's
//! Markdown byte-for-byte.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod csv_clean;
mod md_render;
mod registry;
mod stats_aggregate;

pub use csv_clean::{csv_clean, Row};
pub use md_render::md_render;
pub use registry::{
    load_registry, sha256_file, verify_skills, verify_skills_default, SkillEntry, SkillRegistry,
};
pub use stats_aggregate::{stats_aggregate, Aggregation, Summary, TopItem};
