//! Scoreboard Projection (§4.9, C13): a materialized view over the episode
//! corpus exposing tabular rows, a sqlite upsert target, and filtered,
//! grouped, Top-N, percentile queries computed in memory.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod export;
mod project;
mod query;
mod store;

pub use export::export_csv;
pub use project::{project_episode, ScoreRow};
pub use query::{percentile, resolve_window, run_query, GroupBy, GroupSummary, ScoreQuery, ScoreQueryResult};
pub use store::{ScoreboardStore, SqliteScoreboardStore};
