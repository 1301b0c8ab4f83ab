//! The append-only Outbox (§2 C3, §4.3): one trait, two interchangeable
//! backends.
//!
//! [`FileOutbox`] writes one JSON file per trace with tmp-then-rename atomic
//! replace. [`SqliteOutbox`] stores events and episodes in a relational
//! database, using the `events.id` autoincrement as canonical order. Both
//! derive the episode header the same way (see [`header`]).

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod file_backend;
pub mod header;
mod outbox;
mod sqlite_backend;

pub use file_backend::FileOutbox;
pub use outbox::Outbox;
pub use sqlite_backend::{fetch_episode_row, list_traces, SqliteOutbox};
