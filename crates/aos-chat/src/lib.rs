//! Chat Session Store (C11, §3): persistent conversations, one-shot human
//! approvals against a trace, and a per-session task stack, backing the
//! chat-driven entrypoint that shares the Outbox, Envelope, and LLM
//! provider contracts with the main pipeline.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod store;
mod task_stack;

pub use store::{ChatStore, SqliteChatStore};
pub use task_stack::{pop_task, push_task};
