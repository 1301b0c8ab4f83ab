//! Workflow/job store and the scan loop that drives it (§4.6): resolves
//! each due job's steps from its workflow definition, substitutes
//! `{prev.trace_id}` between steps, and dispatches `run`/`replay` steps
//! sequentially against the closed-loop pipeline and the Replay Engine.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod dispatch;
mod resolve;
mod scan;
mod store;

pub use dispatch::{execute_step, unknown_step_type_result, ReplayStep, RunStep, StepResult};
pub use resolve::{resolve_steps, substitute_prev_trace_id};
pub use scan::{run_scan_loop, scan_once, SCAN_INTERVAL};
pub use store::{JobStore, SqliteJobStore};
