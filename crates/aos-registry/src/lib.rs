//! Typed `role × name → factory` registry for the four agent roles
//! (Planner, Executor, Critic, Reviser), plus their shared trait contracts
//! (§2 C5, §9).
//!
//! The original source keeps one dynamic string→class dict per role,
//! populated by import-time decorators, and raises `KeyError` on first use
//! of an unknown name. Here each role has its own typed map so a lookup can
//! never return the wrong trait, and [`AgentRegistry::resolve`] is meant to
//! be called once at startup so unknown combinations fail fast.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod registry;
mod roles;

pub use registry::{AgentRegistry, ImplNames, ResolvedImpls};
pub use roles::{
    Critic, ExecOutcome, Executor, Planner, PlanOutcome, ReviewOutcome, Reviser, ReviseOutcome,
    RunContext,
};
