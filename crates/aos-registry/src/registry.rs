use crate::roles::{Critic, Executor, Planner, Reviser};
use aos_error::{AosError, AosResult, ErrorCode};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Role×name names bound to a single [`AgentRegistry::resolve`] call,
/// mirroring the `impls={planner, executor, critic, reviser}` argument of
/// the closed-loop pipeline's `run` operation (§4.1).
#[derive(Debug, Clone)]
pub struct ImplNames {
    /// Registered Planner name.
    pub planner: String,
    /// Registered Executor name.
    pub executor: String,
    /// Registered Critic name.
    pub critic: String,
    /// Registered Reviser name.
    pub reviser: String,
}

/// Four concrete role implementations resolved by name (§2 C5, §9).
#[derive(Clone)]
pub struct ResolvedImpls {
    /// The bound Planner.
    pub planner: Arc<dyn Planner>,
    /// The bound Executor.
    pub executor: Arc<dyn Executor>,
    /// The bound Critic.
    pub critic: Arc<dyn Critic>,
    /// The bound Reviser.
    pub reviser: Arc<dyn Reviser>,
}

/// Typed `role × name → factory` registry.
///
/// Unlike the original dynamic class registry (one string-keyed dict per
/// role, populated by decorators at import time), each role here has its
/// own typed map, so a lookup can never return a value of the wrong trait.
/// Unknown role×name combinations are rejected by [`AgentRegistry::resolve`]
/// before a pipeline run starts, rather than failing partway through it.
#[derive(Default)]
pub struct AgentRegistry {
    planners: BTreeMap<String, Arc<dyn Planner>>,
    executors: BTreeMap<String, Arc<dyn Executor>>,
    critics: BTreeMap<String, Arc<dyn Critic>>,
    revisers: BTreeMap<String, Arc<dyn Reviser>>,
}

impl AgentRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a Planner under `name`.
    pub fn register_planner(&mut self, name: impl Into<String>, planner: Arc<dyn Planner>) {
        self.planners.insert(name.into(), planner);
    }

    /// Registers an Executor under `name`.
    pub fn register_executor(&mut self, name: impl Into<String>, executor: Arc<dyn Executor>) {
        self.executors.insert(name.into(), executor);
    }

    /// Registers a Critic under `name`.
    pub fn register_critic(&mut self, name: impl Into<String>, critic: Arc<dyn Critic>) {
        self.critics.insert(name.into(), critic);
    }

    /// Registers a Reviser under `name`.
    pub fn register_reviser(&mut self, name: impl Into<String>, reviser: Arc<dyn Reviser>) {
        self.revisers.insert(name.into(), reviser);
    }

    /// Lists the registered names for each role, e.g. for `registry gen`.
    pub fn list(&self) -> BTreeMap<&'static str, Vec<String>> {
        let mut out = BTreeMap::new();
        out.insert("planner", self.planners.keys().cloned().collect());
        out.insert("executor", self.executors.keys().cloned().collect());
        out.insert("critic", self.critics.keys().cloned().collect());
        out.insert("reviser", self.revisers.keys().cloned().collect());
        out
    }

    /// Resolves all four role bindings named in `names`, or fails on the
    /// first unknown combination, naming both the role and the requested
    /// name.
    pub fn resolve(&self, names: &ImplNames) -> AosResult<ResolvedImpls> {
        Ok(ResolvedImpls {
            planner: lookup(&self.planners, "planner", &names.planner)?,
            executor: lookup(&self.executors, "executor", &names.executor)?,
            critic: lookup(&self.critics, "critic", &names.critic)?,
            reviser: lookup(&self.revisers, "reviser", &names.reviser)?,
        })
    }
}

fn lookup<T: ?Sized>(
    map: &BTreeMap<String, Arc<T>>,
    role: &str,
    name: &str,
) -> AosResult<Arc<T>> {
    map.get(name).cloned().ok_or_else(|| {
        AosError::new(
            ErrorCode::NotFound,
            format!("no {role} plugin registered under name {name:?}"),
        )
        .with_context("role", role)
        .with_context("name", name)
    })
}
