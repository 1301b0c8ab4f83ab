//! CLI-local configuration (§6 "Environment & config"): a small JSON
//! document with just the sections the CLI itself needs, independent of
//! the daemon's own [`aos_daemon`]-scoped config (that crate isn't even a
//! dependency here).

use aos_registry::ImplNames;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// `defaults.{planner,executor,critic,reviser}`, read by `run` when a flag
/// isn't given on the command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Default Planner implementation name.
    pub planner: String,
    /// Default Executor implementation name.
    pub executor: String,
    /// Default Critic implementation name.
    pub critic: String,
    /// Default Reviser implementation name.
    pub reviser: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self { planner: "rules".to_string(), executor: "skills".to_string(), critic: "rules".to_string(), reviser: "rules".to_string() }
    }
}

impl DefaultsConfig {
    /// Converts to the [`ImplNames`] the pipeline's registry lookup expects.
    pub fn to_impl_names(&self) -> ImplNames {
        ImplNames { planner: self.planner.clone(), executor: self.executor.clone(), critic: self.critic.clone(), reviser: self.reviser.clone() }
    }
}

/// `outbox.{backend, path}`, read whenever a subcommand doesn't take an
/// explicit `--db`/`--episodes-dir` override.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxSection {
    /// `"json"` (file-per-trace) or `"sqlite"` (relational).
    pub backend: String,
    /// Directory for the file backend; database path for the sqlite backend.
    pub path: String,
}

impl Default for OutboxSection {
    fn default() -> Self {
        Self { backend: "json".to_string(), path: "episodes".to_string() }
    }
}

/// Full CLI configuration (§6). Loaded from `--config`, or all-defaults if
/// no file is given.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CliConfig {
    /// Default role implementations for `run`.
    pub defaults: DefaultsConfig,
    /// Outbox backend selection for `run`/`replay`/`episodes`.
    pub outbox: OutboxSection,
}

impl CliConfig {
    /// Loads configuration from a JSON file at `path`, if given, else
    /// returns the all-defaults configuration.
    pub fn load(path: Option<&PathBuf>) -> anyhow::Result<Self> {
        let Some(path) = path else { return Ok(Self::default()) };
        let raw = std::fs::read_to_string(path)?;
        let cfg: CliConfig = serde_json::from_str(&raw)?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_with_no_path_returns_defaults() {
        let cfg = CliConfig::load(None).unwrap();
        assert_eq!(cfg.outbox.backend, "json");
        assert_eq!(cfg.defaults.executor, "skills");
    }

    #[test]
    fn load_parses_a_partial_json_document_with_defaults_filled_in() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cli.json");
        std::fs::write(&path, r#"{"outbox": {"backend": "sqlite", "path": "episodes.db"}}"#).unwrap();
        let cfg = CliConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.outbox.backend, "sqlite");
        assert_eq!(cfg.outbox.path, "episodes.db");
        assert_eq!(cfg.defaults.planner, "rules");
    }

    #[test]
    fn load_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = CliConfig::load(Some(&dir.path().join("nope.json")));
        assert!(err.is_err());
    }
}
