use aos_error::{AosError, ErrorCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// One entry in the hash-pinned skill registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillEntry {
    /// Path to the skill's source file, relative to the registry file.
    pub path: String,
    /// Expected SHA-256 hex digest of that file's contents.
    pub sha256: String,
}

/// The on-disk skill registry (`skills/registry.json` by default).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SkillRegistry {
    /// Pinned skill files.
    pub skills: Vec<SkillEntry>,
}

const DEFAULT_REGISTRY_PATH: &str = "skills/registry.json";

/// Computes the SHA-256 hex digest of a file's contents, reading it in
/// fixed-size chunks rather than loading it wholesale.
pub fn sha256_file(path: &Path) -> Result<String, AosError> {
    let mut file = File::open(path).map_err(|e| {
        AosError::new(
            ErrorCode::SkillVerification,
            format!("cannot open {}", path.display()),
        )
        .with_source(e)
    })?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf).map_err(|e| {
            AosError::new(
                ErrorCode::SkillVerification,
                format!("error reading {}", path.display()),
            )
            .with_source(e)
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Loads the skill registry from `path`, returning an empty registry if the
/// file does not exist.
pub fn load_registry(path: &Path) -> Result<SkillRegistry, AosError> {
    if !path.exists() {
        return Ok(SkillRegistry::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| {
        AosError::new(
            ErrorCode::SkillVerification,
            format!("cannot read registry {}", path.display()),
        )
        .with_source(e)
    })?;
    serde_json::from_str(&contents).map_err(|e| {
        AosError::new(ErrorCode::SkillVerification, "malformed skill registry").with_source(e)
    })
}

/// Verifies that every entry in the registry at `path` (resolved relative to
/// the registry file's directory) exists and matches its pinned hash.
///
/// Checks every entry rather than short-circuiting, so that all mismatches
/// surface in one pass. If `strict` and any entry failed, returns a
/// [`ErrorCode::SkillVerification`] error listing the failing paths;
/// otherwise returns whether every entry passed.
pub fn verify_skills(strict: bool, path: &Path) -> Result<bool, AosError> {
    let registry = load_registry(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    let mut failing = Vec::new();
    for entry in &registry.skills {
        let resolved: PathBuf = base.join(&entry.path);
        let matches = sha256_file(&resolved)
            .map(|actual| actual == entry.sha256)
            .unwrap_or(false);
        if !matches {
            failing.push(entry.path.clone());
        }
    }

    let ok = failing.is_empty();
    if strict && !ok {
        return Err(AosError::new(
            ErrorCode::SkillVerification,
            format!("skill verification failed for: {}", failing.join(", ")),
        )
        .with_context("failing_paths", &failing));
    }
    Ok(ok)
}

/// Convenience wrapper over [`verify_skills`] using the default registry
/// location (`skills/registry.json`).
pub fn verify_skills_default(strict: bool) -> Result<bool, AosError> {
    verify_skills(strict, Path::new(DEFAULT_REGISTRY_PATH))
}
