//! Path Resolver (spec.md §4.A) — owns the single, one-shot workspace root.
//!
//! No upward walk, no discovery of nearby governance markers, no
//! environment-variable lookup. The resolver is the only component allowed
//! to turn a caller-supplied path into an absolute filesystem path.

use crate::error::{ErrorCode, GateError};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

const TOOL: &str = "path_resolver";

pub struct PathResolver {
    root: RwLock<Option<PathBuf>>,
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl PathResolver {
    pub fn new() -> Self {
        Self {
            root: RwLock::new(None),
        }
    }

    /// One-shot lock of the workspace root. Fails if already locked, if
    /// `abs_path` is not absolute, or if it does not exist / is not a
    /// directory. On success, eagerly materializes `R/docs/plans`.
    pub fn lock(&self, abs_path: &Path) -> crate::error::Result<()> {
        let mut guard = self.root.write().expect("path resolver lock poisoned");
        if guard.is_some() {
            return Err(GateError::new(
                ErrorCode::RefuseLockSecondTime,
                TOOL,
                "workspace root is already locked for this session",
            ));
        }
        if !abs_path.is_absolute() {
            return Err(GateError::new(
                ErrorCode::PathNotAbsolute,
                TOOL,
                format!("workspace root must be an absolute path: {}", abs_path.display()),
            ));
        }
        if !abs_path.exists() {
            return Err(GateError::new(
                ErrorCode::PathNotExist,
                TOOL,
                format!("workspace root does not exist: {}", abs_path.display()),
            ));
        }
        if !abs_path.is_dir() {
            return Err(GateError::new(
                ErrorCode::PathNotDir,
                TOOL,
                format!("workspace root is not a directory: {}", abs_path.display()),
            ));
        }

        let normalized = normalize(abs_path);
        std::fs::create_dir_all(normalized.join("docs").join("plans")).map_err(|e| {
            GateError::from_unknown(e, TOOL, "failed to materialize docs/plans directory")
        })?;

        *guard = Some(normalized);
        Ok(())
    }

    pub fn root(&self) -> crate::error::Result<PathBuf> {
        self.root
            .read()
            .expect("path resolver lock poisoned")
            .clone()
            .ok_or_else(|| GateError::new(ErrorCode::SessionNotInitialized, TOOL, "workspace root not locked"))
    }

    pub fn plans_dir(&self) -> crate::error::Result<PathBuf> {
        Ok(self.root()?.join("docs").join("plans"))
    }

    pub fn reports_dir(&self) -> crate::error::Result<PathBuf> {
        Ok(self.root()?.join("docs").join("reports"))
    }

    pub fn plan_path(&self, hash: &str) -> crate::error::Result<PathBuf> {
        Ok(self.plans_dir()?.join(format!("{}.md", hash)))
    }

    pub fn audit_log_path(&self) -> crate::error::Result<PathBuf> {
        Ok(self.root()?.join("audit-log.jsonl"))
    }

    pub fn governance_path(&self) -> crate::error::Result<PathBuf> {
        Ok(self.root()?.join(".kaiza").join("governance.json"))
    }

    pub fn kill_switch_path(&self) -> crate::error::Result<PathBuf> {
        Ok(self.root()?.join(".kaiza").join("kill_switch.json"))
    }

    pub fn attestation_secret_path(&self) -> crate::error::Result<PathBuf> {
        Ok(self.root()?.join(".kaiza").join("attestation_secret.json"))
    }

    pub fn audit_lock_path(&self) -> crate::error::Result<PathBuf> {
        Ok(self.root()?.join(".atlas-gate").join("audit.lock"))
    }

    /// Resolve a (relative or absolute) write target against the locked
    /// root, rejecting any `..` segment and any result outside the root.
    pub fn resolve_write_target(&self, rel_or_abs: &str) -> crate::error::Result<PathBuf> {
        if contains_parent_segment(rel_or_abs) {
            return Err(GateError::new(
                ErrorCode::TraversalBlocked,
                TOOL,
                format!("path contains a parent-directory segment: {}", rel_or_abs),
            ));
        }

        let root = self.root()?;
        let candidate = Path::new(rel_or_abs);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            root.join(candidate)
        };
        let resolved = normalize(&joined);

        if !resolved.starts_with(&root) {
            return Err(GateError::new(
                ErrorCode::OutsideWorkspace,
                TOOL,
                format!("resolved path escapes workspace root: {}", resolved.display()),
            ));
        }
        Ok(resolved)
    }
}

/// True if any component of `p`, in any textual form (`..`, `../`, `/..`),
/// denotes a parent-directory segment.
fn contains_parent_segment(p: &str) -> bool {
    Path::new(p)
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
}

/// Lexical normalization (no symlink resolution, no filesystem access
/// beyond what the caller already performed) — resolves `.` and collapses
/// repeated separators without requiring the path to exist.
fn normalize(p: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in p.components() {
        match component {
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}
