//! Governance configuration (`R/.kaiza/governance.json`) — advisory,
//! `serde(default)`-backed config in the teacher's `OpenclawConfig::load`
//! idiom: a corrupt or missing file falls back to the secure default
//! rather than propagating a parse error, because this file is advisory,
//! unlike the load-bearing kill-switch state (`atlas_gate_killswitch::load`).

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Secure-by-default: bootstrap plan approval and auto-registration are
/// both off until a workspace explicitly opts in (spec.md §9 note 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    pub bootstrap_enabled: bool,
    pub approved_plans_count: u64,
    pub auto_register_plans: bool,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            bootstrap_enabled: false,
            approved_plans_count: 0,
            auto_register_plans: false,
        }
    }
}

/// Load governance config, falling back to the secure default on any
/// missing-file or parse error.
pub fn load(path: &Path) -> GovernanceConfig {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|content| serde_json::from_str(&content).ok())
        .unwrap_or_default()
}

/// Persist governance config. Failures here are surfaced to the caller —
/// unlike `load`, a write failure should not be silently swallowed.
pub fn save(path: &Path, config: &GovernanceConfig) -> atlas_gate_core::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| atlas_gate_core::GateError::from_unknown(e, "governance_config", "failed to create governance config directory"))?;
    }
    let body = serde_json::to_string_pretty(config)
        .map_err(|e| atlas_gate_core::GateError::from_unknown(e, "governance_config", "failed to serialize governance config"))?;
    std::fs::write(path, body)
        .map_err(|e| atlas_gate_core::GateError::from_unknown(e, "governance_config", "failed to write governance config"))?;
    Ok(())
}

/// The bootstrap secret environment variable. Required (in addition to
/// `bootstrap_enabled: true`) to approve the very first plan in a
/// workspace that has never had one approved before.
pub const BOOTSTRAP_SECRET_ENV_VAR: &str = "KAIZA_BOOTSTRAP_SECRET";

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_secure_default() {
        let tmp = TempDir::new().unwrap();
        let cfg = load(&tmp.path().join("governance.json"));
        assert!(!cfg.bootstrap_enabled);
        assert!(!cfg.auto_register_plans);
        assert_eq!(cfg.approved_plans_count, 0);
    }

    #[test]
    fn corrupt_file_falls_back_to_secure_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("governance.json");
        std::fs::write(&path, "not json").unwrap();
        let cfg = load(&path);
        assert!(!cfg.bootstrap_enabled);
    }

    #[test]
    fn save_then_load_round_trips() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".kaiza").join("governance.json");
        let cfg = GovernanceConfig {
            bootstrap_enabled: true,
            approved_plans_count: 3,
            auto_register_plans: false,
        };
        save(&path, &cfg).unwrap();
        let loaded = load(&path);
        assert_eq!(loaded.approved_plans_count, 3);
        assert!(loaded.bootstrap_enabled);
    }
}
