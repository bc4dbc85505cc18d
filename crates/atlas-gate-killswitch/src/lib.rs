//! Kill-Switch & Recovery Gate (spec.md §4.L) — persisted HALT state, a
//! closed read-only tool set admitted while engaged, and a two-step
//! human-gated recovery protocol.

use atlas_gate_core::{ErrorCode, GateError, Result};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

const TOOL: &str = "kill_switch";

/// Reason recorded when the persisted state file cannot be parsed. Per
/// spec.md §4.L, a corrupted state file must fail *safe* — engaged, never
/// disengaged.
pub const CORRUPTED_STATE_REASON: &str = "CORRUPTED_STATE";

/// Tools admitted while the kill-switch is engaged (spec.md §4.L).
pub const READ_ONLY_TOOLS: &[&str] = &[
    "read_file",
    "read_audit_log",
    "read_prompt",
    "list_plans",
    "replay_execution",
    "verify_workspace_integrity",
    "generate_attestation_bundle",
    "verify_attestation_bundle",
    "export_attestation_bundle",
];

pub fn is_read_only_tool(name: &str) -> bool {
    READ_ONLY_TOOLS.contains(&name)
}

/// The three independently-gated recovery verifications (spec.md §4.L
/// step 3).
pub const REQUIRED_VERIFICATIONS: &[&str] = &["audit_verify", "plan_lint", "maturity_recompute"];

/// The four explicit understanding flags an OWNER must affirm before a
/// confirmation code is issued.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UnderstandingFlags {
    pub understands_halt_cause: bool,
    pub understands_audit_immutable: bool,
    pub understands_verification_required: bool,
    pub understands_sole_owner_authority: bool,
}

impl UnderstandingFlags {
    pub fn all_true(&self) -> bool {
        self.understands_halt_cause
            && self.understands_audit_immutable
            && self.understands_verification_required
            && self.understands_sole_owner_authority
    }
}

/// The persisted kill-switch state (spec.md §3 Kill-switch State).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillSwitchState {
    pub engaged: bool,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trigger_failure_ids: Vec<String>,
    #[serde(default)]
    pub trigger_invariant_ids: Vec<String>,
    pub trigger_reason: Option<String>,
    pub triggered_by_role: Option<String>,
    pub triggered_by_tool: Option<String>,
    pub halt_report_path: Option<String>,
    #[serde(default)]
    pub recovery_required_verifications: Vec<String>,
    #[serde(default)]
    pub recovery_verifications_passed: BTreeSet<String>,
    #[serde(default)]
    pub recovery_confirmation_code: Option<String>,
    #[serde(default)]
    pub recovery_acknowledged: bool,
    #[serde(default)]
    pub recovery_confirmed: bool,
}

impl KillSwitchState {
    pub fn disengaged() -> Self {
        Self {
            engaged: false,
            timestamp: None,
            trigger_failure_ids: Vec::new(),
            trigger_invariant_ids: Vec::new(),
            trigger_reason: None,
            triggered_by_role: None,
            triggered_by_tool: None,
            halt_report_path: None,
            recovery_required_verifications: Vec::new(),
            recovery_verifications_passed: BTreeSet::new(),
            recovery_confirmation_code: None,
            recovery_acknowledged: false,
            recovery_confirmed: false,
        }
    }

    fn corrupted() -> Self {
        Self {
            engaged: true,
            timestamp: Some(Utc::now()),
            trigger_failure_ids: Vec::new(),
            trigger_invariant_ids: Vec::new(),
            trigger_reason: Some(CORRUPTED_STATE_REASON.to_string()),
            triggered_by_role: None,
            triggered_by_tool: None,
            halt_report_path: None,
            recovery_required_verifications: REQUIRED_VERIFICATIONS.iter().map(|s| s.to_string()).collect(),
            recovery_verifications_passed: BTreeSet::new(),
            recovery_confirmation_code: None,
            recovery_acknowledged: false,
            recovery_confirmed: false,
        }
    }

    pub fn all_verifications_passed(&self) -> bool {
        self.recovery_required_verifications
            .iter()
            .all(|v| self.recovery_verifications_passed.contains(v))
    }
}

/// Load the persisted state. A missing file means never engaged. A file
/// that fails to parse means a corrupted, *engaged* state — fail-safe,
/// never fail-open.
pub fn load(path: &Path) -> KillSwitchState {
    match std::fs::read_to_string(path) {
        Err(_) => KillSwitchState::disengaged(),
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::error!(error = %e, path = %path.display(), "kill-switch state file is corrupted, failing safe to engaged");
            KillSwitchState::corrupted()
        }),
    }
}

/// Persist `state` atomically: write to a sibling temp file, then rename
/// over the target.
fn persist(path: &Path, state: &KillSwitchState) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| GateError::from_unknown(e, TOOL, "failed to create kill-switch state directory"))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    let body = serde_json::to_string_pretty(state).map_err(|e| GateError::from_unknown(e, TOOL, "failed to serialize kill-switch state"))?;
    std::fs::write(&tmp_path, body).map_err(|e| GateError::from_unknown(e, TOOL, "failed to write kill-switch temp state"))?;
    std::fs::rename(&tmp_path, path).map_err(|e| GateError::from_unknown(e, TOOL, "failed to install kill-switch state"))?;
    Ok(())
}

/// Engage the kill-switch, persisting the halt state.
#[allow(clippy::too_many_arguments)]
pub fn engage(
    path: &Path,
    trigger_reason: impl Into<String>,
    trigger_failure_ids: Vec<String>,
    trigger_invariant_ids: Vec<String>,
    triggered_by_role: impl Into<String>,
    triggered_by_tool: impl Into<String>,
    halt_report_path: impl Into<String>,
) -> Result<KillSwitchState> {
    let state = KillSwitchState {
        engaged: true,
        timestamp: Some(Utc::now()),
        trigger_failure_ids,
        trigger_invariant_ids,
        trigger_reason: Some(trigger_reason.into()),
        triggered_by_role: Some(triggered_by_role.into()),
        triggered_by_tool: Some(triggered_by_tool.into()),
        halt_report_path: Some(halt_report_path.into()),
        recovery_required_verifications: REQUIRED_VERIFICATIONS.iter().map(|s| s.to_string()).collect(),
        recovery_verifications_passed: BTreeSet::new(),
        recovery_confirmation_code: None,
        recovery_acknowledged: false,
        recovery_confirmed: false,
    };
    persist(path, &state)?;
    Ok(state)
}

/// If `engaged`, admit only the closed read-only tool set; otherwise raise
/// `SESSION_LOCKED` referencing the halt report.
pub fn gate_tool_call(state: &KillSwitchState, tool_name: &str) -> Result<()> {
    if !state.engaged || is_read_only_tool(tool_name) {
        return Ok(());
    }
    Err(GateError::new(
        ErrorCode::SessionLocked,
        tool_name,
        format!(
            "kill-switch engaged: {}",
            state.halt_report_path.as_deref().unwrap_or("see halt report")
        ),
    ))
}

fn random_confirmation_code() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Recovery step 1: OWNER acknowledges the halt report and affirms all
/// four understanding flags. Returns a random 32-hex confirmation code the
/// OWNER must resubmit in step 2.
pub fn acknowledge_recovery(path: &Path, halt_report_path: &str, flags: UnderstandingFlags) -> Result<String> {
    let mut state = load(path);
    if !state.engaged {
        return Err(GateError::new(ErrorCode::UnauthorizedAction, TOOL, "kill-switch is not engaged, nothing to recover"));
    }
    if state.halt_report_path.as_deref() != Some(halt_report_path) {
        return Err(GateError::new(ErrorCode::InvalidValue, TOOL, "halt_report_path does not match the engaged state"));
    }
    if !flags.all_true() {
        return Err(GateError::new(ErrorCode::MissingRequiredField, TOOL, "all four understanding flags must be affirmed"));
    }

    let code = random_confirmation_code();
    state.recovery_acknowledged = true;
    state.recovery_confirmation_code = Some(code.clone());
    persist(path, &state)?;
    Ok(code)
}

/// Recovery step 2: OWNER resubmits the same flags plus the confirmation
/// code issued in step 1.
pub fn confirm_recovery(path: &Path, flags: UnderstandingFlags, confirmation_code: &str) -> Result<()> {
    let mut state = load(path);
    if !state.recovery_acknowledged {
        return Err(GateError::new(ErrorCode::UnauthorizedAction, TOOL, "recovery has not been acknowledged (step 1 not completed)"));
    }
    if !flags.all_true() {
        return Err(GateError::new(ErrorCode::MissingRequiredField, TOOL, "all four understanding flags must be affirmed"));
    }
    if state.recovery_confirmation_code.as_deref() != Some(confirmation_code) {
        return Err(GateError::new(ErrorCode::InvalidValue, TOOL, "confirmation code does not match"));
    }

    state.recovery_confirmed = true;
    persist(path, &state)?;
    Ok(())
}

/// Recovery step 3: mark one required verification as independently
/// passed (`audit_verify`, `plan_lint`, `maturity_recompute`).
pub fn mark_verification_passed(path: &Path, verification: &str) -> Result<()> {
    if !REQUIRED_VERIFICATIONS.contains(&verification) {
        return Err(GateError::new(
            ErrorCode::InvalidValue,
            TOOL,
            format!("unknown recovery verification '{}'", verification),
        ));
    }
    let mut state = load(path);
    state.recovery_verifications_passed.insert(verification.to_string());
    persist(path, &state)?;
    Ok(())
}

/// Recovery step 4: clear the engaged state. Requires step 2's
/// confirmation and every required verification to be independently
/// passed; otherwise the pending verification blocks unlock.
pub fn unlock(path: &Path) -> Result<()> {
    let state = load(path);
    if !state.recovery_confirmed {
        return Err(GateError::new(ErrorCode::UnauthorizedAction, TOOL, "recovery has not completed step 2 (confirmation)"));
    }
    if !state.all_verifications_passed() {
        let missing: Vec<&str> = state
            .recovery_required_verifications
            .iter()
            .filter(|v| !state.recovery_verifications_passed.contains(*v))
            .map(|s| s.as_str())
            .collect();
        return Err(GateError::new(
            ErrorCode::UnauthorizedAction,
            TOOL,
            format!("pending verification(s) block unlock: {}", missing.join(", ")),
        ));
    }
    persist(path, &KillSwitchState::disengaged())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn all_flags() -> UnderstandingFlags {
        UnderstandingFlags {
            understands_halt_cause: true,
            understands_audit_immutable: true,
            understands_verification_required: true,
            understands_sole_owner_authority: true,
        }
    }

    #[test]
    fn missing_file_loads_as_disengaged() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kill_switch.json");
        assert!(!load(&path).engaged);
    }

    #[test]
    fn corrupted_file_fails_safe_to_engaged() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kill_switch.json");
        std::fs::write(&path, "not json").unwrap();
        let state = load(&path);
        assert!(state.engaged);
        assert_eq!(state.trigger_reason.as_deref(), Some(CORRUPTED_STATE_REASON));
    }

    #[test]
    fn engage_then_gate_blocks_mutating_tool_but_admits_read_only() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kill_switch.json");
        let state = engage(&path, "manual halt", vec![], vec![], "OWNER", "write_file", "docs/reports/halt.md").unwrap();
        assert!(gate_tool_call(&state, "write_file").is_err());
        assert!(gate_tool_call(&state, "read_file").is_ok());
    }

    #[test]
    fn recovery_protocol_full_happy_path_unlocks() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kill_switch.json");
        engage(&path, "manual halt", vec![], vec![], "OWNER", "write_file", "docs/reports/halt.md").unwrap();

        let code = acknowledge_recovery(&path, "docs/reports/halt.md", all_flags()).unwrap();
        assert_eq!(code.len(), 32);

        confirm_recovery(&path, all_flags(), &code).unwrap();

        let err = unlock(&path).unwrap_err();
        assert_eq!(err.error_code, ErrorCode::UnauthorizedAction);

        for v in REQUIRED_VERIFICATIONS {
            mark_verification_passed(&path, v).unwrap();
        }
        unlock(&path).unwrap();
        assert!(!load(&path).engaged);
    }

    #[test]
    fn recovery_blocked_when_a_flag_is_false() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kill_switch.json");
        engage(&path, "manual halt", vec![], vec![], "OWNER", "write_file", "docs/reports/halt.md").unwrap();

        let mut flags = all_flags();
        flags.understands_sole_owner_authority = false;
        let err = acknowledge_recovery(&path, "docs/reports/halt.md", flags).unwrap_err();
        assert_eq!(err.error_code, ErrorCode::MissingRequiredField);
    }

    #[test]
    fn confirm_with_wrong_code_fails() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kill_switch.json");
        engage(&path, "manual halt", vec![], vec![], "OWNER", "write_file", "docs/reports/halt.md").unwrap();
        acknowledge_recovery(&path, "docs/reports/halt.md", all_flags()).unwrap();
        let err = confirm_recovery(&path, all_flags(), "0000000000000000000000000000000000").unwrap_err();
        assert_eq!(err.error_code, ErrorCode::InvalidValue);
    }

    #[test]
    fn unlock_without_confirmation_is_blocked() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kill_switch.json");
        engage(&path, "manual halt", vec![], vec![], "OWNER", "write_file", "docs/reports/halt.md").unwrap();
        let err = unlock(&path).unwrap_err();
        assert_eq!(err.error_code, ErrorCode::UnauthorizedAction);
    }
}
