//! One file per tool family, mirroring the teacher's
//! `agenticlaw-tools/src/tools/` layout (`write.rs`, `read.rs`, …).

pub mod attestation;
pub mod killswitch;
pub mod plan;
pub mod read;
pub mod remediation;
pub mod replay;
pub mod session;
pub mod write_file;

use crate::registry::ToolRegistry;
use std::sync::Arc;

/// Register every tool named in spec.md §4.P / §4.L.
pub fn register_all(registry: &mut ToolRegistry) {
    registry.register(Arc::new(session::InitSession));
    registry.register(Arc::new(session::BindOperatorIdentity));
    registry.register(Arc::new(write_file::WriteFile));
    registry.register(Arc::new(plan::CreatePlan));
    registry.register(Arc::new(plan::ApprovePlan));
    registry.register(Arc::new(plan::RejectPlan));
    registry.register(Arc::new(plan::ListPlans));
    registry.register(Arc::new(killswitch::EngageKillSwitch));
    registry.register(Arc::new(killswitch::AcknowledgeRecovery));
    registry.register(Arc::new(killswitch::ConfirmRecovery));
    registry.register(Arc::new(killswitch::MarkRecoveryVerificationPassed));
    registry.register(Arc::new(remediation::ProposeRemediation));
    registry.register(Arc::new(remediation::DecideRemediation));
    registry.register(Arc::new(read::ReadFile));
    registry.register(Arc::new(read::ReadAuditLog));
    registry.register(Arc::new(read::ReadPrompt));
    registry.register(Arc::new(replay::ReplayExecution));
    registry.register(Arc::new(replay::VerifyWorkspaceIntegrity));
    registry.register(Arc::new(attestation::GenerateAttestationBundle));
    registry.register(Arc::new(attestation::VerifyAttestationBundle));
    registry.register(Arc::new(attestation::ExportAttestationBundle));
}

/// Extract a required string field, classified the same way the write
/// policy engine classifies missing fields.
pub(crate) fn require_str<'a>(args: &'a serde_json::Value, field: &str, tool: &str) -> atlas_gate_core::Result<&'a str> {
    args.get(field).and_then(|v| v.as_str()).filter(|s| !s.is_empty()).ok_or_else(|| {
        atlas_gate_core::GateError::new(atlas_gate_core::ErrorCode::MissingRequiredField, tool, format!("'{}' is required", field))
    })
}

pub(crate) fn optional_str<'a>(args: &'a serde_json::Value, field: &str) -> Option<&'a str> {
    args.get(field).and_then(|v| v.as_str())
}

pub(crate) fn require_bool(args: &serde_json::Value, field: &str, tool: &str) -> atlas_gate_core::Result<bool> {
    args.get(field).and_then(|v| v.as_bool()).ok_or_else(|| {
        atlas_gate_core::GateError::new(atlas_gate_core::ErrorCode::MissingRequiredField, tool, format!("'{}' is required", field))
    })
}

pub(crate) fn require_str_array(args: &serde_json::Value, field: &str, tool: &str) -> atlas_gate_core::Result<Vec<String>> {
    args.get(field)
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .ok_or_else(|| atlas_gate_core::GateError::new(atlas_gate_core::ErrorCode::MissingRequiredField, tool, format!("'{}' is required", field)))
}

pub(crate) fn parse_operator_role(s: &str, tool: &str) -> atlas_gate_core::Result<atlas_gate_core::OperatorRole> {
    match s {
        "OWNER" => Ok(atlas_gate_core::OperatorRole::Owner),
        "REVIEWER" => Ok(atlas_gate_core::OperatorRole::Reviewer),
        "AUDITOR" => Ok(atlas_gate_core::OperatorRole::Auditor),
        other => Err(atlas_gate_core::GateError::new(
            atlas_gate_core::ErrorCode::InvalidValue,
            tool,
            format!("unknown operator_role '{}'", other),
        )),
    }
}

pub(crate) fn parse_client_role(s: &str, tool: &str) -> atlas_gate_core::Result<atlas_gate_core::ClientRole> {
    match s {
        "EXECUTION" => Ok(atlas_gate_core::ClientRole::Execution),
        "PLANNING" => Ok(atlas_gate_core::ClientRole::Planning),
        "READ_ONLY" => Ok(atlas_gate_core::ClientRole::ReadOnly),
        other => Err(atlas_gate_core::GateError::new(
            atlas_gate_core::ErrorCode::InvalidValue,
            tool,
            format!("unknown client_role '{}'", other),
        )),
    }
}
