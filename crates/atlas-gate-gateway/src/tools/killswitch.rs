//! Kill-switch and recovery tools (spec.md §4.L).

use crate::registry::Tool;
use crate::state::GatewayState;
use crate::tools::{require_bool, require_str, require_str_array};
use async_trait::async_trait;
use atlas_gate_core::session::OperatorRole;
use atlas_gate_core::{ErrorCode, GateError, Result};
use atlas_gate_killswitch::UnderstandingFlags;
use serde_json::{json, Value};

fn require_owner(state: &GatewayState, tool_name: &str) -> Result<()> {
    let identity = state
        .session
        .operator_identity()
        .ok_or_else(|| GateError::new(ErrorCode::UnauthorizedAction, tool_name, "no operator identity bound"))?;
    if identity.operator_role != OperatorRole::Owner {
        return Err(GateError::new(ErrorCode::InsufficientPermissions, tool_name, "only the OWNER may perform this action"));
    }
    Ok(())
}

pub struct EngageKillSwitch;

#[async_trait]
impl Tool for EngageKillSwitch {
    fn name(&self) -> &str {
        "engage_kill_switch"
    }
    fn description(&self) -> &str {
        "Manually engage the kill-switch, forcing degraded read-only operation until recovery completes."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "reason": { "type": "string" },
                "trigger_failure_ids": { "type": "array", "items": { "type": "string" } },
                "trigger_invariant_ids": { "type": "array", "items": { "type": "string" } },
                "halt_report_path": { "type": "string" },
            },
            "required": ["reason", "halt_report_path"],
        })
    }
    fn is_read_only(&self) -> bool {
        false
    }
    async fn execute(&self, state: &GatewayState, args: Value) -> Result<Value> {
        require_owner(state, self.name())?;
        let reason = require_str(&args, "reason", self.name())?.to_string();
        let halt_report_path = require_str(&args, "halt_report_path", self.name())?.to_string();
        let failure_ids = require_str_array(&args, "trigger_failure_ids", self.name()).unwrap_or_default();
        let invariant_ids = require_str_array(&args, "trigger_invariant_ids", self.name()).unwrap_or_default();
        let identity = state.session.operator_identity().expect("checked by require_owner");

        let path = state.session.resolver.kill_switch_path()?;
        let ks_state = atlas_gate_killswitch::engage(
            &path,
            reason,
            failure_ids,
            invariant_ids,
            "OWNER",
            identity.operator_id.clone(),
            halt_report_path,
        )?;

        Ok(json!({ "engaged": ks_state.engaged, "timestamp": ks_state.timestamp }))
    }
}

pub struct AcknowledgeRecovery;

#[async_trait]
impl Tool for AcknowledgeRecovery {
    fn name(&self) -> &str {
        "acknowledge_recovery"
    }
    fn description(&self) -> &str {
        "Recovery step 1: the OWNER acknowledges the halt report and affirms all four understanding flags; returns a one-time confirmation code."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "halt_report_path": { "type": "string" },
                "understands_halt_cause": { "type": "boolean" },
                "understands_audit_immutable": { "type": "boolean" },
                "understands_verification_required": { "type": "boolean" },
                "understands_sole_owner_authority": { "type": "boolean" },
            },
            "required": [
                "halt_report_path",
                "understands_halt_cause",
                "understands_audit_immutable",
                "understands_verification_required",
                "understands_sole_owner_authority",
            ],
        })
    }
    fn is_read_only(&self) -> bool {
        false
    }
    async fn execute(&self, state: &GatewayState, args: Value) -> Result<Value> {
        require_owner(state, self.name())?;
        let halt_report_path = require_str(&args, "halt_report_path", self.name())?;
        let flags = UnderstandingFlags {
            understands_halt_cause: require_bool(&args, "understands_halt_cause", self.name())?,
            understands_audit_immutable: require_bool(&args, "understands_audit_immutable", self.name())?,
            understands_verification_required: require_bool(&args, "understands_verification_required", self.name())?,
            understands_sole_owner_authority: require_bool(&args, "understands_sole_owner_authority", self.name())?,
        };

        let path = state.session.resolver.kill_switch_path()?;
        let code = atlas_gate_killswitch::acknowledge_recovery(&path, halt_report_path, flags)?;
        Ok(json!({ "confirmation_code": code }))
    }
}

pub struct ConfirmRecovery;

#[async_trait]
impl Tool for ConfirmRecovery {
    fn name(&self) -> &str {
        "confirm_recovery"
    }
    fn description(&self) -> &str {
        "Recovery step 2: the OWNER resubmits the understanding flags plus the confirmation code issued in step 1."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "confirmation_code": { "type": "string" },
                "understands_halt_cause": { "type": "boolean" },
                "understands_audit_immutable": { "type": "boolean" },
                "understands_verification_required": { "type": "boolean" },
                "understands_sole_owner_authority": { "type": "boolean" },
            },
            "required": [
                "confirmation_code",
                "understands_halt_cause",
                "understands_audit_immutable",
                "understands_verification_required",
                "understands_sole_owner_authority",
            ],
        })
    }
    fn is_read_only(&self) -> bool {
        false
    }
    async fn execute(&self, state: &GatewayState, args: Value) -> Result<Value> {
        require_owner(state, self.name())?;
        let confirmation_code = require_str(&args, "confirmation_code", self.name())?;
        let flags = UnderstandingFlags {
            understands_halt_cause: require_bool(&args, "understands_halt_cause", self.name())?,
            understands_audit_immutable: require_bool(&args, "understands_audit_immutable", self.name())?,
            understands_verification_required: require_bool(&args, "understands_verification_required", self.name())?,
            understands_sole_owner_authority: require_bool(&args, "understands_sole_owner_authority", self.name())?,
        };

        let path = state.session.resolver.kill_switch_path()?;
        atlas_gate_killswitch::confirm_recovery(&path, flags, confirmation_code)?;

        match atlas_gate_killswitch::unlock(&path) {
            Ok(()) => Ok(json!({ "confirmed": true, "unlocked": true })),
            Err(e) if e.error_code == ErrorCode::UnauthorizedAction => Ok(json!({ "confirmed": true, "unlocked": false, "blocked_by": e.human_message })),
            Err(e) => Err(e),
        }
    }
}

pub struct MarkRecoveryVerificationPassed;

#[async_trait]
impl Tool for MarkRecoveryVerificationPassed {
    fn name(&self) -> &str {
        "mark_recovery_verification_passed"
    }
    fn description(&self) -> &str {
        "Recovery step 3: independently mark one required verification (audit_verify, plan_lint, maturity_recompute) as passed."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "verification": { "type": "string", "enum": ["audit_verify", "plan_lint", "maturity_recompute"] } },
            "required": ["verification"],
        })
    }
    fn is_read_only(&self) -> bool {
        false
    }
    async fn execute(&self, state: &GatewayState, args: Value) -> Result<Value> {
        if state.session.operator_identity().is_none() {
            return Err(GateError::new(ErrorCode::UnauthorizedAction, self.name(), "no operator identity bound"));
        }
        let verification = require_str(&args, "verification", self.name())?;
        let path = state.session.resolver.kill_switch_path()?;
        atlas_gate_killswitch::mark_verification_passed(&path, verification)?;

        match atlas_gate_killswitch::unlock(&path) {
            Ok(()) => Ok(json!({ "verification": verification, "passed": true, "unlocked": true })),
            Err(e) if e.error_code == ErrorCode::UnauthorizedAction => Ok(json!({ "verification": verification, "passed": true, "unlocked": false, "blocked_by": e.human_message })),
            Err(e) => Err(e),
        }
    }
}
