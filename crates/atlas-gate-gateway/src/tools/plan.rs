//! Plan-management tools (spec.md §4.F, §4.G) — create, approve, reject,
//! and enumerate content-addressed plans.

use crate::governance;
use crate::registry::Tool;
use crate::state::GatewayState;
use crate::tools::{optional_str, require_str};
use async_trait::async_trait;
use atlas_gate_core::session::{ClientRole, OperatorRole};
use atlas_gate_core::{ErrorCode, GateError, Result};
use atlas_gate_plan::{lint_plan, parse_envelope};
use serde_json::{json, Value};

pub struct CreatePlan;

#[async_trait]
impl Tool for CreatePlan {
    fn name(&self) -> &str {
        "create_plan"
    }
    fn description(&self) -> &str {
        "Lint a plan body, compute its content hash, and write it to the plan store with STATUS: PENDING."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "body": { "type": "string", "description": "plan text without the envelope header" },
                "role": { "type": "string", "default": "EXECUTION" },
            },
            "required": ["body"],
        })
    }
    fn is_read_only(&self) -> bool {
        false
    }
    async fn execute(&self, state: &GatewayState, args: Value) -> Result<Value> {
        if state.session.client_role == ClientRole::ReadOnly {
            return Err(GateError::new(ErrorCode::UnauthorizedAction, self.name(), "a READ_ONLY client role may not create plans"));
        }
        let body = require_str(&args, "body", self.name())?;
        let role = optional_str(&args, "role").unwrap_or("EXECUTION");

        let verdict = lint_plan(body, None)?;
        if !verdict.pass {
            return Err(GateError::new(
                ErrorCode::PlanLintFailed,
                self.name(),
                format!("plan fails {} lint stage(s)", verdict.violations.len()),
            ));
        }

        let envelope = format!("<!-- ATLAS-GATE_PLAN_HASH: {} ROLE: {} STATUS: PENDING -->\n\n{}", verdict.plan_hash, role, body);
        let path = state.session.resolver.plan_path(&verdict.plan_hash)?;
        std::fs::write(&path, &envelope).map_err(|e| GateError::from_unknown(e, self.name(), "failed to write plan file"))?;

        Ok(json!({ "plan_hash": verdict.plan_hash, "status": "PENDING" }))
    }
}

/// Rewrite a plan file's `STATUS:` field in place, preserving the rest of
/// the envelope and body byte for byte.
fn rewrite_status(path: &std::path::Path, new_status: &str) -> Result<()> {
    let text = std::fs::read_to_string(path).map_err(|e| GateError::from_unknown(e, "plan_store", "failed to read plan file"))?;
    let rewritten = text.replacen("STATUS: PENDING", &format!("STATUS: {}", new_status), 1);
    std::fs::write(path, rewritten).map_err(|e| GateError::from_unknown(e, "plan_store", "failed to rewrite plan status"))?;
    Ok(())
}

pub struct ApprovePlan;

#[async_trait]
impl Tool for ApprovePlan {
    fn name(&self) -> &str {
        "approve_plan"
    }
    fn description(&self) -> &str {
        "Transition a PENDING plan to APPROVED. Requires an OWNER or REVIEWER operator identity; the first-ever approval in a workspace additionally requires governance bootstrap opt-in."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "plan": { "type": "string" },
                "bootstrap_secret": { "type": "string" },
            },
            "required": ["plan"],
        })
    }
    fn is_read_only(&self) -> bool {
        false
    }
    async fn execute(&self, state: &GatewayState, args: Value) -> Result<Value> {
        let plan_hash = require_str(&args, "plan", self.name())?;
        let identity = state.session.operator_identity().ok_or_else(|| {
            GateError::new(ErrorCode::UnauthorizedAction, self.name(), "no operator identity bound")
        })?;
        if !matches!(identity.operator_role, OperatorRole::Owner | OperatorRole::Reviewer) {
            return Err(GateError::new(ErrorCode::InsufficientPermissions, self.name(), "only an OWNER or REVIEWER may approve a plan"));
        }

        let governance_path = state.session.resolver.governance_path()?;
        let mut config = governance::load(&governance_path);

        if config.approved_plans_count == 0 {
            if !config.bootstrap_enabled {
                return Err(GateError::new(ErrorCode::BootstrapFailure, self.name(), "bootstrap_enabled is false; the first plan approval requires an explicit opt-in"));
            }
            let expected = std::env::var(governance::BOOTSTRAP_SECRET_ENV_VAR).map_err(|_| {
                GateError::new(ErrorCode::BootstrapFailure, self.name(), format!("{} is not set", governance::BOOTSTRAP_SECRET_ENV_VAR))
            })?;
            let supplied = require_str(&args, "bootstrap_secret", self.name())?;
            if supplied != expected {
                return Err(GateError::new(ErrorCode::BootstrapFailure, self.name(), "bootstrap_secret does not match"));
            }
        }

        let path = state.session.resolver.plan_path(plan_hash)?;
        let text = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GateError::new(ErrorCode::PlanNotFound, self.name(), "no plan file at the given hash")
            } else {
                GateError::from_unknown(e, self.name(), "failed to read plan file")
            }
        })?;
        let envelope = parse_envelope(&text).ok_or_else(|| GateError::new(ErrorCode::PlanNotApproved, self.name(), "plan envelope missing or unparseable"))?;
        if envelope.status != "PENDING" {
            return Err(GateError::new(ErrorCode::InvalidValue, self.name(), format!("plan status is {}, not PENDING", envelope.status)));
        }

        rewrite_status(&path, "APPROVED")?;
        config.approved_plans_count += 1;
        governance::save(&governance_path, &config)?;

        Ok(json!({ "plan_hash": plan_hash, "status": "APPROVED" }))
    }
}

pub struct RejectPlan;

#[async_trait]
impl Tool for RejectPlan {
    fn name(&self) -> &str {
        "reject_plan"
    }
    fn description(&self) -> &str {
        "Transition a PENDING plan to REJECTED. Requires an OWNER or REVIEWER operator identity."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "plan": { "type": "string" } },
            "required": ["plan"],
        })
    }
    fn is_read_only(&self) -> bool {
        false
    }
    async fn execute(&self, state: &GatewayState, args: Value) -> Result<Value> {
        let plan_hash = require_str(&args, "plan", self.name())?;
        let identity = state.session.operator_identity().ok_or_else(|| {
            GateError::new(ErrorCode::UnauthorizedAction, self.name(), "no operator identity bound")
        })?;
        if !matches!(identity.operator_role, OperatorRole::Owner | OperatorRole::Reviewer) {
            return Err(GateError::new(ErrorCode::InsufficientPermissions, self.name(), "only an OWNER or REVIEWER may reject a plan"));
        }

        let path = state.session.resolver.plan_path(plan_hash)?;
        let text = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GateError::new(ErrorCode::PlanNotFound, self.name(), "no plan file at the given hash")
            } else {
                GateError::from_unknown(e, self.name(), "failed to read plan file")
            }
        })?;
        let envelope = parse_envelope(&text).ok_or_else(|| GateError::new(ErrorCode::PlanNotApproved, self.name(), "plan envelope missing or unparseable"))?;
        if envelope.status != "PENDING" {
            return Err(GateError::new(ErrorCode::InvalidValue, self.name(), format!("plan status is {}, not PENDING", envelope.status)));
        }

        let rewritten = text.replacen("STATUS: PENDING", "STATUS: REJECTED", 1);
        std::fs::write(&path, rewritten).map_err(|e| GateError::from_unknown(e, self.name(), "failed to rewrite plan status"))?;

        Ok(json!({ "plan_hash": plan_hash, "status": "REJECTED" }))
    }
}

pub struct ListPlans;

#[async_trait]
impl Tool for ListPlans {
    fn name(&self) -> &str {
        "list_plans"
    }
    fn description(&self) -> &str {
        "Enumerate every plan in the plan store with its hash and status."
    }
    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }
    fn is_read_only(&self) -> bool {
        true
    }
    async fn execute(&self, state: &GatewayState, _args: Value) -> Result<Value> {
        let dir = state.session.resolver.plans_dir()?;
        let mut plans = Vec::new();
        if dir.is_dir() {
            for entry in std::fs::read_dir(&dir).map_err(|e| GateError::from_unknown(e, self.name(), "failed to list plans directory"))? {
                let entry = entry.map_err(|e| GateError::from_unknown(e, self.name(), "failed to read plans directory entry"))?;
                if entry.path().extension().and_then(|e| e.to_str()) != Some("md") {
                    continue;
                }
                let text = std::fs::read_to_string(entry.path()).unwrap_or_default();
                if let Some(envelope) = parse_envelope(&text) {
                    plans.push(json!({ "plan_hash": envelope.plan_hash, "status": envelope.status }));
                }
            }
        }
        plans.sort_by(|a, b| a["plan_hash"].as_str().cmp(&b["plan_hash"].as_str()));
        Ok(json!({ "plans": plans }))
    }
}
