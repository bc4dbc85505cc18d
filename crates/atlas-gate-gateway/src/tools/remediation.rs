//! Remediation proposal tools (spec.md §4.O).

use crate::registry::Tool;
use crate::state::GatewayState;
use crate::tools::{optional_str, require_str, require_str_array};
use async_trait::async_trait;
use atlas_gate_core::{ErrorCode, GateError, Result};
use atlas_gate_remediate::{decide, propose, ProposalInput, ProposalStatus};
use serde_json::{json, Value};

pub struct ProposeRemediation;

#[async_trait]
impl Tool for ProposeRemediation {
    fn name(&self) -> &str {
        "propose_remediation"
    }
    fn description(&self) -> &str {
        "Produce a PENDING remediation proposal bound to one or more evidence references."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "evidence_code": { "type": "string" },
                "evidence_refs": { "type": "array", "items": { "type": "string" } },
                "violations_addressed": { "type": "array", "items": { "type": "string" } },
                "exact_changes_requested": { "type": "string" },
                "files_affected": { "type": "array", "items": { "type": "string" } },
                "scope": { "type": "string" },
                "risk_assessment": { "type": "string" },
                "verification_after_apply": { "type": "array", "items": { "type": "string" } },
                "plan_hash": { "type": "string" },
                "expiration_condition": { "type": "string" },
            },
            "required": ["evidence_code", "evidence_refs", "exact_changes_requested", "scope", "risk_assessment"],
        })
    }
    fn is_read_only(&self) -> bool {
        false
    }
    async fn execute(&self, state: &GatewayState, args: Value) -> Result<Value> {
        let input = ProposalInput {
            evidence_code: require_str(&args, "evidence_code", self.name())?.to_string(),
            evidence_refs: require_str_array(&args, "evidence_refs", self.name())?,
            violations_addressed: require_str_array(&args, "violations_addressed", self.name()).unwrap_or_default(),
            exact_changes_requested: require_str(&args, "exact_changes_requested", self.name())?.to_string(),
            files_affected: require_str_array(&args, "files_affected", self.name()).unwrap_or_default(),
            scope: require_str(&args, "scope", self.name())?.to_string(),
            risk_assessment: require_str(&args, "risk_assessment", self.name())?.to_string(),
            verification_after_apply: require_str_array(&args, "verification_after_apply", self.name()).unwrap_or_default(),
            workspace_root: state.session.resolver.root()?.display().to_string(),
            plan_hash: optional_str(&args, "plan_hash").map(str::to_string),
            expiration_condition: optional_str(&args, "expiration_condition").map(str::to_string),
        };

        let proposal = propose(input)?;
        let value = serde_json::to_value(&proposal).map_err(|e| GateError::from_unknown(e, self.name(), "failed to serialize proposal"))?;
        state.insert_proposal(proposal);
        Ok(value)
    }
}

pub struct DecideRemediation;

#[async_trait]
impl Tool for DecideRemediation {
    fn name(&self) -> &str {
        "decide_remediation"
    }
    fn description(&self) -> &str {
        "Transition a PENDING remediation proposal to APPROVED or REJECTED. Requires an OWNER or REVIEWER operator identity."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "proposal_id": { "type": "string" },
                "decision": { "type": "string", "enum": ["APPROVED", "REJECTED"] },
            },
            "required": ["proposal_id", "decision"],
        })
    }
    fn is_read_only(&self) -> bool {
        false
    }
    async fn execute(&self, state: &GatewayState, args: Value) -> Result<Value> {
        let proposal_id = require_str(&args, "proposal_id", self.name())?;
        let decision = match require_str(&args, "decision", self.name())? {
            "APPROVED" => ProposalStatus::Approved,
            "REJECTED" => ProposalStatus::Rejected,
            other => return Err(GateError::new(ErrorCode::InvalidValue, self.name(), format!("decision must be APPROVED or REJECTED, got '{}'", other))),
        };

        let identity = state
            .session
            .operator_identity()
            .ok_or_else(|| GateError::new(ErrorCode::UnauthorizedAction, self.name(), "no operator identity bound"))?;

        let result = state.with_proposal_mut(proposal_id, |proposal| decide(proposal, decision, identity.operator_role, &identity.operator_id));
        match result {
            None => Err(GateError::new(ErrorCode::PlanNotFound, self.name(), format!("no remediation proposal with id '{}'", proposal_id))),
            Some(Err(e)) => Err(e),
            Some(Ok(())) => {
                let proposal = state.get_proposal(proposal_id).expect("just decided");
                serde_json::to_value(&proposal).map_err(|e| GateError::from_unknown(e, self.name(), "failed to serialize proposal"))
            }
        }
    }
}
