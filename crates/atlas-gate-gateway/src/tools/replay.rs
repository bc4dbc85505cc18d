//! Replay / integrity tools (spec.md §4.M) — read-only re-derivation of
//! verdicts from the audit log.

use crate::registry::Tool;
use crate::state::GatewayState;
use crate::tools::{optional_str, require_str};
use async_trait::async_trait;
use atlas_gate_audit::TamperFinding;
use atlas_gate_core::{GateError, Result};
use atlas_gate_replay::{replay, ReplayFilter, ReplayFinding, Verdict};
use serde_json::{json, Value};

/// The `seq` a finding pins blame on, where the finding carries one.
/// `SeqGap`/`InvalidJson` describe a position rather than a specific
/// record's seq, so they report `None` here.
fn tamper_finding_seq(finding: &TamperFinding) -> Option<u64> {
    match finding {
        TamperFinding::BrokenChain { seq, .. } => Some(*seq),
        TamperFinding::RecomputationMismatch { seq } => Some(*seq),
        TamperFinding::SeqGap { found, .. } => Some(*found),
        TamperFinding::InvalidJson { .. } => None,
    }
}

fn replay_finding_seq(finding: &ReplayFinding) -> Option<u64> {
    match finding {
        ReplayFinding::Tamper(t) => tamper_finding_seq(t),
        ReplayFinding::PolicyViolationBlockedByGate { seq }
        | ReplayFinding::PolicyViolationInvariantViolation { seq }
        | ReplayFinding::AuthorityViolationExecutionWithoutPlan { seq }
        | ReplayFinding::AuthorityViolationRoleMismatch { seq } => Some(*seq),
        ReplayFinding::DivergenceIdenticalArgsDifferentResults { .. } | ReplayFinding::EvidenceGapIncompletePlanExecution { .. } => None,
    }
}

fn report_to_value(report: &atlas_gate_replay::ReplayReport, tool_name: &str) -> Result<Value> {
    let timeline = serde_json::to_value(&report.timeline).map_err(|e| GateError::from_unknown(e, tool_name, "failed to serialize timeline"))?;
    let findings: Vec<Value> = report
        .findings
        .iter()
        .map(|f| json!({ "code": f.code(), "seq": replay_finding_seq(f) }))
        .collect();
    Ok(json!({
        "verdict": if report.verdict == Verdict::Pass { "PASS" } else { "FAIL" },
        "timeline": timeline,
        "findings": findings,
    }))
}

pub struct ReplayExecution;

#[async_trait]
impl Tool for ReplayExecution {
    fn name(&self) -> &str {
        "replay_execution"
    }
    fn description(&self) -> &str {
        "Deterministically re-derive a PASS/FAIL verdict for one plan's execution from the audit log: chain integrity, determinism, and authority/policy findings."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "plan": { "type": "string", "description": "64-hex plan hash to scope the replay to" },
                "phase_id": { "type": "string" },
                "tool": { "type": "string" },
                "seq_start": { "type": "integer" },
                "seq_end": { "type": "integer" },
            },
            "required": ["plan"],
        })
    }
    fn is_read_only(&self) -> bool {
        true
    }
    async fn execute(&self, state: &GatewayState, args: Value) -> Result<Value> {
        let plan_hash = require_str(&args, "plan", self.name())?;
        let root = state.session.resolver.root()?;
        let log_path = state.session.resolver.audit_log_path()?;

        let filter = ReplayFilter {
            phase_id: optional_str(&args, "phase_id").map(str::to_string),
            tool: optional_str(&args, "tool").map(str::to_string),
            seq_range: match (args.get("seq_start").and_then(|v| v.as_u64()), args.get("seq_end").and_then(|v| v.as_u64())) {
                (Some(s), Some(e)) => Some((s, e)),
                _ => None,
            },
        };

        let report = replay(&root.display().to_string(), &log_path, plan_hash, filter)?;
        report_to_value(&report, self.name())
    }
}

pub struct VerifyWorkspaceIntegrity;

#[async_trait]
impl Tool for VerifyWorkspaceIntegrity {
    fn name(&self) -> &str {
        "verify_workspace_integrity"
    }
    fn description(&self) -> &str {
        "Verify the audit log's hash chain in isolation, without scoping to a plan. Reports every TAMPER_* finding and the first broken sequence number, if any."
    }
    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }
    fn is_read_only(&self) -> bool {
        true
    }
    async fn execute(&self, state: &GatewayState, _args: Value) -> Result<Value> {
        let log_path = state.session.resolver.audit_log_path()?;
        let chain = atlas_gate_audit::verify_chain(&log_path)?;

        let findings: Vec<Value> = chain.findings.iter().map(|f| json!({ "code": f.code(), "seq": tamper_finding_seq(f) })).collect();
        let first_failing_seq = chain.findings.iter().find_map(tamper_finding_seq);
        Ok(json!({
            "valid": chain.is_valid(),
            "record_count": chain.records.len(),
            "first_failing_seq": first_failing_seq,
            "findings": findings,
        }))
    }
}
