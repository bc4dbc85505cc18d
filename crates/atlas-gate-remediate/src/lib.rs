//! Remediation Proposer (spec.md §4.O) — evidence-bound `PENDING` proposals
//! with human-gated status transitions. The proposer never mutates target
//! state; it only ever produces and advances a proposal record.

use atlas_gate_core::session::OperatorRole;
use atlas_gate_core::{ErrorCode, GateError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const TOOL: &str = "remediation_proposer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalType {
    PolicyExceptionRequest,
    ExecutionRetry,
    InvestigationRequired,
    IntentCorrection,
    PlanCorrection,
}

impl ProposalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalType::PolicyExceptionRequest => "POLICY_EXCEPTION_REQUEST",
            ProposalType::ExecutionRetry => "EXECUTION_RETRY",
            ProposalType::InvestigationRequired => "INVESTIGATION_REQUIRED",
            ProposalType::IntentCorrection => "INTENT_CORRECTION",
            ProposalType::PlanCorrection => "PLAN_CORRECTION",
        }
    }
}

/// Deterministic evidence-code → proposal-type mapping (spec.md §4.O table).
/// Anything not named here falls through to `INVESTIGATION_REQUIRED`.
pub fn map_evidence_to_proposal_type(evidence_code: &str) -> ProposalType {
    match evidence_code {
        "POLICY_VIOLATION_UNSAFE_UNWRAP" => ProposalType::PolicyExceptionRequest,
        "DIVERGENCE_DETECTED" | "DIVERGENCE_IDENTICAL_ARGS_DIFFERENT_RESULTS" => ProposalType::ExecutionRetry,
        "TAMPER_DETECTED_BROKEN_HASH_CHAIN" => ProposalType::InvestigationRequired,
        "INTENT_SCHEMA_VIOLATION" => ProposalType::IntentCorrection,
        "INVARIANT_VIOLATION" => ProposalType::PlanCorrection,
        code if code.starts_with("POLICY_VIOLATION") => ProposalType::PolicyExceptionRequest,
        _ => ProposalType::InvestigationRequired,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationProposal {
    pub proposal_id: String,
    pub proposal_type: ProposalType,
    pub evidence_refs: Vec<String>,
    pub violations_addressed: Vec<String>,
    pub exact_changes_requested: String,
    pub files_affected: Vec<String>,
    pub scope: String,
    pub risk_assessment: String,
    pub verification_after_apply: Vec<String>,
    pub status: ProposalStatus,
    pub created_at: String,
    pub workspace_root: String,
    pub plan_hash: Option<String>,
    pub expiration_condition: Option<String>,
    pub decided_by: Option<String>,
    pub decided_at: Option<String>,
}

/// Caller-supplied fields for a new proposal. `proposal_id`, `status`, and
/// `created_at` are computed by `propose`.
#[derive(Debug, Clone)]
pub struct ProposalInput {
    pub evidence_code: String,
    pub evidence_refs: Vec<String>,
    pub violations_addressed: Vec<String>,
    pub exact_changes_requested: String,
    pub files_affected: Vec<String>,
    pub scope: String,
    pub risk_assessment: String,
    pub verification_after_apply: Vec<String>,
    pub workspace_root: String,
    pub plan_hash: Option<String>,
    pub expiration_condition: Option<String>,
}

fn sha256_hex(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

/// Produce a new `PENDING` proposal bound to non-empty evidence. The
/// proposal's identity is derived entirely from its inputs: the same
/// evidence, proposal type, and creation input always produce the same
/// `proposal_id`.
pub fn propose(input: ProposalInput) -> Result<RemediationProposal> {
    if input.evidence_refs.is_empty() {
        return Err(GateError::new(
            ErrorCode::MissingRequiredField,
            TOOL,
            "a remediation proposal requires at least one evidence reference",
        ));
    }
    if input.evidence_code.trim().is_empty() {
        return Err(GateError::new(ErrorCode::MissingRequiredField, TOOL, "evidence_code is required"));
    }

    let proposal_type = map_evidence_to_proposal_type(&input.evidence_code);
    let evidence_hash = sha256_hex(&input.evidence_refs.join("|"));
    let creation_input = format!(
        "{}|{}|{}|{}",
        input.exact_changes_requested,
        input.scope,
        input.workspace_root,
        input.plan_hash.as_deref().unwrap_or("")
    );
    let id_seed = format!("{}{}{}", evidence_hash, proposal_type.as_str(), creation_input);
    let proposal_id = format!("PROP-{}", &sha256_hex(&id_seed)[..16]);

    Ok(RemediationProposal {
        proposal_id,
        proposal_type,
        evidence_refs: input.evidence_refs,
        violations_addressed: input.violations_addressed,
        exact_changes_requested: input.exact_changes_requested,
        files_affected: input.files_affected,
        scope: input.scope,
        risk_assessment: input.risk_assessment,
        verification_after_apply: input.verification_after_apply,
        status: ProposalStatus::Pending,
        created_at: chrono::Utc::now().to_rfc3339(),
        workspace_root: input.workspace_root,
        plan_hash: input.plan_hash,
        expiration_condition: input.expiration_condition,
        decided_by: None,
        decided_at: None,
    })
}

/// Transition a `PENDING` proposal to `APPROVED` or `REJECTED`. Only an
/// `OWNER` or `REVIEWER` operator identity may decide; the proposer itself
/// never calls this on its own output.
pub fn decide(
    proposal: &mut RemediationProposal,
    decision: ProposalStatus,
    decided_by_role: OperatorRole,
    decided_by_id: &str,
) -> Result<()> {
    if proposal.status != ProposalStatus::Pending {
        return Err(GateError::new(
            ErrorCode::InvalidValue,
            TOOL,
            format!("proposal {} is not PENDING, cannot be decided again", proposal.proposal_id),
        ));
    }
    if decision == ProposalStatus::Pending {
        return Err(GateError::new(ErrorCode::InvalidValue, TOOL, "a decision must be APPROVED or REJECTED"));
    }
    if !matches!(decided_by_role, OperatorRole::Owner | OperatorRole::Reviewer) {
        return Err(GateError::new(
            ErrorCode::InsufficientPermissions,
            TOOL,
            "only an OWNER or REVIEWER operator may decide a remediation proposal",
        ));
    }

    proposal.status = decision;
    proposal.decided_by = Some(decided_by_id.to_string());
    proposal.decided_at = Some(chrono::Utc::now().to_rfc3339());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> ProposalInput {
        ProposalInput {
            evidence_code: "RUST_POLICY_VIOLATION".into(),
            evidence_refs: vec!["audit-seq-12".into()],
            violations_addressed: vec!["unwrap() in src/a.rs".into()],
            exact_changes_requested: "replace unwrap() with a propagated Result".into(),
            files_affected: vec!["src/a.rs".into()],
            scope: "src/a.rs".into(),
            risk_assessment: "low".into(),
            verification_after_apply: vec!["plan_lint".into()],
            workspace_root: "/tmp/ws".into(),
            plan_hash: Some("a".repeat(64)),
            expiration_condition: None,
        }
    }

    #[test]
    fn propose_rejects_empty_evidence_refs() {
        let mut i = input();
        i.evidence_refs.clear();
        let err = propose(i).unwrap_err();
        assert_eq!(err.error_code, ErrorCode::MissingRequiredField);
    }

    #[test]
    fn propose_maps_known_evidence_codes_deterministically() {
        assert_eq!(map_evidence_to_proposal_type("POLICY_VIOLATION_UNSAFE_UNWRAP").as_str(), "POLICY_EXCEPTION_REQUEST");
        assert_eq!(map_evidence_to_proposal_type("DIVERGENCE_DETECTED").as_str(), "EXECUTION_RETRY");
        assert_eq!(map_evidence_to_proposal_type("TAMPER_DETECTED_BROKEN_HASH_CHAIN").as_str(), "INVESTIGATION_REQUIRED");
        assert_eq!(map_evidence_to_proposal_type("INTENT_SCHEMA_VIOLATION").as_str(), "INTENT_CORRECTION");
        assert_eq!(map_evidence_to_proposal_type("INVARIANT_VIOLATION").as_str(), "PLAN_CORRECTION");
        assert_eq!(map_evidence_to_proposal_type("POLICY_VIOLATION").as_str(), "POLICY_EXCEPTION_REQUEST");
        assert_eq!(map_evidence_to_proposal_type("SOMETHING_UNKNOWN").as_str(), "INVESTIGATION_REQUIRED");
    }

    #[test]
    fn proposal_id_is_stable_for_identical_inputs() {
        let a = propose(input()).unwrap();
        let b = propose(input()).unwrap();
        assert_eq!(a.proposal_id, b.proposal_id);
        assert!(a.proposal_id.starts_with("PROP-"));
        assert_eq!(a.proposal_id.len(), "PROP-".len() + 16);
    }

    #[test]
    fn proposal_id_changes_with_different_scope() {
        let a = propose(input()).unwrap();
        let mut other = input();
        other.scope = "src/b.rs".into();
        let b = propose(other).unwrap();
        assert_ne!(a.proposal_id, b.proposal_id);
    }

    #[test]
    fn decide_transitions_pending_to_approved_for_owner() {
        let mut proposal = propose(input()).unwrap();
        decide(&mut proposal, ProposalStatus::Approved, OperatorRole::Owner, "op-1").unwrap();
        assert_eq!(proposal.status, ProposalStatus::Approved);
        assert_eq!(proposal.decided_by.as_deref(), Some("op-1"));
    }

    #[test]
    fn decide_rejects_auditor_role() {
        let mut proposal = propose(input()).unwrap();
        let err = decide(&mut proposal, ProposalStatus::Approved, OperatorRole::Auditor, "op-1").unwrap_err();
        assert_eq!(err.error_code, ErrorCode::InsufficientPermissions);
        assert_eq!(proposal.status, ProposalStatus::Pending);
    }

    #[test]
    fn decide_twice_is_rejected() {
        let mut proposal = propose(input()).unwrap();
        decide(&mut proposal, ProposalStatus::Rejected, OperatorRole::Reviewer, "op-2").unwrap();
        let err = decide(&mut proposal, ProposalStatus::Approved, OperatorRole::Owner, "op-1").unwrap_err();
        assert_eq!(err.error_code, ErrorCode::InvalidValue);
    }
}
