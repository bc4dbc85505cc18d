//! Replay Engine (spec.md §4.M) — pure, read-only re-derivation of
//! verdicts from the audit log: chain verification, determinism, and
//! authority/policy findings.

use atlas_gate_audit::{verify_chain, AuditRecord, TamperFinding};
use atlas_gate_core::{ErrorCode, GateError, Result};
use std::collections::HashMap;
use std::path::Path;

/// A single replay finding. `Tamper` wraps the audit chain's own finding
/// types; the rest are replay-specific.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayFinding {
    Tamper(TamperFinding),
    DivergenceIdenticalArgsDifferentResults { args_hash: String, tool: String, phase_id: Option<String> },
    PolicyViolationBlockedByGate { seq: u64 },
    PolicyViolationInvariantViolation { seq: u64 },
    AuthorityViolationExecutionWithoutPlan { seq: u64 },
    AuthorityViolationRoleMismatch { seq: u64 },
    EvidenceGapIncompletePlanExecution { plan_hash: String },
}

impl ReplayFinding {
    pub fn code(&self) -> String {
        match self {
            ReplayFinding::Tamper(t) => t.code().to_string(),
            ReplayFinding::DivergenceIdenticalArgsDifferentResults { .. } => "DIVERGENCE_IDENTICAL_ARGS_DIFFERENT_RESULTS".to_string(),
            ReplayFinding::PolicyViolationBlockedByGate { .. } => "POLICY_VIOLATION_BLOCKED_BY_GATE".to_string(),
            ReplayFinding::PolicyViolationInvariantViolation { .. } => "POLICY_VIOLATION_INVARIANT_VIOLATION".to_string(),
            ReplayFinding::AuthorityViolationExecutionWithoutPlan { .. } => "AUTHORITY_VIOLATION_EXECUTION_WITHOUT_PLAN".to_string(),
            ReplayFinding::AuthorityViolationRoleMismatch { .. } => "AUTHORITY_VIOLATION_ROLE_MISMATCH".to_string(),
            ReplayFinding::EvidenceGapIncompletePlanExecution { .. } => "EVIDENCE_GAP_INCOMPLETE_PLAN_EXECUTION".to_string(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TimelineEntry {
    pub seq: u64,
    pub ts: String,
    pub tool: String,
    pub role: String,
    pub intent: Option<String>,
    pub plan_hash: Option<String>,
    pub phase_id: Option<String>,
    pub args_hash: String,
    pub result_hash: Option<String>,
    pub error_code: Option<String>,
    pub invariant_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
}

#[derive(Debug, Clone)]
pub struct ReplayReport {
    pub timeline: Vec<TimelineEntry>,
    pub findings: Vec<ReplayFinding>,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, Default)]
pub struct ReplayFilter {
    pub phase_id: Option<String>,
    pub tool: Option<String>,
    pub seq_range: Option<(u64, u64)>,
}

fn is_hex64(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit()) && s.chars().all(|c| !c.is_ascii_uppercase())
}

/// Replay the audit log at `log_path` for `plan_hash`, optionally narrowed
/// by `filter`. Read-only: never mutates the log.
pub fn replay(workspace_root: &str, log_path: &Path, plan_hash: &str, filter: ReplayFilter) -> Result<ReplayReport> {
    if workspace_root.trim().is_empty() {
        return Err(GateError::new(ErrorCode::InvalidValue, "replay_execution", "workspace_root must be non-empty"));
    }
    if !is_hex64(plan_hash) {
        return Err(GateError::new(ErrorCode::InvalidFormat, "replay_execution", "plan_hash must be 64 lowercase hex characters"));
    }

    let chain = verify_chain(log_path)?;
    let mut findings: Vec<ReplayFinding> = chain.findings.into_iter().map(ReplayFinding::Tamper).collect();

    let mut records = chain.records;
    if let Some(range) = filter.seq_range {
        records.retain(|r| r.seq >= range.0 && r.seq <= range.1);
    }
    if let Some(tool) = &filter.tool {
        records.retain(|r| &r.tool == tool);
    }
    if let Some(phase) = &filter.phase_id {
        records.retain(|r| r.phase_id.as_deref() == Some(phase.as_str()));
    }

    findings.extend(determinism_findings(&records));
    findings.extend(authority_and_policy_findings(&records));

    let scope_present = records.iter().any(|r| r.plan_hash.as_deref() == Some(plan_hash));
    if !scope_present {
        findings.push(ReplayFinding::EvidenceGapIncompletePlanExecution { plan_hash: plan_hash.to_string() });
    }

    let timeline = records
        .iter()
        .map(|r| TimelineEntry {
            seq: r.seq,
            ts: r.ts.clone(),
            tool: r.tool.clone(),
            role: r.role.clone(),
            intent: r.notes.clone(),
            plan_hash: r.plan_hash.clone(),
            phase_id: r.phase_id.clone(),
            args_hash: r.args_hash.clone(),
            result_hash: r.result_hash.clone(),
            error_code: r.error_code.clone(),
            invariant_id: r.invariant_id.clone(),
        })
        .collect();

    let verdict = if findings.is_empty() { Verdict::Pass } else { Verdict::Fail };

    Ok(ReplayReport { timeline, findings, verdict })
}

/// I5 / spec.md §4.M step 6: within each `(phase_id, tool)` partition,
/// records sharing an `args_hash` must share an identical `result_hash`.
fn determinism_findings(records: &[AuditRecord]) -> Vec<ReplayFinding> {
    let mut by_key: HashMap<(Option<String>, String, String), Vec<Option<String>>> = HashMap::new();
    for r in records {
        by_key
            .entry((r.phase_id.clone(), r.tool.clone(), r.args_hash.clone()))
            .or_default()
            .push(r.result_hash.clone());
    }
    let mut findings = Vec::new();
    for ((phase_id, tool, args_hash), results) in by_key {
        let mut distinct: Vec<&Option<String>> = Vec::new();
        for r in &results {
            if !distinct.contains(&r) {
                distinct.push(r);
            }
        }
        if distinct.len() > 1 {
            findings.push(ReplayFinding::DivergenceIdenticalArgsDifferentResults { args_hash, tool, phase_id });
        }
    }
    findings
}

fn authority_and_policy_findings(records: &[AuditRecord]) -> Vec<ReplayFinding> {
    let mut findings = Vec::new();
    for r in records {
        let Some(code) = &r.error_code else { continue };
        if code == "INVARIANT_VIOLATION" {
            findings.push(ReplayFinding::PolicyViolationInvariantViolation { seq: r.seq });
        } else if code == "PLAN_NOT_APPROVED" {
            findings.push(ReplayFinding::AuthorityViolationExecutionWithoutPlan { seq: r.seq });
        } else if code == "ROLE_MISMATCH" {
            findings.push(ReplayFinding::AuthorityViolationRoleMismatch { seq: r.seq });
        } else if code == "POLICY_VIOLATION" || code.ends_with("_POLICY_VIOLATION") {
            findings.push(ReplayFinding::PolicyViolationBlockedByGate { seq: r.seq });
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_gate_audit::{append, NewAuditRecord};
    use tempfile::TempDir;

    fn base_record(tool: &str, plan_hash: Option<&str>, args_hash: &str, result_hash: Option<&str>, error_code: Option<&str>) -> NewAuditRecord {
        NewAuditRecord {
            session_id: "sess-1".into(),
            role: "EXECUTION".into(),
            tool: tool.into(),
            event_type: "write".into(),
            plan_hash: plan_hash.map(|s| s.to_string()),
            phase_id: Some("PHASE_ONE".into()),
            args_hash: args_hash.into(),
            result: if error_code.is_some() { "error".into() } else { "ok".into() },
            error_code: error_code.map(|s| s.to_string()),
            invariant_id: None,
            result_hash: result_hash.map(|s| s.to_string()),
            notes: None,
        }
    }

    #[test]
    fn clean_log_replays_to_pass() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("audit-log.jsonl");
        let lock = tmp.path().join("audit.lock");
        let plan_hash = "a".repeat(64);
        append(&log, &lock, 5, 3, base_record("write_file", Some(&plan_hash), "args1", Some("r1"), None)).unwrap();

        let report = replay("/tmp/ws", &log, &plan_hash, ReplayFilter::default()).unwrap();
        assert_eq!(report.verdict, Verdict::Pass);
        assert!(report.findings.is_empty());
        assert_eq!(report.timeline.len(), 1);
    }

    #[test]
    fn divergent_results_for_identical_args_fail_replay() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("audit-log.jsonl");
        let lock = tmp.path().join("audit.lock");
        let plan_hash = "b".repeat(64);
        append(&log, &lock, 5, 3, base_record("write_file", Some(&plan_hash), "same-args", Some("r1"), None)).unwrap();
        append(&log, &lock, 5, 3, base_record("write_file", Some(&plan_hash), "same-args", Some("r2"), None)).unwrap();

        let report = replay("/tmp/ws", &log, &plan_hash, ReplayFilter::default()).unwrap();
        assert_eq!(report.verdict, Verdict::Fail);
        assert!(report.findings.iter().any(|f| f.code() == "DIVERGENCE_IDENTICAL_ARGS_DIFFERENT_RESULTS"));
    }

    #[test]
    fn plan_not_approved_error_code_is_authority_violation() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("audit-log.jsonl");
        let lock = tmp.path().join("audit.lock");
        let plan_hash = "c".repeat(64);
        append(&log, &lock, 5, 3, base_record("write_file", Some(&plan_hash), "args1", None, Some("PLAN_NOT_APPROVED"))).unwrap();

        let report = replay("/tmp/ws", &log, &plan_hash, ReplayFilter::default()).unwrap();
        assert_eq!(report.verdict, Verdict::Fail);
        assert!(report.findings.iter().any(|f| f.code() == "AUTHORITY_VIOLATION_EXECUTION_WITHOUT_PLAN"));
    }

    #[test]
    fn missing_plan_hash_coverage_is_evidence_gap() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("audit-log.jsonl");
        let lock = tmp.path().join("audit.lock");
        let other_plan = "d".repeat(64);
        append(&log, &lock, 5, 3, base_record("write_file", Some(&other_plan), "args1", Some("r1"), None)).unwrap();

        let requested_plan = "e".repeat(64);
        let report = replay("/tmp/ws", &log, &requested_plan, ReplayFilter::default()).unwrap();
        assert_eq!(report.verdict, Verdict::Fail);
        assert!(report.findings.iter().any(|f| f.code() == "EVIDENCE_GAP_INCOMPLETE_PLAN_EXECUTION"));
    }

    #[test]
    fn tampered_log_fails_replay() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("audit-log.jsonl");
        let lock = tmp.path().join("audit.lock");
        let plan_hash = "f".repeat(64);
        append(&log, &lock, 5, 3, base_record("write_file", Some(&plan_hash), "args1", Some("r1"), None)).unwrap();

        let content = std::fs::read_to_string(&log).unwrap();
        let tampered = content.replace("sess-1", "sess-X");
        std::fs::write(&log, tampered).unwrap();

        let report = replay("/tmp/ws", &log, &plan_hash, ReplayFilter::default()).unwrap();
        assert_eq!(report.verdict, Verdict::Fail);
        assert!(report.findings.iter().any(|f| f.code() == "TAMPER_DETECTED_RECOMPUTATION_MISMATCH"));
    }

    #[test]
    fn language_policy_violation_codes_are_blocked_by_gate_findings() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("audit-log.jsonl");
        let lock = tmp.path().join("audit.lock");
        let plan_hash = "1".repeat(64);
        for (i, code) in ["RUST_POLICY_VIOLATION", "TS_JS_POLICY_VIOLATION", "PYTHON_POLICY_VIOLATION"]
            .iter()
            .enumerate()
        {
            append(
                &log,
                &lock,
                5,
                3,
                base_record("write_file", Some(&plan_hash), &format!("args{i}"), None, Some(code)),
            )
            .unwrap();
        }
        append(&log, &lock, 5, 3, base_record("write_file", Some(&plan_hash), "args-invariant", None, Some("INVARIANT_VIOLATION"))).unwrap();

        let report = replay("/tmp/ws", &log, &plan_hash, ReplayFilter::default()).unwrap();
        assert_eq!(report.verdict, Verdict::Fail);
        let blocked_by_gate = report.findings.iter().filter(|f| f.code() == "POLICY_VIOLATION_BLOCKED_BY_GATE").count();
        assert_eq!(blocked_by_gate, 3, "RUST_/TS_JS_/PYTHON_POLICY_VIOLATION must all classify as POLICY_VIOLATION_BLOCKED_BY_GATE");
        assert!(report.findings.iter().any(|f| f.code() == "POLICY_VIOLATION_INVARIANT_VIOLATION"));
    }

    #[test]
    fn rejects_malformed_plan_hash() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("audit-log.jsonl");
        let err = replay("/tmp/ws", &log, "not-hex", ReplayFilter::default()).unwrap_err();
        assert_eq!(err.error_code, ErrorCode::InvalidFormat);
    }
}
