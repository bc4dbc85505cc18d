//! Intent Validator (spec.md §4.H) — schema-validated intent artifact
//! co-located with each write target.
//!
//! Targets under `docs/reports/` are exempt (failure-report paths are
//! generated, not authored). Every validation outcome — success or a
//! specific class of failure — is meant to be audited by the caller before
//! any error propagates; this crate stays audit-agnostic and returns a
//! `Result` the caller records immediately via `atlas-gate-audit`.

use atlas_gate_core::{ErrorCode, GateError};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

const TOOL: &str = "intent_validator";

const REQUIRED_H2_SECTIONS: &[&str] = &[
    "Purpose",
    "Authority",
    "Inputs",
    "Outputs",
    "Invariants",
    "Failure Modes",
    "Debug Signals",
    "Out-of-Scope",
];

const BULLETED_SECTIONS: &[&str] = &["Inputs", "Outputs", "Invariants", "Failure Modes", "Debug Signals", "Out-of-Scope"];

fn forbidden_code_fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`").unwrap())
}

fn forbidden_timestamp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{4}-\d{2}-\d{2}([T ]\d{2}:\d{2}(:\d{2})?)?\b").unwrap())
}

fn forbidden_author_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^\s*(author|by)\s*:").unwrap())
}

fn forbidden_work_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(TODO|FIXME|XXX|HACK|WIP)\b").unwrap())
}

fn conditional_language_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(might|should|could|ideal\w*)\b").unwrap())
}

fn h1_intent_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^#\s+Intent:\s*(.+?)\s*$").unwrap())
}

fn h2_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^##\s+(.+?)\s*$").unwrap())
}

fn authority_plan_hash_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^\s*Plan Hash\s*:\s*([0-9a-fA-F]{64})\s*$").unwrap())
}

fn authority_phase_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^\s*Phase ID\s*:\s*(PHASE_[A-Z0-9_]+)\s*$").unwrap())
}

fn bullet_item_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*-\s+\S").unwrap())
}

/// True for targets exempt from intent-artifact validation.
pub fn is_exempt_target(workspace_relative_path: &str) -> bool {
    workspace_relative_path.starts_with("docs/reports/") || workspace_relative_path.starts_with("docs\\reports\\")
}

#[derive(Debug, Clone)]
pub struct IntentAuthority {
    pub plan_hash: String,
    pub phase_id: String,
}

#[derive(Debug, Clone)]
pub struct IntentRecord {
    pub intent_hash: String,
    pub authority: IntentAuthority,
}

fn section_body<'a>(headers: &[regex::Match<'a>], idx: usize, text: &'a str) -> &'a str {
    let start = headers[idx].end();
    let end = headers.get(idx + 1).map(|m| m.start()).unwrap_or(text.len());
    &text[start..end]
}

/// Validate intent artifact text against a workspace-relative target path
/// and, when supplied, the currently executing plan hash / phase id.
pub fn validate_intent(
    content: &str,
    workspace_relative_target: &str,
    executing_plan_hash: Option<&str>,
    executing_phase_id: Option<&str>,
) -> atlas_gate_core::Result<IntentRecord> {
    if content.trim().is_empty() {
        return Err(GateError::new(ErrorCode::IntentMissing, TOOL, "intent artifact is empty"));
    }

    if let Some(m) = forbidden_code_fence_re().find(content) {
        return Err(schema_violation(format!("forbidden code symbol '{}' present", m.as_str())));
    }
    if let Some(m) = forbidden_timestamp_re().find(content) {
        return Err(schema_violation(format!("forbidden timestamp '{}' present", m.as_str())));
    }
    if forbidden_author_re().is_match(content) {
        return Err(schema_violation("forbidden author/by attribution line present"));
    }
    if let Some(m) = forbidden_work_marker_re().find(content) {
        return Err(schema_violation(format!("forbidden work marker '{}' present", m.as_str())));
    }
    if let Some(m) = conditional_language_re().find(content) {
        return Err(schema_violation(format!("forbidden conditional language '{}' present", m.as_str())));
    }

    let h1 = h1_intent_re()
        .captures(content)
        .ok_or_else(|| schema_violation("missing required '# Intent: <target>' header"))?;
    let declared_target = h1[1].trim();
    if declared_target != workspace_relative_target {
        return Err(schema_violation(format!(
            "'# Intent:' target '{}' does not match workspace-relative target '{}'",
            declared_target, workspace_relative_target
        )));
    }

    let h2_headers: Vec<_> = h2_header_re().find_iter(content).collect();
    let h2_names: Vec<String> = h2_header_re().captures_iter(content).map(|c| c[1].trim().to_string()).collect();
    for required in REQUIRED_H2_SECTIONS {
        if !h2_names.iter().any(|n| n.eq_ignore_ascii_case(required)) {
            return Err(schema_violation(format!("missing required section '## {}'", required)));
        }
    }
    let present_required: Vec<&String> = h2_names.iter().filter(|n| REQUIRED_H2_SECTIONS.iter().any(|r| n.eq_ignore_ascii_case(r))).collect();
    let expected_order: Vec<&String> = REQUIRED_H2_SECTIONS
        .iter()
        .filter_map(|r| present_required.iter().find(|n| n.eq_ignore_ascii_case(r)).copied())
        .collect();
    if present_required != expected_order {
        return Err(schema_violation("required sections present but not in declared order"));
    }

    let authority_idx = h2_names.iter().position(|n| n.eq_ignore_ascii_case("Authority")).expect("checked above");
    let authority_body = section_body(&h2_headers, authority_idx, content);
    let plan_hash = authority_plan_hash_re()
        .captures(authority_body)
        .map(|c| c[1].to_ascii_lowercase())
        .ok_or_else(|| schema_violation("'## Authority' missing 'Plan Hash: <64-hex>'"))?;
    let phase_id = authority_phase_id_re()
        .captures(authority_body)
        .map(|c| c[1].to_string())
        .ok_or_else(|| schema_violation("'## Authority' missing 'Phase ID: PHASE_<NAME>'"))?;

    if let Some(expected) = executing_plan_hash {
        if expected.to_ascii_lowercase() != plan_hash {
            return Err(GateError::new(
                ErrorCode::IntentAuthorityDrift,
                TOOL,
                format!("intent authority plan hash {} does not match executing plan hash {}", plan_hash, expected),
            ));
        }
    }
    if let Some(expected) = executing_phase_id {
        if expected != phase_id {
            return Err(GateError::new(
                ErrorCode::IntentAuthorityDrift,
                TOOL,
                format!("intent authority phase id {} does not match executing phase id {}", phase_id, expected),
            ));
        }
    }

    for section in BULLETED_SECTIONS {
        let idx = h2_names.iter().position(|n| n.eq_ignore_ascii_case(section)).expect("checked above");
        let body = section_body(&h2_headers, idx, content);
        if !bullet_item_re().is_match(body) {
            return Err(schema_violation(format!("section '## {}' has no bulleted items", section)));
        }
    }

    let intent_hash = sha256_hex(content.trim());

    Ok(IntentRecord {
        intent_hash,
        authority: IntentAuthority { plan_hash, phase_id },
    })
}

fn schema_violation(message: impl Into<String>) -> GateError {
    GateError::new(ErrorCode::IntentSchemaViolation, TOOL, message)
}

fn sha256_hex(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}
